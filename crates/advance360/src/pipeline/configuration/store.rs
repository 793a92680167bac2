use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::schema::{
    recognized_keys, BadDebtWeights, BusinessRuleWeights, ClusteringParams, ConfigType,
};

/// A stored configuration record. `config_type` is immutable after
/// creation; `config_data` holds only recognized keys for that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub config_type: ConfigType,
    pub config_data: BTreeMap<String, f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator-supplied fields for create/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config_type: ConfigType,
    pub config_data: BTreeMap<String, f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("configuration not found")]
    NotFound,
    #[error("active configuration cannot be deleted; deactivate it first")]
    InUse,
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// In-process transactional store enforcing the single-active-per-type
/// invariant. All mutations run under one mutex, so `activate` swaps the
/// flag atomically: no observer ever sees two active records of one type,
/// and once a type has an active record there is no instant without one.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    records: Mutex<Vec<Configuration>>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, draft: ConfigurationDraft) -> Result<Configuration, ConfigStoreError> {
        validate_draft(&draft)?;
        let now = Utc::now();
        let record = Configuration {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            config_type: draft.config_type,
            config_data: draft.config_data,
            is_active: false,
            created_at: now,
            updated_at: now,
        };

        let mut records = self.lock();
        records.push(record.clone());
        Ok(record)
    }

    /// Replaces name/description/data. The record's type cannot change.
    pub fn update(
        &self,
        id: Uuid,
        draft: ConfigurationDraft,
    ) -> Result<Configuration, ConfigStoreError> {
        validate_draft(&draft)?;
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(ConfigStoreError::NotFound)?;

        if record.config_type != draft.config_type {
            return Err(ConfigStoreError::Validation(format!(
                "config_type is immutable: record is '{}', draft says '{}'",
                record.config_type.label(),
                draft.config_type.label()
            )));
        }

        record.name = draft.name;
        record.description = draft.description;
        record.config_data = draft.config_data;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn delete(&self, id: Uuid) -> Result<(), ConfigStoreError> {
        let mut records = self.lock();
        let index = records
            .iter()
            .position(|record| record.id == id)
            .ok_or(ConfigStoreError::NotFound)?;
        if records[index].is_active {
            return Err(ConfigStoreError::InUse);
        }
        records.remove(index);
        Ok(())
    }

    /// Activates `id` and deactivates any other record of the same type in
    /// one critical section.
    pub fn activate(&self, id: Uuid) -> Result<Configuration, ConfigStoreError> {
        let mut records = self.lock();
        let config_type = records
            .iter()
            .find(|record| record.id == id)
            .map(|record| record.config_type)
            .ok_or(ConfigStoreError::NotFound)?;

        let now = Utc::now();
        let mut activated = None;
        for record in records.iter_mut() {
            if record.config_type != config_type {
                continue;
            }
            let should_be_active = record.id == id;
            if record.is_active != should_be_active {
                record.is_active = should_be_active;
                record.updated_at = now;
            }
            if should_be_active {
                activated = Some(record.clone());
            }
        }
        // Unwrap is safe: the id was found above while the lock was held.
        Ok(activated.expect("activated record present"))
    }

    pub fn get(&self, id: Uuid) -> Result<Configuration, ConfigStoreError> {
        self.lock()
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or(ConfigStoreError::NotFound)
    }

    /// Lists records, newest first, optionally filtered by type.
    pub fn list(&self, filter_by_type: Option<ConfigType>) -> Vec<Configuration> {
        let mut records: Vec<Configuration> = self
            .lock()
            .iter()
            .filter(|record| filter_by_type.map_or(true, |t| record.config_type == t))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }

    pub fn active(&self, config_type: ConfigType) -> Option<Configuration> {
        self.lock()
            .iter()
            .find(|record| record.config_type == config_type && record.is_active)
            .cloned()
    }

    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        let records = self.lock();
        let mut counts = BTreeMap::new();
        for config_type in ConfigType::all() {
            let count = records
                .iter()
                .filter(|record| record.config_type == config_type)
                .count();
            if count > 0 {
                counts.insert(config_type.label().to_string(), count);
            }
        }
        counts
    }

    /// Resolves the typed views a run will see: the active record per type,
    /// falling back to documented defaults where no record is active.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let records = self.lock();
        let active = |config_type: ConfigType| {
            records
                .iter()
                .find(|record| record.config_type == config_type && record.is_active)
        };

        let bad_debt_record = active(ConfigType::BadDebt);
        let business_record = active(ConfigType::BusinessRules);
        let clustering_record = active(ConfigType::Clustering);

        ConfigSnapshot {
            config_id: business_record.map(|record| record.id),
            bad_debt: bad_debt_record
                .map(|record| BadDebtWeights::from_map(&record.config_data))
                .unwrap_or_default(),
            business_rules: business_record
                .map(|record| BusinessRuleWeights::from_map(&record.config_data))
                .unwrap_or_default(),
            clustering: clustering_record
                .map(|record| ClusteringParams::from_map(&record.config_data))
                .unwrap_or_default(),
        }
    }

    /// Snapshot with one record substituted for its type regardless of the
    /// active flag, pinning `config_id` to that record.
    pub fn snapshot_with_override(
        &self,
        config_id: Uuid,
    ) -> Result<ConfigSnapshot, ConfigStoreError> {
        let record = self.get(config_id)?;
        let mut snapshot = self.snapshot();
        match record.config_type {
            ConfigType::BadDebt => {
                snapshot.bad_debt = BadDebtWeights::from_map(&record.config_data);
            }
            ConfigType::BusinessRules => {
                snapshot.business_rules = BusinessRuleWeights::from_map(&record.config_data);
            }
            ConfigType::Clustering => {
                snapshot.clustering = ClusteringParams::from_map(&record.config_data);
            }
        }
        snapshot.config_id = Some(record.id);
        Ok(snapshot)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Configuration>> {
        self.records.lock().expect("configuration store mutex poisoned")
    }
}

/// Typed configuration views pinned at run start, isolating an in-flight
/// run from concurrent operator edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Identifier of the business-rules record the run was pinned to, when
    /// one was active or explicitly requested.
    pub config_id: Option<Uuid>,
    pub bad_debt: BadDebtWeights,
    pub business_rules: BusinessRuleWeights,
    pub clustering: ClusteringParams,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            config_id: None,
            bad_debt: BadDebtWeights::default(),
            business_rules: BusinessRuleWeights::default(),
            clustering: ClusteringParams::default(),
        }
    }
}

fn validate_draft(draft: &ConfigurationDraft) -> Result<(), ConfigStoreError> {
    if draft.name.trim().is_empty() {
        return Err(ConfigStoreError::Validation(
            "name must not be empty".to_string(),
        ));
    }

    let known = recognized_keys(draft.config_type);
    for (key, value) in &draft.config_data {
        if !known.contains(&key.as_str()) {
            return Err(ConfigStoreError::Validation(format!(
                "unrecognized key '{}' for config_type '{}'",
                key,
                draft.config_type.label()
            )));
        }
        if !value.is_finite() {
            return Err(ConfigStoreError::Validation(format!(
                "value for '{key}' must be a finite number"
            )));
        }
    }

    // Recommended, not enforced: bad-debt weights are meant to sum to 100.
    if draft.config_type == ConfigType::BadDebt {
        let weights = BadDebtWeights::from_map(&draft.config_data);
        let sum = weights.weight_sum();
        if !weight_sum_is_nominal(sum) {
            warn!(weight_sum = sum, name = %draft.name, "bad_debt weights do not sum to 100");
        }
    }

    Ok(())
}

/// The tolerance absorbs representation error in operator-entered
/// percentages (33.4 + 33.3 + 33.3 only approximates 100 in binary).
fn weight_sum_is_nominal(sum: f64) -> bool {
    (sum - 100.0).abs() <= 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(config_type: ConfigType, name: &str) -> ConfigurationDraft {
        ConfigurationDraft {
            name: name.to_string(),
            description: None,
            config_type,
            config_data: BTreeMap::new(),
        }
    }

    #[test]
    fn create_starts_inactive() {
        let store = ConfigurationStore::new();
        let record = store
            .create(draft(ConfigType::BadDebt, "baseline"))
            .expect("creates");
        assert!(!record.is_active);
    }

    #[test]
    fn activate_swaps_within_type_only() {
        let store = ConfigurationStore::new();
        let a = store
            .create(draft(ConfigType::BadDebt, "a"))
            .expect("creates");
        let b = store
            .create(draft(ConfigType::BadDebt, "b"))
            .expect("creates");
        let other = store
            .create(draft(ConfigType::Clustering, "kmeans"))
            .expect("creates");
        store.activate(other.id).expect("activates");
        store.activate(a.id).expect("activates");
        store.activate(b.id).expect("activates");

        let bad_debt = store.list(Some(ConfigType::BadDebt));
        let active: Vec<_> = bad_debt.iter().filter(|r| r.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        assert!(store.active(ConfigType::Clustering).is_some());
    }

    #[test]
    fn delete_active_is_rejected() {
        let store = ConfigurationStore::new();
        let record = store
            .create(draft(ConfigType::BusinessRules, "rules"))
            .expect("creates");
        store.activate(record.id).expect("activates");
        assert!(matches!(
            store.delete(record.id),
            Err(ConfigStoreError::InUse)
        ));
    }

    #[test]
    fn update_round_trips_config_data() {
        let store = ConfigurationStore::new();
        let record = store
            .create(draft(ConfigType::BusinessRules, "rules"))
            .expect("creates");

        let mut data = BTreeMap::new();
        data.insert("voice_sms_threshold".to_string(), 65.0);
        data.insert("mbfg_min_amount".to_string(), 12_000.0);
        let mut updated_draft = draft(ConfigType::BusinessRules, "rules v2");
        updated_draft.config_data = data.clone();
        store.update(record.id, updated_draft).expect("updates");

        let fetched = store.get(record.id).expect("fetches");
        assert_eq!(fetched.config_data, data);
        assert_eq!(fetched.name, "rules v2");
    }

    #[test]
    fn retype_on_update_is_rejected() {
        let store = ConfigurationStore::new();
        let record = store
            .create(draft(ConfigType::BadDebt, "weights"))
            .expect("creates");
        let result = store.update(record.id, draft(ConfigType::Clustering, "weights"));
        assert!(matches!(result, Err(ConfigStoreError::Validation(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let store = ConfigurationStore::new();
        let mut bad = draft(ConfigType::Clustering, "kmeans");
        bad.config_data.insert("n_neighbours".to_string(), 5.0);
        assert!(matches!(
            store.create(bad),
            Err(ConfigStoreError::Validation(_))
        ));
    }

    #[test]
    fn weight_sum_check_absorbs_float_noise() {
        assert!(weight_sum_is_nominal(100.0));
        assert!(weight_sum_is_nominal(33.4 + 33.3 + 33.3));
        assert!(weight_sum_is_nominal(40.0 + 20.0 + 20.0 + 20.0));
        assert!(!weight_sum_is_nominal(99.0));
        assert!(!weight_sum_is_nominal(100.5));
    }

    #[test]
    fn snapshot_falls_back_to_defaults() {
        let store = ConfigurationStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.business_rules, BusinessRuleWeights::default());
        assert!(snapshot.config_id.is_none());
    }

    #[test]
    fn snapshot_with_override_pins_the_record() {
        let store = ConfigurationStore::new();
        let mut custom = draft(ConfigType::BusinessRules, "custom");
        custom
            .config_data
            .insert("voice_sms_threshold".to_string(), 55.0);
        let record = store.create(custom).expect("creates");

        let snapshot = store
            .snapshot_with_override(record.id)
            .expect("snapshots");
        assert_eq!(snapshot.business_rules.voice_sms_threshold, 55.0);
        assert_eq!(snapshot.config_id, Some(record.id));
    }
}
