use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The three editable configuration families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    BadDebt,
    BusinessRules,
    Clustering,
}

impl ConfigType {
    pub fn label(self) -> &'static str {
        match self {
            ConfigType::BadDebt => "bad_debt",
            ConfigType::BusinessRules => "business_rules",
            ConfigType::Clustering => "clustering",
        }
    }

    pub fn all() -> [ConfigType; 3] {
        [
            ConfigType::BadDebt,
            ConfigType::BusinessRules,
            ConfigType::Clustering,
        ]
    }
}

/// Recognized keys per configuration type. Drafts carrying keys outside this
/// set are rejected; missing keys fall back to defaults at read time.
pub fn recognized_keys(config_type: ConfigType) -> &'static [&'static str] {
    match config_type {
        ConfigType::BadDebt => &[
            "topup_advance_ratio_weight",
            "topup_frequency_weight",
            "arpu_stability_weight",
            "avg_topup_weight",
            "base_risk_score",
            "low_risk_threshold",
            "high_risk_threshold",
        ],
        ConfigType::BusinessRules => &[
            "voice_sms_threshold",
            "ungsanluong_arpu_multiplier",
            "ungsanluong_min_amount",
            "ungsanluong_max_amount",
            "ungsanluong_revenue_rate",
            "easycredit_min_topup_count_1m",
            "easycredit_min_topup_amount",
            "easycredit_min_topup_count_2m",
            "easycredit_vip_arpu_threshold",
            "easycredit_default_amount",
            "easycredit_vip_amount",
            "easycredit_revenue_rate",
            "mbfg_min_topup_count_1m",
            "mbfg_arpu_multiplier",
            "mbfg_min_amount",
            "mbfg_max_amount",
            "mbfg_revenue_rate",
        ],
        ConfigType::Clustering => &["n_clusters", "n_init", "max_iter", "random_state"],
    }
}

fn get(data: &BTreeMap<String, f64>, key: &str, default: f64) -> f64 {
    data.get(key).copied().unwrap_or(default)
}

/// Bad-debt scorer weights and thresholds. Weights are percentage
/// contributions intended (not enforced) to sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadDebtWeights {
    pub topup_advance_ratio_weight: f64,
    pub topup_frequency_weight: f64,
    pub arpu_stability_weight: f64,
    pub avg_topup_weight: f64,
    pub base_risk_score: f64,
    pub low_risk_threshold: f64,
    pub high_risk_threshold: f64,
}

impl Default for BadDebtWeights {
    fn default() -> Self {
        Self {
            topup_advance_ratio_weight: 40.0,
            topup_frequency_weight: 20.0,
            arpu_stability_weight: 20.0,
            avg_topup_weight: 20.0,
            base_risk_score: 50.0,
            low_risk_threshold: 30.0,
            high_risk_threshold: 60.0,
        }
    }
}

impl BadDebtWeights {
    pub fn from_map(data: &BTreeMap<String, f64>) -> Self {
        let d = Self::default();
        Self {
            topup_advance_ratio_weight: get(
                data,
                "topup_advance_ratio_weight",
                d.topup_advance_ratio_weight,
            ),
            topup_frequency_weight: get(data, "topup_frequency_weight", d.topup_frequency_weight),
            arpu_stability_weight: get(data, "arpu_stability_weight", d.arpu_stability_weight),
            avg_topup_weight: get(data, "avg_topup_weight", d.avg_topup_weight),
            base_risk_score: get(data, "base_risk_score", d.base_risk_score),
            low_risk_threshold: get(data, "low_risk_threshold", d.low_risk_threshold),
            high_risk_threshold: get(data, "high_risk_threshold", d.high_risk_threshold),
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.topup_advance_ratio_weight
            + self.topup_frequency_weight
            + self.arpu_stability_weight
            + self.avg_topup_weight
    }
}

/// Per-branch thresholds and multipliers for the service classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRuleWeights {
    // Quota (ungsanluong)
    pub voice_sms_threshold: f64,
    pub ungsanluong_arpu_multiplier: f64,
    pub ungsanluong_min_amount: f64,
    pub ungsanluong_max_amount: f64,
    pub ungsanluong_revenue_rate: f64,
    // Fee (EasyCredit)
    pub easycredit_min_topup_count_1m: f64,
    pub easycredit_min_topup_amount: f64,
    pub easycredit_min_topup_count_2m: f64,
    pub easycredit_vip_arpu_threshold: f64,
    pub easycredit_default_amount: f64,
    pub easycredit_vip_amount: f64,
    pub easycredit_revenue_rate: f64,
    // Free (MBFG)
    pub mbfg_min_topup_count_1m: f64,
    pub mbfg_arpu_multiplier: f64,
    pub mbfg_min_amount: f64,
    pub mbfg_max_amount: f64,
    pub mbfg_revenue_rate: f64,
}

impl Default for BusinessRuleWeights {
    fn default() -> Self {
        Self {
            voice_sms_threshold: 70.0,
            ungsanluong_arpu_multiplier: 0.8,
            ungsanluong_min_amount: 10_000.0,
            ungsanluong_max_amount: 50_000.0,
            ungsanluong_revenue_rate: 0.20,
            easycredit_min_topup_count_1m: 1.0,
            easycredit_min_topup_amount: 50_000.0,
            easycredit_min_topup_count_2m: 1.0,
            easycredit_vip_arpu_threshold: 100_000.0,
            easycredit_default_amount: 25_000.0,
            easycredit_vip_amount: 50_000.0,
            easycredit_revenue_rate: 0.30,
            mbfg_min_topup_count_1m: 2.0,
            mbfg_arpu_multiplier: 1.2,
            mbfg_min_amount: 10_000.0,
            mbfg_max_amount: 50_000.0,
            mbfg_revenue_rate: 0.30,
        }
    }
}

impl BusinessRuleWeights {
    pub fn from_map(data: &BTreeMap<String, f64>) -> Self {
        let d = Self::default();
        Self {
            voice_sms_threshold: get(data, "voice_sms_threshold", d.voice_sms_threshold),
            ungsanluong_arpu_multiplier: get(
                data,
                "ungsanluong_arpu_multiplier",
                d.ungsanluong_arpu_multiplier,
            ),
            ungsanluong_min_amount: get(data, "ungsanluong_min_amount", d.ungsanluong_min_amount),
            ungsanluong_max_amount: get(data, "ungsanluong_max_amount", d.ungsanluong_max_amount),
            ungsanluong_revenue_rate: get(
                data,
                "ungsanluong_revenue_rate",
                d.ungsanluong_revenue_rate,
            ),
            easycredit_min_topup_count_1m: get(
                data,
                "easycredit_min_topup_count_1m",
                d.easycredit_min_topup_count_1m,
            ),
            easycredit_min_topup_amount: get(
                data,
                "easycredit_min_topup_amount",
                d.easycredit_min_topup_amount,
            ),
            easycredit_min_topup_count_2m: get(
                data,
                "easycredit_min_topup_count_2m",
                d.easycredit_min_topup_count_2m,
            ),
            easycredit_vip_arpu_threshold: get(
                data,
                "easycredit_vip_arpu_threshold",
                d.easycredit_vip_arpu_threshold,
            ),
            easycredit_default_amount: get(
                data,
                "easycredit_default_amount",
                d.easycredit_default_amount,
            ),
            easycredit_vip_amount: get(data, "easycredit_vip_amount", d.easycredit_vip_amount),
            easycredit_revenue_rate: get(
                data,
                "easycredit_revenue_rate",
                d.easycredit_revenue_rate,
            ),
            mbfg_min_topup_count_1m: get(
                data,
                "mbfg_min_topup_count_1m",
                d.mbfg_min_topup_count_1m,
            ),
            mbfg_arpu_multiplier: get(data, "mbfg_arpu_multiplier", d.mbfg_arpu_multiplier),
            mbfg_min_amount: get(data, "mbfg_min_amount", d.mbfg_min_amount),
            mbfg_max_amount: get(data, "mbfg_max_amount", d.mbfg_max_amount),
            mbfg_revenue_rate: get(data, "mbfg_revenue_rate", d.mbfg_revenue_rate),
        }
    }
}

/// Contract parameters for the clustering stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringParams {
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub random_state: u64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            n_init: 20,
            max_iter: 500,
            random_state: 42,
        }
    }
}

impl ClusteringParams {
    /// Reads the numeric map, clamping to sane floors: fewer than two
    /// clusters or zero initializations would make the stage degenerate.
    pub fn from_map(data: &BTreeMap<String, f64>) -> Self {
        let d = Self::default();
        let as_usize = |key: &str, default: usize, floor: usize| -> usize {
            let raw = get(data, key, default as f64);
            (raw.max(0.0) as usize).max(floor)
        };
        Self {
            n_clusters: as_usize("n_clusters", d.n_clusters, 2),
            n_init: as_usize("n_init", d.n_init, 1),
            max_iter: as_usize("max_iter", d.max_iter, 1),
            random_state: get(data, "random_state", d.random_state as f64).max(0.0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let bad_debt = BadDebtWeights::default();
        assert_eq!(bad_debt.weight_sum(), 100.0);
        assert_eq!(bad_debt.base_risk_score, 50.0);

        let rules = BusinessRuleWeights::default();
        assert_eq!(rules.voice_sms_threshold, 70.0);
        assert_eq!(rules.easycredit_default_amount, 25_000.0);

        let clustering = ClusteringParams::default();
        assert_eq!(clustering.n_clusters, 3);
        assert_eq!(clustering.random_state, 42);
    }

    #[test]
    fn from_map_overrides_only_present_keys() {
        let mut data = BTreeMap::new();
        data.insert("voice_sms_threshold".to_string(), 55.0);
        let rules = BusinessRuleWeights::from_map(&data);
        assert_eq!(rules.voice_sms_threshold, 55.0);
        assert_eq!(rules.mbfg_arpu_multiplier, 1.2);
    }

    #[test]
    fn clustering_params_clamp_degenerate_values() {
        let mut data = BTreeMap::new();
        data.insert("n_clusters".to_string(), 1.0);
        data.insert("n_init".to_string(), 0.0);
        let params = ClusteringParams::from_map(&data);
        assert_eq!(params.n_clusters, 2);
        assert_eq!(params.n_init, 1);
    }
}
