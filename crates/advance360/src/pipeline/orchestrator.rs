//! Run orchestration: sequences the pipeline phases, enforces the
//! single-active-run rule, and records progress, logs, and metrics per run.
//!
//! Execution is synchronous; callers that must not block wrap
//! [`Orchestrator::execute`] in a blocking task. Configuration is pinned
//! into the run at submission, so an edit mid-run never changes behavior.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::classification::classify;
use super::clustering::cluster_subscribers;
use super::configuration::{ConfigSnapshot, ConfigStoreError, ConfigurationStore};
use super::datasets::{Dataset, DatasetStore};
use super::features::derive_features;
use super::ingest::{load_selection, FileSelection, IngestError};
use super::risk::assess;
use super::summary;

/// Pipeline phases in execution order. Wire names keep the numbering the
/// operational tooling already knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseId {
    #[serde(rename = "phase1")]
    DataLoad,
    #[serde(rename = "phase2")]
    FeatureEngineering,
    #[serde(rename = "phase3a")]
    Clustering,
    #[serde(rename = "phase3b")]
    Classification,
    #[serde(rename = "phase4")]
    RiskFilter,
    #[serde(rename = "phase5")]
    Summary,
}

impl PhaseId {
    pub fn all() -> [PhaseId; 6] {
        [
            PhaseId::DataLoad,
            PhaseId::FeatureEngineering,
            PhaseId::Clustering,
            PhaseId::Classification,
            PhaseId::RiskFilter,
            PhaseId::Summary,
        ]
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            PhaseId::DataLoad => "phase1",
            PhaseId::FeatureEngineering => "phase2",
            PhaseId::Clustering => "phase3a",
            PhaseId::Classification => "phase3b",
            PhaseId::RiskFilter => "phase4",
            PhaseId::Summary => "phase5",
        }
    }

    pub fn from_wire(name: &str) -> Option<PhaseId> {
        PhaseId::all()
            .into_iter()
            .find(|phase| phase.wire_name() == name)
    }

    /// Dataset this phase writes; used for `use_existing_data` skips.
    fn output(self) -> Option<Dataset> {
        match self {
            PhaseId::DataLoad => Some(Dataset::Monthly),
            PhaseId::FeatureEngineering => Some(Dataset::Features),
            PhaseId::Clustering => Some(Dataset::Clusters),
            PhaseId::Classification => Some(Dataset::Recommendations),
            PhaseId::RiskFilter => Some(Dataset::Filtered),
            PhaseId::Summary => None,
        }
    }

    /// Datasets this phase reads; missing ones fail the run at this step.
    fn inputs(self) -> &'static [Dataset] {
        match self {
            PhaseId::DataLoad => &[],
            PhaseId::FeatureEngineering => &[Dataset::Monthly],
            PhaseId::Clustering => &[Dataset::Features],
            PhaseId::Classification => &[Dataset::Features],
            PhaseId::RiskFilter => &[Dataset::Features, Dataset::Recommendations],
            PhaseId::Summary => &[],
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Position within a run, structured so clients can render progress bars
/// without parsing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: PhaseId,
    pub step: usize,
    pub total: usize,
}

impl PhaseProgress {
    /// Legacy display form, e.g. `phase3b (2/4)`.
    pub fn label(&self) -> String {
        format!("{} ({}/{})", self.phase, self.step, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One submitted pipeline run. Terminal runs (`Completed`, `Failed`) are
/// never mutated again.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub phases: Vec<PhaseId>,
    pub status: RunStatus,
    pub progress: Option<PhaseProgress>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Configuration pinned when the run was submitted.
    pub config: ConfigSnapshot,
    pub error_message: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub logs: String,
}

/// Submission payload. An empty `phases` list means the full pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub phases: Vec<String>,
    /// Pin the run to a specific configuration record instead of the
    /// currently active set.
    #[serde(default)]
    pub config_id: Option<Uuid>,
    /// Skip phases whose output dataset already exists.
    #[serde(default)]
    pub use_existing_data: bool,
    /// Extract files for the data-load phase.
    #[serde(default, rename = "file_selection")]
    pub selection: FileSelection,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("a pipeline run is already in progress")]
    RunInProgress,
    #[error("unknown phase `{0}`")]
    UnknownPhase(String),
    #[error("pipeline run {0} not found")]
    RunNotFound(Uuid),
    #[error("pipeline run {0} already finished")]
    RunFinished(Uuid),
    #[error(transparent)]
    Config(#[from] ConfigStoreError),
}

/// Failure of a single phase; folded into the run's `error_message`.
#[derive(Debug, thiserror::Error)]
enum PhaseError {
    #[error("required dataset `{0}` is missing; run the producing phase first")]
    MissingDependency(&'static str),
    #[error("no extract files selected")]
    EmptySelection,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("run aborted")]
    Aborted,
}

struct RunEntry {
    run: PipelineRun,
    selection: FileSelection,
    use_existing_data: bool,
}

#[derive(Default)]
struct Registry {
    entries: Vec<RunEntry>,
    active: Option<Uuid>,
    aborts: HashSet<Uuid>,
}

pub struct Orchestrator {
    configs: Arc<ConfigurationStore>,
    datasets: Arc<DatasetStore>,
    data_dir: PathBuf,
    registry: Mutex<Registry>,
}

impl Orchestrator {
    pub fn new(
        configs: Arc<ConfigurationStore>,
        datasets: Arc<DatasetStore>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            configs,
            datasets,
            data_dir,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    /// Creates a `Pending` run and reserves the single active slot.
    /// Rejected outright when another run holds the slot.
    pub fn submit(&self, request: RunRequest) -> Result<PipelineRun, PipelineError> {
        let phases = resolve_phases(&request.phases)?;
        let config = match request.config_id {
            Some(config_id) => self.configs.snapshot_with_override(config_id)?,
            None => self.configs.snapshot(),
        };

        let run = PipelineRun {
            id: Uuid::new_v4(),
            phases,
            status: RunStatus::Pending,
            progress: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            config,
            error_message: None,
            metrics: BTreeMap::new(),
            logs: String::new(),
        };

        let mut registry = self.lock();
        if registry.active.is_some() {
            return Err(PipelineError::RunInProgress);
        }
        registry.active = Some(run.id);
        registry.entries.push(RunEntry {
            run: run.clone(),
            selection: request.selection,
            use_existing_data: request.use_existing_data,
        });

        info!(run_id = %run.id, phases = ?run.phases, "pipeline run submitted");
        Ok(run)
    }

    /// Runs a submitted run to completion on the calling thread. Phases are
    /// strictly sequential; the first failure stops the run and leaves the
    /// outputs of earlier phases in place for a later resume.
    pub fn execute(&self, run_id: Uuid) -> Result<PipelineRun, PipelineError> {
        let (phases, selection, use_existing_data, config) = {
            let mut registry = self.lock();
            let entry = entry_mut(&mut registry, run_id)?;
            if entry.run.status != RunStatus::Pending {
                return Err(PipelineError::RunFinished(run_id));
            }
            entry.run.status = RunStatus::Running;
            entry.run.started_at = Some(Utc::now());
            (
                entry.run.phases.clone(),
                entry.selection.clone(),
                entry.use_existing_data,
                entry.run.config.clone(),
            )
        };

        let total = phases.len();
        for (index, phase) in phases.iter().copied().enumerate() {
            let progress = PhaseProgress {
                phase,
                step: index + 1,
                total,
            };
            self.update(run_id, |run| run.progress = Some(progress));

            let result = if self.abort_requested(run_id) {
                Err(PhaseError::Aborted)
            } else {
                self.run_phase(phase, &selection, use_existing_data, &config, run_id)
            };

            if let Err(err) = result {
                let message = format!("failed at {}: {err}", progress.label());
                error!(run_id = %run_id, %message, "pipeline run failed");
                self.update(run_id, |run| {
                    run.status = RunStatus::Failed;
                    run.completed_at = Some(Utc::now());
                    run.error_message = Some(message.clone());
                    run.logs.push_str(&message);
                    run.logs.push('\n');
                });
                self.release(run_id);
                return self.run(run_id).ok_or(PipelineError::RunNotFound(run_id));
            }
        }

        self.update(run_id, |run| {
            run.status = RunStatus::Completed;
            run.completed_at = Some(Utc::now());
            run.progress = None;
        });
        self.release(run_id);
        info!(run_id = %run_id, "pipeline run completed");
        self.run(run_id).ok_or(PipelineError::RunNotFound(run_id))
    }

    /// Flags a pending or running run for abort. The flag is honored at the
    /// next phase boundary; the phase in flight always finishes.
    pub fn request_abort(&self, run_id: Uuid) -> Result<(), PipelineError> {
        let mut registry = self.lock();
        let entry = entry_mut(&mut registry, run_id)?;
        match entry.run.status {
            RunStatus::Pending | RunStatus::Running => {
                registry.aborts.insert(run_id);
                Ok(())
            }
            RunStatus::Completed | RunStatus::Failed => Err(PipelineError::RunFinished(run_id)),
        }
    }

    pub fn run(&self, run_id: Uuid) -> Option<PipelineRun> {
        self.lock()
            .entries
            .iter()
            .find(|entry| entry.run.id == run_id)
            .map(|entry| entry.run.clone())
    }

    /// All runs, newest first.
    pub fn runs(&self) -> Vec<PipelineRun> {
        let registry = self.lock();
        let mut runs: Vec<PipelineRun> =
            registry.entries.iter().map(|entry| entry.run.clone()).collect();
        runs.reverse();
        runs
    }

    pub fn active_run(&self) -> Option<PipelineRun> {
        let registry = self.lock();
        let active = registry.active?;
        registry
            .entries
            .iter()
            .find(|entry| entry.run.id == active)
            .map(|entry| entry.run.clone())
    }

    fn run_phase(
        &self,
        phase: PhaseId,
        selection: &FileSelection,
        use_existing_data: bool,
        config: &ConfigSnapshot,
        run_id: Uuid,
    ) -> Result<(), PhaseError> {
        for dataset in phase.inputs() {
            if !self.datasets.has(*dataset) {
                return Err(PhaseError::MissingDependency(dataset.label()));
            }
        }

        if use_existing_data {
            if let Some(output) = phase.output() {
                if self.datasets.has(output) {
                    self.log(run_id, phase, "skipped, output dataset already present");
                    return Ok(());
                }
            }
        }

        match phase {
            PhaseId::DataLoad => {
                if selection.is_empty() {
                    return Err(PhaseError::EmptySelection);
                }
                let outcome = load_selection(&self.data_dir, selection)?;
                let line = format!(
                    "loaded {} records from {} files ({} rows skipped)",
                    outcome.records.len(),
                    selection.monthly_files.len(),
                    outcome.rows_skipped
                );
                self.log(run_id, phase, &line);
                self.update(run_id, |run| {
                    run.metrics
                        .insert("records_loaded".into(), outcome.records.len() as f64);
                    run.metrics
                        .insert("rows_skipped".into(), outcome.rows_skipped as f64);
                });
                self.datasets.put_monthly(outcome.records);
            }
            PhaseId::FeatureEngineering => {
                let monthly = self
                    .datasets
                    .monthly()
                    .ok_or(PhaseError::MissingDependency("monthly"))?;
                let features = derive_features(&monthly);
                self.log(
                    run_id,
                    phase,
                    &format!("derived features for {} subscribers", features.len()),
                );
                self.update(run_id, |run| {
                    run.metrics
                        .insert("subscribers".into(), features.len() as f64);
                });
                self.datasets.put_features(features);
            }
            PhaseId::Clustering => {
                let features = self
                    .datasets
                    .features()
                    .ok_or(PhaseError::MissingDependency("features"))?;
                let outcome = cluster_subscribers(&features, &config.clustering);
                self.log(
                    run_id,
                    phase,
                    &format!(
                        "clustered {} subscribers, expansion target {}",
                        outcome.assignments.len(),
                        outcome.expansion_target
                    ),
                );
                self.update(run_id, |run| {
                    run.metrics.insert("inertia".into(), outcome.inertia);
                    run.metrics.insert(
                        "expansion_target".into(),
                        outcome.expansion_target as f64,
                    );
                });
                self.datasets.put_clusters(outcome.assignments);
            }
            PhaseId::Classification => {
                let features = self
                    .datasets
                    .features()
                    .ok_or(PhaseError::MissingDependency("features"))?;
                let outcome = classify(&features, &config.business_rules);
                self.log(
                    run_id,
                    phase,
                    &format!(
                        "{} offers, {} unmatched, {} skipped, {} post-paid dropped",
                        outcome.recommendations.len(),
                        outcome.unmatched,
                        outcome.skipped,
                        outcome.pos_dropped
                    ),
                );
                self.update(run_id, |run| {
                    run.metrics.insert(
                        "recommendations".into(),
                        outcome.recommendations.len() as f64,
                    );
                    run.metrics.insert("unmatched".into(), outcome.unmatched as f64);
                    run.metrics
                        .insert("records_skipped".into(), outcome.skipped as f64);
                    run.metrics
                        .insert("pos_dropped".into(), outcome.pos_dropped as f64);
                });
                self.datasets.put_recommendations(outcome.recommendations);
            }
            PhaseId::RiskFilter => {
                let features = self
                    .datasets
                    .features()
                    .ok_or(PhaseError::MissingDependency("features"))?;
                let recommendations = self
                    .datasets
                    .recommendations()
                    .ok_or(PhaseError::MissingDependency("recommendations"))?;
                let recommended_isdns: BTreeSet<_> =
                    recommendations.iter().map(|r| &r.isdn).collect();
                let recommended: Vec<_> = features
                    .iter()
                    .filter(|f| recommended_isdns.contains(&f.isdn))
                    .cloned()
                    .collect();
                let outcome = assess(&recommended, &config.bad_debt);
                self.log(
                    run_id,
                    phase,
                    &format!(
                        "assessed {}, kept {}, declined {}",
                        outcome.assessments.len(),
                        outcome.kept.len(),
                        outcome.assessments.len() - outcome.kept.len()
                    ),
                );
                self.update(run_id, |run| {
                    run.metrics
                        .insert("assessed".into(), outcome.assessments.len() as f64);
                    run.metrics.insert("kept".into(), outcome.kept.len() as f64);
                });
                self.datasets.put_assessments(outcome.assessments, outcome.kept);
            }
            PhaseId::Summary => {
                let mut lines = Vec::new();
                if let Some(monthly) = self.datasets.monthly() {
                    let s = summary::data_load_summary(&monthly);
                    lines.push(format!(
                        "data: {} records, {} subscribers, {} months",
                        s.total_records,
                        s.unique_subscribers,
                        s.months.len()
                    ));
                }
                if let Some(clusters) = self.datasets.clusters() {
                    if let Some(features) = self.datasets.features() {
                        let s = summary::clustering_summary(&clusters, &features);
                        lines.push(format!(
                            "segments: {} clusters, expansion target {}",
                            s.cluster_count, s.expansion_target
                        ));
                    }
                }
                if let Some(recommendations) = self.datasets.recommendations() {
                    let s = summary::classification_summary(&recommendations);
                    lines.push(format!(
                        "offers: {} worth {:.0} VND",
                        s.total_recommendations, s.total_revenue_potential
                    ));
                }
                if let (Some(assessments), Some(kept), Some(recommendations)) = (
                    self.datasets.assessments(),
                    self.datasets.filtered(),
                    self.datasets.recommendations(),
                ) {
                    let s = summary::risk_filter_summary(&assessments, &kept, &recommendations);
                    lines.push(format!(
                        "risk: {} of {} pass ({:.1}%)",
                        s.filtered_count, s.initial_count, s.pass_rate_pct
                    ));
                }
                let digest = if lines.is_empty() {
                    "no datasets to summarize".to_string()
                } else {
                    lines.join("; ")
                };
                self.log(run_id, phase, &digest);
            }
        }
        Ok(())
    }

    fn abort_requested(&self, run_id: Uuid) -> bool {
        self.lock().aborts.contains(&run_id)
    }

    fn release(&self, run_id: Uuid) {
        let mut registry = self.lock();
        if registry.active == Some(run_id) {
            registry.active = None;
        }
        registry.aborts.remove(&run_id);
    }

    fn log(&self, run_id: Uuid, phase: PhaseId, line: &str) {
        info!(run_id = %run_id, phase = %phase, "{line}");
        self.update(run_id, |run| {
            let step = run
                .progress
                .map(|p| p.label())
                .unwrap_or_else(|| phase.wire_name().to_string());
            run.logs.push_str(&format!("{step}: {line}\n"));
        });
    }

    fn update(&self, run_id: Uuid, apply: impl FnOnce(&mut PipelineRun)) {
        let mut registry = self.lock();
        if let Some(entry) = registry
            .entries
            .iter_mut()
            .find(|entry| entry.run.id == run_id)
        {
            apply(&mut entry.run);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().expect("run registry mutex poisoned")
    }
}

fn entry_mut<'a>(
    registry: &'a mut Registry,
    run_id: Uuid,
) -> Result<&'a mut RunEntry, PipelineError> {
    registry
        .entries
        .iter_mut()
        .find(|entry| entry.run.id == run_id)
        .ok_or(PipelineError::RunNotFound(run_id))
}

/// Parses wire names and orders them canonically, deduplicated. An empty
/// request selects the whole pipeline.
fn resolve_phases(names: &[String]) -> Result<Vec<PhaseId>, PipelineError> {
    if names.is_empty() {
        return Ok(PhaseId::all().to_vec());
    }
    let mut phases = Vec::new();
    for name in names {
        let phase = PhaseId::from_wire(name)
            .ok_or_else(|| PipelineError::UnknownPhase(name.clone()))?;
        if !phases.contains(&phase) {
            phases.push(phase);
        }
    }
    phases.sort();
    Ok(phases)
}
