use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use advance360::pipeline::configuration::ConfigurationStore;
use advance360::pipeline::datasets::DatasetStore;
use advance360::pipeline::orchestrator::Orchestrator;

/// Shared handles injected into every route via `Extension`.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) configs: Arc<ConfigurationStore>,
    pub(crate) datasets: Arc<DatasetStore>,
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn build_state(
    data_dir: PathBuf,
    readiness: Arc<AtomicBool>,
    metrics: Arc<PrometheusHandle>,
) -> AppState {
    let configs = Arc::new(ConfigurationStore::new());
    let datasets = Arc::new(DatasetStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        configs.clone(),
        datasets.clone(),
        data_dir,
    ));
    AppState {
        configs,
        datasets,
        orchestrator,
        readiness,
        metrics,
    }
}
