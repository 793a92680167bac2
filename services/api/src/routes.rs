use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use advance360::error::AppError;
use advance360::pipeline::configuration::{ConfigType, Configuration, ConfigurationDraft};
use advance360::pipeline::datasets::Dataset;
use advance360::pipeline::orchestrator::{PipelineRun, RunRequest, RunStatus};
use advance360::pipeline::profile::{
    list_subscribers, subscriber_profile, subscriber_stats, Subscriber360Profile, SubscriberPage,
    SubscriberQuery, SubscriberStats,
};
use advance360::pipeline::summary::{
    classification_summary, clustering_summary, data_load_summary, feature_summary,
    risk_filter_summary, ClassificationSummary, ClusteringSummary, DataLoadSummary,
    FeatureSummary, RiskFilterSummary,
};

use crate::infra::AppState;

pub(crate) fn router() -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/api/configurations",
            get(list_configurations).post(create_configuration),
        )
        .route(
            "/api/configurations/:id",
            get(get_configuration)
                .put(update_configuration)
                .delete(delete_configuration),
        )
        .route(
            "/api/configurations/:id/activate",
            post(activate_configuration),
        )
        .route("/api/pipeline/run", post(run_pipeline))
        .route("/api/pipeline/runs", get(list_runs))
        .route("/api/pipeline/runs/:id", get(get_run))
        .route("/api/pipeline/runs/:id/logs", get(get_run_logs))
        .route("/api/pipeline/runs/:id/abort", post(abort_run))
        .route("/api/results/:phase", get(phase_results))
        .route("/api/subscribers/list", get(subscribers_list))
        .route("/api/subscribers/detail/:isdn", get(subscriber_detail))
        .route("/api/subscribers/profile", get(subscriber_profile_endpoint))
        .route("/api/subscribers/stats", get(subscribers_stats))
        .route("/api/system/status", get(system_status))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigurationFilter {
    #[serde(default)]
    pub(crate) config_type: Option<ConfigType>,
}

pub(crate) async fn list_configurations(
    Extension(state): Extension<AppState>,
    Query(filter): Query<ConfigurationFilter>,
) -> Json<Vec<Configuration>> {
    Json(state.configs.list(filter.config_type))
}

pub(crate) async fn create_configuration(
    Extension(state): Extension<AppState>,
    Json(draft): Json<ConfigurationDraft>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.configs.create(draft)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn get_configuration(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Configuration>, AppError> {
    Ok(Json(state.configs.get(id)?))
}

pub(crate) async fn update_configuration(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ConfigurationDraft>,
) -> Result<Json<Configuration>, AppError> {
    Ok(Json(state.configs.update(id, draft)?))
}

pub(crate) async fn delete_configuration(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.configs.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn activate_configuration(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Configuration>, AppError> {
    Ok(Json(state.configs.activate(id)?))
}

/// Accepts the run, then executes it on a blocking worker so the request
/// returns immediately with the pending run.
pub(crate) async fn run_pipeline(
    Extension(state): Extension<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<impl IntoResponse, AppError> {
    let run = state.orchestrator.submit(request)?;
    let orchestrator = state.orchestrator.clone();
    let run_id = run.id;
    tokio::task::spawn_blocking(move || {
        if let Err(err) = orchestrator.execute(run_id) {
            tracing::error!(%run_id, %err, "pipeline execution error");
        }
    });
    Ok((StatusCode::ACCEPTED, Json(run)))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunListQuery {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

pub(crate) async fn list_runs(
    Extension(state): Extension<AppState>,
    Query(query): Query<RunListQuery>,
) -> Json<Vec<PipelineRun>> {
    let mut runs = state.orchestrator.runs();
    if let Some(limit) = query.limit {
        runs.truncate(limit);
    }
    Json(runs)
}

pub(crate) async fn get_run(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineRun>, AppError> {
    let run = state
        .orchestrator
        .run(id)
        .ok_or_else(|| AppError::NotFound(format!("pipeline run {id} not found")))?;
    Ok(Json(run))
}

#[derive(Debug, Serialize)]
pub(crate) struct RunLogsResponse {
    pub(crate) run_id: Uuid,
    pub(crate) logs: String,
}

pub(crate) async fn get_run_logs(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunLogsResponse>, AppError> {
    let run = state
        .orchestrator
        .run(id)
        .ok_or_else(|| AppError::NotFound(format!("pipeline run {id} not found")))?;
    Ok(Json(RunLogsResponse {
        run_id: run.id,
        logs: run.logs,
    }))
}

pub(crate) async fn abort_run(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.orchestrator.request_abort(id)?;
    Ok(Json(json!({ "run_id": id, "status": "abort_requested" })))
}

/// Summary payloads per phase, computed on demand from the dataset store.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum PhaseResults {
    DataLoad(DataLoadSummary),
    Features(FeatureSummary),
    Clustering(ClusteringSummary),
    Classification(ClassificationSummary),
    RiskFilter(RiskFilterSummary),
    Overview(OverviewSummary),
}

#[derive(Debug, Serialize)]
pub(crate) struct OverviewSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<DataLoadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) features: Option<FeatureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) clustering: Option<ClusteringSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) classification: Option<ClassificationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) risk_filter: Option<RiskFilterSummary>,
}

pub(crate) async fn phase_results(
    Extension(state): Extension<AppState>,
    Path(phase): Path<String>,
) -> Result<Json<PhaseResults>, AppError> {
    let datasets = &state.datasets;
    let results = match phase.as_str() {
        "phase1" => datasets
            .monthly()
            .map(|monthly| PhaseResults::DataLoad(data_load_summary(&monthly))),
        "phase2" => datasets
            .features()
            .map(|features| PhaseResults::Features(feature_summary(&features))),
        "phase3a" => match (datasets.clusters(), datasets.features()) {
            (Some(clusters), Some(features)) => Some(PhaseResults::Clustering(
                clustering_summary(&clusters, &features),
            )),
            _ => None,
        },
        "phase3b" => datasets
            .recommendations()
            .map(|recs| PhaseResults::Classification(classification_summary(&recs))),
        "phase4" => match (
            datasets.assessments(),
            datasets.filtered(),
            datasets.recommendations(),
        ) {
            (Some(assessments), Some(kept), Some(recs)) => Some(PhaseResults::RiskFilter(
                risk_filter_summary(&assessments, &kept, &recs),
            )),
            _ => None,
        },
        "phase5" => {
            let overview = OverviewSummary {
                data: datasets.monthly().map(|m| data_load_summary(&m)),
                features: datasets.features().map(|f| feature_summary(&f)),
                clustering: match (datasets.clusters(), datasets.features()) {
                    (Some(clusters), Some(features)) => {
                        Some(clustering_summary(&clusters, &features))
                    }
                    _ => None,
                },
                classification: datasets
                    .recommendations()
                    .map(|recs| classification_summary(&recs)),
                risk_filter: match (
                    datasets.assessments(),
                    datasets.filtered(),
                    datasets.recommendations(),
                ) {
                    (Some(assessments), Some(kept), Some(recs)) => {
                        Some(risk_filter_summary(&assessments, &kept, &recs))
                    }
                    _ => None,
                },
            };
            if overview.data.is_none()
                && overview.features.is_none()
                && overview.classification.is_none()
            {
                None
            } else {
                Some(PhaseResults::Overview(overview))
            }
        }
        _ => {
            return Err(AppError::BadRequest(format!("unknown phase `{phase}`")));
        }
    };

    results.map(Json).ok_or_else(|| {
        AppError::NotFound(format!(
            "no results for {phase}; run the producing phase first"
        ))
    })
}

pub(crate) async fn subscribers_list(
    Extension(state): Extension<AppState>,
    Query(query): Query<SubscriberQuery>,
) -> Result<Json<SubscriberPage>, AppError> {
    list_subscribers(&state.datasets, &query)
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound("no filtered offers yet; run the pipeline first".to_string())
        })
}

pub(crate) async fn subscriber_detail(
    Extension(state): Extension<AppState>,
    Path(isdn): Path<String>,
) -> Result<Json<Subscriber360Profile>, AppError> {
    subscriber_profile(&state.datasets, &isdn)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("subscriber {isdn} not found")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileQuery {
    pub(crate) isdn: String,
}

pub(crate) async fn subscriber_profile_endpoint(
    Extension(state): Extension<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Subscriber360Profile>, AppError> {
    subscriber_profile(&state.datasets, &query.isdn)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("subscriber {} not found", query.isdn)))
}

pub(crate) async fn subscribers_stats(
    Extension(state): Extension<AppState>,
) -> Result<Json<SubscriberStats>, AppError> {
    subscriber_stats(&state.datasets)
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound("no filtered offers yet; run the pipeline first".to_string())
        })
}

#[derive(Debug, Serialize)]
pub(crate) struct SystemStatus {
    pub(crate) configurations_by_type: BTreeMap<String, usize>,
    pub(crate) runs_by_status: BTreeMap<String, usize>,
    pub(crate) active_run_id: Option<Uuid>,
    pub(crate) latest_completed_run_id: Option<Uuid>,
    pub(crate) datasets_present: Vec<&'static str>,
}

pub(crate) async fn system_status(Extension(state): Extension<AppState>) -> Json<SystemStatus> {
    let runs = state.orchestrator.runs();
    let mut runs_by_status: BTreeMap<String, usize> = BTreeMap::new();
    for run in &runs {
        let key = match run.status {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        *runs_by_status.entry(key.to_string()).or_default() += 1;
    }
    // Runs are newest first.
    let latest_completed_run_id = runs
        .iter()
        .find(|run| run.status == RunStatus::Completed)
        .map(|run| run.id);

    let datasets_present = [
        Dataset::Monthly,
        Dataset::Features,
        Dataset::Clusters,
        Dataset::Recommendations,
        Dataset::Assessments,
        Dataset::Filtered,
    ]
    .into_iter()
    .filter(|dataset| state.datasets.has(*dataset))
    .map(|dataset| dataset.label())
    .collect();

    Json(SystemStatus {
        configurations_by_type: state.configs.counts_by_type(),
        runs_by_status,
        active_run_id: state.orchestrator.active_run().map(|run| run.id),
        latest_completed_run_id,
        datasets_present,
    })
}
