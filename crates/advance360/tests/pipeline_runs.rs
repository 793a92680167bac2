mod common;

use std::collections::BTreeMap;

use advance360::pipeline::configuration::{ConfigType, ConfigurationDraft};
use advance360::pipeline::datasets::Dataset;
use advance360::pipeline::domain::{RiskTier, ServiceType};
use advance360::pipeline::ingest::FileSelection;
use advance360::pipeline::orchestrator::{PipelineError, RunRequest, RunStatus};
use advance360::pipeline::summary;

use common::{TestEnv, EXTRACT_FILE};

fn full_run_request() -> RunRequest {
    RunRequest {
        phases: Vec::new(),
        config_id: None,
        use_existing_data: false,
        selection: FileSelection {
            monthly_files: vec![EXTRACT_FILE.to_string()],
        },
    }
}

#[test]
fn full_pipeline_completes_and_populates_every_dataset() {
    let env = TestEnv::new();
    let run = env
        .orchestrator
        .submit(full_run_request())
        .expect("submits");
    assert_eq!(run.status, RunStatus::Pending);

    let finished = env.orchestrator.execute(run.id).expect("executes");
    assert_eq!(finished.status, RunStatus::Completed);
    assert!(finished.error_message.is_none());
    assert!(finished.completed_at.is_some());

    for dataset in [
        Dataset::Monthly,
        Dataset::Features,
        Dataset::Clusters,
        Dataset::Recommendations,
        Dataset::Assessments,
        Dataset::Filtered,
    ] {
        assert!(env.datasets.has(dataset), "{} missing", dataset.label());
    }

    assert_eq!(finished.metrics["records_loaded"], 6.0);
    // The post-paid subscriber never reaches classification output.
    assert_eq!(finished.metrics["pos_dropped"], 1.0);
    assert!(finished.logs.contains("phase1 (1/6)"));
    assert!(finished.logs.contains("phase5 (6/6)"));
}

#[test]
fn voice_dominant_subscriber_gets_quota_and_topup_heavy_gets_fee() {
    let env = TestEnv::new();
    let run = env
        .orchestrator
        .submit(full_run_request())
        .expect("submits");
    env.orchestrator.execute(run.id).expect("executes");

    let recommendations = env.datasets.recommendations().expect("present");
    assert_eq!(recommendations.len(), 2);

    // 80% voice+sms revenue share against the default 70% threshold.
    let quota = recommendations
        .iter()
        .find(|r| r.isdn.0 == "84901111111")
        .expect("quota offer");
    assert_eq!(quota.service_type, ServiceType::Quota);
    // 0.8 * avg ARPU of 29_000 over two months.
    assert!((quota.advance_amount - 23_200.0).abs() < 1e-9);
    assert_eq!(quota.usage_time_hours, Some(48));
    assert!(quota.classification_reason.starts_with("ungsanluong:"));

    let fee = recommendations
        .iter()
        .find(|r| r.isdn.0 == "84902222222")
        .expect("fee offer");
    assert_eq!(fee.service_type, ServiceType::Fee);
    assert_eq!(fee.advance_amount, 25_000.0);
    assert_eq!(fee.usage_time_hours, None);

    // The dormant subscriber matched no branch and is absent from the
    // classification summary entirely.
    let class_summary = summary::classification_summary(&recommendations);
    assert_eq!(class_summary.total_recommendations, 2);
    assert!(recommendations.iter().all(|r| r.isdn.0 != "84904444444"));
}

#[test]
fn risk_filter_declines_the_high_tier() {
    let env = TestEnv::new();
    let run = env
        .orchestrator
        .submit(full_run_request())
        .expect("submits");
    env.orchestrator.execute(run.id).expect("executes");

    let assessments = env.datasets.assessments().expect("present");
    let kept = env.datasets.filtered().expect("present");
    assert_eq!(assessments.len(), 2);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].isdn.0, "84902222222");
    assert_eq!(kept[0].bad_debt_risk, RiskTier::Low);

    let declined = assessments
        .iter()
        .find(|a| a.isdn.0 == "84901111111")
        .expect("assessed");
    assert_eq!(declined.bad_debt_risk, RiskTier::High);

    let recommendations = env.datasets.recommendations().expect("present");
    let filter_summary = summary::risk_filter_summary(&assessments, &kept, &recommendations);
    assert_eq!(filter_summary.high_risk_removed, 1);
    assert_eq!(filter_summary.pass_rate_pct, 50.0);
}

#[test]
fn missing_dependency_fails_with_the_phase_tag() {
    let env = TestEnv::new();
    let run = env
        .orchestrator
        .submit(RunRequest {
            phases: vec!["phase3b".to_string()],
            ..full_run_request()
        })
        .expect("submits");

    let finished = env.orchestrator.execute(run.id).expect("executes");
    assert_eq!(finished.status, RunStatus::Failed);
    let message = finished.error_message.expect("message recorded");
    assert!(message.starts_with("failed at phase3b (1/1):"), "{message}");
    assert!(message.contains("features"), "{message}");
}

#[test]
fn resumed_run_reuses_persisted_features() {
    let env = TestEnv::new();
    let first = env
        .orchestrator
        .submit(RunRequest {
            phases: vec!["phase1".to_string(), "phase2".to_string()],
            ..full_run_request()
        })
        .expect("submits");
    env.orchestrator.execute(first.id).expect("executes");
    assert!(env.datasets.has(Dataset::Features));
    let features_before = env.datasets.features().expect("present");

    // Resume from classification without re-running the earlier phases or
    // passing any extract files.
    let resume = env
        .orchestrator
        .submit(RunRequest {
            phases: vec!["phase3b".to_string(), "phase4".to_string()],
            config_id: None,
            use_existing_data: false,
            selection: FileSelection::default(),
        })
        .expect("submits");
    let finished = env.orchestrator.execute(resume.id).expect("executes");
    assert_eq!(finished.status, RunStatus::Completed);
    assert!(env.datasets.has(Dataset::Filtered));

    let features_after = env.datasets.features().expect("present");
    assert_eq!(*features_before, *features_after);
}

#[test]
fn use_existing_data_skips_populated_phases() {
    let env = TestEnv::new();
    let first = env
        .orchestrator
        .submit(RunRequest {
            phases: vec!["phase1".to_string()],
            ..full_run_request()
        })
        .expect("submits");
    env.orchestrator.execute(first.id).expect("executes");

    let second = env
        .orchestrator
        .submit(RunRequest {
            use_existing_data: true,
            ..full_run_request()
        })
        .expect("submits");
    let finished = env.orchestrator.execute(second.id).expect("executes");
    assert_eq!(finished.status, RunStatus::Completed);
    assert!(finished.logs.contains("phase1 (1/6): skipped"));
    assert!(!finished.metrics.contains_key("records_loaded"));
}

#[test]
fn second_run_is_rejected_while_one_is_active() {
    let env = TestEnv::new();
    let first = env
        .orchestrator
        .submit(full_run_request())
        .expect("submits");

    let rejected = env.orchestrator.submit(full_run_request());
    assert!(matches!(rejected, Err(PipelineError::RunInProgress)));

    env.orchestrator.execute(first.id).expect("executes");
    // The slot frees once the run reaches a terminal state.
    env.orchestrator
        .submit(full_run_request())
        .expect("submits after completion");
}

#[test]
fn abort_flag_stops_the_run_at_the_next_phase_boundary() {
    let env = TestEnv::new();
    let run = env
        .orchestrator
        .submit(full_run_request())
        .expect("submits");
    env.orchestrator.request_abort(run.id).expect("flags");

    let finished = env.orchestrator.execute(run.id).expect("executes");
    assert_eq!(finished.status, RunStatus::Failed);
    assert!(finished
        .error_message
        .expect("message recorded")
        .contains("aborted"));
    // Aborted before phase1, so nothing was loaded.
    assert!(!env.datasets.has(Dataset::Monthly));

    // A finished run cannot be aborted again.
    assert!(matches!(
        env.orchestrator.request_abort(run.id),
        Err(PipelineError::RunFinished(_))
    ));
}

#[test]
fn run_pins_the_requested_configuration() {
    let env = TestEnv::new();
    let mut data = BTreeMap::new();
    data.insert("voice_sms_threshold".to_string(), 90.0);
    let record = env
        .configs
        .create(ConfigurationDraft {
            name: "strict quota".to_string(),
            description: None,
            config_type: ConfigType::BusinessRules,
            config_data: data,
        })
        .expect("creates");

    let run = env
        .orchestrator
        .submit(RunRequest {
            config_id: Some(record.id),
            ..full_run_request()
        })
        .expect("submits");
    assert_eq!(run.config.config_id, Some(record.id));
    assert_eq!(run.config.business_rules.voice_sms_threshold, 90.0);

    env.orchestrator.execute(run.id).expect("executes");
    // At 90% the voice-dominant subscriber misses quota and falls through
    // to the fee branch on sustained topups.
    let recommendations = env.datasets.recommendations().expect("present");
    let offer = recommendations
        .iter()
        .find(|r| r.isdn.0 == "84901111111")
        .expect("still classified");
    assert_eq!(offer.service_type, ServiceType::Fee);
}

#[test]
fn unknown_phase_and_unknown_run_are_rejected() {
    let env = TestEnv::new();
    let err = env
        .orchestrator
        .submit(RunRequest {
            phases: vec!["phase9".to_string()],
            ..full_run_request()
        })
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownPhase(_)));

    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        env.orchestrator.execute(missing),
        Err(PipelineError::RunNotFound(_))
    ));
}
