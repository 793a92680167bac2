//! Shared fixtures for the pipeline integration tests.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use advance360::pipeline::configuration::ConfigurationStore;
use advance360::pipeline::datasets::DatasetStore;
use advance360::pipeline::orchestrator::Orchestrator;

pub const EXTRACT_FILE: &str = "monthly_usage.csv";

const HEADER: &str =
    "isdn,subscriber_type,data_month,arpu_total,arpu_call,arpu_sms,arpu_data,topup_count,topup_amount,advance_amount";

/// Four-subscriber extract covering the main decision outcomes:
/// voice-dominant (quota offer, high risk), topup-heavy (fee offer, low
/// risk), post-paid (dropped), and dormant (no branch).
pub fn extract_rows() -> Vec<String> {
    vec![
        "84901111111,PRE,202507,28000,18000,5000,5000,1,20000,".to_string(),
        "84901111111,PRE,202508,30000,19000,5000,6000,1,20000,".to_string(),
        "84902222222,PRE,202507,48000,10000,2000,36000,3,90000,50000".to_string(),
        "84902222222,PRE,202508,52000,11000,2000,39000,4,120000,50000".to_string(),
        "84903333333,POS,202508,80000,60000,10000,10000,2,50000,".to_string(),
        "84904444444,PRE,202508,5000,0,0,5000,0,0,".to_string(),
    ]
}

pub struct TestEnv {
    pub configs: Arc<ConfigurationStore>,
    pub datasets: Arc<DatasetStore>,
    pub orchestrator: Orchestrator,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let data_dir = std::env::temp_dir().join(format!("advance360-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&data_dir).expect("creates fixture dir");

        let mut contents = String::from(HEADER);
        for row in extract_rows() {
            contents.push('\n');
            contents.push_str(&row);
        }
        contents.push('\n');
        fs::write(data_dir.join(EXTRACT_FILE), contents).expect("writes fixture extract");

        let configs = Arc::new(ConfigurationStore::new());
        let datasets = Arc::new(DatasetStore::new());
        let orchestrator =
            Orchestrator::new(configs.clone(), datasets.clone(), data_dir.clone());
        Self {
            configs,
            datasets,
            orchestrator,
            data_dir,
        }
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.data_dir);
    }
}
