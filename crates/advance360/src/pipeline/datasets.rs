//! Shared storage for stage outputs. Each stage exclusively owns one slot
//! and overwrites it on every re-run; downstream stages read the slots of
//! their predecessors. Slots survive failed runs so a resumed run can pick
//! up where the failure happened.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::domain::{
    ClusterAssignment, MonthlyUsageRecord, RiskAssessment, ServiceRecommendation,
    SubscriberFeatureRecord,
};

/// Names of the persisted intermediate datasets, used in dependency checks
/// and failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Monthly,
    Features,
    Clusters,
    Recommendations,
    Assessments,
    Filtered,
}

impl Dataset {
    pub fn label(self) -> &'static str {
        match self {
            Dataset::Monthly => "monthly",
            Dataset::Features => "features",
            Dataset::Clusters => "clusters",
            Dataset::Recommendations => "recommendations",
            Dataset::Assessments => "assessments",
            Dataset::Filtered => "filtered",
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    monthly: Option<Arc<Vec<MonthlyUsageRecord>>>,
    features: Option<Arc<Vec<SubscriberFeatureRecord>>>,
    clusters: Option<Arc<Vec<ClusterAssignment>>>,
    recommendations: Option<Arc<Vec<ServiceRecommendation>>>,
    assessments: Option<Arc<Vec<RiskAssessment>>>,
    filtered: Option<Arc<Vec<RiskAssessment>>>,
}

#[derive(Debug, Default)]
pub struct DatasetStore {
    slots: Mutex<Slots>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, dataset: Dataset) -> bool {
        let slots = self.lock();
        match dataset {
            Dataset::Monthly => slots.monthly.is_some(),
            Dataset::Features => slots.features.is_some(),
            Dataset::Clusters => slots.clusters.is_some(),
            Dataset::Recommendations => slots.recommendations.is_some(),
            Dataset::Assessments => slots.assessments.is_some(),
            Dataset::Filtered => slots.filtered.is_some(),
        }
    }

    pub fn put_monthly(&self, records: Vec<MonthlyUsageRecord>) {
        self.lock().monthly = Some(Arc::new(records));
    }

    pub fn monthly(&self) -> Option<Arc<Vec<MonthlyUsageRecord>>> {
        self.lock().monthly.clone()
    }

    pub fn put_features(&self, records: Vec<SubscriberFeatureRecord>) {
        self.lock().features = Some(Arc::new(records));
    }

    pub fn features(&self) -> Option<Arc<Vec<SubscriberFeatureRecord>>> {
        self.lock().features.clone()
    }

    pub fn put_clusters(&self, assignments: Vec<ClusterAssignment>) {
        self.lock().clusters = Some(Arc::new(assignments));
    }

    pub fn clusters(&self) -> Option<Arc<Vec<ClusterAssignment>>> {
        self.lock().clusters.clone()
    }

    pub fn put_recommendations(&self, recommendations: Vec<ServiceRecommendation>) {
        self.lock().recommendations = Some(Arc::new(recommendations));
    }

    pub fn recommendations(&self) -> Option<Arc<Vec<ServiceRecommendation>>> {
        self.lock().recommendations.clone()
    }

    /// Stores the full assessment set and the LOW+MEDIUM subset kept for
    /// consumers in one call, so the two slots never diverge.
    pub fn put_assessments(&self, all: Vec<RiskAssessment>, kept: Vec<RiskAssessment>) {
        let mut slots = self.lock();
        slots.assessments = Some(Arc::new(all));
        slots.filtered = Some(Arc::new(kept));
    }

    pub fn assessments(&self) -> Option<Arc<Vec<RiskAssessment>>> {
        self.lock().assessments.clone()
    }

    pub fn filtered(&self) -> Option<Arc<Vec<RiskAssessment>>> {
        self.lock().filtered.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().expect("dataset store mutex poisoned")
    }
}
