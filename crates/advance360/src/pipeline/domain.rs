//! Subscriber-scoped entities flowing between pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscriber phone-line identifier, primary key for subscriber-scoped
/// entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isdn(pub String);

impl fmt::Display for Isdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Isdn {
    fn from(value: &str) -> Self {
        Isdn(value.to_string())
    }
}

/// Billing mode of the line. Only pre-paid subscribers are eligible for
/// advance offers; post-paid records are dropped by a hard filter before
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberType {
    #[serde(rename = "PRE")]
    Pre,
    #[serde(rename = "POS")]
    Pos,
}

/// One month of aggregated usage for one subscriber, as produced by the
/// upstream extract aggregation. `data_month` is "YYYYMM" and sorts
/// chronologically as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsageRecord {
    pub isdn: Isdn,
    pub subscriber_type: SubscriberType,
    pub data_month: String,
    pub arpu_total: f64,
    pub arpu_call: f64,
    pub arpu_sms: f64,
    pub arpu_data: f64,
    pub topup_count: u32,
    pub topup_amount: f64,
    pub advance_amount: Option<f64>,
}

/// Direction of the ARPU series over the observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArpuTrend {
    Increasing,
    Stable,
    Decreasing,
}

impl ArpuTrend {
    /// Growth-rate thresholds of +/-10% bucket the trend.
    pub fn from_growth_rate(growth_rate_pct: f64) -> Self {
        if growth_rate_pct > 10.0 {
            ArpuTrend::Increasing
        } else if growth_rate_pct < -10.0 {
            ArpuTrend::Decreasing
        } else {
            ArpuTrend::Stable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArpuTrend::Increasing => "increasing",
            ArpuTrend::Stable => "stable",
            ArpuTrend::Decreasing => "decreasing",
        }
    }
}

/// Last-month topup cadence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopupFrequency {
    Frequent,
    Moderate,
    Rare,
    None,
}

impl TopupFrequency {
    pub fn from_monthly_count(count: u32) -> Self {
        match count {
            c if c >= 4 => TopupFrequency::Frequent,
            c if c >= 2 => TopupFrequency::Moderate,
            c if c >= 1 => TopupFrequency::Rare,
            _ => TopupFrequency::None,
        }
    }

    /// Normalized goodness contribution in [0, 1] for risk scoring.
    pub fn score(self) -> f64 {
        match self {
            TopupFrequency::Frequent => 1.0,
            TopupFrequency::Moderate => 2.0 / 3.0,
            TopupFrequency::Rare => 1.0 / 3.0,
            TopupFrequency::None => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TopupFrequency::Frequent => "frequent",
            TopupFrequency::Moderate => "moderate",
            TopupFrequency::Rare => "rare",
            TopupFrequency::None => "none",
        }
    }
}

/// Per-subscriber numeric features consumed by the decision stages.
/// Immutable once produced by feature engineering; keyed by `isdn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberFeatureRecord {
    pub isdn: Isdn,
    pub subscriber_type: SubscriberType,
    /// Latest-month total ARPU.
    pub arpu: f64,
    pub revenue_call_pct: f64,
    pub revenue_sms_pct: f64,
    pub revenue_data_pct: f64,
    pub arpu_avg_6m: f64,
    pub arpu_std_6m: f64,
    pub arpu_min_6m: f64,
    pub arpu_max_6m: f64,
    pub arpu_growth_rate: f64,
    pub arpu_trend: ArpuTrend,
    pub topup_count_last_1m: u32,
    pub topup_amount_last_1m: f64,
    pub topup_count_last_2m: u32,
    pub avg_topup_amount: f64,
    pub topup_frequency: TopupFrequency,
    /// Last-month topup amount over latest advance amount; 0 when the
    /// subscriber took no advance.
    pub topup_advance_ratio: f64,
    pub has_advance_history: bool,
}

/// Output of the clustering stage: one row per subscriber, overwritten by
/// each re-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub isdn: Isdn,
    pub cluster_id: usize,
    pub segment_label: SegmentLabel,
}

/// Behavioral segment bucketed from per-cluster advance rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SegmentLabel {
    #[serde(rename = "GROUP_1_EXISTING")]
    ExistingAdvanceUser,
    #[serde(rename = "GROUP_2_SIMILAR")]
    HighPropensity,
    #[serde(rename = "GROUP_2_MEDIUM")]
    MediumPropensity,
    #[serde(rename = "GROUP_3_UNLIKELY")]
    Unlikely,
}

impl SegmentLabel {
    pub fn label(self) -> &'static str {
        match self {
            SegmentLabel::ExistingAdvanceUser => "GROUP_1_EXISTING",
            SegmentLabel::HighPropensity => "GROUP_2_SIMILAR",
            SegmentLabel::MediumPropensity => "GROUP_2_MEDIUM",
            SegmentLabel::Unlikely => "GROUP_3_UNLIKELY",
        }
    }

    /// Segments counted toward the expansion target (reporting only).
    pub fn is_expansion_target(self) -> bool {
        matches!(
            self,
            SegmentLabel::HighPropensity | SegmentLabel::MediumPropensity
        )
    }
}

/// Mutually exclusive advance-offer branches, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Quota-based advance for voice/SMS-dominant subscribers.
    #[serde(rename = "ungsanluong")]
    Quota,
    /// Fee-based advance (30% fee) for consistent large topups.
    #[serde(rename = "EasyCredit")]
    Fee,
    /// Free advance; profit comes from the unused portion.
    #[serde(rename = "MBFG")]
    Free,
}

impl ServiceType {
    pub fn label(self) -> &'static str {
        match self {
            ServiceType::Quota => "ungsanluong",
            ServiceType::Fee => "EasyCredit",
            ServiceType::Free => "MBFG",
        }
    }

    pub fn all() -> [ServiceType; 3] {
        [ServiceType::Quota, ServiceType::Fee, ServiceType::Free]
    }
}

/// A classified offer for one pre-paid subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecommendation {
    pub isdn: Isdn,
    pub service_type: ServiceType,
    pub advance_amount: f64,
    pub revenue_per_advance: f64,
    /// Hours of validity for the advance; `None` means unlimited (fee-based
    /// offers run until the SIM is locked).
    pub usage_time_hours: Option<u32>,
    /// Which branch matched and the deciding inequality, for audit and UI.
    pub classification_reason: String,
}

/// Bad-debt tier derived from the weighted risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn label(self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

/// Weighted bad-debt score for a classified subscriber. Lower is safer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub isdn: Isdn,
    pub risk_score: f64,
    pub bad_debt_risk: RiskTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arpu_trend_buckets_at_ten_percent() {
        assert_eq!(ArpuTrend::from_growth_rate(10.1), ArpuTrend::Increasing);
        assert_eq!(ArpuTrend::from_growth_rate(10.0), ArpuTrend::Stable);
        assert_eq!(ArpuTrend::from_growth_rate(-10.0), ArpuTrend::Stable);
        assert_eq!(ArpuTrend::from_growth_rate(-10.5), ArpuTrend::Decreasing);
    }

    #[test]
    fn topup_frequency_classes() {
        assert_eq!(
            TopupFrequency::from_monthly_count(0),
            TopupFrequency::None
        );
        assert_eq!(TopupFrequency::from_monthly_count(1), TopupFrequency::Rare);
        assert_eq!(
            TopupFrequency::from_monthly_count(3),
            TopupFrequency::Moderate
        );
        assert_eq!(
            TopupFrequency::from_monthly_count(4),
            TopupFrequency::Frequent
        );
    }

    #[test]
    fn service_type_serializes_to_wire_labels() {
        assert_eq!(
            serde_json::to_string(&ServiceType::Quota).expect("serializes"),
            "\"ungsanluong\""
        );
        assert_eq!(
            serde_json::to_string(&ServiceType::Fee).expect("serializes"),
            "\"EasyCredit\""
        );
    }

    #[test]
    fn risk_tier_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&RiskTier::Medium).expect("serializes"),
            "\"MEDIUM\""
        );
    }
}
