//! Read-side projections over the persisted stage outputs. Summaries are
//! computed on demand from the dataset store instead of being materialized,
//! so they always reflect the latest completed run.

use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{
    ClusterAssignment, MonthlyUsageRecord, RiskAssessment, ServiceRecommendation, ServiceType,
    SubscriberFeatureRecord,
};

/// Overview of the raw monthly dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DataLoadSummary {
    pub total_records: usize,
    pub unique_subscribers: usize,
    pub months: Vec<String>,
    pub advance_users: usize,
    pub topup_users: usize,
    pub total_advance_amount: f64,
    pub total_topup_amount: f64,
    pub subscriber_type_distribution: BTreeMap<String, usize>,
    pub monthly_rollups: Vec<MonthlyRollup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRollup {
    pub data_month: String,
    pub records: usize,
    pub total_arpu: f64,
    pub total_topup_amount: f64,
    pub advance_users: usize,
}

pub fn data_load_summary(monthly: &[MonthlyUsageRecord]) -> DataLoadSummary {
    let mut subscribers: BTreeMap<&str, (bool, bool)> = BTreeMap::new();
    let mut types: BTreeMap<String, usize> = BTreeMap::new();
    let mut rollups: BTreeMap<&str, MonthlyRollup> = BTreeMap::new();
    let mut total_advance_amount = 0.0;
    let mut total_topup_amount = 0.0;

    for record in monthly {
        let advance = record.advance_amount.unwrap_or(0.0);
        let entry = subscribers.entry(&record.isdn.0).or_insert((false, false));
        entry.0 |= advance > 0.0;
        entry.1 |= record.topup_count > 0;

        let type_key = match record.subscriber_type {
            super::domain::SubscriberType::Pre => "PRE",
            super::domain::SubscriberType::Pos => "POS",
        };
        *types.entry(type_key.to_string()).or_default() += 1;

        total_advance_amount += advance;
        total_topup_amount += record.topup_amount;

        let rollup = rollups
            .entry(&record.data_month)
            .or_insert_with(|| MonthlyRollup {
                data_month: record.data_month.clone(),
                records: 0,
                total_arpu: 0.0,
                total_topup_amount: 0.0,
                advance_users: 0,
            });
        rollup.records += 1;
        rollup.total_arpu += record.arpu_total;
        rollup.total_topup_amount += record.topup_amount;
        if advance > 0.0 {
            rollup.advance_users += 1;
        }
    }

    DataLoadSummary {
        total_records: monthly.len(),
        unique_subscribers: subscribers.len(),
        months: rollups.keys().map(|m| m.to_string()).collect(),
        advance_users: subscribers.values().filter(|(adv, _)| *adv).count(),
        topup_users: subscribers.values().filter(|(_, topup)| *topup).count(),
        total_advance_amount,
        total_topup_amount,
        subscriber_type_distribution: types,
        monthly_rollups: rollups.into_values().collect(),
    }
}

/// Distribution view over engineered features.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub subscribers: usize,
    pub arpu_trend_distribution: BTreeMap<String, usize>,
    pub topup_frequency_distribution: BTreeMap<String, usize>,
}

pub fn feature_summary(features: &[SubscriberFeatureRecord]) -> FeatureSummary {
    let mut trends: BTreeMap<String, usize> = BTreeMap::new();
    let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();
    for record in features {
        *trends.entry(record.arpu_trend.label().to_string()).or_default() += 1;
        *frequencies
            .entry(record.topup_frequency.label().to_string())
            .or_default() += 1;
    }
    FeatureSummary {
        subscribers: features.len(),
        arpu_trend_distribution: trends,
        topup_frequency_distribution: frequencies,
    }
}

/// Per-segment and per-cluster composition after clustering.
#[derive(Debug, Clone, Serialize)]
pub struct ClusteringSummary {
    pub total_subscribers: usize,
    pub cluster_count: usize,
    pub expansion_target: usize,
    pub segments: Vec<GroupStats>,
    pub clusters: Vec<GroupStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    pub name: String,
    pub count: usize,
    pub advance_users: usize,
    pub advance_rate: f64,
}

pub fn clustering_summary(
    clusters: &[ClusterAssignment],
    features: &[SubscriberFeatureRecord],
) -> ClusteringSummary {
    let advance_by_isdn: BTreeMap<&str, bool> = features
        .iter()
        .map(|f| (f.isdn.0.as_str(), f.has_advance_history))
        .collect();

    let mut by_segment: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut by_cluster: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for assignment in clusters {
        let advanced = advance_by_isdn
            .get(assignment.isdn.0.as_str())
            .copied()
            .unwrap_or(false);
        for (map, key) in [
            (&mut by_segment, assignment.segment_label.label().to_string()),
            (&mut by_cluster, format!("cluster_{}", assignment.cluster_id)),
        ] {
            let entry = map.entry(key).or_insert((0, 0));
            entry.0 += 1;
            if advanced {
                entry.1 += 1;
            }
        }
    }

    let stats = |map: BTreeMap<String, (usize, usize)>| -> Vec<GroupStats> {
        map.into_iter()
            .map(|(name, (count, advance_users))| GroupStats {
                name,
                count,
                advance_users,
                advance_rate: if count > 0 {
                    advance_users as f64 / count as f64
                } else {
                    0.0
                },
            })
            .collect()
    };

    let cluster_count = clusters
        .iter()
        .map(|a| a.cluster_id)
        .max()
        .map_or(0, |max| max + 1);

    ClusteringSummary {
        total_subscribers: clusters.len(),
        cluster_count,
        expansion_target: clusters
            .iter()
            .filter(|a| a.segment_label.is_expansion_target())
            .count(),
        segments: stats(by_segment),
        clusters: stats(by_cluster),
    }
}

/// Offer mix and revenue potential after classification.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSummary {
    pub total_recommendations: usize,
    pub services: Vec<ServiceStats>,
    pub total_revenue_potential: f64,
    pub avg_revenue_per_advance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub service: String,
    pub count: usize,
    pub share_pct: f64,
    pub total_revenue: f64,
}

pub fn classification_summary(
    recommendations: &[ServiceRecommendation],
) -> ClassificationSummary {
    let total = recommendations.len();
    let mut services = Vec::new();
    for service_type in ServiceType::all() {
        let matching: Vec<&ServiceRecommendation> = recommendations
            .iter()
            .filter(|r| r.service_type == service_type)
            .collect();
        services.push(ServiceStats {
            service: service_type.label().to_string(),
            count: matching.len(),
            share_pct: if total > 0 {
                matching.len() as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            total_revenue: matching.iter().map(|r| r.revenue_per_advance).sum(),
        });
    }

    let total_revenue_potential: f64 = recommendations
        .iter()
        .map(|r| r.revenue_per_advance)
        .sum();
    ClassificationSummary {
        total_recommendations: total,
        services,
        total_revenue_potential,
        avg_revenue_per_advance: if total > 0 {
            total_revenue_potential / total as f64
        } else {
            0.0
        },
    }
}

/// Risk-filter outcome: how many offers survived and at what revenue.
#[derive(Debug, Clone, Serialize)]
pub struct RiskFilterSummary {
    pub initial_count: usize,
    pub filtered_count: usize,
    pub high_risk_removed: usize,
    pub pass_rate_pct: f64,
    pub risk_tier_distribution: BTreeMap<String, usize>,
    pub service_revenue: Vec<ServiceStats>,
}

pub fn risk_filter_summary(
    assessments: &[RiskAssessment],
    kept: &[RiskAssessment],
    recommendations: &[ServiceRecommendation],
) -> RiskFilterSummary {
    let mut tiers: BTreeMap<String, usize> = BTreeMap::new();
    for assessment in assessments {
        *tiers
            .entry(assessment.bad_debt_risk.label().to_string())
            .or_default() += 1;
    }

    let kept_isdns: BTreeMap<&str, ()> =
        kept.iter().map(|a| (a.isdn.0.as_str(), ())).collect();
    let surviving: Vec<&ServiceRecommendation> = recommendations
        .iter()
        .filter(|r| kept_isdns.contains_key(r.isdn.0.as_str()))
        .collect();

    let mut service_revenue = Vec::new();
    for service_type in ServiceType::all() {
        let matching: Vec<&&ServiceRecommendation> = surviving
            .iter()
            .filter(|r| r.service_type == service_type)
            .collect();
        service_revenue.push(ServiceStats {
            service: service_type.label().to_string(),
            count: matching.len(),
            share_pct: if surviving.is_empty() {
                0.0
            } else {
                matching.len() as f64 / surviving.len() as f64 * 100.0
            },
            total_revenue: matching.iter().map(|r| r.revenue_per_advance).sum(),
        });
    }

    RiskFilterSummary {
        initial_count: assessments.len(),
        filtered_count: kept.len(),
        high_risk_removed: assessments.len() - kept.len(),
        pass_rate_pct: if assessments.is_empty() {
            0.0
        } else {
            kept.len() as f64 / assessments.len() as f64 * 100.0
        },
        risk_tier_distribution: tiers,
        service_revenue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::domain::{
        ArpuTrend, Isdn, RiskTier, SegmentLabel, SubscriberType, TopupFrequency,
    };

    fn monthly(isdn: &str, month: &str, advance: Option<f64>, topups: u32) -> MonthlyUsageRecord {
        MonthlyUsageRecord {
            isdn: Isdn::from(isdn),
            subscriber_type: SubscriberType::Pre,
            data_month: month.to_string(),
            arpu_total: 10_000.0,
            arpu_call: 6_000.0,
            arpu_sms: 1_000.0,
            arpu_data: 3_000.0,
            topup_count: topups,
            topup_amount: topups as f64 * 20_000.0,
            advance_amount: advance,
        }
    }

    #[test]
    fn data_load_summary_counts_users_once_across_months() {
        let monthly = vec![
            monthly("84901", "202507", Some(20_000.0), 1),
            monthly("84901", "202508", None, 2),
            monthly("84902", "202508", None, 0),
        ];
        let summary = data_load_summary(&monthly);
        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.unique_subscribers, 2);
        assert_eq!(summary.advance_users, 1);
        assert_eq!(summary.topup_users, 1);
        assert_eq!(summary.months, vec!["202507", "202508"]);
        assert_eq!(summary.monthly_rollups.len(), 2);
        assert_eq!(summary.subscriber_type_distribution["PRE"], 3);
    }

    #[test]
    fn clustering_summary_joins_advance_history_from_features() {
        let features = vec![
            feature_with_history("84901", true),
            feature_with_history("84902", false),
        ];
        let clusters = vec![
            ClusterAssignment {
                isdn: Isdn::from("84901"),
                cluster_id: 0,
                segment_label: SegmentLabel::ExistingAdvanceUser,
            },
            ClusterAssignment {
                isdn: Isdn::from("84902"),
                cluster_id: 1,
                segment_label: SegmentLabel::HighPropensity,
            },
        ];
        let summary = clustering_summary(&clusters, &features);
        assert_eq!(summary.total_subscribers, 2);
        assert_eq!(summary.cluster_count, 2);
        assert_eq!(summary.expansion_target, 1);

        let existing = summary
            .segments
            .iter()
            .find(|s| s.name == "GROUP_1_EXISTING")
            .expect("segment present");
        assert_eq!(existing.advance_users, 1);
        assert_eq!(existing.advance_rate, 1.0);
    }

    #[test]
    fn risk_filter_summary_tracks_surviving_revenue() {
        let assessments = vec![
            assessment("84901", 10.0, RiskTier::Low),
            assessment("84902", 80.0, RiskTier::High),
        ];
        let kept = vec![assessment("84901", 10.0, RiskTier::Low)];
        let recommendations = vec![
            offer("84901", ServiceType::Fee, 7_500.0),
            offer("84902", ServiceType::Fee, 7_500.0),
        ];
        let summary = risk_filter_summary(&assessments, &kept, &recommendations);
        assert_eq!(summary.high_risk_removed, 1);
        assert_eq!(summary.pass_rate_pct, 50.0);
        assert_eq!(summary.risk_tier_distribution["HIGH"], 1);

        let fee = summary
            .service_revenue
            .iter()
            .find(|s| s.service == "EasyCredit")
            .expect("service present");
        assert_eq!(fee.count, 1);
        assert_eq!(fee.total_revenue, 7_500.0);
    }

    fn feature_with_history(isdn: &str, advanced: bool) -> SubscriberFeatureRecord {
        SubscriberFeatureRecord {
            isdn: Isdn::from(isdn),
            subscriber_type: SubscriberType::Pre,
            arpu: 10_000.0,
            revenue_call_pct: 50.0,
            revenue_sms_pct: 10.0,
            revenue_data_pct: 40.0,
            arpu_avg_6m: 10_000.0,
            arpu_std_6m: 0.0,
            arpu_min_6m: 10_000.0,
            arpu_max_6m: 10_000.0,
            arpu_growth_rate: 0.0,
            arpu_trend: ArpuTrend::Stable,
            topup_count_last_1m: 1,
            topup_amount_last_1m: 20_000.0,
            topup_count_last_2m: 2,
            avg_topup_amount: 20_000.0,
            topup_frequency: TopupFrequency::Rare,
            topup_advance_ratio: 0.0,
            has_advance_history: advanced,
        }
    }

    fn assessment(isdn: &str, score: f64, tier: RiskTier) -> RiskAssessment {
        RiskAssessment {
            isdn: Isdn::from(isdn),
            risk_score: score,
            bad_debt_risk: tier,
        }
    }

    fn offer(isdn: &str, service_type: ServiceType, revenue: f64) -> ServiceRecommendation {
        ServiceRecommendation {
            isdn: Isdn::from(isdn),
            service_type,
            advance_amount: 25_000.0,
            revenue_per_advance: revenue,
            usage_time_hours: None,
            classification_reason: "EasyCredit: test".to_string(),
        }
    }
}
