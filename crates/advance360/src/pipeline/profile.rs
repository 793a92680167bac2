//! Subscriber query surface: paged listings over the filtered offer set and
//! the 360-degree profile join used by the detail endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::datasets::DatasetStore;
use super::domain::{
    ArpuTrend, Isdn, RiskTier, SegmentLabel, ServiceRecommendation, ServiceType,
    SubscriberFeatureRecord, SubscriberType, TopupFrequency,
};

fn default_limit() -> usize {
    50
}

/// Filters for the paged subscriber listing. `service_type` and
/// `risk_level` take the wire labels (for example `EasyCredit`, `LOW`).
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub service_type: Option<ServiceType>,
    #[serde(default)]
    pub risk_level: Option<RiskTier>,
}

impl Default for SubscriberQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            search: None,
            service_type: None,
            risk_level: None,
        }
    }
}

/// One row of the listing: the offer joined with its risk assessment and,
/// when clustering ran, the behavioral segment.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberRow {
    pub isdn: Isdn,
    pub service_type: ServiceType,
    pub advance_amount: f64,
    pub revenue_per_advance: f64,
    pub usage_time_hours: Option<u32>,
    pub risk_score: f64,
    pub bad_debt_risk: RiskTier,
    pub segment_label: Option<SegmentLabel>,
    pub arpu_avg_6m: Option<f64>,
    pub topup_frequency: Option<TopupFrequency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberPage {
    pub subscribers: Vec<SubscriberRow>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Aggregate counts over the filtered offer set.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStats {
    pub total: usize,
    pub by_service: Vec<LabeledCount>,
    pub by_risk_tier: Vec<LabeledCount>,
    pub total_advance_amount: f64,
    pub total_revenue_potential: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledCount {
    pub label: String,
    pub count: usize,
}

/// Full join for one subscriber, including the monthly ARPU series and the
/// derived engagement scores.
#[derive(Debug, Clone, Serialize)]
pub struct Subscriber360Profile {
    pub isdn: Isdn,
    pub subscriber_type: SubscriberType,
    pub user_type: String,
    pub segment_label: Option<SegmentLabel>,
    pub recommendation: Option<ServiceRecommendation>,
    pub risk_score: Option<f64>,
    pub bad_debt_risk: Option<RiskTier>,
    pub arpu_avg_6m: f64,
    pub arpu_growth_rate: f64,
    pub arpu_trend: ArpuTrend,
    pub topup_frequency: TopupFrequency,
    pub topup_advance_ratio: f64,
    pub monthly_arpu: Vec<MonthlyArpuPoint>,
    pub customer_value_score: f64,
    pub advance_readiness_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyArpuPoint {
    pub data_month: String,
    pub arpu_total: f64,
    pub topup_amount: f64,
}

/// Pages through the filtered offers. Returns `None` until both the
/// recommendation and filtered-assessment datasets exist.
pub fn list_subscribers(store: &DatasetStore, query: &SubscriberQuery) -> Option<SubscriberPage> {
    let rows = joined_rows(store)?;

    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let mut matching: Vec<SubscriberRow> = rows
        .into_iter()
        .filter(|row| {
            search.map_or(true, |needle| row.isdn.0.contains(needle))
                && query
                    .service_type
                    .map_or(true, |service| row.service_type == service)
                && query
                    .risk_level
                    .map_or(true, |tier| row.bad_debt_risk == tier)
        })
        .collect();
    matching.sort_by(|a, b| a.isdn.cmp(&b.isdn));

    let total = matching.len();
    let subscribers: Vec<SubscriberRow> = matching
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();
    let has_more = query.offset + subscribers.len() < total;

    Some(SubscriberPage {
        subscribers,
        total,
        limit: query.limit,
        offset: query.offset,
        has_more,
    })
}

pub fn subscriber_stats(store: &DatasetStore) -> Option<SubscriberStats> {
    let rows = joined_rows(store)?;

    let by_service = ServiceType::all()
        .into_iter()
        .map(|service| LabeledCount {
            label: service.label().to_string(),
            count: rows.iter().filter(|r| r.service_type == service).count(),
        })
        .collect();
    let by_risk_tier = [RiskTier::Low, RiskTier::Medium, RiskTier::High]
        .into_iter()
        .map(|tier| LabeledCount {
            label: tier.label().to_string(),
            count: rows.iter().filter(|r| r.bad_debt_risk == tier).count(),
        })
        .collect();

    Some(SubscriberStats {
        total: rows.len(),
        by_service,
        by_risk_tier,
        total_advance_amount: rows.iter().map(|r| r.advance_amount).sum(),
        total_revenue_potential: rows.iter().map(|r| r.revenue_per_advance).sum(),
    })
}

/// Builds the 360 profile for one subscriber. Requires the feature dataset;
/// offer, risk, and segment fields fill in when their stages have run.
pub fn subscriber_profile(store: &DatasetStore, isdn: &str) -> Option<Subscriber360Profile> {
    let features = store.features()?;
    let feature = features.iter().find(|f| f.isdn.0 == isdn)?.clone();

    let monthly_arpu = store
        .monthly()
        .map(|monthly| {
            let mut points: Vec<MonthlyArpuPoint> = monthly
                .iter()
                .filter(|m| m.isdn.0 == isdn)
                .map(|m| MonthlyArpuPoint {
                    data_month: m.data_month.clone(),
                    arpu_total: m.arpu_total,
                    topup_amount: m.topup_amount,
                })
                .collect();
            points.sort_by(|a, b| a.data_month.cmp(&b.data_month));
            points
        })
        .unwrap_or_default();

    let segment_label = store
        .clusters()
        .and_then(|clusters| clusters.iter().find(|c| c.isdn.0 == isdn).map(|c| c.segment_label));
    let recommendation = store
        .recommendations()
        .and_then(|recs| recs.iter().find(|r| r.isdn.0 == isdn).cloned());
    let assessment = store
        .assessments()
        .and_then(|assessments| assessments.iter().find(|a| a.isdn.0 == isdn).cloned());

    let customer_value_score = customer_value_score(&feature);
    let advance_readiness_score =
        advance_readiness_score(&feature, assessment.as_ref().map(|a| a.bad_debt_risk));

    Some(Subscriber360Profile {
        isdn: feature.isdn.clone(),
        subscriber_type: feature.subscriber_type,
        user_type: user_type(&feature).to_string(),
        segment_label,
        recommendation,
        risk_score: assessment.as_ref().map(|a| a.risk_score),
        bad_debt_risk: assessment.map(|a| a.bad_debt_risk),
        arpu_avg_6m: feature.arpu_avg_6m,
        arpu_growth_rate: feature.arpu_growth_rate,
        arpu_trend: feature.arpu_trend,
        topup_frequency: feature.topup_frequency,
        topup_advance_ratio: feature.topup_advance_ratio,
        monthly_arpu,
        customer_value_score,
        advance_readiness_score,
    })
}

fn joined_rows(store: &DatasetStore) -> Option<Vec<SubscriberRow>> {
    let recommendations = store.recommendations()?;
    let kept = store.filtered()?;
    let features = store.features();
    let clusters = store.clusters();

    // Keyed lookups keep the join linear over large subscriber sets.
    let offers_by_isdn: BTreeMap<&Isdn, &ServiceRecommendation> =
        recommendations.iter().map(|r| (&r.isdn, r)).collect();
    let features_by_isdn: BTreeMap<&Isdn, &SubscriberFeatureRecord> = features
        .as_deref()
        .map(|f| f.iter().map(|f| (&f.isdn, f)).collect())
        .unwrap_or_default();
    let segments_by_isdn: BTreeMap<&Isdn, SegmentLabel> = clusters
        .as_deref()
        .map(|c| c.iter().map(|c| (&c.isdn, c.segment_label)).collect())
        .unwrap_or_default();

    let rows = kept
        .iter()
        .filter_map(|assessment| {
            let offer = *offers_by_isdn.get(&assessment.isdn)?;
            let feature = features_by_isdn.get(&assessment.isdn).copied();
            let segment_label = segments_by_isdn.get(&assessment.isdn).copied();
            Some(SubscriberRow {
                isdn: assessment.isdn.clone(),
                service_type: offer.service_type,
                advance_amount: offer.advance_amount,
                revenue_per_advance: offer.revenue_per_advance,
                usage_time_hours: offer.usage_time_hours,
                risk_score: assessment.risk_score,
                bad_debt_risk: assessment.bad_debt_risk,
                segment_label,
                arpu_avg_6m: feature.map(|f| f.arpu_avg_6m),
                topup_frequency: feature.map(|f| f.topup_frequency),
            })
        })
        .collect();
    Some(rows)
}

/// Dominant-usage label from the latest-month revenue split.
fn user_type(feature: &super::domain::SubscriberFeatureRecord) -> &'static str {
    if feature.revenue_data_pct > 80.0 {
        "Heavy Data User"
    } else if feature.revenue_data_pct < 20.0 {
        "Voice/SMS User"
    } else {
        "Balanced User"
    }
}

/// 0..100 engagement score: up to 40 points for ARPU level (full credit at
/// 100k VND), 30 for topup-to-advance coverage, 30 for ARPU growth.
fn customer_value_score(feature: &super::domain::SubscriberFeatureRecord) -> f64 {
    let arpu_points = clamp(feature.arpu_avg_6m / 2_500.0, 0.0, 40.0);
    let ratio_points = clamp(feature.topup_advance_ratio * 10.0, 0.0, 30.0);
    let growth_points = clamp((feature.arpu_growth_rate + 10.0) / 2.0, 0.0, 30.0);
    (arpu_points + ratio_points + growth_points).round()
}

/// 0..100 readiness score: risk tier dominates, topup coverage and cadence
/// fill in the rest.
fn advance_readiness_score(
    feature: &super::domain::SubscriberFeatureRecord,
    risk: Option<RiskTier>,
) -> f64 {
    let risk_points = match risk {
        Some(RiskTier::Low) => 50.0,
        Some(RiskTier::Medium) => 30.0,
        Some(RiskTier::High) | None => 0.0,
    };
    let ratio_points = clamp(feature.topup_advance_ratio * 7.5, 0.0, 30.0);
    let frequency_points = match feature.topup_frequency {
        TopupFrequency::Frequent => 20.0,
        TopupFrequency::Moderate => 10.0,
        TopupFrequency::Rare => 5.0,
        TopupFrequency::None => 0.0,
    };
    (risk_points + ratio_points + frequency_points).round()
}

fn clamp(value: f64, low: f64, high: f64) -> f64 {
    value.max(low).min(high)
}
