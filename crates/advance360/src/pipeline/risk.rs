//! Risk-filter phase: scores every classified subscriber against the
//! bad-debt indicators and drops the HIGH tier before fulfillment.
//!
//! All four indicators are goodness measures in [0, 1]. The score starts
//! at the neutral `base_risk_score`; good behavior pulls it down toward 0
//! and absent behavior pushes it up toward twice the base. Lower is safer.

use tracing::info;

use super::configuration::BadDebtWeights;
use super::domain::{RiskAssessment, RiskTier, SubscriberFeatureRecord};

/// Reference average topup that earns full adequacy credit, in VND.
const AVG_TOPUP_FULL_CREDIT: f64 = 100_000.0;

/// Normalized goodness indicators backing one subscriber's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskIndicators {
    pub ratio_adequacy: f64,
    pub frequency: f64,
    pub arpu_stability: f64,
    pub avg_topup_adequacy: f64,
}

/// Output of the risk-filter phase over one batch.
#[derive(Debug, Default)]
pub struct RiskOutcome {
    /// Every scored subscriber, HIGH tier included.
    pub assessments: Vec<RiskAssessment>,
    /// LOW and MEDIUM tiers only; the set passed downstream.
    pub kept: Vec<RiskAssessment>,
}

pub fn indicators(record: &SubscriberFeatureRecord) -> RiskIndicators {
    let cv = if record.arpu_avg_6m > 0.0 {
        record.arpu_std_6m / record.arpu_avg_6m
    } else {
        0.0
    };
    RiskIndicators {
        ratio_adequacy: unit_clamp(record.topup_advance_ratio),
        frequency: record.topup_frequency.score(),
        arpu_stability: 1.0 - unit_clamp(cv),
        avg_topup_adequacy: unit_clamp(record.avg_topup_amount / AVG_TOPUP_FULL_CREDIT),
    }
}

pub fn score(record: &SubscriberFeatureRecord, weights: &BadDebtWeights) -> f64 {
    let ind = indicators(record);
    let goodness = weights.topup_advance_ratio_weight / 100.0 * ind.ratio_adequacy
        + weights.topup_frequency_weight / 100.0 * ind.frequency
        + weights.arpu_stability_weight / 100.0 * ind.arpu_stability
        + weights.avg_topup_weight / 100.0 * ind.avg_topup_adequacy;
    weights.base_risk_score + (1.0 - 2.0 * goodness) * weights.base_risk_score
}

pub fn tier(risk_score: f64, weights: &BadDebtWeights) -> RiskTier {
    if risk_score <= weights.low_risk_threshold {
        RiskTier::Low
    } else if risk_score <= weights.high_risk_threshold {
        RiskTier::Medium
    } else {
        RiskTier::High
    }
}

/// Scores the batch and splits out the LOW+MEDIUM subset kept for
/// fulfillment.
pub fn assess(features: &[SubscriberFeatureRecord], weights: &BadDebtWeights) -> RiskOutcome {
    let mut outcome = RiskOutcome::default();
    for record in features {
        let risk_score = score(record, weights);
        let assessment = RiskAssessment {
            isdn: record.isdn.clone(),
            risk_score,
            bad_debt_risk: tier(risk_score, weights),
        };
        if assessment.bad_debt_risk != RiskTier::High {
            outcome.kept.push(assessment.clone());
        }
        outcome.assessments.push(assessment);
    }

    info!(
        assessed = outcome.assessments.len(),
        kept = outcome.kept.len(),
        declined = outcome.assessments.len() - outcome.kept.len(),
        "risk filter complete"
    );
    outcome
}

fn unit_clamp(value: f64) -> f64 {
    value.max(0.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::domain::{ArpuTrend, Isdn, SubscriberType, TopupFrequency};

    fn feature(ratio: f64, topups: u32, avg_topup: f64, std: f64) -> SubscriberFeatureRecord {
        SubscriberFeatureRecord {
            isdn: Isdn::from("84901"),
            subscriber_type: SubscriberType::Pre,
            arpu: 50_000.0,
            revenue_call_pct: 40.0,
            revenue_sms_pct: 10.0,
            revenue_data_pct: 50.0,
            arpu_avg_6m: 50_000.0,
            arpu_std_6m: std,
            arpu_min_6m: 40_000.0,
            arpu_max_6m: 60_000.0,
            arpu_growth_rate: 0.0,
            arpu_trend: ArpuTrend::Stable,
            topup_count_last_1m: topups,
            topup_amount_last_1m: avg_topup * topups as f64,
            topup_count_last_2m: topups * 2,
            avg_topup_amount: avg_topup,
            topup_frequency: TopupFrequency::from_monthly_count(topups),
            topup_advance_ratio: ratio,
            has_advance_history: ratio > 0.0,
        }
    }

    #[test]
    fn perfect_indicators_zero_the_score() {
        let record = feature(2.0, 5, 150_000.0, 0.0);
        let weights = BadDebtWeights::default();
        let ind = indicators(&record);
        assert_eq!(ind.ratio_adequacy, 1.0);
        assert_eq!(ind.frequency, 1.0);
        assert_eq!(ind.arpu_stability, 1.0);
        assert_eq!(ind.avg_topup_adequacy, 1.0);
        assert!((score(&record, &weights)).abs() < 1e-9);
    }

    #[test]
    fn empty_indicators_score_double_the_base() {
        let record = feature(0.0, 0, 0.0, 60_000.0);
        let weights = BadDebtWeights::default();
        // cv = 1.2 clamps to 1, stability 0; everything else is 0, so the
        // score tops out at 2 * base = 100.
        assert!((score(&record, &weights) - 100.0).abs() < 1e-9);
        assert_eq!(tier(100.0, &weights), RiskTier::High);
    }

    #[test]
    fn half_goodness_scores_the_neutral_base() {
        // ratio 0.5, moderate frequency would overshoot; use weights on one
        // indicator only to isolate the midpoint.
        let mut weights = BadDebtWeights::default();
        weights.topup_advance_ratio_weight = 100.0;
        weights.topup_frequency_weight = 0.0;
        weights.arpu_stability_weight = 0.0;
        weights.avg_topup_weight = 0.0;

        let record = feature(0.5, 0, 0.0, 0.0);
        assert!((score(&record, &weights) - weights.base_risk_score).abs() < 1e-9);
        assert_eq!(tier(weights.base_risk_score, &weights), RiskTier::Medium);
    }

    #[test]
    fn raising_the_topup_advance_ratio_never_raises_the_score() {
        let weights = BadDebtWeights::default();
        let mut previous = f64::INFINITY;
        for step in 0..=10 {
            let ratio = step as f64 * 0.2;
            let current = score(&feature(ratio, 1, 30_000.0, 5_000.0), &weights);
            assert!(current <= previous + 1e-12);
            previous = current;
        }
    }

    #[test]
    fn tier_boundaries_are_inclusive() {
        let weights = BadDebtWeights::default();
        assert_eq!(tier(30.0, &weights), RiskTier::Low);
        assert_eq!(tier(30.1, &weights), RiskTier::Medium);
        assert_eq!(tier(60.0, &weights), RiskTier::Medium);
        assert_eq!(tier(60.1, &weights), RiskTier::High);
    }

    #[test]
    fn high_tier_is_assessed_but_not_kept() {
        let weights = BadDebtWeights::default();
        let safe = feature(1.5, 4, 120_000.0, 0.0);
        let risky = feature(0.0, 0, 0.0, 100_000.0);

        let outcome = assess(&[safe, risky], &weights);
        assert_eq!(outcome.assessments.len(), 2);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].bad_debt_risk, RiskTier::Low);
        assert_eq!(outcome.assessments[1].bad_debt_risk, RiskTier::High);
    }
}
