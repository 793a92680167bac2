//! Classification phase: assigns each eligible pre-paid subscriber at most
//! one advance service through an ordered rule list. Branch order is fixed
//! and the first match wins, so a subscriber never receives two offers.

use tracing::{debug, warn};

use super::configuration::BusinessRuleWeights;
use super::domain::{
    ServiceRecommendation, ServiceType, SubscriberFeatureRecord, SubscriberType,
};

/// Result of classifying one feature batch.
#[derive(Debug, Default)]
pub struct ClassificationOutcome {
    pub recommendations: Vec<ServiceRecommendation>,
    /// Records dropped because a required feature was not a finite number.
    pub skipped: usize,
    /// Pre-paid records that matched no branch.
    pub unmatched: usize,
    /// Post-paid records removed by the hard eligibility filter.
    pub pos_dropped: usize,
}

/// Runs the ordered rule list over the feature batch.
pub fn classify(
    features: &[SubscriberFeatureRecord],
    rules: &BusinessRuleWeights,
) -> ClassificationOutcome {
    let mut outcome = ClassificationOutcome::default();

    for record in features {
        if record.subscriber_type == SubscriberType::Pos {
            outcome.pos_dropped += 1;
            continue;
        }
        if !required_fields_finite(record) {
            outcome.skipped += 1;
            warn!(isdn = %record.isdn, "skipping record with non-finite features");
            continue;
        }

        match classify_one(record, rules) {
            Some(recommendation) => outcome.recommendations.push(recommendation),
            None => outcome.unmatched += 1,
        }
    }

    debug!(
        recommended = outcome.recommendations.len(),
        unmatched = outcome.unmatched,
        skipped = outcome.skipped,
        pos_dropped = outcome.pos_dropped,
        "classification complete"
    );
    outcome
}

fn required_fields_finite(record: &SubscriberFeatureRecord) -> bool {
    [
        record.arpu_avg_6m,
        record.revenue_call_pct,
        record.revenue_sms_pct,
        record.topup_amount_last_1m,
    ]
    .iter()
    .all(|value| value.is_finite())
}

fn classify_one(
    record: &SubscriberFeatureRecord,
    rules: &BusinessRuleWeights,
) -> Option<ServiceRecommendation> {
    let voice_sms_pct = record.revenue_call_pct + record.revenue_sms_pct;

    // Quota: voice/SMS-dominant usage, advance sized from average ARPU.
    if voice_sms_pct >= rules.voice_sms_threshold {
        let advance = clamp(
            record.arpu_avg_6m * rules.ungsanluong_arpu_multiplier,
            rules.ungsanluong_min_amount,
            rules.ungsanluong_max_amount,
        );
        return Some(recommendation(
            record,
            ServiceType::Quota,
            advance,
            advance * rules.ungsanluong_revenue_rate,
            Some(usage_time_hours(advance)),
            format!(
                "voice+sms revenue share {voice_sms_pct:.1}% >= {:.1}%",
                rules.voice_sms_threshold
            ),
        ));
    }

    // Fee: consistent topup behavior, flat amount with a VIP uplift.
    let recent_topups = record.topup_count_last_1m as f64 >= rules.easycredit_min_topup_count_1m
        && record.topup_amount_last_1m >= rules.easycredit_min_topup_amount;
    let sustained_topups =
        record.topup_count_last_2m as f64 >= rules.easycredit_min_topup_count_2m;
    if recent_topups || sustained_topups {
        let vip = record.arpu_avg_6m >= rules.easycredit_vip_arpu_threshold;
        let advance = if vip {
            rules.easycredit_vip_amount
        } else {
            rules.easycredit_default_amount
        };
        let reason = if recent_topups {
            format!(
                "last-month topups {} >= {:.0} with amount {:.0} >= {:.0}",
                record.topup_count_last_1m,
                rules.easycredit_min_topup_count_1m,
                record.topup_amount_last_1m,
                rules.easycredit_min_topup_amount,
            )
        } else {
            format!(
                "two-month topups {} >= {:.0}",
                record.topup_count_last_2m, rules.easycredit_min_topup_count_2m,
            )
        };
        return Some(recommendation(
            record,
            ServiceType::Fee,
            advance,
            advance * rules.easycredit_revenue_rate,
            None,
            reason,
        ));
    }

    // Free: active topup cadence, advance sized from average ARPU.
    if record.topup_count_last_1m as f64 >= rules.mbfg_min_topup_count_1m {
        let advance = clamp(
            record.arpu_avg_6m * rules.mbfg_arpu_multiplier,
            rules.mbfg_min_amount,
            rules.mbfg_max_amount,
        );
        return Some(recommendation(
            record,
            ServiceType::Free,
            advance,
            advance * rules.mbfg_revenue_rate,
            Some(usage_time_hours(advance)),
            format!(
                "last-month topups {} >= {:.0}",
                record.topup_count_last_1m, rules.mbfg_min_topup_count_1m,
            ),
        ));
    }

    None
}

fn recommendation(
    record: &SubscriberFeatureRecord,
    service_type: ServiceType,
    advance_amount: f64,
    revenue_per_advance: f64,
    usage_time_hours: Option<u32>,
    deciding_inequality: String,
) -> ServiceRecommendation {
    ServiceRecommendation {
        isdn: record.isdn.clone(),
        service_type,
        advance_amount,
        revenue_per_advance,
        usage_time_hours,
        classification_reason: format!("{}: {deciding_inequality}", service_type.label()),
    }
}

fn clamp(value: f64, low: f64, high: f64) -> f64 {
    value.max(low).min(high)
}

/// Validity window by advance size. Larger advances get more time to be
/// consumed before reclamation.
fn usage_time_hours(advance_amount: f64) -> u32 {
    if advance_amount <= 5_000.0 {
        24
    } else if advance_amount <= 15_000.0 {
        36
    } else if advance_amount <= 30_000.0 {
        48
    } else {
        60
    }
}
