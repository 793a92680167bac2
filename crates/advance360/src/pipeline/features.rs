//! Feature-engineering phase: collapses a subscriber's monthly usage rows
//! into the per-subscriber aggregates the decision stages consume.

use std::collections::BTreeMap;

use super::domain::{
    ArpuTrend, Isdn, MonthlyUsageRecord, SubscriberFeatureRecord, TopupFrequency,
};

/// Derives one feature record per subscriber from the monthly dataset.
/// Months are ordered by `data_month` ("YYYYMM" sorts chronologically);
/// "latest month" aggregates use the final entry of that ordering.
pub fn derive_features(monthly: &[MonthlyUsageRecord]) -> Vec<SubscriberFeatureRecord> {
    let mut by_isdn: BTreeMap<&Isdn, Vec<&MonthlyUsageRecord>> = BTreeMap::new();
    for record in monthly {
        by_isdn.entry(&record.isdn).or_default().push(record);
    }

    by_isdn
        .into_iter()
        .map(|(isdn, mut months)| {
            months.sort_by(|a, b| a.data_month.cmp(&b.data_month));
            build_record(isdn.clone(), &months)
        })
        .collect()
}

fn build_record(isdn: Isdn, months: &[&MonthlyUsageRecord]) -> SubscriberFeatureRecord {
    let latest = months.last().expect("grouping yields at least one month");
    let series: Vec<f64> = months.iter().map(|m| m.arpu_total).collect();

    let arpu_avg_6m = mean(&series);
    let arpu_std_6m = sample_std(&series, arpu_avg_6m);
    let arpu_min_6m = series.iter().copied().fold(f64::INFINITY, f64::min);
    let arpu_max_6m = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let first = series.first().copied().unwrap_or(0.0);
    let last = series.last().copied().unwrap_or(0.0);
    let arpu_growth_rate = if first > 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };

    let arpu = latest.arpu_total;
    let pct_of_arpu = |part: f64| if arpu > 0.0 { part / arpu * 100.0 } else { 0.0 };

    let topup_count_last_1m = latest.topup_count;
    let topup_amount_last_1m = latest.topup_amount;
    let topup_count_last_2m: u32 = months
        .iter()
        .rev()
        .take(2)
        .map(|m| m.topup_count)
        .sum();

    let total_topup_count: u32 = months.iter().map(|m| m.topup_count).sum();
    let total_topup_amount: f64 = months.iter().map(|m| m.topup_amount).sum();
    let avg_topup_amount = if total_topup_count > 0 {
        total_topup_amount / total_topup_count as f64
    } else {
        0.0
    };

    let latest_advance = latest.advance_amount.unwrap_or(0.0);
    let topup_advance_ratio = if latest_advance > 0.0 {
        topup_amount_last_1m / latest_advance
    } else {
        0.0
    };

    let has_advance_history = months
        .iter()
        .any(|m| m.advance_amount.map_or(false, |amount| amount > 0.0));

    SubscriberFeatureRecord {
        isdn,
        subscriber_type: latest.subscriber_type,
        arpu,
        revenue_call_pct: pct_of_arpu(latest.arpu_call),
        revenue_sms_pct: pct_of_arpu(latest.arpu_sms),
        revenue_data_pct: pct_of_arpu(latest.arpu_data),
        arpu_avg_6m,
        arpu_std_6m,
        arpu_min_6m,
        arpu_max_6m,
        arpu_growth_rate,
        arpu_trend: ArpuTrend::from_growth_rate(arpu_growth_rate),
        topup_count_last_1m,
        topup_amount_last_1m,
        topup_count_last_2m,
        avg_topup_amount,
        topup_frequency: TopupFrequency::from_monthly_count(topup_count_last_1m),
        topup_advance_ratio,
        has_advance_history,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}
