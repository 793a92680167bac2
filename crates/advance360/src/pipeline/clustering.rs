//! Clustering phase: seeded k-means over standardized behavior features,
//! plus the advance-rate bucketing that turns raw cluster ids into
//! business segment labels.
//!
//! Determinism contract: identical input and identical clustering
//! configuration produce identical assignments. Every random draw flows
//! from `random_state`, and all tie-breaks prefer the lowest index.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use tracing::info;

use super::configuration::ClusteringParams;
use super::domain::{ClusterAssignment, SegmentLabel, SubscriberFeatureRecord};

/// Feature columns fed to k-means, in order.
const FEATURE_DIM: usize = 5;

#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    pub assignments: Vec<ClusterAssignment>,
    /// Within-cluster sum of squared distances of the winning run.
    pub inertia: f64,
    /// Subscribers in high-advance-propensity segments; reporting only.
    pub expansion_target: usize,
}

/// Partitions subscribers into `n_clusters` groups, running `n_init`
/// seeded initializations and keeping the lowest-inertia result.
pub fn cluster_subscribers(
    features: &[SubscriberFeatureRecord],
    params: &ClusteringParams,
) -> ClusteringOutcome {
    if features.is_empty() {
        return ClusteringOutcome {
            assignments: Vec::new(),
            inertia: 0.0,
            expansion_target: 0,
        };
    }

    let matrix = standardize(features);
    let k = params.n_clusters.min(features.len());

    let mut best: Option<(Vec<usize>, f64)> = None;
    for init in 0..params.n_init {
        let seed = params.random_state.wrapping_add(init as u64);
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let (labels, inertia) = lloyd(&matrix, k, params.max_iter, &mut rng);
        let better = best
            .as_ref()
            .map_or(true, |(_, best_inertia)| inertia < *best_inertia);
        if better {
            best = Some((labels, inertia));
        }
    }

    let (labels, inertia) = best.expect("at least one initialization ran");
    let assignments = label_segments(features, &labels, k);
    let expansion_target = assignments
        .iter()
        .filter(|a| a.segment_label.is_expansion_target())
        .count();

    info!(
        subscribers = features.len(),
        clusters = k,
        inertia,
        expansion_target,
        "clustering complete"
    );

    ClusteringOutcome {
        assignments,
        inertia,
        expansion_target,
    }
}

fn feature_vector(record: &SubscriberFeatureRecord) -> [f64; FEATURE_DIM] {
    [
        record.arpu_avg_6m,
        record.topup_count_last_1m as f64,
        record.topup_amount_last_1m,
        record.avg_topup_amount,
        record.topup_advance_ratio,
    ]
}

/// Z-score standardization per column; constant columns map to zero.
fn standardize(features: &[SubscriberFeatureRecord]) -> Vec<[f64; FEATURE_DIM]> {
    let n = features.len() as f64;
    let raw: Vec<[f64; FEATURE_DIM]> = features.iter().map(feature_vector).collect();

    let mut means = [0.0; FEATURE_DIM];
    for row in &raw {
        for (mean, value) in means.iter_mut().zip(row) {
            *mean += value / n;
        }
    }

    let mut stds = [0.0; FEATURE_DIM];
    for row in &raw {
        for ((std, value), mean) in stds.iter_mut().zip(row).zip(&means) {
            *std += (value - mean).powi(2) / n;
        }
    }
    for std in &mut stds {
        *std = std.sqrt();
    }

    raw.into_iter()
        .map(|row| {
            let mut scaled = [0.0; FEATURE_DIM];
            for i in 0..FEATURE_DIM {
                scaled[i] = if stds[i] > 0.0 {
                    (row[i] - means[i]) / stds[i]
                } else {
                    0.0
                };
            }
            scaled
        })
        .collect()
}

fn squared_distance(a: &[f64; FEATURE_DIM], b: &[f64; FEATURE_DIM]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// One Lloyd run: centroids seeded from `k` distinct samples, iterated
/// until assignments stabilize or `max_iter` passes.
fn lloyd(
    matrix: &[[f64; FEATURE_DIM]],
    k: usize,
    max_iter: usize,
    rng: &mut Pcg64Mcg,
) -> (Vec<usize>, f64) {
    let n = matrix.len();
    let mut centroids: Vec<[f64; FEATURE_DIM]> = choose_distinct(rng, n, k)
        .into_iter()
        .map(|index| matrix[index])
        .collect();

    let mut labels = vec![0usize; n];
    for _ in 0..max_iter {
        let mut changed = false;
        for (index, row) in matrix.iter().enumerate() {
            let nearest = nearest_centroid(row, &centroids);
            if labels[index] != nearest {
                labels[index] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0; FEATURE_DIM]; k];
        let mut counts = vec![0usize; k];
        for (row, &label) in matrix.iter().zip(&labels) {
            counts[label] += 1;
            for (sum, value) in sums[label].iter_mut().zip(row) {
                *sum += value;
            }
        }
        for (cluster, count) in counts.iter().enumerate() {
            // Empty clusters keep their previous centroid.
            if *count > 0 {
                for (centroid, sum) in centroids[cluster].iter_mut().zip(&sums[cluster]) {
                    *centroid = sum / *count as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = matrix
        .iter()
        .zip(&labels)
        .map(|(row, &label)| squared_distance(row, &centroids[label]))
        .sum();
    (labels, inertia)
}

fn nearest_centroid(row: &[f64; FEATURE_DIM], centroids: &[[f64; FEATURE_DIM]]) -> usize {
    let mut nearest = 0;
    let mut nearest_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(row, centroid);
        if distance < nearest_distance {
            nearest = index;
            nearest_distance = distance;
        }
    }
    nearest
}

/// Partial Fisher-Yates draw of `k` distinct indices out of `n`.
fn choose_distinct(rng: &mut Pcg64Mcg, n: usize, k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

/// Buckets clusters into segments by aggregate advance rate: subscribers
/// with advance history are the existing base; among the rest, the cluster
/// with the highest advance rate is the prime expansion target and the
/// lowest-rate cluster is unlikely to convert.
fn label_segments(
    features: &[SubscriberFeatureRecord],
    labels: &[usize],
    k: usize,
) -> Vec<ClusterAssignment> {
    let mut totals = vec![0usize; k];
    let mut advance_users = vec![0usize; k];
    for (record, &label) in features.iter().zip(labels) {
        totals[label] += 1;
        if record.has_advance_history {
            advance_users[label] += 1;
        }
    }

    let mut ranked: Vec<(usize, f64)> = (0..k)
        .map(|cluster| {
            let rate = if totals[cluster] > 0 {
                advance_users[cluster] as f64 / totals[cluster] as f64
            } else {
                0.0
            };
            (cluster, rate)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let highest = ranked.first().map(|(cluster, _)| *cluster);
    let lowest = if ranked.len() > 1 {
        ranked.last().map(|(cluster, _)| *cluster)
    } else {
        None
    };

    features
        .iter()
        .zip(labels)
        .map(|(record, &cluster_id)| {
            let segment_label = if record.has_advance_history {
                SegmentLabel::ExistingAdvanceUser
            } else if Some(cluster_id) == highest {
                SegmentLabel::HighPropensity
            } else if Some(cluster_id) == lowest {
                SegmentLabel::Unlikely
            } else {
                SegmentLabel::MediumPropensity
            };
            ClusterAssignment {
                isdn: record.isdn.clone(),
                cluster_id,
                segment_label,
            }
        })
        .collect()
}
