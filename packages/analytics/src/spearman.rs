//! Spearman rank correlation with a permutation test.

use std::sync::Arc;

use need_map_analytics_models::{AnalysisConfig, SpearmanResult};

use crate::config::validate_permutations;
use crate::permutation::permute_values;
use crate::progress::ProgressCallback;
use crate::standardize::mean;
use crate::{AnalyticsError, Series};

/// Spearman's rho between two paired variables.
///
/// Tied values share the average of their ranks. The p-value is
/// two-sided: the share of random re-pairings (of `y` against fixed `x`)
/// whose |rho| reaches the observed |rho|, as `(count + 1) / (permutations + 1)`.
///
/// # Errors
///
/// * [`AnalyticsError::LengthMismatch`] if the variables differ in length.
/// * [`AnalyticsError::InsufficientData`] for fewer than three pairs.
/// * [`AnalyticsError::DegenerateInput`] if either variable is constant or
///   not finite.
/// * [`AnalyticsError::Configuration`] for an invalid permutation count.
#[allow(clippy::cast_precision_loss)]
pub fn spearman(
    x: Series<'_>,
    y: Series<'_>,
    config: &AnalysisConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SpearmanResult, AnalyticsError> {
    validate_permutations(config.permutations)?;
    if x.values.len() != y.values.len() {
        return Err(AnalyticsError::LengthMismatch {
            variable: y.name.to_string(),
            expected: x.values.len(),
            actual: y.values.len(),
        });
    }
    x.check_finite()?;
    y.check_finite()?;
    let n = x.values.len();
    if n < 3 {
        return Err(AnalyticsError::InsufficientData {
            valid: n,
            required: 3,
        });
    }

    let rx = average_ranks(x.values);
    let ry = average_ranks(y.values);
    for (series, ranks) in [(x, &rx), (y, &ry)] {
        if ranks.iter().all(|&r| r == ranks[0]) {
            return Err(AnalyticsError::DegenerateInput {
                variable: series.name.to_string(),
                reason: "all values are identical (zero variance)".to_string(),
            });
        }
    }

    let rho = pearson(&rx, &ry);
    progress.set_message(format!("Spearman: {} / {}", x.name, y.name));
    let simulated = permute_values(&ry, config.permutations, config.seed, progress, |perm| {
        pearson(&rx, perm)
    });
    let extreme = simulated.iter().filter(|s| s.abs() >= rho.abs()).count();
    let p_sim = (extreme + 1) as f64 / (f64::from(config.permutations) + 1.0);

    log::info!(
        "Spearman rho for {} / {}: {rho:.4}, p_sim = {p_sim:.4}",
        x.name,
        y.name
    );

    Ok(SpearmanResult {
        x_variable: x.name.to_string(),
        y_variable: y.name.to_string(),
        areas: n,
        rho,
        p_sim,
        permutations: config.permutations,
        seed: config.seed,
    })
}

/// 1-based ranks, ties averaged.
#[allow(clippy::cast_precision_loss)]
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1 ..= end.
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let denominator = (va * vb).sqrt();
    if denominator == 0.0 { 0.0 } else { cov / denominator }
}
