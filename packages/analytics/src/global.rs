//! Global Moran's I and its bivariate form.

use std::sync::Arc;

use need_map_analytics_models::{AnalysisConfig, GlobalMoranResult, NormalInference};
use need_map_spatial::SpatialWeights;

use crate::config::validate_permutations;
use crate::permutation::{permute_values, summarize};
use crate::progress::ProgressCallback;
use crate::standardize::{deviations, standardize};
use crate::{AnalyticsError, Series};

/// Global Moran's I of one variable over the graph.
///
/// `I = (n / S0) * Σᵢ zᵢ lag(z)ᵢ / Σᵢ zᵢ²` with `z` the deviations from the
/// mean. Significance comes from `config.permutations` random
/// reassignments of the values to areas, plus the analytical inference
/// under normality.
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] for an invalid permutation count.
/// * [`AnalyticsError::LengthMismatch`] if the values do not line up with
///   the graph.
/// * [`AnalyticsError::DegenerateInput`] if the values have zero variance
///   or no area has a neighbor.
pub fn global_moran(
    weights: &SpatialWeights,
    series: Series<'_>,
    config: &AnalysisConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<GlobalMoranResult, AnalyticsError> {
    validate_permutations(config.permutations)?;
    series.check_against(weights)?;
    let s0 = linked_weight_sum(weights, series.name)?;
    let z = deviations(series)?;

    let statistic = moran(weights, &z, &z, s0);
    progress.set_message(format!("Moran's I: {}", series.name));
    let simulated = permute_values(&z, config.permutations, config.seed, progress, |perm| {
        moran(weights, perm, perm, s0)
    });
    let simulation = summarize(statistic, &simulated, config.permutations, config.seed);
    let normal = normal_inference(weights, statistic, s0);

    log::info!(
        "Moran's I for {}: I = {statistic:.4}, p_sim = {:.4} ({} permutations)",
        series.name,
        simulation.p_sim,
        config.permutations
    );

    Ok(GlobalMoranResult {
        variable: series.name.to_string(),
        linked_variable: None,
        areas: weights.len(),
        statistic,
        expected: expected_value(weights.len()),
        normal,
        simulation,
    })
}

/// Global bivariate Moran's I: association between `x` at each area and
/// the spatial lag of `y`.
///
/// Both variables are standardized; `I = (n / S0) * Σᵢ xᵢ lag(y)ᵢ / Σᵢ xᵢ²`.
/// Significance permutes `y` while holding `x` and the graph fixed.
///
/// # Errors
///
/// Same as [`global_moran`], for either variable.
pub fn global_bivariate_moran(
    weights: &SpatialWeights,
    x: Series<'_>,
    y: Series<'_>,
    config: &AnalysisConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<GlobalMoranResult, AnalyticsError> {
    validate_permutations(config.permutations)?;
    x.check_against(weights)?;
    y.check_against(weights)?;
    let s0 = linked_weight_sum(weights, x.name)?;
    let zx = standardize(x)?;
    let zy = standardize(y)?;

    let statistic = moran(weights, &zx, &zy, s0);
    progress.set_message(format!("Bivariate Moran's I: {} / {}", x.name, y.name));
    let simulated = permute_values(&zy, config.permutations, config.seed, progress, |perm| {
        moran(weights, &zx, perm, s0)
    });
    let simulation = summarize(statistic, &simulated, config.permutations, config.seed);

    log::info!(
        "Bivariate Moran's I for {} against lag of {}: I = {statistic:.4}, p_sim = {:.4}",
        x.name,
        y.name,
        simulation.p_sim
    );

    Ok(GlobalMoranResult {
        variable: x.name.to_string(),
        linked_variable: Some(y.name.to_string()),
        areas: weights.len(),
        statistic,
        expected: expected_value(weights.len()),
        normal: None,
        simulation,
    })
}

/// `(n / S0) * Σᵢ xᵢ lag(y)ᵢ / Σᵢ xᵢ²`.
#[allow(clippy::cast_precision_loss)]
fn moran(weights: &SpatialWeights, x: &[f64], y: &[f64], s0: f64) -> f64 {
    let n = weights.len() as f64;
    let cross: f64 = x
        .iter()
        .enumerate()
        .map(|(i, xi)| xi * weights.lag_at(i, y))
        .sum();
    let ss: f64 = x.iter().map(|v| v * v).sum();
    n / s0 * cross / ss
}

fn linked_weight_sum(weights: &SpatialWeights, variable: &str) -> Result<f64, AnalyticsError> {
    let s0 = weights.s0();
    if s0 == 0.0 {
        return Err(AnalyticsError::DegenerateInput {
            variable: variable.to_string(),
            reason: "no area has a neighbor".to_string(),
        });
    }
    Ok(s0)
}

#[allow(clippy::cast_precision_loss)]
fn expected_value(n: usize) -> f64 {
    -1.0 / (n as f64 - 1.0)
}

/// Variance, z-score and two-sided p-value of I under normality.
#[allow(clippy::cast_precision_loss)]
fn normal_inference(weights: &SpatialWeights, statistic: f64, s0: f64) -> Option<NormalInference> {
    let n = weights.len() as f64;
    let expected = expected_value(weights.len());
    let (s1, s2) = (weights.s1(), weights.s2());
    let variance = (n * n * s1 - n * s2 + 3.0 * s0 * s0) / ((n * n - 1.0) * s0 * s0)
        - expected * expected;
    if variance <= 0.0 || !variance.is_finite() {
        log::debug!("Normality variance of Moran's I is not positive ({variance})");
        return None;
    }
    let z_score = (statistic - expected) / variance.sqrt();
    Some(NormalInference {
        variance,
        z_score,
        p_value: 2.0 * normal_cdf(-z_score.abs()),
    })
}

/// Standard normal CDF, Abramowitz & Stegun 26.2.17 (error below 7.5e-8).
fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let density = 0.398_942_280_401_432_7 * (-x * x / 2.0).exp();
    let poly = t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429));
    let tail = density * t * (0.319_381_530 + t * (-0.356_563_782 + poly));
    if x > 0.0 { 1.0 - tail } else { tail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;
    use crate::test_support::{assert_close, lattice, line};
    use need_map_analytics_models::MAX_PERMUTATIONS;
    use need_map_geography_models::AreaId;

    const LINE: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];

    fn run(weights: &SpatialWeights, values: &[f64]) -> Result<GlobalMoranResult, AnalyticsError> {
        global_moran(
            weights,
            Series::new("calls", values),
            &AnalysisConfig::default(),
            &null_progress(),
        )
    }

    #[test]
    fn gradient_on_a_line_is_positively_autocorrelated() {
        let result = run(&line(5), &LINE).unwrap();
        assert_close(result.statistic, 0.6, 1e-12);
        assert_close(result.expected, -0.25, 1e-12);
        assert!(result.statistic > 0.0);
        assert_eq!(result.simulation.permutations, 999);
        assert_eq!(result.simulation.seed, 42);
        assert!(result.simulation.p_sim > 0.0 && result.simulation.p_sim <= 0.5);
    }

    #[test]
    fn seeded_p_value_is_reproducible() {
        let w = line(5);
        let first = run(&w, &LINE).unwrap();
        let second = run(&w, &LINE).unwrap();
        assert_eq!(
            first.simulation.p_sim.to_bits(),
            second.simulation.p_sim.to_bits()
        );
        assert_eq!(first, second);
    }

    #[test]
    fn normality_inference_on_a_line() {
        let normal = run(&line(5), &LINE).unwrap().normal.unwrap();
        assert_close(normal.variance, 132.5 / 600.0 - 0.0625, 1e-12);
        assert!(normal.z_score > 2.0, "z = {}", normal.z_score);
        assert!(normal.p_value < 0.05, "p = {}", normal.p_value);
    }

    #[test]
    fn zero_variance_is_degenerate() {
        let err = run(&line(5), &[5.0; 5]).unwrap_err();
        assert!(matches!(err, AnalyticsError::DegenerateInput { .. }), "{err}");
    }

    #[test]
    fn graph_without_links_is_degenerate() {
        let ids = (1..=3).map(|i| AreaId::new(i.to_string())).collect();
        let w = SpatialWeights::from_adjacency(ids, Vec::new()).unwrap();
        let err = run(&w, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(err.to_string().contains("no area has a neighbor"), "{err}");
    }

    #[test]
    fn clustered_lattice_is_significant() {
        let w = lattice(5);
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f64> = (0..25).map(|i| (i % 5) as f64).collect();
        let result = run(&w, &values).unwrap();
        assert!(result.statistic > 0.5, "I = {}", result.statistic);
        assert!(result.simulation.p_sim < 0.01, "p = {}", result.simulation.p_sim);
        assert!(result.simulation.z_score.unwrap() > 2.0);
    }

    #[test]
    fn permutation_count_is_bounded() {
        let config = AnalysisConfig {
            permutations: MAX_PERMUTATIONS + 1,
            ..AnalysisConfig::default()
        };
        let err = global_moran(
            &line(5),
            Series::new("calls", &LINE),
            &config,
            &null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)), "{err}");
    }

    #[test]
    fn bivariate_of_a_variable_with_itself_matches_univariate() {
        let w = lattice(4);
        let values: Vec<f64> = [3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 8, 9, 7, 9, 3]
            .into_iter()
            .map(f64::from)
            .collect();
        let series = Series::new("calls", &values);
        let config = AnalysisConfig::default();
        let uni = global_moran(&w, series, &config, &null_progress()).unwrap();
        let bi = global_bivariate_moran(&w, series, series, &config, &null_progress()).unwrap();
        assert_close(bi.statistic, uni.statistic, 1e-12);
        assert_eq!(bi.linked_variable.as_deref(), Some("calls"));
        assert!(bi.normal.is_none());
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert_close(normal_cdf(0.0), 0.5, 1e-7);
        assert_close(normal_cdf(1.0), 0.841_344_746, 1e-7);
        assert_close(normal_cdf(-2.5), 0.006_209_665, 1e-7);
        assert_close(normal_cdf(1.96), 0.975, 1e-4);
        assert_close(normal_cdf(-1.96), 0.025, 1e-4);
    }
}
