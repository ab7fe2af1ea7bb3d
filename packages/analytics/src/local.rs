//! Local Moran's I (LISA) and bivariate LISA.
//!
//! Both forms compute `focal[i] * lag(linked)[i]` over standardized
//! values and share one conditional permutation engine; the univariate
//! form simply passes the same vector as focal and linked.

use std::sync::Arc;

use need_map_analytics_models::{
    AnalysisConfig, ClusterLabel, LocalRecord, LocalResult, Quadrant,
};
use need_map_spatial::SpatialWeights;

use crate::config::{validate_permutations, validate_significance};
use crate::permutation::conditional_p_values;
use crate::progress::ProgressCallback;
use crate::standardize::standardize;
use crate::{AnalyticsError, Series};

/// Local Moran's I of one variable at every area.
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] for an invalid permutation count or
///   significance threshold.
/// * [`AnalyticsError::LengthMismatch`] if the values do not line up with
///   the graph.
/// * [`AnalyticsError::DegenerateInput`] if the values have zero variance.
pub fn local_moran(
    weights: &SpatialWeights,
    series: Series<'_>,
    config: &AnalysisConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<LocalResult, AnalyticsError> {
    check_config(config)?;
    series.check_against(weights)?;
    let z = standardize(series)?;

    progress.set_message(format!("LISA: {}", series.name));
    Ok(local_indicators(
        weights,
        (&z, &z),
        (series.name, None),
        config,
        progress,
    ))
}

/// Bivariate Local Moran's I: `x` at each area against the spatial lag of
/// `y`, each standardized with its own mean and variance.
///
/// # Errors
///
/// Same as [`local_moran`], for either variable.
pub fn bivariate_local_moran(
    weights: &SpatialWeights,
    x: Series<'_>,
    y: Series<'_>,
    config: &AnalysisConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<LocalResult, AnalyticsError> {
    check_config(config)?;
    x.check_against(weights)?;
    y.check_against(weights)?;
    let zx = standardize(x)?;
    let zy = standardize(y)?;

    progress.set_message(format!("Bivariate LISA: {} / {}", x.name, y.name));
    Ok(local_indicators(
        weights,
        (&zx, &zy),
        (x.name, Some(y.name)),
        config,
        progress,
    ))
}

fn check_config(config: &AnalysisConfig) -> Result<(), AnalyticsError> {
    validate_permutations(config.permutations)?;
    validate_significance(config.significance)
}

fn local_indicators(
    weights: &SpatialWeights,
    (focal, linked): (&[f64], &[f64]),
    (variable, linked_variable): (&str, Option<&str>),
    config: &AnalysisConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> LocalResult {
    let lag = weights.lag(linked);
    let observed: Vec<f64> = focal.iter().zip(&lag).map(|(x, l)| x * l).collect();
    let p_values = conditional_p_values(
        weights,
        focal,
        linked,
        &observed,
        config.permutations,
        config.seed,
        progress,
    );

    let records: Vec<LocalRecord> = (0..weights.len())
        .map(|i| {
            let p_sim = p_values[i];
            // Islands have no neighbor context to classify against.
            let quadrant = p_sim.and_then(|_| Quadrant::from_signs(focal[i], lag[i]));
            let significant =
                quadrant.is_some() && p_sim.is_some_and(|p| p < config.significance);
            LocalRecord {
                area_id: weights.id(i).clone(),
                value: focal[i],
                lag: lag[i],
                statistic: observed[i],
                quadrant,
                p_sim,
                significant,
                label: ClusterLabel::from_quadrant(quadrant, significant),
            }
        })
        .collect();

    let result = LocalResult {
        variable: variable.to_string(),
        linked_variable: linked_variable.map(str::to_string),
        permutations: config.permutations,
        seed: config.seed,
        significance: config.significance,
        records,
    };

    let islands = result.islands().len();
    if islands > 0 {
        log::warn!(
            "{islands} area(s) have no neighbors; their {variable} indicators are labeled {}",
            ClusterLabel::Undefined
        );
    }
    let significant = result.records.iter().filter(|r| r.significant).count();
    log::info!(
        "Local Moran's I for {variable}{}: {significant}/{} area(s) significant at {}",
        linked_variable.map_or_else(String::new, |y| format!(" against lag of {y}")),
        result.records.len(),
        config.significance
    );
    log::debug!("{variable} labels: {:?}", result.label_counts());

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;
    use crate::test_support::{assert_close, lattice, line};
    use need_map_geography_models::AreaId;

    fn run(weights: &SpatialWeights, values: &[f64]) -> LocalResult {
        local_moran(
            weights,
            Series::new("calls", values),
            &AnalysisConfig::default(),
            &null_progress(),
        )
        .unwrap()
    }

    /// `row + col` over a `size` x `size` lattice in row-major order.
    #[allow(clippy::cast_precision_loss)]
    fn diagonal_gradient(size: usize) -> Vec<f64> {
        (0..size * size)
            .map(|i| (i / size + i % size) as f64)
            .collect()
    }

    #[test]
    fn line_quadrants_and_sum() {
        let result = run(&line(5), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let quadrants: Vec<Option<Quadrant>> = result.records.iter().map(|r| r.quadrant).collect();
        assert_eq!(
            quadrants,
            vec![
                Some(Quadrant::LowLow),
                Some(Quadrant::LowLow),
                None,
                Some(Quadrant::HighHigh),
                Some(Quadrant::HighHigh),
            ]
        );
        assert_eq!(result.records[2].label, ClusterLabel::Undefined);

        // With standardized values, Σ Iᵢ = I * S0 = 0.6 * 5.
        let total: f64 = result.records.iter().map(|r| r.statistic).sum();
        assert_close(total, 3.0, 1e-12);
    }

    #[test]
    fn area_at_the_mean_is_never_significant() {
        let result = run(&line(5), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let middle = &result.records[2];
        assert_eq!(middle.statistic, 0.0);
        assert_eq!(middle.p_sim, Some(1.0));
        assert!(!middle.significant);
        assert_eq!(middle.label, ClusterLabel::Undefined);
    }

    #[test]
    fn mean_valued_area_with_a_nonzero_lag_is_not_significant() {
        let ids = (1..=5).map(|i| AreaId::new(i.to_string())).collect();
        let w = SpatialWeights::from_adjacency(ids, vec![(0, 1), (2, 3), (2, 4), (3, 4)]).unwrap();
        let result = run(&w, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let centered = &result.records[2];
        assert_eq!(centered.value, 0.0);
        assert!(centered.lag > 0.0);
        assert_eq!(centered.statistic, 0.0);
        assert_eq!(centered.p_sim, Some(1.0));
        assert!(!centered.significant);
        assert_eq!(centered.label, ClusterLabel::NotSignificant);
    }

    #[test]
    fn corners_of_a_gradient_are_significant_clusters() {
        let w = lattice(7);
        let result = run(&w, &diagonal_gradient(7));
        let low = &result.records[0];
        let high = &result.records[48];
        assert_eq!(low.label, ClusterLabel::LowLow, "p = {:?}", low.p_sim);
        assert_eq!(high.label, ClusterLabel::HighHigh, "p = {:?}", high.p_sim);
        assert!(result.outliers().is_empty());
    }

    #[test]
    fn islands_get_zero_lag_and_no_p_value() {
        let ids = (1..=4).map(|i| AreaId::new(i.to_string())).collect();
        let w = SpatialWeights::from_adjacency(ids, vec![(0, 1), (1, 2)]).unwrap();
        let result = run(&w, &[1.0, 2.0, 3.0, 10.0]);
        let island = &result.records[3];
        assert_eq!(island.lag, 0.0);
        assert_eq!(island.statistic, 0.0);
        assert!(island.statistic.is_finite());
        assert_eq!(island.p_sim, None);
        assert!(!island.significant);
        assert_eq!(island.label, ClusterLabel::Undefined);
        assert_eq!(result.islands(), vec![&AreaId::new("4")]);
    }

    #[test]
    fn p_values_are_reproducible() {
        let w = lattice(5);
        let values = diagonal_gradient(5);
        let first = run(&w, &values);
        let second = run(&w, &values);
        assert_eq!(first, second);

        let reseeded = local_moran(
            &w,
            Series::new("calls", &values),
            &AnalysisConfig {
                seed: 7,
                ..AnalysisConfig::default()
            },
            &null_progress(),
        )
        .unwrap();
        assert_ne!(
            first.records.iter().map(|r| r.p_sim).collect::<Vec<_>>(),
            reseeded.records.iter().map(|r| r.p_sim).collect::<Vec<_>>()
        );
    }

    #[test]
    fn bivariate_with_itself_matches_univariate() {
        let w = lattice(5);
        let values = diagonal_gradient(5);
        let series = Series::new("calls", &values);
        let config = AnalysisConfig::default();
        let uni = local_moran(&w, series, &config, &null_progress()).unwrap();
        let bi = bivariate_local_moran(&w, series, series, &config, &null_progress()).unwrap();
        assert_eq!(uni.records, bi.records);
        assert_eq!(bi.linked_variable.as_deref(), Some("calls"));
    }

    #[test]
    fn opposing_gradients_are_outliers() {
        let w = lattice(7);
        let need = diagonal_gradient(7);
        let calls: Vec<f64> = need.iter().map(|v| 12.0 - v).collect();
        let result = bivariate_local_moran(
            &w,
            Series::new("poverty", &need),
            Series::new("calls", &calls),
            &AnalysisConfig::default(),
            &null_progress(),
        )
        .unwrap();
        assert_eq!(result.records[0].label, ClusterLabel::LowHigh);
        assert_eq!(result.records[48].label, ClusterLabel::HighLow);
        let outliers: Vec<&str> = result.outliers().iter().map(|r| r.area_id.as_str()).collect();
        assert!(outliers.contains(&"000") && outliers.contains(&"048"), "{outliers:?}");
    }

    #[test]
    fn significance_threshold_is_validated() {
        let err = local_moran(
            &line(5),
            Series::new("calls", &[1.0, 2.0, 3.0, 4.0, 5.0]),
            &AnalysisConfig {
                significance: 1.5,
                ..AnalysisConfig::default()
            },
            &null_progress(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)), "{err}");
    }
}
