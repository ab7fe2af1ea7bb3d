//! Bivariate quantile classification.

use need_map_analytics_models::{CategoryGrid, QuantileClass, QuantileGrid};
use need_map_geography_models::AreaId;

use crate::config::validate_bins;
use crate::{AnalyticsError, Series};

/// Equal-frequency bin (1-based) of every value.
///
/// Values are ordered ascending with ties kept in row order, and the
/// value at sorted position `r` goes to bin `r * bins / n + 1`. Every bin
/// therefore holds `⌊n / bins⌋` or `⌈n / bins⌉` values, so no bin can be
/// empty even when many values tie.
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] unless `2 <= bins <= n`.
/// * [`AnalyticsError::DegenerateInput`] if a value is not finite.
pub fn quantile_ranks(series: Series<'_>, bins: usize) -> Result<Vec<usize>, AnalyticsError> {
    series.check_finite()?;
    let n = series.values.len();
    validate_bins(bins, n)?;

    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort: equal values keep their row order.
    order.sort_by(|&a, &b| series.values[a].total_cmp(&series.values[b]));

    let mut ranks = vec![0; n];
    for (position, &row) in order.iter().enumerate() {
        ranks[row] = position * bins / n + 1;
    }
    Ok(ranks)
}

/// Classifies each area by the quantile ranks of `x` and `y` and looks
/// the rank pair up in `categories`.
///
/// `ids`, `x` and `y` are parallel; the bin count is the grid's.
///
/// # Errors
///
/// * [`AnalyticsError::LengthMismatch`] if the three inputs differ in length.
/// * Anything [`quantile_ranks`] returns for either variable.
pub fn quantile_grid(
    ids: &[AreaId],
    x: Series<'_>,
    y: Series<'_>,
    categories: &CategoryGrid,
) -> Result<QuantileGrid, AnalyticsError> {
    for series in [x, y] {
        if series.values.len() != ids.len() {
            return Err(AnalyticsError::LengthMismatch {
                variable: series.name.to_string(),
                expected: ids.len(),
                actual: series.values.len(),
            });
        }
    }

    let bins = categories.bins();
    let rank_x = quantile_ranks(x, bins)?;
    let rank_y = quantile_ranks(y, bins)?;

    let classes = ids
        .iter()
        .zip(rank_x.into_iter().zip(rank_y))
        .map(|(id, (rx, ry))| QuantileClass {
            area_id: id.clone(),
            rank_x: rx,
            rank_y: ry,
            category: categories.label(rx, ry).unwrap_or_default().to_string(),
        })
        .collect();

    let grid = QuantileGrid {
        x_variable: x.name.to_string(),
        y_variable: y.name.to_string(),
        bins,
        classes,
    };
    log::debug!(
        "Classified {} area(s) on a {bins}x{bins} grid of {} by {} (bin sizes {:?} / {:?})",
        ids.len(),
        x.name,
        y.name,
        grid.x_bin_sizes(),
        grid.y_bin_sizes()
    );

    Ok(grid)
}
