//! Centering and standardization of attribute values.

use crate::{AnalyticsError, Series};

/// Arithmetic mean. Zero for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divisor `n`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Deviations from the mean, `z_i = y_i - mean(y)`.
///
/// # Errors
///
/// * [`AnalyticsError::DegenerateInput`] if every value is identical,
///   since the deviations are then all zero.
pub fn deviations(series: Series<'_>) -> Result<Vec<f64>, AnalyticsError> {
    ensure_variation(series)?;
    let m = mean(series.values);
    let z: Vec<f64> = series.values.iter().map(|v| v - m).collect();
    if z.iter().all(|&d| d == 0.0) {
        return Err(zero_variance(series.name));
    }
    Ok(z)
}

/// Standardized values, `(y_i - mean(y)) / sd(y)` with the population
/// standard deviation.
///
/// # Errors
///
/// * [`AnalyticsError::DegenerateInput`] if every value is identical.
pub fn standardize(series: Series<'_>) -> Result<Vec<f64>, AnalyticsError> {
    let z = deviations(series)?;
    let sd = population_std(series.values);
    if sd == 0.0 || !sd.is_finite() {
        return Err(zero_variance(series.name));
    }
    Ok(z.into_iter().map(|d| d / sd).collect())
}

fn ensure_variation(series: Series<'_>) -> Result<(), AnalyticsError> {
    match series.values.split_first() {
        Some((first, rest)) if rest.iter().any(|v| v != first) => Ok(()),
        _ => Err(zero_variance(series.name)),
    }
}

fn zero_variance(variable: &str) -> AnalyticsError {
    AnalyticsError::DegenerateInput {
        variable: variable.to_string(),
        reason: "all values are identical (zero variance)".to_string(),
    }
}
