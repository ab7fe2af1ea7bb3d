//! Validation of run parameters.

use need_map_analytics_models::{AnalysisConfig, MAX_PERMUTATIONS};

use crate::AnalyticsError;

/// Checks permutation count, significance threshold and bin count.
///
/// The bin count is checked against the number of areas separately, by
/// [`validate_bins`], once that number is known.
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] naming the first invalid parameter.
pub fn validate(config: &AnalysisConfig) -> Result<(), AnalyticsError> {
    validate_permutations(config.permutations)?;
    validate_significance(config.significance)?;
    if config.quantile_bins < 2 {
        return Err(AnalyticsError::Configuration(format!(
            "quantile_bins must be at least 2, got {}",
            config.quantile_bins
        )));
    }
    Ok(())
}

/// Checks a permutation count against `1..=MAX_PERMUTATIONS`.
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] when out of range.
pub fn validate_permutations(permutations: u32) -> Result<(), AnalyticsError> {
    if permutations == 0 || permutations > MAX_PERMUTATIONS {
        return Err(AnalyticsError::Configuration(format!(
            "permutations must be between 1 and {MAX_PERMUTATIONS}, got {permutations}"
        )));
    }
    Ok(())
}

/// Checks that a significance threshold lies strictly inside (0, 1).
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] otherwise (including NaN).
pub fn validate_significance(significance: f64) -> Result<(), AnalyticsError> {
    if !(significance > 0.0 && significance < 1.0) {
        return Err(AnalyticsError::Configuration(format!(
            "significance must be in (0, 1), got {significance}"
        )));
    }
    Ok(())
}

/// Checks a bin count against the number of observations.
///
/// # Errors
///
/// * [`AnalyticsError::Configuration`] unless `2 <= bins <= n`.
pub fn validate_bins(bins: usize, n: usize) -> Result<(), AnalyticsError> {
    if bins < 2 || bins > n {
        return Err(AnalyticsError::Configuration(format!(
            "quantile bins must be between 2 and the number of areas ({n}), got {bins}"
        )));
    }
    Ok(())
}
