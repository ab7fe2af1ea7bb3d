#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial statistics over a contiguity graph.
//!
//! Global and local Moran's I (univariate and bivariate) with seeded
//! permutation inference, the bivariate quantile classifier, Spearman
//! rank correlation and cross-tabulation of per-area labelings.
//!
//! Every engine takes its inputs by reference and returns new records;
//! the [`SpatialWeights`] graph is shared read-only across all of them
//! and across the permutation workers.

pub mod config;
pub mod crosstab;
pub mod global;
pub mod local;
pub mod permutation;
pub mod progress;
pub mod quantile;
pub mod session;
pub mod spearman;
pub mod standardize;

use need_map_geography_models::TableError;
use need_map_spatial::{SpatialError, SpatialWeights};
use thiserror::Error;

pub use crosstab::{alignment, cross_tabulate, cross_tabulate_with};
pub use global::{global_bivariate_moran, global_moran};
pub use local::{bivariate_local_moran, local_moran};
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use quantile::{quantile_grid, quantile_ranks};
pub use session::{AnalysisSession, SessionOptions};
pub use spearman::spearman;

/// Errors that can occur while computing statistics.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Too few observations for the statistic to be defined.
    #[error("Insufficient data: {valid} valid area(s), at least {required} required")]
    InsufficientData {
        /// Observations available.
        valid: usize,
        /// Observations required.
        required: usize,
    },

    /// The input makes the statistic undefined (zero variance, no links).
    #[error("Degenerate input for {variable}: {reason}")]
    DegenerateInput {
        /// Variable the statistic was computed for.
        variable: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// A run parameter is out of range.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value vector does not line up with the graph.
    #[error("Length mismatch for {variable}: expected {expected} values, got {actual}")]
    LengthMismatch {
        /// Variable whose values were supplied.
        variable: String,
        /// Number of areas in the graph.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// Building the graph failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Reading the area table failed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// A named value vector aligned with the nodes of a [`SpatialWeights`].
#[derive(Debug, Clone, Copy)]
pub struct Series<'a> {
    /// Variable name, carried into results and errors.
    pub name: &'a str,
    /// One value per node, in graph order.
    pub values: &'a [f64],
}

impl<'a> Series<'a> {
    /// Pairs a name with its values.
    #[must_use]
    pub const fn new(name: &'a str, values: &'a [f64]) -> Self {
        Self { name, values }
    }

    /// Checks that the series has one finite value per graph node.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::LengthMismatch`] if the lengths differ.
    /// * [`AnalyticsError::DegenerateInput`] if a value is NaN or infinite.
    pub fn check_against(&self, weights: &SpatialWeights) -> Result<(), AnalyticsError> {
        if self.values.len() != weights.len() {
            return Err(AnalyticsError::LengthMismatch {
                variable: self.name.to_string(),
                expected: weights.len(),
                actual: self.values.len(),
            });
        }
        self.check_finite()
    }

    /// Checks that every value is finite.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::DegenerateInput`] naming the first bad position.
    pub fn check_finite(&self) -> Result<(), AnalyticsError> {
        match self.values.iter().position(|v| !v.is_finite()) {
            Some(i) => Err(AnalyticsError::DegenerateInput {
                variable: self.name.to_string(),
                reason: format!("non-finite value at position {i}"),
            }),
            None => Ok(()),
        }
    }
}
