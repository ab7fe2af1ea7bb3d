#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration and result types for the need/demand spatial analysis.
//!
//! Everything here is plain data: the analysis parameters, the per-area
//! and global result records, the cluster and quadrant labels, the
//! quantile category grid and the cross-tabulation table. The engines
//! that produce these live in `need_map_analytics`.

pub mod crosstab;
pub mod grid;
pub mod labels;
pub mod records;

use serde::{Deserialize, Serialize};

pub use crosstab::CrossTab;
pub use grid::{CategoryGrid, QuantileClass, QuantileGrid};
pub use labels::{Alignment, ClusterLabel, Quadrant};
pub use records::{
    ExclusionReport, GlobalMoranResult, LocalRecord, LocalResult, NormalInference,
    SimulationSummary, SpearmanResult,
};

/// Default number of permutations per test.
pub const DEFAULT_PERMUTATIONS: u32 = 999;

/// Default master seed.
pub const DEFAULT_SEED: u64 = 42;

/// Default pseudo p-value threshold.
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

/// Default number of quantile bins per axis.
pub const DEFAULT_QUANTILE_BINS: usize = 4;

/// Upper bound on permutations per test.
pub const MAX_PERMUTATIONS: u32 = 99_999;

/// Parameters shared by every statistic in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Permutations per permutation test.
    pub permutations: u32,
    /// Master seed; every test and worker derives its own stream from it.
    pub seed: u64,
    /// Significance threshold for local labels.
    pub significance: f64,
    /// Bins per axis for the quantile grid.
    pub quantile_bins: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            permutations: DEFAULT_PERMUTATIONS,
            seed: DEFAULT_SEED,
            significance: DEFAULT_SIGNIFICANCE,
            quantile_bins: DEFAULT_QUANTILE_BINS,
        }
    }
}
