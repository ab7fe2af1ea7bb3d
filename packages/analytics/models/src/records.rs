//! Result records of the spatial statistics.

use std::collections::BTreeMap;

use need_map_geography_models::AreaId;
use serde::{Deserialize, Serialize};

use crate::{ClusterLabel, Quadrant};

/// Inference for global Moran's I under the normality assumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalInference {
    /// Variance of I under normality.
    pub variance: f64,
    /// Standardized deviation of the observed I from its expectation.
    pub z_score: f64,
    /// Two-sided p-value from the standard normal.
    pub p_value: f64,
}

/// Summary of a permutation reference distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    /// Number of permutations drawn.
    pub permutations: u32,
    /// Master seed the permutations were derived from.
    pub seed: u64,
    /// Folded pseudo p-value `(extreme + 1) / (permutations + 1)`.
    pub p_sim: f64,
    /// Mean of the simulated statistics.
    pub mean: f64,
    /// Standard deviation of the simulated statistics.
    pub std_dev: f64,
    /// Observed statistic standardized by the simulated distribution;
    /// `None` when every permutation produced the same value.
    pub z_score: Option<f64>,
}

/// Global Moran's I for one variable, or bivariate Moran's I for a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMoranResult {
    /// Variable at each area.
    pub variable: String,
    /// Variable whose spatial lag is compared, for the bivariate form.
    pub linked_variable: Option<String>,
    /// Number of areas in the graph.
    pub areas: usize,
    /// Observed statistic.
    pub statistic: f64,
    /// Expected value under spatial randomness, `-1 / (n - 1)`.
    pub expected: f64,
    /// Analytical inference; univariate only.
    pub normal: Option<NormalInference>,
    /// Permutation inference.
    pub simulation: SimulationSummary,
}

/// One area's local (or bivariate local) Moran statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    /// Area identifier.
    pub area_id: AreaId,
    /// Standardized focal value.
    pub value: f64,
    /// Spatial lag of the (standardized) linked values.
    pub lag: f64,
    /// `value * lag`.
    pub statistic: f64,
    /// Scatterplot quadrant, if defined.
    pub quadrant: Option<Quadrant>,
    /// Conditional permutation pseudo p-value; `None` for islands.
    pub p_sim: Option<f64>,
    /// Whether `p_sim` is below the significance threshold.
    pub significant: bool,
    /// Final label.
    pub label: ClusterLabel,
}

/// Local statistics for every area of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalResult {
    /// Focal variable.
    pub variable: String,
    /// Linked variable, for the bivariate form.
    pub linked_variable: Option<String>,
    /// Permutations per area.
    pub permutations: u32,
    /// Master seed.
    pub seed: u64,
    /// Significance threshold applied.
    pub significance: f64,
    /// One record per area, in graph order.
    pub records: Vec<LocalRecord>,
}

impl LocalResult {
    /// Final label per area.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<AreaId, ClusterLabel> {
        self.records
            .iter()
            .map(|r| (r.area_id.clone(), r.label))
            .collect()
    }

    /// Number of areas per label.
    #[must_use]
    pub fn label_counts(&self) -> BTreeMap<ClusterLabel, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.label).or_insert(0) += 1;
        }
        counts
    }

    /// Significant spatial outliers (LH and HL), in area order.
    #[must_use]
    pub fn outliers(&self) -> Vec<&LocalRecord> {
        self.records
            .iter()
            .filter(|r| r.significant && r.quadrant.is_some_and(Quadrant::is_outlier))
            .collect()
    }

    /// Areas with no neighbor context (no p-value).
    #[must_use]
    pub fn islands(&self) -> Vec<&AreaId> {
        self.records
            .iter()
            .filter(|r| r.p_sim.is_none())
            .map(|r| &r.area_id)
            .collect()
    }
}

/// Spearman rank correlation between two variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpearmanResult {
    /// First variable.
    pub x_variable: String,
    /// Second variable.
    pub y_variable: String,
    /// Number of paired observations.
    pub areas: usize,
    /// Rank correlation coefficient.
    pub rho: f64,
    /// Two-sided permutation p-value.
    pub p_sim: f64,
    /// Permutations drawn.
    pub permutations: u32,
    /// Master seed.
    pub seed: u64,
}

/// Everything dropped or substituted on the way to the results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionReport {
    /// Areas outside the requested subset.
    pub outside_subset: usize,
    /// Areas dropped for missing attribute values (exclude policy).
    pub missing_attribute: Vec<AreaId>,
    /// Areas with no boundary.
    pub missing_geometry: Vec<AreaId>,
    /// Areas with an unusable boundary.
    pub invalid_geometry: Vec<AreaId>,
    /// Boundaries with no matching area.
    pub unmatched_geometry: Vec<AreaId>,
    /// Areas in the graph without neighbors.
    pub islands: Vec<AreaId>,
    /// Number of filled values per attribute (fill policy).
    pub filled_values: BTreeMap<String, usize>,
}

impl ExclusionReport {
    /// Number of table areas that did not make it into the graph.
    #[must_use]
    pub fn excluded_areas(&self) -> usize {
        self.outside_subset
            + self.missing_attribute.len()
            + self.missing_geometry.len()
            + self.invalid_geometry.len()
    }
}
