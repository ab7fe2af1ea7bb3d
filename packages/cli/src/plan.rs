//! Run plan: which statistics to compute over which variables.
//!
//! Read from a TOML file. Every section is optional; an empty plan
//! prepares the area set and graph and writes only the exclusion report.

use std::collections::BTreeSet;
use std::path::Path;

use need_map_analytics::SessionOptions;
use need_map_analytics_models::{AnalysisConfig, CategoryGrid};
use need_map_geography_models::{AreaId, DerivedAttribute, MissingValuePolicy};
use need_map_spatial::Contiguity;
use serde::Deserialize;
use thiserror::Error;

/// Errors in the plan file.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The file could not be read.
    #[error("Failed to read plan {path}: {source}")]
    Io {
        /// Plan path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not a valid plan.
    #[error("Failed to parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    /// A cross-tabulation names a labeling the plan does not produce.
    #[error("Cross-tabulation {crosstab} refers to {labeling}, which the plan does not compute")]
    UnknownLabeling {
        /// Cross-tabulation name.
        crosstab: String,
        /// Referenced labeling.
        labeling: String,
    },

    /// Alignment was requested for a labeling that has no cluster labels.
    #[error("Cross-tabulation {0} requests alignment, which needs LISA labels on both sides")]
    AlignmentNeedsClusters(String),
}

/// How to read the input files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSettings {
    /// Area id column in the attribute CSV.
    pub id_column: String,
    /// Zero-pad numeric ids to this width (5 for ZIP codes).
    pub id_width: Option<usize>,
    /// Feature property holding the area id in the boundary `GeoJSON`.
    pub boundary_id_property: String,
}

impl InputSettings {
    /// Normalizes a raw id cell; `None` if it is empty or, with a fixed
    /// width, not a number that fits.
    #[must_use]
    pub fn area_id(&self, raw: &str) -> Option<AreaId> {
        match self.id_width {
            Some(width) => AreaId::zero_padded(raw, width),
            None if raw.trim().is_empty() => None,
            None => Some(AreaId::new(raw.trim())),
        }
    }
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            id_column: "zip".to_string(),
            id_width: Some(5),
            boundary_id_property: "ZCTA5CE10".to_string(),
        }
    }
}

/// Two variables analysed together.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariablePair {
    /// Focal (x) variable.
    pub x: String,
    /// Linked (y) variable.
    pub y: String,
    /// Output name; defaults to `{x}_{y}`.
    pub name: Option<String>,
}

impl VariablePair {
    /// Output name of the pair.
    #[must_use]
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.x, self.y))
    }
}

/// A quantile-grid classification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantileSpec {
    /// Variable on the x axis.
    pub x: String,
    /// Variable on the y axis.
    pub y: String,
    /// Output name; defaults to `{x}_{y}`.
    pub name: Option<String>,
    /// Category table; defaults to the built-in grid for the bin count.
    pub categories: Option<CategoryGrid>,
}

impl QuantileSpec {
    /// Output name of the classification.
    #[must_use]
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.x, self.y))
    }
}

/// A per-area labeling produced by the plan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelingRef {
    /// LISA labels of a univariate variable.
    Local {
        /// Variable name.
        variable: String,
    },
    /// Bivariate LISA labels of a named pair.
    Bivariate {
        /// Pair name.
        name: String,
    },
    /// Quantile-grid categories of a named classification.
    Quantile {
        /// Classification name.
        name: String,
    },
}

impl LabelingRef {
    /// Whether the labels are cluster labels.
    #[must_use]
    pub const fn is_cluster(&self) -> bool {
        !matches!(self, Self::Quantile { .. })
    }
}

impl std::fmt::Display for LabelingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { variable } => write!(f, "local {variable}"),
            Self::Bivariate { name } => write!(f, "bivariate {name}"),
            Self::Quantile { name } => write!(f, "quantile {name}"),
        }
    }
}

/// Cross-tabulation of two labelings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrossTabSpec {
    /// Output name.
    pub name: String,
    /// Labeling on the rows (the need side for alignment).
    pub rows: LabelingRef,
    /// Labeling on the columns (the demand side for alignment).
    pub columns: LabelingRef,
    /// Also classify need/demand alignment per area.
    #[serde(default)]
    pub alignment: bool,
}

/// Everything one batch run computes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunPlan {
    /// Input file settings.
    pub input: InputSettings,
    /// Statistic parameters.
    pub analysis: AnalysisConfig,
    /// Missing-value policy.
    pub missing: MissingValuePolicy,
    /// Neighbor rule.
    pub contiguity: Contiguity,
    /// Restrict the run to these area ids.
    pub areas_subset: Option<Vec<String>>,
    /// Attributes derived before the run.
    pub derived: Vec<DerivedAttribute>,
    /// Variables that get global and local Moran's I.
    pub univariate: Vec<String>,
    /// Pairs that get global and local bivariate Moran's I.
    pub bivariate: Vec<VariablePair>,
    /// Quantile-grid classifications.
    pub quantile: Vec<QuantileSpec>,
    /// Spearman correlations.
    pub correlation: Vec<VariablePair>,
    /// Cross-tabulations of the labelings above.
    pub crosstab: Vec<CrossTabSpec>,
}

impl RunPlan {
    /// Reads a plan file, or returns the empty plan when no path is given.
    ///
    /// # Errors
    ///
    /// * [`PlanError::Io`] / [`PlanError::Parse`] for unreadable files.
    /// * Any error from [`Self::check`].
    pub fn load(path: Option<&Path>) -> Result<Self, PlanError> {
        let Some(path) = path else {
            log::warn!("No plan given; only the area set and graph will be prepared");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let plan: Self = toml::from_str(&text)?;
        plan.check()?;
        Ok(plan)
    }

    /// Checks that every cross-tabulation refers to a computed labeling.
    ///
    /// # Errors
    ///
    /// * [`PlanError::UnknownLabeling`] or
    ///   [`PlanError::AlignmentNeedsClusters`].
    pub fn check(&self) -> Result<(), PlanError> {
        for table in &self.crosstab {
            for labeling in [&table.rows, &table.columns] {
                let known = match labeling {
                    LabelingRef::Local { variable } => self.univariate.contains(variable),
                    LabelingRef::Bivariate { name } => {
                        self.bivariate.iter().any(|p| &p.name() == name)
                    }
                    LabelingRef::Quantile { name } => {
                        self.quantile.iter().any(|q| &q.name() == name)
                    }
                };
                if !known {
                    return Err(PlanError::UnknownLabeling {
                        crosstab: table.name.clone(),
                        labeling: labeling.to_string(),
                    });
                }
            }
            if table.alignment && !(table.rows.is_cluster() && table.columns.is_cluster()) {
                return Err(PlanError::AlignmentNeedsClusters(table.name.clone()));
            }
        }
        Ok(())
    }

    /// Every variable a statistic reads, in first-use order.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        let pairs = self
            .bivariate
            .iter()
            .flat_map(|p| [&p.x, &p.y])
            .chain(self.quantile.iter().flat_map(|q| [&q.x, &q.y]))
            .chain(self.correlation.iter().flat_map(|p| [&p.x, &p.y]));

        let mut seen = BTreeSet::new();
        self.univariate
            .iter()
            .chain(pairs)
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }

    /// Number of analysis steps, for the overall progress bar.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        let steps = 2 * self.univariate.len()
            + 2 * self.bivariate.len()
            + self.quantile.len()
            + self.correlation.len()
            + self.crosstab.len();
        steps as u64
    }

    /// Preparation options for the analysis session.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            variables: self.variables(),
            derived: self.derived.clone(),
            subset: self.areas_subset.as_ref().map(|ids| {
                ids.iter()
                    .filter_map(|raw| {
                        let id = self.input.area_id(raw);
                        if id.is_none() {
                            log::warn!("Ignoring malformed subset id {raw:?}");
                        }
                        id
                    })
                    .collect::<BTreeSet<AreaId>>()
            }),
            missing: self.missing,
            contiguity: self.contiguity,
            config: self.analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
univariate = ["calls_per_1000", "poverty_rate"]
areas_subset = ["78201", "78202", "8203", "7820x"]

[analysis]
permutations = 499
seed = 7

[missing]
policy = "exclude"

[[derived]]
name = "alice_rate"
op = "difference"
minuend = "below_alice_rate"
subtrahend = "poverty_rate"

[[bivariate]]
x = "poverty_rate"
y = "calls_per_1000"
name = "poverty_calls"

[[quantile]]
x = "alice_rate"
y = "calls_per_1000"
name = "alice_calls"

[[correlation]]
x = "poverty_rate"
y = "calls_per_1000"

[[crosstab]]
name = "poverty_vs_calls"
rows = { kind = "local", variable = "poverty_rate" }
columns = { kind = "local", variable = "calls_per_1000" }
alignment = true
"#;

    #[test]
    fn parses_a_full_plan() {
        let plan: RunPlan = toml::from_str(PLAN).unwrap();
        plan.check().unwrap();
        assert_eq!(plan.analysis.permutations, 499);
        assert!((plan.analysis.significance - 0.05).abs() < f64::EPSILON);
        assert_eq!(plan.missing, MissingValuePolicy::Exclude);
        assert_eq!(plan.contiguity, Contiguity::Queen);
        assert_eq!(plan.input.id_column, "zip");
        assert_eq!(plan.bivariate[0].name(), "poverty_calls");
        assert_eq!(plan.correlation[0].name(), "poverty_rate_calls_per_1000");
        assert_eq!(plan.step_count(), 4 + 2 + 1 + 1 + 1);
    }

    #[test]
    fn variables_are_deduplicated_in_first_use_order() {
        let plan: RunPlan = toml::from_str(PLAN).unwrap();
        assert_eq!(
            plan.variables(),
            vec!["calls_per_1000", "poverty_rate", "alice_rate"]
        );
    }

    #[test]
    fn subset_ids_are_zero_padded() {
        let plan: RunPlan = toml::from_str(PLAN).unwrap();
        let subset = plan.session_options().subset.unwrap();
        assert!(subset.contains(&AreaId::new("08203")));
        assert_eq!(subset.len(), 3);
    }

    #[test]
    fn free_form_ids_are_trimmed() {
        let settings = InputSettings {
            id_width: None,
            ..InputSettings::default()
        };
        assert_eq!(settings.area_id(" tract-7 "), Some(AreaId::new("tract-7")));
        assert_eq!(settings.area_id("  "), None);
    }

    #[test]
    fn unknown_crosstab_labeling_is_rejected() {
        let plan: RunPlan = toml::from_str(
            r#"
univariate = ["calls"]

[[crosstab]]
name = "t"
rows = { kind = "local", variable = "calls" }
columns = { kind = "quantile", name = "missing" }
"#,
        )
        .unwrap();
        let err = plan.check().unwrap_err();
        assert!(matches!(err, PlanError::UnknownLabeling { .. }), "{err}");
    }

    #[test]
    fn alignment_needs_cluster_labels() {
        let plan: RunPlan = toml::from_str(
            r#"
univariate = ["calls"]

[[quantile]]
x = "poverty"
y = "calls"

[[crosstab]]
name = "t"
rows = { kind = "quantile", name = "poverty_calls" }
columns = { kind = "local", variable = "calls" }
alignment = true
"#,
        )
        .unwrap();
        let err = plan.check().unwrap_err();
        assert!(matches!(err, PlanError::AlignmentNeedsClusters(_)), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<RunPlan>("univarite = [\"calls\"]").is_err());
    }
}
