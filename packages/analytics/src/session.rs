//! One analysis run: a prepared area set, its graph and its columns.
//!
//! The graph is built once from the table's areas and reused by every
//! statistic, each of which is parameterized by variable name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use need_map_analytics_models::{
    AnalysisConfig, CategoryGrid, ExclusionReport, GlobalMoranResult, LocalResult, QuantileGrid,
    SpearmanResult,
};
use need_map_geography_models::{
    AreaId, AreaTable, DerivedAttribute, MissingValuePolicy, TableError,
};
use need_map_spatial::{Boundary, Contiguity, SpatialError, SpatialWeights, WeightsBuild};

use crate::progress::ProgressCallback;
use crate::{AnalyticsError, Series, config, global, local, quantile, spearman};

/// How to turn a raw area table into an analysis-ready area set.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Attributes the run will use, derived ones included.
    pub variables: Vec<String>,
    /// Attributes to derive before anything else.
    pub derived: Vec<DerivedAttribute>,
    /// Restrict the run to these areas.
    pub subset: Option<BTreeSet<AreaId>>,
    /// Missing-value handling for `variables`.
    pub missing: MissingValuePolicy,
    /// Neighbor rule for the graph.
    pub contiguity: Contiguity,
    /// Statistic parameters.
    pub config: AnalysisConfig,
}

/// A prepared run. Immutable once built.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    weights: SpatialWeights,
    columns: BTreeMap<String, Vec<f64>>,
    config: AnalysisConfig,
    exclusions: ExclusionReport,
}

impl AnalysisSession {
    /// Derives attributes, applies the subset and missing-value policy,
    /// joins the surviving areas to their boundaries and builds the graph.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::Configuration`] for invalid parameters.
    /// * [`AnalyticsError::Table`] for unknown attributes.
    /// * [`AnalyticsError::InsufficientData`] if fewer than two areas
    ///   survive.
    /// * [`AnalyticsError::Spatial`] for duplicate boundaries.
    pub fn prepare(
        table: &AreaTable,
        boundaries: &[Boundary],
        options: &SessionOptions,
    ) -> Result<Self, AnalyticsError> {
        config::validate(&options.config)?;
        let names: Vec<&str> = options.variables.iter().map(String::as_str).collect();
        let mut exclusions = ExclusionReport::default();

        let table = table.with_derived(&options.derived)?;
        let table = match &options.subset {
            Some(keep) => {
                let kept = table.retain_areas(keep);
                exclusions.outside_subset = table.len() - kept.len();
                log::info!(
                    "Restricted run to {} of {} area(s)",
                    kept.len(),
                    table.len()
                );
                kept
            }
            None => table,
        };
        let table = match options.missing {
            MissingValuePolicy::Exclude => {
                let (complete, dropped) = table.complete_cases(&names)?;
                exclusions.missing_attribute = dropped;
                complete
            }
            MissingValuePolicy::Fill { .. } => table,
        };

        let ids: Vec<AreaId> = table.ids().cloned().collect();
        let WeightsBuild {
            weights,
            exclusions: geometry,
        } = need_map_spatial::build_weights(boundaries, &ids, options.contiguity).map_err(
            |e| match e {
                SpatialError::InsufficientData { valid } => {
                    AnalyticsError::InsufficientData { valid, required: 2 }
                }
                other => other.into(),
            },
        )?;
        exclusions.missing_geometry = geometry.missing_geometry;
        exclusions.invalid_geometry = geometry.invalid_geometry;
        exclusions.unmatched_geometry = geometry.unmatched_geometry;
        exclusions.islands = weights
            .islands()
            .into_iter()
            .map(|i| weights.id(i).clone())
            .collect();

        let mut columns = BTreeMap::new();
        for name in names {
            let column = table.column(weights.ids(), name, options.missing)?;
            if !column.filled.is_empty() {
                log::warn!(
                    "{} area(s) have no {name} value and were filled",
                    column.filled.len()
                );
                exclusions
                    .filled_values
                    .insert(name.to_string(), column.filled.len());
            }
            columns.insert(column.name, column.values);
        }

        log::info!(
            "Prepared {} area(s) with {} variable(s); {} excluded",
            weights.len(),
            columns.len(),
            exclusions.excluded_areas()
        );

        Ok(Self {
            weights,
            columns,
            config: options.config,
            exclusions,
        })
    }

    /// The contiguity graph.
    #[must_use]
    pub const fn weights(&self) -> &SpatialWeights {
        &self.weights
    }

    /// Area ids in graph order.
    #[must_use]
    pub fn area_ids(&self) -> &[AreaId] {
        self.weights.ids()
    }

    /// Statistic parameters.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// What was dropped or filled while preparing the run.
    #[must_use]
    pub const fn exclusions(&self) -> &ExclusionReport {
        &self.exclusions
    }

    /// Values of a prepared variable, in graph order.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::Table`] if the variable was not prepared.
    pub fn series(&self, name: &str) -> Result<Series<'_>, AnalyticsError> {
        self.columns
            .get_key_value(name)
            .map(|(name, values)| Series::new(name, values))
            .ok_or_else(|| TableError::UnknownAttribute(name.to_string()).into())
    }

    /// Global Moran's I of `variable`.
    ///
    /// # Errors
    ///
    /// See [`global::global_moran`].
    pub fn global(
        &self,
        variable: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<GlobalMoranResult, AnalyticsError> {
        global::global_moran(&self.weights, self.series(variable)?, &self.config, progress)
    }

    /// Global bivariate Moran's I of `x` against the lag of `y`.
    ///
    /// # Errors
    ///
    /// See [`global::global_bivariate_moran`].
    pub fn global_bivariate(
        &self,
        x: &str,
        y: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<GlobalMoranResult, AnalyticsError> {
        global::global_bivariate_moran(
            &self.weights,
            self.series(x)?,
            self.series(y)?,
            &self.config,
            progress,
        )
    }

    /// Local Moran's I of `variable`.
    ///
    /// # Errors
    ///
    /// See [`local::local_moran`].
    pub fn local(
        &self,
        variable: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<LocalResult, AnalyticsError> {
        local::local_moran(&self.weights, self.series(variable)?, &self.config, progress)
    }

    /// Bivariate Local Moran's I of `x` against the lag of `y`.
    ///
    /// # Errors
    ///
    /// See [`local::bivariate_local_moran`].
    pub fn bivariate_local(
        &self,
        x: &str,
        y: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<LocalResult, AnalyticsError> {
        local::bivariate_local_moran(
            &self.weights,
            self.series(x)?,
            self.series(y)?,
            &self.config,
            progress,
        )
    }

    /// Quantile-grid classification of `x` by `y`.
    ///
    /// Without a caller grid, four bins use the need-vs-demand quartile
    /// categories and any other count labels cells by rank pair.
    ///
    /// # Errors
    ///
    /// See [`quantile::quantile_grid`].
    pub fn quantiles(
        &self,
        x: &str,
        y: &str,
        categories: Option<&CategoryGrid>,
    ) -> Result<QuantileGrid, AnalyticsError> {
        let bins = self.config.quantile_bins;
        let fallback;
        let categories = match categories {
            Some(grid) => grid,
            None => {
                config::validate_bins(bins, self.weights.len())?;
                fallback = if bins == 4 {
                    CategoryGrid::need_vs_demand_quartiles()
                } else {
                    CategoryGrid::rank_pairs(bins)
                };
                &fallback
            }
        };
        quantile::quantile_grid(self.area_ids(), self.series(x)?, self.series(y)?, categories)
    }

    /// Spearman rank correlation of `x` and `y`.
    ///
    /// # Errors
    ///
    /// See [`spearman::spearman`].
    pub fn spearman(
        &self,
        x: &str,
        y: &str,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<SpearmanResult, AnalyticsError> {
        spearman::spearman(self.series(x)?, self.series(y)?, &self.config, progress)
    }
}
