//! Batch analysis pipeline.
//!
//! Reads the inputs, prepares one [`AnalysisSession`] and runs every
//! statistic the plan asks for against it, then writes the results to
//! the output directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use need_map_analytics::{
    AnalysisSession, AnalyticsError, ProgressCallback, alignment, cross_tabulate_with,
};
use need_map_analytics_models::{
    Alignment, ClusterLabel, CrossTab, ExclusionReport, GlobalMoranResult, LocalResult,
    QuantileGrid, SpearmanResult,
};
use need_map_cli_utils::{IndicatifProgress, MultiProgress};
use need_map_geography_models::{AreaId, AreaTable};
use need_map_spatial::BoundaryLoad;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::input::{self, InputError};
use crate::output::{self, ExclusionSummary, GlobalSummary, OutputError};
use crate::plan::{LabelingRef, PlanError, RunPlan};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The plan is invalid.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// An input file could not be read.
    #[error(transparent)]
    Input(#[from] InputError),

    /// A statistic failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// A result file could not be written.
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Input file locations.
#[derive(Debug, Clone, Copy)]
pub struct InputPaths<'a> {
    /// Attribute CSV.
    pub areas: &'a Path,
    /// Boundary `GeoJSON`.
    pub boundaries: &'a Path,
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct Outputs {
    /// What was dropped or filled while preparing the run.
    pub exclusions: ExclusionReport,
    /// Boundary features with an id but no polygon.
    pub unreadable_boundaries: Vec<AreaId>,
    /// Boundary features without an id.
    pub unidentified_features: usize,
    /// Global Moran's I, univariate then bivariate, in plan order.
    pub global: Vec<GlobalMoranResult>,
    /// LISA per univariate variable.
    pub local: BTreeMap<String, LocalResult>,
    /// Bivariate LISA per named pair.
    pub bivariate: BTreeMap<String, LocalResult>,
    /// Quantile grids per named classification.
    pub quantile: BTreeMap<String, QuantileGrid>,
    /// Spearman correlations, in plan order.
    pub correlation: Vec<SpearmanResult>,
    /// Cross-tabulations by name.
    pub crosstab: BTreeMap<String, CrossTab>,
    /// Need/demand alignment by cross-tabulation name.
    pub alignment: BTreeMap<String, BTreeMap<AreaId, Alignment>>,
}

/// Reads both input files.
///
/// # Errors
///
/// * [`PipelineError::Input`] if either file is unreadable.
pub fn load_inputs(
    plan: &RunPlan,
    paths: InputPaths<'_>,
) -> Result<(AreaTable, BoundaryLoad), PipelineError> {
    let table = input::read_area_table(paths.areas, &plan.input)?;
    let boundaries = input::read_boundaries(paths.boundaries, &plan.input)?;
    Ok((table, boundaries))
}

/// Prepares the session: derived attributes, subset, missing values and
/// the contiguity graph.
///
/// # Errors
///
/// * [`PipelineError::Analytics`] if preparation fails.
pub fn prepare(
    plan: &RunPlan,
    table: &AreaTable,
    boundaries: &BoundaryLoad,
) -> Result<AnalysisSession, PipelineError> {
    Ok(AnalysisSession::prepare(
        table,
        &boundaries.boundaries,
        &plan.session_options(),
    )?)
}

/// Runs every statistic in the plan.
///
/// # Errors
///
/// * [`PipelineError::Analytics`] on the first statistic that fails.
pub fn execute(
    plan: &RunPlan,
    session: &AnalysisSession,
    boundaries: &BoundaryLoad,
    multi: &MultiProgress,
) -> Result<Outputs, PipelineError> {
    let steps = IndicatifProgress::steps_bar(multi, "Analyses", plan.step_count());
    let mut outputs = Outputs {
        exclusions: session.exclusions().clone(),
        unreadable_boundaries: boundaries.invalid.clone(),
        unidentified_features: boundaries.unidentified,
        ..Outputs::default()
    };

    for variable in &plan.univariate {
        let result = tracked(multi, &format!("Moran's I: {variable}"), |bar| {
            session.global(variable, bar)
        })?;
        outputs.global.push(result);
        steps.inc(1);

        let result = tracked(multi, &format!("LISA: {variable}"), |bar| {
            session.local(variable, bar)
        })?;
        outputs.local.insert(variable.clone(), result);
        steps.inc(1);
    }

    for pair in &plan.bivariate {
        let name = pair.name();
        let result = tracked(multi, &format!("Bivariate Moran's I: {name}"), |bar| {
            session.global_bivariate(&pair.x, &pair.y, bar)
        })?;
        outputs.global.push(result);
        steps.inc(1);

        let result = tracked(multi, &format!("Bivariate LISA: {name}"), |bar| {
            session.bivariate_local(&pair.x, &pair.y, bar)
        })?;
        outputs.bivariate.insert(name, result);
        steps.inc(1);
    }

    for spec in &plan.quantile {
        let name = spec.name();
        let grid = session.quantiles(&spec.x, &spec.y, spec.categories.as_ref())?;
        log::info!(
            "Quantile grid {name}: {} areas in {}x{} cells",
            grid.classes.len(),
            grid.bins,
            grid.bins
        );
        outputs.quantile.insert(name, grid);
        steps.inc(1);
    }

    for pair in &plan.correlation {
        let result = tracked(multi, &format!("Spearman: {}", pair.name()), |bar| {
            session.spearman(&pair.x, &pair.y, bar)
        })?;
        outputs.correlation.push(result);
        steps.inc(1);
    }

    for spec in &plan.crosstab {
        let (rows, row_order) = labeling(&outputs, &spec.rows)?;
        let (columns, column_order) = labeling(&outputs, &spec.columns)?;
        let table = cross_tabulate_with(
            &spec.rows.to_string(),
            &rows,
            &row_order,
            &spec.columns.to_string(),
            &columns,
            &column_order,
        );
        log::info!(
            "Cross-tabulation {}: {} area(s), {} excluded",
            spec.name,
            table.total(),
            table.excluded()
        );

        if spec.alignment {
            let need = cluster_labels(&outputs, &spec.rows)?;
            let demand = cluster_labels(&outputs, &spec.columns)?;
            let classes = alignment(&need, &demand);
            let underserved = classes
                .values()
                .filter(|&&a| a == Alignment::Underserved)
                .count();
            log::info!(
                "Alignment {}: {underserved} underserved area(s) of {}",
                spec.name,
                classes.len()
            );
            outputs.alignment.insert(spec.name.clone(), classes);
        }

        outputs.crosstab.insert(spec.name.clone(), table);
        steps.inc(1);
    }

    steps.finish("Analyses complete".to_string());
    Ok(outputs)
}

/// Writes every result file into `dir`, creating it if needed.
///
/// # Errors
///
/// * [`PipelineError::Output`] if a file cannot be written.
pub fn write_outputs(outputs: &Outputs, dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    output::to_file(dir, "exclusions.json", |w| {
        output::write_json(
            w,
            &ExclusionSummary {
                report: &outputs.exclusions,
                unreadable_boundaries: &outputs.unreadable_boundaries,
                unidentified_features: outputs.unidentified_features,
            },
        )
    })?;
    output::to_file(dir, "global.json", |w| {
        output::write_json(
            w,
            &GlobalSummary {
                moran: &outputs.global,
                spearman: &outputs.correlation,
            },
        )
    })?;

    for (variable, result) in &outputs.local {
        output::to_file(dir, &format!("local_{variable}.csv"), |w| {
            output::write_local(w, result)
        })?;
    }
    for (name, result) in &outputs.bivariate {
        output::to_file(dir, &format!("bivariate_{name}.csv"), |w| {
            output::write_local(w, result)
        })?;
    }
    for (name, grid) in &outputs.quantile {
        output::to_file(dir, &format!("quantile_{name}.csv"), |w| {
            output::write_quantile(w, grid)
        })?;
        output::to_file(dir, &format!("quantile_{name}_cells.csv"), |w| {
            output::write_quantile_cells(w, grid)
        })?;
    }
    for (name, table) in &outputs.crosstab {
        output::to_file(dir, &format!("crosstab_{name}.csv"), |w| {
            output::write_crosstab(w, table)
        })?;
    }
    for (name, classes) in &outputs.alignment {
        output::to_file(dir, &format!("alignment_{name}.csv"), |w| {
            output::write_alignment(w, classes)
        })?;
    }

    log::info!("Results written to {}", dir.display());
    Ok(())
}

/// Full batch run: read, prepare, analyse and write.
///
/// # Errors
///
/// Returns the first error of any stage.
pub fn run(
    plan: &RunPlan,
    paths: InputPaths<'_>,
    out_dir: &Path,
    multi: &MultiProgress,
) -> Result<(), PipelineError> {
    let (table, boundaries) = load_inputs(plan, paths)?;
    let session = prepare(plan, &table, &boundaries)?;
    let outputs = execute(plan, &session, &boundaries, multi)?;
    write_outputs(&outputs, out_dir)
}

/// Runs `f` against a fresh permutation bar and finishes the bar.
fn tracked<T>(
    multi: &MultiProgress,
    message: &str,
    f: impl FnOnce(&Arc<dyn ProgressCallback>) -> Result<T, AnalyticsError>,
) -> Result<T, AnalyticsError> {
    let bar = IndicatifProgress::permutations_bar(multi, message);
    let result = f(&bar);
    bar.finish(format!("{message}: done"));
    result
}

/// Labels of a labeling as strings, with its display order.
fn labeling(
    outputs: &Outputs,
    reference: &LabelingRef,
) -> Result<(BTreeMap<AreaId, String>, Vec<String>), AnalyticsError> {
    if let Ok(labels) = cluster_labels(outputs, reference) {
        let labels = labels
            .into_iter()
            .map(|(id, label)| (id, label.to_string()))
            .collect();
        let order = ClusterLabel::iter().map(|l| l.to_string()).collect();
        return Ok((labels, order));
    }

    let LabelingRef::Quantile { name } = reference else {
        return Err(unknown(reference));
    };
    let grid = outputs.quantile.get(name).ok_or_else(|| unknown(reference))?;

    let mut by_rank: Vec<_> = grid.classes.iter().collect();
    by_rank.sort_by_key(|c| (c.rank_x, c.rank_y));
    let mut order: Vec<String> = Vec::new();
    for class in by_rank {
        if !order.contains(&class.category) {
            order.push(class.category.clone());
        }
    }
    let labels = grid
        .classes
        .iter()
        .map(|c| (c.area_id.clone(), c.category.clone()))
        .collect();
    Ok((labels, order))
}

fn cluster_labels(
    outputs: &Outputs,
    reference: &LabelingRef,
) -> Result<BTreeMap<AreaId, ClusterLabel>, AnalyticsError> {
    let result = match reference {
        LabelingRef::Local { variable } => outputs.local.get(variable),
        LabelingRef::Bivariate { name } => outputs.bivariate.get(name),
        LabelingRef::Quantile { .. } => None,
    };
    result.map(LocalResult::labels).ok_or_else(|| unknown(reference))
}

fn unknown(reference: &LabelingRef) -> AnalyticsError {
    AnalyticsError::Configuration(format!("no {reference} labels were computed"))
}
