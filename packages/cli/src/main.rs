#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch driver for the need map spatial analysis.
//!
//! Joins an area attribute CSV to area boundaries, builds the contiguity
//! graph and runs the statistics named in a TOML run plan, writing one
//! result file per statistic.
//!
//! Uses `indicatif-log-bridge` (via [`need_map_cli_utils::init_logger`])
//! so log lines and permutation progress bars share the terminal.

mod input;
mod output;
mod pipeline;
mod plan;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::InputPaths;
use crate::plan::RunPlan;

#[derive(Parser)]
#[command(name = "need_map_cli", about = "Spatial analysis of community need and call demand")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every statistic in the plan and write the results
    Run {
        #[command(flatten)]
        inputs: InputArgs,

        /// Directory for result files
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Prepare the area set and graph and report exclusions only
    Check {
        #[command(flatten)]
        inputs: InputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Area attribute CSV
    #[arg(long)]
    areas: PathBuf,

    /// Area boundary `GeoJSON`
    #[arg(long)]
    boundaries: PathBuf,

    /// Run plan (TOML)
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Override the number of permutations
    #[arg(long)]
    permutations: Option<u32>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the significance threshold
    #[arg(long)]
    significance: Option<f64>,

    /// Override the number of quantile bins
    #[arg(long)]
    bins: Option<usize>,
}

impl InputArgs {
    fn load_plan(&self) -> Result<RunPlan, plan::PlanError> {
        let mut plan = RunPlan::load(self.plan.as_deref())?;
        let analysis = &mut plan.analysis;
        if let Some(permutations) = self.permutations {
            analysis.permutations = permutations;
        }
        if let Some(seed) = self.seed {
            analysis.seed = seed;
        }
        if let Some(significance) = self.significance {
            analysis.significance = significance;
        }
        if let Some(bins) = self.bins {
            analysis.quantile_bins = bins;
        }
        Ok(plan)
    }

    fn paths(&self) -> InputPaths<'_> {
        InputPaths {
            areas: &self.areas,
            boundaries: &self.boundaries,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = need_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { inputs, out } => {
            let plan = inputs.load_plan()?;
            pipeline::run(&plan, inputs.paths(), &out, &multi)?;
        }
        Commands::Check { inputs } => {
            let plan = inputs.load_plan()?;
            let (table, boundaries) = pipeline::load_inputs(&plan, inputs.paths())?;
            let session = pipeline::prepare(&plan, &table, &boundaries)?;
            let weights = session.weights();
            let exclusions = session.exclusions();

            println!(
                "{} of {} area(s) in the {} graph, {:.2} mean neighbors",
                weights.len(),
                table.len(),
                plan.contiguity,
                weights.mean_cardinality()
            );
            println!("  outside subset:     {}", exclusions.outside_subset);
            println!("  missing attributes: {}", exclusions.missing_attribute.len());
            println!("  missing geometry:   {}", exclusions.missing_geometry.len());
            println!("  invalid geometry:   {}", exclusions.invalid_geometry.len());
            println!("  unmatched geometry: {}", exclusions.unmatched_geometry.len());
            println!("  islands:            {}", exclusions.islands.len());
            for (variable, filled) in &exclusions.filled_values {
                println!("  filled {variable}: {filled}");
            }
        }
    }

    Ok(())
}
