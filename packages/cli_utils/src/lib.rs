#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the need map CLI.
//!
//! [`IndicatifProgress`] reports permutation tests and plan steps through
//! the analytics [`ProgressCallback`] trait. [`init_logger`] routes `log`
//! output through the same [`MultiProgress`] so log lines never tear a
//! bar mid-draw.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use need_map_analytics::ProgressCallback;

pub use indicatif::MultiProgress;

const PERMUTATION_TEMPLATE: &str = "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]";
const STEP_TEMPLATE: &str = "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]";

/// [`ProgressCallback`] backed by an `indicatif` [`ProgressBar`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied when the engine announces its draw or area count.
    sized_style: ProgressStyle,
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

impl IndicatifProgress {
    /// Bar for one permutation test.
    ///
    /// Spins while standardization runs; the global engine then sizes it
    /// by permutations, the local engine by areas.
    #[must_use]
    pub fn permutations_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        Arc::new(Self {
            bar,
            sized_style: bar_style(PERMUTATION_TEMPLATE),
        })
    }

    /// Bar over the analyses of a run plan.
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        let sized_style = bar_style(STEP_TEMPLATE);
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(sized_style.clone());
        bar.set_message(message.to_string());

        Arc::new(Self { bar, sized_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.sized_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge` and returns the [`MultiProgress`] every bar of
/// the run must join.
///
/// A second call keeps the first logger.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_total_sizes_the_spinner() {
        let progress = IndicatifProgress {
            bar: ProgressBar::hidden(),
            sized_style: bar_style(PERMUTATION_TEMPLATE),
        };
        progress.set_total(999);
        progress.inc(400);
        assert_eq!(progress.bar.length(), Some(999));
        assert_eq!(progress.bar.position(), 400);
        progress.finish("999 permutations".to_string());
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn steps_bar_starts_sized() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::steps_bar(&multi, "analyses", 3);
        progress.inc(3);
        progress.finish("3 analyses".to_string());
    }

    #[test]
    fn logger_init_is_idempotent() {
        let _first = init_logger();
        let _second = init_logger();
    }
}
