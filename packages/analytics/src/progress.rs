//! Progress reporting for permutation runs.
//!
//! The engines report through [`ProgressCallback`] so they stay
//! independent of how (or whether) progress is rendered. The CLI plugs
//! in `indicatif` bars; tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running statistic.
///
/// Updates may arrive from several permutation workers at once, so
/// implementations must be `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
