//! Structured lifecycle events for recommendations and build runs.
//!
//! Every event carries an `event` field (`run.started`, `stage.entered`, ...)
//! so log pipelines can filter on it. Verbosity follows `RUST_LOG`; set
//! `OPFORGE_LOG_FORMAT=json` for JSON lines.

use tracing::{info, warn};

/// RAII guard that keeps a run-scoped span entered.
///
/// ```ignore
/// let _span = RunSpan::enter("3f2a...");
/// // everything logged here carries run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// The run-scoped span, unentered. Use with `Instrument` across `.await`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("opforge.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, destination: &str, config_digest: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        destination = %destination,
        config_digest = %config_digest,
    );
}

pub fn emit_stage_entered(run_id: &str, stage: &str, percent: u8) {
    info!(event = "stage.entered", run_id = %run_id, stage = %stage, percent = percent);
}

pub fn emit_stage_log(run_id: &str, stage: &str, line: &str) {
    info!(event = "stage.log", run_id = %run_id, stage = %stage, line = %line);
}

/// `outcome` is the terminal state name.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, outcome: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        outcome = %outcome,
    );
}

/// Run ended in failure (warning level).
pub fn emit_run_failed(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, stage = %stage, error = %error);
}

pub fn emit_recommendation(kind: &str, count: usize, detail: &str) {
    info!(event = "recommendation.computed", kind = %kind, count = count, detail = %detail);
}
