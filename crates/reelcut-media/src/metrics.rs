//! Metrics emitted by media tooling.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const TOOL_RUNS_TOTAL: &str = "reelcut_tool_runs_total";
    pub const TOOL_RETRIES_TOTAL: &str = "reelcut_tool_retries_total";
    pub const ENCODER_FALLBACKS_TOTAL: &str = "reelcut_encoder_fallbacks_total";
}

/// Record the final outcome of an executor invocation.
pub fn record_tool_run(tool: &str, outcome: &'static str) {
    let labels = [("tool", tool.to_string()), ("outcome", outcome.to_string())];
    counter!(names::TOOL_RUNS_TOTAL, &labels).increment(1);
}

/// Record one retry of a transient tool failure.
pub fn record_tool_retry(tool: &str) {
    let labels = [("tool", tool.to_string())];
    counter!(names::TOOL_RETRIES_TOTAL, &labels).increment(1);
}

/// Record a hardware-to-software encoder fallback.
pub fn record_encoder_fallback(preset: &str) {
    let labels = [("preset", preset.to_string())];
    counter!(names::ENCODER_FALLBACKS_TOTAL, &labels).increment(1);
}
