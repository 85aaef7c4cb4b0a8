//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for text mode.

use crate::model::{RunOutcome, RunSummary};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished run.
pub(crate) fn build_text_summary(summary: &RunSummary) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Outcome: {}", summary.outcome.label()));
    let done = summary.last_step.saturating_sub(summary.start_step);
    lines.push(format!(
        "Steps: {} of {} ({} this run, resumed from step {})",
        summary.last_step, summary.total_steps, done, summary.start_step
    ));
    lines.push(format!("Progress: {}%", summary.final_percent));
    lines.push(format!(
        "Elapsed: {}",
        humantime::format_duration(std::time::Duration::from_millis(summary.elapsed_ms))
    ));

    if !summary.errors.is_empty() {
        lines.push(format!("Errors: {}", summary.errors.len()));
        for e in &summary.errors {
            lines.push(format!("  {e}"));
        }
    }

    if summary.outcome == RunOutcome::Cancelled && summary.final_percent < 100 {
        lines.push(format!(
            "Resume with: --start-percent {}",
            summary.final_percent
        ));
    }

    TextSummary { lines }
}
