//! Post-run processing for headless modes.
//!
//! Folds the worker's event stream into a `RunSummary` ready for text or JSON output.

use crate::model::{percent_for, RunOutcome, RunSummary, WorkerConfig, WorkerEvent};
use std::time::Instant;

pub(crate) struct RunRecorder {
    total_steps: u64,
    start_step: u64,
    last_step: u64,
    outcome: Option<RunOutcome>,
    messages: Vec<String>,
    errors: Vec<String>,
    started: Instant,
}

impl RunRecorder {
    pub fn new(cfg: &WorkerConfig) -> Self {
        Self {
            total_steps: cfg.total_steps,
            start_step: cfg.start_step,
            last_step: cfg.start_step,
            outcome: None,
            messages: Vec::new(),
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Record an event and return the log line it renders to, if any.
    pub fn record(&mut self, ev: &WorkerEvent) -> Option<String> {
        match ev {
            WorkerEvent::Progress { step, .. } => {
                self.last_step = *step;
                None
            }
            WorkerEvent::Message(msg) => {
                let line = msg.to_message();
                self.messages.push(line.clone());
                Some(line)
            }
            WorkerEvent::Error(msg) => {
                self.errors.push(msg.clone());
                Some(format!("[error] {msg}"))
            }
            WorkerEvent::Finished { outcome, last_step } => {
                self.outcome = Some(*outcome);
                self.last_step = *last_step;
                None
            }
        }
    }

    /// Build the summary. A run that never reported `Finished` (it was abandoned
    /// after the shutdown grace period) counts as cancelled.
    pub fn finish(self) -> RunSummary {
        RunSummary {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            total_steps: self.total_steps,
            start_step: self.start_step,
            last_step: self.last_step,
            final_percent: percent_for(self.last_step, self.total_steps),
            outcome: self.outcome.unwrap_or(RunOutcome::Cancelled),
            messages: self.messages,
            errors: self.errors,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkerMessage;
    use std::time::Duration;

    #[test]
    fn records_progress_and_outcome() {
        let cfg = WorkerConfig::new(120, 60, Duration::ZERO).unwrap();
        let mut rec = RunRecorder::new(&cfg);

        assert!(rec
            .record(&WorkerEvent::Progress {
                step: 61,
                percent: 50
            })
            .is_none());
        assert_eq!(
            rec.record(&WorkerEvent::Message(WorkerMessage::StopRequested))
                .as_deref(),
            Some("Stop requested, cleaning up…")
        );
        rec.record(&WorkerEvent::Finished {
            outcome: RunOutcome::Cancelled,
            last_step: 61,
        });

        let summary = rec.finish();
        assert_eq!(summary.start_step, 60);
        assert_eq!(summary.last_step, 61);
        assert_eq!(summary.final_percent, 50);
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.messages.len(), 1);
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn errors_are_prefixed() {
        let cfg = WorkerConfig::new(10, 0, Duration::ZERO).unwrap();
        let mut rec = RunRecorder::new(&cfg);
        let line = rec.record(&WorkerEvent::Error("Worker failure: x".into()));
        assert_eq!(line.as_deref(), Some("[error] Worker failure: x"));
        assert_eq!(rec.finish().errors, vec!["Worker failure: x".to_string()]);
    }

    #[test]
    fn unfinished_run_counts_as_cancelled() {
        let cfg = WorkerConfig::new(10, 0, Duration::ZERO).unwrap();
        let rec = RunRecorder::new(&cfg);
        assert_eq!(rec.finish().outcome, RunOutcome::Cancelled);
    }
}
