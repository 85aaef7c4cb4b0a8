use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub total_steps: u64,
    pub start_step: u64,
    #[serde(with = "humantime_serde")]
    pub step_delay: Duration,
}

impl WorkerConfig {
    pub fn new(total_steps: u64, start_step: u64, step_delay: Duration) -> Result<Self> {
        ensure!(total_steps >= 1, "total steps must be at least 1");
        ensure!(
            start_step <= total_steps,
            "start step {start_step} exceeds total steps {total_steps}"
        );
        Ok(Self {
            total_steps,
            start_step,
            step_delay,
        })
    }

    /// Config that resumes from a displayed percentage rather than an exact step.
    pub fn resume_from(total_steps: u64, displayed_percent: u8, step_delay: Duration) -> Result<Self> {
        Self::new(
            total_steps,
            start_step_for(displayed_percent, total_steps),
            step_delay,
        )
    }
}

/// `floor(step / total * 100)`, computed exactly in integers.
pub fn percent_for(step: u64, total_steps: u64) -> u8 {
    if total_steps == 0 {
        return 0;
    }
    let step = step.min(total_steps) as u128;
    ((step * 100) / total_steps as u128) as u8
}

/// `floor(percent / 100 * total)`. Can drift from the step that produced the
/// percent; resuming always restarts from the displayed value.
pub fn start_step_for(displayed_percent: u8, total_steps: u64) -> u64 {
    let percent = displayed_percent.min(100) as u128;
    ((percent * total_steps as u128) / 100) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

impl RunOutcome {
    pub fn label(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerEvent {
    Progress {
        step: u64,
        percent: u8,
    },
    Message(WorkerMessage),
    Error(String),
    /// Emitted exactly once per run, after every other event.
    Finished {
        outcome: RunOutcome,
        last_step: u64,
    },
}

/// Structured log messages emitted by the worker and rendered by UI/CLI layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerMessage {
    Started { start_step: u64, total_steps: u64 },
    Milestone { percent: u8 },
    StopRequested,
    Completed,
}

impl WorkerMessage {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            WorkerMessage::Started {
                start_step,
                total_steps,
            } => {
                if *start_step == 0 {
                    format!("Task started ({total_steps} steps)")
                } else {
                    format!("Task started, resuming at step {start_step} of {total_steps}")
                }
            }
            WorkerMessage::Milestone { percent } => format!("Completed {percent}%"),
            WorkerMessage::StopRequested => "Stop requested, cleaning up…".to_string(),
            WorkerMessage::Completed => "Task completed normally".to_string(),
        }
    }
}

/// Result of a single headless run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub timestamp_utc: String,
    pub total_steps: u64,
    pub start_step: u64,
    pub last_step: u64,
    pub final_percent: u8,
    pub outcome: RunOutcome,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}
