mod work;

pub use work::{SimulatedWork, StepWork};
#[cfg(test)]
pub use work::StalledWork;

use crate::model::{percent_for, RunOutcome, WorkerConfig, WorkerEvent, WorkerMessage};
use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop. Never blocks; the worker notices at the top of its next step.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

pub struct ProgressWorker {
    cfg: WorkerConfig,
    work: Arc<dyn StepWork>,
    stop: StopHandle,
}

impl ProgressWorker {
    pub fn new(cfg: WorkerConfig, work: Arc<dyn StepWork>) -> Self {
        Self {
            cfg,
            work,
            stop: StopHandle::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run the step loop to completion, cancellation or failure.
    ///
    /// Always ends with exactly one `WorkerEvent::Finished`. Send errors are
    /// ignored: a dropped receiver only means nobody is watching any more.
    pub async fn run(self, event_tx: mpsc::UnboundedSender<WorkerEvent>) -> RunOutcome {
        let WorkerConfig {
            total_steps,
            start_step,
            ..
        } = self.cfg;
        tracing::info!(start_step, total_steps, "worker started");

        let _ = event_tx.send(WorkerEvent::Message(WorkerMessage::Started {
            start_step,
            total_steps,
        }));

        let mut last_step = start_step;
        let outcome = match self.step_loop(&event_tx, &mut last_step).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(step = last_step + 1, error = %format!("{e:#}"), "step failed");
                let _ = event_tx.send(WorkerEvent::Error(format!("Worker failure: {e:#}")));
                RunOutcome::Failed
            }
        };

        tracing::info!(outcome = outcome.label(), last_step, "worker finished");
        let _ = event_tx.send(WorkerEvent::Finished { outcome, last_step });
        outcome
    }

    async fn step_loop(
        &self,
        event_tx: &mpsc::UnboundedSender<WorkerEvent>,
        last_step: &mut u64,
    ) -> Result<RunOutcome> {
        let total = self.cfg.total_steps;
        for step in (self.cfg.start_step + 1)..=total {
            if self.stop.is_stopped() {
                let _ = event_tx.send(WorkerEvent::Message(WorkerMessage::StopRequested));
                return Ok(RunOutcome::Cancelled);
            }

            self.execute_step(step).await?;
            *last_step = step;

            let percent = percent_for(step, total);
            tracing::trace!(step, percent, "step done");
            let _ = event_tx.send(WorkerEvent::Progress { step, percent });
            if step % 10 == 0 {
                let _ = event_tx.send(WorkerEvent::Message(WorkerMessage::Milestone { percent }));
            }
        }

        let _ = event_tx.send(WorkerEvent::Message(WorkerMessage::Completed));
        Ok(RunOutcome::Completed)
    }

    /// Delay plus the step's work; panics inside are caught and returned as errors.
    async fn execute_step(&self, step: u64) -> Result<()> {
        let delay = self.cfg.step_delay;
        let work = self.work.clone();
        let fut = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            work.run_step(step).await
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => Err(anyhow!("step {step} panicked: {}", panic_message(&*payload))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
