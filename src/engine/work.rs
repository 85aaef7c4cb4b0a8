use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::FutureExt;

/// The unit of work performed for each step, after the step delay.
pub trait StepWork: Send + Sync + 'static {
    fn run_step(&self, step: u64) -> BoxFuture<'_, Result<()>>;
}

/// Work that does nothing beyond the worker's step delay, optionally failing
/// at a chosen step.
#[derive(Debug, Clone, Default)]
pub struct SimulatedWork {
    pub fail_at_step: Option<u64>,
}

impl SimulatedWork {
    pub fn new(fail_at_step: Option<u64>) -> Self {
        Self { fail_at_step }
    }
}

impl StepWork for SimulatedWork {
    fn run_step(&self, step: u64) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.fail_at_step == Some(step) {
                bail!("simulated failure at step {step}");
            }
            Ok(())
        }
        .boxed()
    }
}

/// Work whose step never completes, for exercising shutdown grace periods.
#[cfg(test)]
pub struct StalledWork;

#[cfg(test)]
impl StepWork for StalledWork {
    fn run_step(&self, _step: u64) -> BoxFuture<'_, Result<()>> {
        futures::future::pending::<Result<()>>().boxed()
    }
}
