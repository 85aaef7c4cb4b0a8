//! Run lifecycle controller.
//!
//! Owns start/stop/reset orchestration for a single progress worker and keeps the
//! display state (percent, log, status, enabled controls) that presentation layers render.

use crate::engine::{ProgressWorker, StepWork, StopHandle};
use crate::model::{RunOutcome, WorkerConfig, WorkerEvent};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
#[cfg(feature = "tui")]
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

const MAX_LOG_LINES: usize = 500;

/// Commands emitted by UI layers to control the worker.
#[cfg(feature = "tui")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UiCommand {
    Start,
    Stop,
    Reset,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Ready,
    Running,
    Stopping,
    Finished,
}

impl RunStatus {
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Ready => "Ready",
            RunStatus::Running => "Running…",
            RunStatus::Stopping => "Stopping…",
            RunStatus::Finished => "Finished",
        }
    }
}

/// Display state published to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub percent: u8,
    pub total_steps: u64,
    pub status: RunStatus,
    pub log: Vec<String>,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_reset: bool,
}

/// Settings shared by every run the controller launches.
#[derive(Clone)]
pub(crate) struct ControllerSettings {
    pub total_steps: u64,
    pub step_delay: Duration,
    pub work: Arc<dyn StepWork>,
}

/// Internal handle for a running worker task.
struct RunCtx {
    stop: StopHandle,
    handle: Option<JoinHandle<RunOutcome>>,
}

pub(crate) struct Controller {
    settings: ControllerSettings,
    event_tx: UnboundedSender<WorkerEvent>,
    run_ctx: Option<RunCtx>,
    is_running: bool,
    start_pending: bool,
    percent: u8,
    status: RunStatus,
    log: Vec<String>,
}

impl Controller {
    /// Create a controller and the event stream its workers report on.
    pub fn new(
        settings: ControllerSettings,
        initial_percent: u8,
    ) -> (Self, UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let controller = Self {
            settings,
            event_tx,
            run_ctx: None,
            is_running: false,
            start_pending: false,
            percent: initial_percent.min(100),
            status: RunStatus::Ready,
            log: Vec::new(),
        };
        (controller, event_rx)
    }

    pub fn has_active_run(&self) -> bool {
        self.run_ctx.is_some()
    }

    pub fn start(&mut self) {
        if self.is_running {
            tracing::debug!("start ignored: run in progress");
            return;
        }
        if self.percent >= 100 {
            self.push_log("[hint] Already complete, press reset to start again from 0".into());
            return;
        }
        if self.run_ctx.is_some() {
            // The previous worker was asked to stop but has not exited yet.
            // Runs never overlap, so launch once it does.
            tracing::debug!("start queued until the stopping run exits");
            self.start_pending = true;
            return;
        }
        if let Err(e) = self.launch() {
            self.push_log(format!("[error] {e:#}"));
        }
    }

    fn launch(&mut self) -> Result<()> {
        let cfg = WorkerConfig::resume_from(
            self.settings.total_steps,
            self.percent,
            self.settings.step_delay,
        )?;
        tracing::info!(
            percent = self.percent,
            start_step = cfg.start_step,
            "starting run"
        );

        let worker = ProgressWorker::new(cfg, self.settings.work.clone());
        let stop = worker.stop_handle();
        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move { worker.run(event_tx).await });

        self.log.clear();
        self.run_ctx = Some(RunCtx {
            stop,
            handle: Some(handle),
        });
        self.is_running = true;
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Request a cooperative stop without waiting for the worker to exit.
    pub fn stop(&mut self) {
        let Some(ctx) = &self.run_ctx else {
            tracing::debug!("stop ignored: no active run");
            return;
        };
        tracing::info!("stop requested");
        ctx.stop.stop();
        self.start_pending = false;
        self.is_running = false;
        self.status = RunStatus::Stopping;
    }

    pub fn reset(&mut self) {
        if self.run_ctx.is_some() {
            tracing::debug!("reset ignored: run handle still held");
            return;
        }
        self.percent = 0;
        self.status = RunStatus::Ready;
        self.log.clear();
        self.push_log("Progress reset to 0".into());
    }

    pub fn apply_event(&mut self, ev: WorkerEvent) {
        match ev {
            WorkerEvent::Progress { percent, .. } => self.percent = percent,
            WorkerEvent::Message(msg) => self.push_log(msg.to_message()),
            WorkerEvent::Error(msg) => self.push_log(format!("[error] {msg}")),
            WorkerEvent::Finished { outcome, last_step } => {
                tracing::debug!(outcome = outcome.label(), last_step, "worker reported finished");
                self.is_running = false;
            }
        }
    }

    /// Resolve once the active worker task exits; pending forever when there is none.
    ///
    /// The handle is only taken after it resolves, so dropping this future from a
    /// `select!` loses nothing.
    pub async fn wait_for_exit(&mut self) -> Result<RunOutcome, JoinError> {
        if let Some(ctx) = &mut self.run_ctx {
            if let Some(h) = ctx.handle.as_mut() {
                let res = h.await;
                ctx.handle.take();
                return res;
            }
        }
        futures::future::pending().await
    }

    /// Release the exited run. Callers drain queued events first so the
    /// terminal notification has been applied.
    pub fn on_run_exited(&mut self, join_res: Result<RunOutcome, JoinError>) {
        if let Err(e) = join_res {
            tracing::warn!(error = %e, "worker task failed");
            self.push_log(format!("[error] Worker task failed: {e}"));
        }
        self.run_ctx = None;
        self.is_running = false;
        self.status = RunStatus::Finished;

        if std::mem::take(&mut self.start_pending) {
            self.start();
        }
    }

    /// Stop the active run, waiting up to `grace` for it to exit.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.run_ctx.is_none() {
            return;
        }
        self.stop();
        match tokio::time::timeout(grace, self.wait_for_exit()).await {
            Ok(res) => self.on_run_exited(res),
            Err(_) => {
                tracing::warn!(?grace, "worker did not exit within the shutdown grace period");
                if let Some(mut ctx) = self.run_ctx.take() {
                    if let Some(h) = ctx.handle.take() {
                        h.abort();
                    }
                }
                self.start_pending = false;
                self.is_running = false;
                self.status = RunStatus::Finished;
                self.push_log(format!(
                    "[error] Worker did not stop within {}, abandoned",
                    humantime::format_duration(grace)
                ));
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            percent: self.percent,
            total_steps: self.settings.total_steps,
            status: self.status,
            log: self.log.clone(),
            can_start: !self.is_running,
            can_stop: self.is_running,
            can_reset: self.run_ctx.is_none() && self.percent > 0,
        }
    }

    fn push_log(&mut self, line: String) {
        self.log.push(line);
        if self.log.len() > MAX_LOG_LINES {
            self.log.drain(..self.log.len() - MAX_LOG_LINES);
        }
    }
}

/// Drive the controller from UI commands and worker events, publishing a
/// snapshot after every change.
#[cfg(feature = "tui")]
pub(crate) async fn run_controller(
    mut controller: Controller,
    mut event_rx: UnboundedReceiver<WorkerEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
    view_tx: watch::Sender<Snapshot>,
    shutdown_grace: Duration,
) -> Result<()> {
    view_tx.send_replace(controller.snapshot());

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Start) => controller.start(),
                    Some(UiCommand::Stop) => controller.stop(),
                    Some(UiCommand::Reset) => controller.reset(),
                    Some(UiCommand::Quit) | None => {
                        controller.shutdown(shutdown_grace).await;
                        while let Ok(ev) = event_rx.try_recv() {
                            controller.apply_event(ev);
                        }
                        view_tx.send_replace(controller.snapshot());
                        break;
                    }
                }
            }
            Some(ev) = event_rx.recv() => controller.apply_event(ev),
            join_res = controller.wait_for_exit() => {
                // The task has exited, so everything it sent is already queued.
                while let Ok(ev) = event_rx.try_recv() {
                    controller.apply_event(ev);
                }
                controller.on_run_exited(join_res);
            }
        }
        view_tx.send_replace(controller.snapshot());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SimulatedWork, StalledWork};

    fn settings(total_steps: u64) -> ControllerSettings {
        ControllerSettings {
            total_steps,
            step_delay: Duration::from_millis(10),
            work: Arc::new(SimulatedWork::default()),
        }
    }

    /// Pump events until the active run exits and is released.
    async fn drive_to_exit(c: &mut Controller, rx: &mut UnboundedReceiver<WorkerEvent>) {
        let res = c.wait_for_exit().await;
        while let Ok(ev) = rx.try_recv() {
            c.apply_event(ev);
        }
        c.on_run_exited(res);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_to_completion() {
        let (mut c, mut rx) = Controller::new(settings(100), 0);
        c.start();
        assert!(c.is_running);
        assert!(!c.snapshot().can_start);
        assert!(c.snapshot().can_stop);

        drive_to_exit(&mut c, &mut rx).await;

        let snap = c.snapshot();
        assert_eq!(snap.percent, 100);
        assert_eq!(snap.status, RunStatus::Finished);
        assert!(snap.can_start && snap.can_reset && !snap.can_stop);
        assert_eq!(snap.log.first().map(String::as_str), Some("Task started (100 steps)"));
        assert_eq!(
            snap.log.last().map(String::as_str),
            Some("Task completed normally")
        );
        assert!(c.run_ctx.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_noop() {
        let (mut c, mut rx) = Controller::new(settings(20), 0);
        c.start();
        let before = c.snapshot();
        c.start();
        assert_eq!(c.snapshot(), before);

        drive_to_exit(&mut c, &mut rx).await;
        // A second run would have left a second "Task started" line.
        let started = c
            .snapshot()
            .log
            .iter()
            .filter(|l| l.starts_with("Task started"))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_at_full_progress_only_hints() {
        let (mut c, _rx) = Controller::new(settings(20), 100);
        c.start();
        assert!(c.run_ctx.is_none());
        assert!(!c.is_running);
        assert!(c.snapshot().log[0].contains("press reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_starts_from_displayed_percent() {
        let (mut c, mut rx) = Controller::new(settings(120), 50);
        c.start();

        let first = loop {
            match rx.recv().await.unwrap() {
                WorkerEvent::Progress { step, percent } => break (step, percent),
                ev => c.apply_event(ev),
            }
        };
        assert_eq!(first, (61, 50));
        assert!(c
            .snapshot()
            .log
            .iter()
            .any(|l| l.contains("resuming at step 60 of 120")));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_then_resume_continues_from_progress() {
        let (mut c, mut rx) = Controller::new(settings(100), 0);
        c.start();
        while c.percent < 30 {
            let ev = rx.recv().await.unwrap();
            c.apply_event(ev);
        }
        c.stop();
        assert!(!c.is_running);
        assert_eq!(c.snapshot().status, RunStatus::Stopping);
        assert!(c.run_ctx.is_some());

        drive_to_exit(&mut c, &mut rx).await;
        let stopped_at = c.percent;
        assert!((30..100).contains(&stopped_at));
        assert!(c.snapshot().log.iter().any(|l| l.contains("Stop requested")));

        c.start();
        let first = loop {
            match rx.recv().await.unwrap() {
                WorkerEvent::Progress { percent, .. } => break percent,
                ev => c.apply_event(ev),
            }
        };
        assert!(first >= stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_stopping_is_queued() {
        let (mut c, mut rx) = Controller::new(settings(100), 0);
        c.start();
        while c.percent < 10 {
            let ev = rx.recv().await.unwrap();
            c.apply_event(ev);
        }
        c.stop();
        c.start();
        // Still the old run; nothing new spawned yet.
        assert!(!c.is_running);

        drive_to_exit(&mut c, &mut rx).await;
        assert!(c.is_running);
        assert!(c.run_ctx.is_some());
        assert_eq!(c.snapshot().status, RunStatus::Running);

        drive_to_exit(&mut c, &mut rx).await;
        assert_eq!(c.percent, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_is_refused_while_handle_held() {
        let (mut c, mut rx) = Controller::new(settings(50), 40);
        c.start();
        c.stop();
        c.reset();
        assert_ne!(c.percent, 0);
        assert!(!c.snapshot().can_reset);

        drive_to_exit(&mut c, &mut rx).await;
        c.reset();
        assert_eq!(c.percent, 0);
        c.reset();
        let snap = c.snapshot();
        assert_eq!(snap.percent, 0);
        assert_eq!(snap.status, RunStatus::Ready);
        assert_eq!(snap.log, vec!["Progress reset to 0".to_string()]);
        assert!(!snap.can_reset);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_run_is_noop() {
        let (mut c, _rx) = Controller::new(settings(10), 0);
        let before = c.snapshot();
        c.stop();
        assert_eq!(c.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_step_is_logged_not_propagated() {
        let (mut c, mut rx) = Controller::new(
            ControllerSettings {
                total_steps: 30,
                step_delay: Duration::from_millis(10),
                work: Arc::new(SimulatedWork::new(Some(12))),
            },
            0,
        );
        c.start();
        drive_to_exit(&mut c, &mut rx).await;

        let snap = c.snapshot();
        assert_eq!(snap.percent, 36);
        assert!(snap
            .log
            .iter()
            .any(|l| l.starts_with("[error] Worker failure") && l.contains("step 12")));
        assert!(snap.can_start);
        assert_eq!(snap.status, RunStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_worker() {
        let (mut c, _rx) = Controller::new(settings(1000), 0);
        c.start();
        c.shutdown(Duration::from_secs(3)).await;
        assert!(c.run_ctx.is_none());
        assert!(!c.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_stalled_worker() {
        let (mut c, _rx) = Controller::new(
            ControllerSettings {
                total_steps: 10,
                step_delay: Duration::from_millis(10),
                work: Arc::new(StalledWork),
            },
            0,
        );
        c.start();
        // Let the worker get past the stop check and into its first step.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = tokio::time::Instant::now();
        c.shutdown(Duration::from_secs(1)).await;
        assert!(started.elapsed() >= Duration::from_secs(1));

        assert!(c.run_ctx.is_none());
        let snap = c.snapshot();
        assert_eq!(snap.status, RunStatus::Finished);
        assert!(snap.can_start && !snap.can_stop);
        assert!(snap
            .log
            .last()
            .is_some_and(|l| l.contains("did not stop within 1s")));
    }

    #[tokio::test(start_paused = true)]
    async fn log_is_capped() {
        let (mut c, _rx) = Controller::new(settings(10), 0);
        for i in 0..(MAX_LOG_LINES + 25) {
            c.push_log(format!("line {i}"));
        }
        let snap = c.snapshot();
        assert_eq!(snap.log.len(), MAX_LOG_LINES);
        assert_eq!(snap.log[0], "line 25");
    }

    #[cfg(feature = "tui")]
    #[tokio::test(start_paused = true)]
    async fn controller_loop_publishes_snapshots() {
        let (c, event_rx) = Controller::new(settings(20), 0);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, mut view_rx) = watch::channel(c.snapshot());
        let handle = tokio::spawn(run_controller(
            c,
            event_rx,
            cmd_rx,
            view_tx,
            Duration::from_secs(3),
        ));

        cmd_tx.send(UiCommand::Start).unwrap();
        loop {
            view_rx.changed().await.unwrap();
            let snap = view_rx.borrow_and_update().clone();
            if snap.status == RunStatus::Finished {
                assert_eq!(snap.percent, 100);
                break;
            }
        }

        cmd_tx.send(UiCommand::Reset).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(view_rx.borrow().percent, 0);
    }
}
