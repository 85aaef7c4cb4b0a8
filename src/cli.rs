use crate::engine::{SimulatedWork, StepWork};
use crate::model::{RunOutcome, RunSummary, WorkerConfig, WorkerEvent};
use crate::orchestrator::{Controller, ControllerSettings, RunRecorder};
use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "progress-worker",
    version,
    about = "Stepped background worker with progress reporting and cooperative cancellation"
)]
pub struct Cli {
    /// Total number of steps in a full run
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    pub total_steps: u64,

    /// Simulated work time per step
    #[arg(long, default_value = "20ms")]
    pub step_delay: humantime::Duration,

    /// Progress to resume from, as a displayed percentage
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub start_percent: u8,

    /// How long to wait for a stopping worker on quit or Ctrl-C
    #[arg(long, default_value = "3s")]
    pub shutdown_grace: humantime::Duration,

    /// Make the given step fail, to exercise error reporting
    #[arg(long)]
    pub fail_at_step: Option<u64>,

    /// Start a run as soon as the TUI opens
    #[arg(long)]
    pub start_on_launch: bool,

    /// Print JSON result and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print progress and a text summary, then exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Write logs to this file
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        !self.json && !self.text && cfg!(feature = "tui")
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json {
        return run_headless(args, false).await;
    }
    if args.text {
        return run_headless(args, true).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_headless(args, true).await
    }
}

/// Build a `WorkerConfig` from CLI arguments, resuming from `--start-percent`.
pub fn build_config(args: &Cli) -> Result<WorkerConfig> {
    WorkerConfig::resume_from(
        args.total_steps,
        args.start_percent,
        Duration::from(args.step_delay),
    )
    .context("invalid worker configuration")
}

pub fn build_work(args: &Cli) -> Arc<dyn StepWork> {
    Arc::new(SimulatedWork::new(args.fail_at_step))
}

/// Run a single worker without the TUI. `stream` prints log lines as they arrive
/// and a text summary at the end; otherwise the summary is printed as JSON.
async fn run_headless(args: Cli, stream: bool) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, requesting stop"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                futures::future::pending::<()>().await;
            }
        }
    };

    let res = drive_run(&args, build_work(&args), interrupt, |line| {
        if stream {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    })
    .await;

    let summary = match res {
        Ok(summary) => summary,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    if stream {
        for line in crate::text_summary::build_text_summary(&summary).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    } else {
        let out = serde_json::to_string_pretty(&summary)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    }

    drop(out_tx);
    let _ = out_handle.await;

    if summary.outcome == RunOutcome::Failed {
        return Err(anyhow::anyhow!(
            "run failed at step {} of {}",
            summary.last_step + 1,
            summary.total_steps
        ));
    }
    Ok(())
}

/// Start one controller-managed run and follow it until the worker exits, or
/// until `interrupt` resolves, in which case the run is shut down within the
/// configured grace period. Log lines are handed to `on_line` as they arrive.
async fn drive_run<I>(
    args: &Cli,
    work: Arc<dyn StepWork>,
    interrupt: I,
    mut on_line: impl FnMut(String),
) -> Result<RunSummary>
where
    I: Future<Output = ()>,
{
    let cfg = build_config(args)?;
    let grace = Duration::from(args.shutdown_grace);
    let settings = ControllerSettings {
        total_steps: cfg.total_steps,
        step_delay: cfg.step_delay,
        work,
    };
    let (mut controller, mut event_rx) = Controller::new(settings, args.start_percent);

    controller.start();
    if !controller.has_active_run() {
        let reason = controller
            .snapshot()
            .log
            .last()
            .cloned()
            .unwrap_or_else(|| "run was not started".into());
        return Err(anyhow::anyhow!("nothing to run: {reason}"));
    }

    let mut recorder = RunRecorder::new(&cfg);
    let mut last_percent = None;

    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            Some(ev) = event_rx.recv() => {
                follow_event(ev, &mut controller, &mut recorder, &mut last_percent, &mut on_line);
            }
            join_res = controller.wait_for_exit() => {
                // The task has exited, so everything it sent is already queued.
                while let Ok(ev) = event_rx.try_recv() {
                    follow_event(ev, &mut controller, &mut recorder, &mut last_percent, &mut on_line);
                }
                controller.on_run_exited(join_res);
                break;
            }
            _ = &mut interrupt => {
                on_line("Interrupted, stopping…".into());
                controller.shutdown(grace).await;
                while let Ok(ev) = event_rx.try_recv() {
                    follow_event(ev, &mut controller, &mut recorder, &mut last_percent, &mut on_line);
                }
                break;
            }
        }
    }

    Ok(recorder.finish())
}

/// Record one worker event, print what it renders to and apply it to the controller.
fn follow_event(
    ev: WorkerEvent,
    controller: &mut Controller,
    recorder: &mut RunRecorder,
    last_percent: &mut Option<u8>,
    on_line: &mut impl FnMut(String),
) {
    if let WorkerEvent::Progress { percent, .. } = ev {
        if *last_percent != Some(percent) {
            *last_percent = Some(percent);
            on_line(format!("Progress: {percent}%"));
        }
    }
    if let Some(line) = recorder.record(&ev) {
        on_line(line);
    }
    controller.apply_event(ev);
}
