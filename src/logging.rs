//! Tracing subscriber and panic hook setup.
//!
//! The TUI owns the terminal, so interactive runs log to a file (or nowhere);
//! headless runs log to stderr next to their progress lines.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Where log output should go for this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
    Sink,
}

/// Pick a log target: an explicit file wins, then stderr for headless runs,
/// then the per-user cache file for the TUI.
pub fn resolve_target(log_file: Option<&Path>, interactive: bool) -> LogTarget {
    if let Some(p) = log_file {
        return LogTarget::File(p.to_path_buf());
    }
    if !interactive {
        return LogTarget::Stderr;
    }
    default_log_path()
        .map(LogTarget::File)
        .unwrap_or(LogTarget::Sink)
}

fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("progress-worker").join("progress-worker.log"))
}

fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok()?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
/// A log file that cannot be opened degrades to the sink rather than failing the run.
pub fn init(target: &LogTarget, level: &str) {
    let fallback_level = normalize_level(level);
    let make_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match target {
        LogTarget::File(path) => match open_log_file(path) {
            Some(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_writer(std::io::sink)
                    .try_init();
            }
        },
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogTarget::Sink => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_writer(std::io::sink)
                .try_init();
        }
    }
}

/// Name of the thread that owns the terminal in TUI mode.
pub const UI_THREAD: &str = "tui";

/// Panics on these threads end the process. Anywhere else they happen inside
/// tokio tasks and come back as caught step failures or `JoinError`s.
fn is_fatal_panic_thread(name: Option<&str>) -> bool {
    matches!(name, Some("main") | Some(UI_THREAD))
}

/// Log panics through tracing. For fatal ones, run `on_fatal` (terminal
/// cleanup) and then the previously installed hook.
pub fn install_panic_hook<F>(on_fatal: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        if is_fatal_panic_thread(thread.name()) {
            tracing::error!(thread = thread.name(), panic = %info, "uncaught panic");
            on_fatal();
            prev(info);
        } else {
            tracing::debug!(thread = thread.name(), panic = %info, "panic inside task");
        }
    }));
}
