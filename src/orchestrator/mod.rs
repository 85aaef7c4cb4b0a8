//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/stop/reset) and post-run processing
//! for headless output. UI/CLI layers call into this module to keep responsibilities separated.

mod controller;
mod summary;

#[cfg(feature = "tui")]
pub(crate) use controller::{run_controller, RunStatus, Snapshot, UiCommand};
pub(crate) use controller::{Controller, ControllerSettings};
pub(crate) use summary::RunRecorder;
