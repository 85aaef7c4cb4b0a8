use crate::orchestrator::{RunStatus, Snapshot};
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

pub const TAB_WORKER: usize = 0;
pub const TAB_HELP: usize = 1;

/// UI-thread state; the controller's snapshot is the source of truth for
/// everything except tab selection.
pub struct UiState {
    pub tab: usize,
    pub view: Snapshot,
}

impl UiState {
    pub fn new(view: Snapshot) -> Self {
        Self {
            tab: TAB_WORKER,
            view,
        }
    }

    pub fn next_tab(&mut self) {
        self.tab = (self.tab + 1) % 2;
    }
}

/// The most recent lines that fit in a bordered area of `height` rows.
pub fn log_tail(log: &[String], height: u16) -> &[String] {
    let rows = height.saturating_sub(2) as usize;
    &log[log.len().saturating_sub(rows)..]
}

pub fn status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Ready => Color::Gray,
        RunStatus::Running => Color::Green,
        RunStatus::Stopping => Color::Yellow,
        RunStatus::Finished => Color::Cyan,
    }
}

/// Key hint for a control, dimmed when the control is disabled.
pub fn control_hint(key: &'static str, label: &'static str, enabled: bool) -> Vec<Span<'static>> {
    let (key_style, label_style) = if enabled {
        (Style::default().fg(Color::Magenta), Style::default())
    } else {
        (
            Style::default().fg(Color::DarkGray),
            Style::default().fg(Color::DarkGray),
        )
    };
    vec![
        Span::styled(key, key_style),
        Span::raw(" "),
        Span::styled(label, label_style),
        Span::raw("   "),
    ]
}

pub fn controls_line(view: &Snapshot) -> Line<'static> {
    let mut spans = Vec::new();
    spans.extend(control_hint("s", "Start", view.can_start));
    spans.extend(control_hint("x", "Stop", view.can_stop));
    spans.extend(control_hint("r", "Reset", view.can_reset));
    spans.extend(control_hint("q", "Quit", true));
    Line::from(spans)
}
