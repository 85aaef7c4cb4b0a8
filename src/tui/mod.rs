mod help;
mod state;

use crate::cli::{build_config, build_work, Cli};
use crate::orchestrator::{self, Controller, ControllerSettings, Snapshot, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Tabs},
    Terminal,
};
use state::{UiState, TAB_HELP, TAB_WORKER};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinError;

pub async fn run(args: Cli) -> Result<()> {
    // Validate flags before taking over the terminal.
    build_config(&args)?;

    let settings = ControllerSettings {
        total_steps: args.total_steps,
        step_delay: Duration::from(args.step_delay),
        work: build_work(&args),
    };
    let (mut controller, event_rx) = Controller::new(settings, args.start_percent);
    if args.start_on_launch {
        controller.start();
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (view_tx, view_rx) = watch::channel(controller.snapshot());

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::Builder::new()
        .name(crate::logging::UI_THREAD.into())
        .spawn(move || run_threaded(view_rx, cmd_tx))
        .context("spawn TUI thread")?;

    let res = orchestrator::run_controller(
        controller,
        event_rx,
        cmd_rx,
        view_tx,
        Duration::from(args.shutdown_grace),
    )
    .await;

    ui_exit_status(tokio::task::spawn_blocking(move || ui_handle.join()).await)?;
    res
}

/// Flatten the result of joining the UI thread through `spawn_blocking`.
fn ui_exit_status(joined: Result<std::thread::Result<Result<()>>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(anyhow::anyhow!("joining TUI thread failed: {e}")),
    }
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    mut view_rx: watch::Receiver<Snapshot>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; the controller publishes snapshots.
    let mut state = UiState::new(view_rx.borrow_and_update().clone());

    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        match view_rx.has_changed() {
            Ok(true) => {
                state.view = view_rx.borrow_and_update().clone();
                dirty = true;
            }
            Ok(false) => {}
            // Controller has exited.
            Err(_) => break Ok(()),
        }

        if dirty && last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            dirty = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    let cmd = match (k.modifiers, k.code) {
                        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                            let _ = cmd_tx.send(UiCommand::Quit);
                            break Ok(());
                        }
                        (_, KeyCode::Char('s')) | (_, KeyCode::Enter) => Some(UiCommand::Start),
                        (_, KeyCode::Char('x')) | (_, KeyCode::Char('p')) => Some(UiCommand::Stop),
                        (_, KeyCode::Char('r')) => Some(UiCommand::Reset),
                        (_, KeyCode::Tab) => {
                            state.next_tab();
                            dirty = true;
                            None
                        }
                        (_, KeyCode::Char('?')) => {
                            state.tab = TAB_HELP;
                            dirty = true;
                            None
                        }
                        (_, KeyCode::Esc) => {
                            state.tab = TAB_WORKER;
                            dirty = true;
                            None
                        }
                        _ => None,
                    };
                    if let Some(cmd) = cmd {
                        if cmd_tx.send(cmd).is_err() {
                            break Ok(());
                        }
                    }
                }
                Ok(Event::Resize(..)) => dirty = true,
                _ => {}
            }
        }
    };

    restore_terminal();
    res
}

/// Leave raw mode and the alternate screen. Harmless if neither is active.
pub fn restore_terminal() {
    disable_raw_mode().ok();
    execute!(io::stdout(), LeaveAlternateScreen).ok();
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Worker"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("progress-worker"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_WORKER => draw_worker(chunks[1], f, &state.view),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_worker(area: Rect, f: &mut ratatui::Frame, view: &Snapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(3),
            ]
            .as_ref(),
        )
        .split(area);

    let status = Paragraph::new(Line::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Gray)),
        Span::styled(
            view.status.label(),
            Style::default()
                .fg(state::status_color(view.status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled("Steps: ", Style::default().fg(Color::Gray)),
        Span::raw(view.total_steps.to_string()),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, chunks[0]);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(u16::from(view.percent.min(100)))
        .label(format!("{}%", view.percent));
    f.render_widget(gauge, chunks[1]);

    let controls = Paragraph::new(state::controls_line(view))
        .block(Block::default().borders(Borders::ALL).title("Controls"));
    f.render_widget(controls, chunks[2]);

    let log_area = chunks[3];
    let lines: Vec<Line> = state::log_tail(&view.log, log_area.height)
        .iter()
        .map(|l| {
            if l.starts_with("[error]") {
                Line::styled(l.clone(), Style::default().fg(Color::Red))
            } else if l.starts_with("[hint]") {
                Line::styled(l.clone(), Style::default().fg(Color::Yellow))
            } else {
                Line::from(l.clone())
            }
        })
        .collect();
    let log = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(log, log_area);
}
