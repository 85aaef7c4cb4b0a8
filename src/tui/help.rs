use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key_line(keys: &[&'static str], pad: &'static str, desc: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
        }
        spans.push(Span::styled(*k, Style::default().fg(Color::Magenta)));
    }
    spans.push(Span::raw(pad));
    spans.push(Span::raw(desc));
    Line::from(spans)
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line(&["s", "Enter"], "   ", "Start, or resume from the current progress"),
        key_line(&["x", "p"], "       ", "Stop (the worker finishes its current step first)"),
        key_line(&["r"], "           ", "Reset progress to 0 (only once the worker has exited)"),
        key_line(&["tab"], "         ", "Switch tabs"),
        key_line(&["?"], "           ", "Show this help"),
        key_line(&["q", "Ctrl-C"], "  ", "Quit"),
        Line::from(""),
        Line::from("Notes:"),
        Line::from("  Starting again after a stop resumes from the displayed percentage."),
        Line::from("  At 100% a reset is needed before the next run."),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
