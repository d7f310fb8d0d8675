use crate::app::{App, InputMode};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};

pub fn draw_footer<B: Backend>(f: &mut Frame, app: &App, area: Rect) {
    let footer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let (nav_text, action_text) = match app.input_mode {
        InputMode::Normal if app.quitting => (
            "Waiting for the current transfer to stop...",
            "[q] Quit now",
        ),
        InputMode::Normal => (
            "↑/↓: Move  [Enter] Open  [Backspace] Up  [Tab] Switch  [Space] Mark  [g] Go to",
            "[u] Upload [d] Download [x] Delete [F2] Rename [n] New folder [c] Cancel [?] Help [q] Quit",
        ),
        InputMode::PathEntry | InputMode::Rename => ("Type a name", "[Enter] Confirm  [Esc] Cancel"),
        InputMode::Prompt => ("Answer the question above", "[Esc] Skip / No"),
        InputMode::Help | InputMode::ErrorLog => ("↑/k ↓/j: Scroll", "[Esc] Close"),
    };

    let nav_help = Paragraph::new(nav_text).style(Style::default().fg(if app.quitting {
        Color::Yellow
    } else {
        Color::Gray
    }));
    let action_help = Paragraph::new(action_text).style(Style::default().fg(Color::Yellow));

    f.render_widget(nav_help, footer[0]);
    f.render_widget(action_help, footer[1]);
}
