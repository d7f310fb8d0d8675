use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use crate::app::{App, STATUS_MESSAGE_TIMEOUT};

pub fn draw_status_bar<B: Backend>(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(24)])
        .split(area);

    if let Some((message, timestamp)) = &app.status_message {
        if timestamp.elapsed() < STATUS_MESSAGE_TIMEOUT || app.quitting {
            let lower = message.to_lowercase();
            let style = if lower.contains("error") || lower.contains("failed") {
                Style::default().fg(Color::Red)
            } else if lower.starts_with("finished") || lower.starts_with("created") {
                Style::default().fg(Color::Green)
            } else if lower.contains("reading") || lower.contains("starting") {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::Yellow)
            };

            let paragraph = Paragraph::new(message.as_str())
                .style(style)
                .alignment(ratatui::layout::Alignment::Center);
            f.render_widget(paragraph, chunks[0]);
        } else {
            // Clear the status message if it's expired
            app.status_message = None;
        }
    }

    let unseen = app.error_log.unseen();
    if unseen > 0 {
        let errors = Paragraph::new(format!("{} new error(s) [e]", unseen))
            .style(Style::default().fg(Color::Red))
            .alignment(ratatui::layout::Alignment::Right);
        f.render_widget(errors, chunks[1]);
    }
}
