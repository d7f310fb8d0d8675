use ratatui::{
    backend::Backend,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation},
    Frame,
};

use crate::app::App;

pub fn render_help_popup<B: Backend>(f: &mut Frame, app: &mut App) {
    let block = Block::default()
        .title("Keyboard Shortcuts")
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::White));

    let area = centered_rect(80, 80, f.size());
    f.render_widget(Clear, area); // this clears the background
    f.render_widget(block, area);

    let text = get_help_text();
    let line_count = text.lines.len();

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::White))
        .scroll((app.help_scroll_position, 0));

    let inner_area = area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    }); // Get area inside the block borders

    f.render_widget(paragraph, inner_area);

    // Make scrollbar only appear if there is overflow
    if line_count > inner_area.height as usize {
        let mut scrollbar_state =
            ratatui::widgets::ScrollbarState::new(line_count).position(app.help_scroll_position as usize);

        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓")),
            inner_area,
            &mut scrollbar_state,
        );
    }
}

fn get_help_text<'a>() -> Text<'a> {
    Text::from(vec![
        Line::from(Span::styled("Panels", Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))),
        Line::from(vec![Span::styled("  Tab", Style::default().fg(Color::Green)), Span::raw("         - Switch between computer and PVR")]),
        Line::from(vec![Span::styled("  j, ↓ / k, ↑", Style::default().fg(Color::Green)), Span::raw(" - Move down / up")]),
        Line::from(vec![Span::styled("  Home, End", Style::default().fg(Color::Green)), Span::raw("   - First / last row")]),
        Line::from(vec![Span::styled("  Enter", Style::default().fg(Color::Green)), Span::raw("       - Open directory")]),
        Line::from(vec![Span::styled("  Backspace", Style::default().fg(Color::Green)), Span::raw("   - Go to parent directory")]),
        Line::from(vec![Span::styled("  g", Style::default().fg(Color::Green)), Span::raw("           - Type a path to go to")]),
        Line::from(vec![Span::styled("  Space", Style::default().fg(Color::Green)), Span::raw("       - Mark or unmark a row")]),
        Line::from(vec![Span::styled("  s", Style::default().fg(Color::Green)), Span::raw("           - Next sort column")]),
        Line::from(vec![Span::styled("  o", Style::default().fg(Color::Green)), Span::raw("           - Reverse sort order")]),
        Line::from(vec![Span::styled("  .", Style::default().fg(Color::Green)), Span::raw("           - Show or hide hidden files")]),
        Line::from(vec![Span::styled("  r", Style::default().fg(Color::Green)), Span::raw("           - Reload both sides")]),
        Line::from(vec![Span::styled("  q", Style::default().fg(Color::Green)), Span::raw("           - Quit, stopping transfers")]),
        Line::from(""),
        Line::from(Span::styled("Files", Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))),
        Line::from(vec![Span::styled("  u", Style::default().fg(Color::Green)), Span::raw("           - Upload marked files to the PVR")]),
        Line::from(vec![Span::styled("  d", Style::default().fg(Color::Green)), Span::raw("           - Download marked files from the PVR")]),
        Line::from(vec![Span::styled("  n", Style::default().fg(Color::Green)), Span::raw("           - New folder")]),
        Line::from(vec![Span::styled("  F2, R", Style::default().fg(Color::Green)), Span::raw("       - Rename")]),
        Line::from(vec![Span::styled("  x, Delete", Style::default().fg(Color::Green)), Span::raw("   - Delete marked rows")]),
        Line::from(""),
        Line::from(Span::styled("Transfers", Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))),
        Line::from(vec![Span::styled("  [, ]", Style::default().fg(Color::Green)), Span::raw("        - Select transfer")]),
        Line::from(vec![Span::styled("  c", Style::default().fg(Color::Green)), Span::raw("           - Cancel selected transfer")]),
        Line::from(vec![Span::styled("  C", Style::default().fg(Color::Green)), Span::raw("           - Clear finished transfers")]),
        Line::from(vec![Span::styled("  Q", Style::default().fg(Color::Green)), Span::raw("           - Quit after the last queued transfer")]),
        Line::from(vec![Span::styled("  t", Style::default().fg(Color::Green)), Span::raw("           - Toggle turbo mode")]),
        Line::from(vec![Span::styled("  e", Style::default().fg(Color::Green)), Span::raw("           - Show the error log")]),
        Line::from(""),
        Line::from(Span::styled("Prompts", Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))),
        Line::from(vec![Span::styled("  y / n", Style::default().fg(Color::Green)), Span::raw("       - Yes / No")]),
        Line::from(vec![Span::styled("  s / r / a", Style::default().fg(Color::Green)), Span::raw("   - Skip / Replace or Retry / Replace All")]),
        Line::from(vec![Span::styled("  Esc", Style::default().fg(Color::Green)), Span::raw("         - Skip or No")]),
        Line::from(""),
        Line::from(Span::styled("Help Popup", Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))),
        Line::from(vec![Span::styled("  ?, Esc", Style::default().fg(Color::Green)), Span::raw("      - Toggle/Close help")]),
        Line::from(vec![Span::styled("  ↑, k", Style::default().fg(Color::Green)), Span::raw("        - Scroll up")]),
        Line::from(vec![Span::styled("  ↓, j", Style::default().fg(Color::Green)), Span::raw("        - Scroll down")]),
    ])
}

/// helper function to create a centered rect using up certain percentage of the available rect `r`
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(ratatui::layout::Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}