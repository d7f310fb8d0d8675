use crate::app::{App, InputMode, PanelSide};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    Frame,
};

pub mod footer;
pub mod help_popup;
pub mod panels;
pub mod popups;
pub mod status_bar;
pub mod transfers;

/// Most job rows shown at once in the transfers panel.
const MAX_TRANSFER_ROWS: usize = 6;

pub fn draw<B: Backend>(f: &mut Frame, app: &mut App) {
    // Borders plus the progress gauge plus one row per job.
    let transfer_rows = app.jobs.len().clamp(1, MAX_TRANSFER_ROWS) as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Min(5),                    // File panels
                Constraint::Length(transfer_rows + 3), // Transfers
                Constraint::Length(1),                 // Status bar
                Constraint::Length(2),                 // Footer
            ]
            .as_ref(),
        )
        .split(f.size());

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    panels::draw_file_panel::<B>(f, app, PanelSide::Local, panels[0]);
    panels::draw_file_panel::<B>(f, app, PanelSide::Remote, panels[1]);
    transfers::draw_transfers::<B>(f, app, chunks[1]);
    status_bar::draw_status_bar::<B>(f, app, chunks[2]);
    footer::draw_footer::<B>(f, app, chunks[3]);

    match app.input_mode {
        InputMode::Help => help_popup::render_help_popup::<B>(f, app),
        InputMode::ErrorLog => popups::draw_error_log::<B>(f, app),
        InputMode::Prompt => popups::draw_prompt::<B>(f, app),
        InputMode::PathEntry | InputMode::Rename => popups::draw_text_input::<B>(f, app),
        InputMode::Normal => {}
    }
}

/// Helper function to center a rectangle with given width and height
pub(crate) fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height)) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
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
