use ratatui::{
    backend::Backend,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        block::{Position, Title},
        Block, Borders, List, ListItem,
    },
    Frame,
};

use crate::app::{App, PanelSide};
use crate::device::FreeSpace;
use crate::fs::{human_readable_size, FileRow, SortOrder};

const DATE_WIDTH: usize = 16;
const SIZE_WIDTH: usize = 10;

fn free_space_text(space: Option<FreeSpace>) -> String {
    match space {
        Some(space) => format!(
            "{} free of {}",
            human_readable_size(space.free),
            human_readable_size(space.total)
        ),
        None => "free space unknown".to_string(),
    }
}

/// Cut `name` to `width` columns, marking the cut with `~`.
fn fit(name: &str, width: usize) -> String {
    let count = name.chars().count();
    if count <= width {
        format!("{:<width$}", name, width = width)
    } else if width == 0 {
        String::new()
    } else {
        let mut cut: String = name.chars().take(width - 1).collect();
        cut.push('~');
        cut
    }
}

fn row_line(row: &FileRow, marked: bool, name_width: usize) -> Line<'static> {
    let mark = if marked { "* " } else { "  " };
    let (name, color) = if row.is_parent() {
        ("..".to_string(), Color::Cyan)
    } else if row.is_dir() {
        (format!("{}/", row.name), Color::Blue)
    } else {
        (row.name.clone(), Color::White)
    };

    Line::from(vec![
        Span::styled(mark, Style::default().fg(Color::Yellow)),
        Span::styled(fit(&name, name_width), Style::default().fg(color)),
        Span::styled(
            format!(" {:<width$}", row.date, width = DATE_WIDTH),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("{:>width$}", row.size, width = SIZE_WIDTH),
            Style::default().fg(Color::Gray),
        ),
    ])
}

pub fn draw_file_panel<B: Backend>(f: &mut Frame, app: &mut App, side: PanelSide, area: Rect) {
    let is_active = app.active_panel == side;
    let border_style = if is_active {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Gray)
    };
    let title_style = border_style.add_modifier(Modifier::BOLD);

    let mut title = format!(" {}: {} ", side.label(), app.current_dir_label(side));
    if side == PanelSide::Remote {
        if app.cache_busy {
            title.push_str("(reading...) ");
        } else if app.remote.is_unreadable() {
            title.push_str("(unreadable) ");
        }
    }

    let free = match side {
        PanelSide::Local => app.local_free,
        PanelSide::Remote => app.remote_free,
    };
    let pane = app.pane(side);
    let arrow = match pane.sort_order {
        SortOrder::Ascending => "↑",
        SortOrder::Descending => "↓",
    };
    let selected = pane.selected_files().len();
    let mut summary = format!(
        " {} | {} {} ",
        free_space_text(free),
        pane.sort_column.label(),
        arrow
    );
    if selected > 0 {
        summary = format!(
            " {} file(s), {} |{}",
            selected,
            human_readable_size(app.selection_size(side)),
            summary
        );
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title)
        .title_style(title_style)
        .title(
            Title::from(summary)
                .position(Position::Bottom)
                .alignment(ratatui::layout::Alignment::Right),
        );

    let name_width = (area.width as usize).saturating_sub(2 + 2 + 1 + DATE_WIDTH + SIZE_WIDTH + 1);
    let pane = app.pane(side);
    let items: Vec<ListItem> = pane
        .rows
        .iter()
        .map(|row| ListItem::new(row_line(row, pane.marked.contains(&row.name), name_width)))
        .collect();

    let highlight = if is_active {
        Style::default()
            .bg(Color::Green)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::REVERSED)
    };
    let list = List::new(items).block(block).highlight_style(highlight);

    f.render_stateful_widget(list, area, &mut app.pane_mut(side).list_state);
}
