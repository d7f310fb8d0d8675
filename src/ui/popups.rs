use ratatui::{
    backend::Backend,
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::centered_rect;
use crate::app::{App, InputMode, Prompt};
use crate::fs::human_readable_size;
use crate::transfer::Direction;

/// Names listed in a delete confirmation before cutting off.
const MAX_LISTED_NAMES: usize = 5;

fn prompt_text(prompt: &Prompt) -> (&'static str, Vec<String>) {
    match prompt {
        Prompt::LowSpace { plan, needed, free } => {
            let side = match plan.direction {
                Direction::Download => "PC",
                Direction::Upload => "PVR",
            };
            (
                " Not enough space ",
                vec![
                    format!(
                        "Not enough disk space available on your {}. Do you still want to continue transfer?",
                        side
                    ),
                    format!(
                        "Needed {}, free {}",
                        human_readable_size(*needed),
                        human_readable_size(*free)
                    ),
                ],
            )
        }
        Prompt::Overwrite { name, plan } => {
            let mut lines = vec![format!("\"{}\" already exists. Do you want to replace it?", name)];
            let left = plan.conflicts_left();
            if left > 1 {
                lines.push(format!("{} files already exist", left));
            }
            (" File exists ", lines)
        }
        Prompt::ConfirmDelete { names, .. } => {
            let mut lines = vec![format!("Delete {} item(s)?", names.len())];
            lines.extend(names.iter().take(MAX_LISTED_NAMES).cloned());
            if names.len() > MAX_LISTED_NAMES {
                lines.push(format!("... and {} more", names.len() - MAX_LISTED_NAMES));
            }
            (" Delete ", lines)
        }
        Prompt::OperationFailed { message, .. } => (" Error ", vec![message.clone()]),
        Prompt::RenameConflict { new, .. } => (
            " Name in use ",
            vec![
                format!("\"{}\" already exists. Do you want to replace it?", new),
                "The existing item is deleted before the rename.".to_string(),
            ],
        ),
    }
}

pub fn draw_prompt<B: Backend>(f: &mut Frame, app: &App) {
    let Some(prompt) = &app.prompt else {
        return;
    };
    let (title, lines) = prompt_text(prompt);

    let mut text: Vec<Line> = lines.into_iter().map(Line::from).collect();
    text.push(Line::from(""));
    let choices: Vec<Span> = app
        .prompt_choices()
        .into_iter()
        .flat_map(|(label, _)| {
            [
                Span::styled(label, Style::default().fg(Color::Green)),
                Span::raw("  "),
            ]
        })
        .collect();
    text.push(Line::from(choices));

    let height = text.len() as u16 + 4;
    let area = centered_rect(60, height, f.size());
    let border = if matches!(prompt, Prompt::OperationFailed { .. }) {
        Color::Red
    } else {
        Color::Yellow
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(border).add_modifier(Modifier::BOLD))
        .border_style(Style::default().fg(border));

    let paragraph = Paragraph::new(text)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

pub fn draw_error_log<B: Backend>(f: &mut Frame, app: &App) {
    let area = centered_rect(80, f.size().height.saturating_sub(4), f.size());

    let entries = app.error_log.entries();
    let mut lines: Vec<Line> = Vec::new();
    if entries.is_empty() {
        lines.push(Line::from("No errors"));
    }
    for entry in entries.iter().rev() {
        lines.push(Line::from(Span::styled(
            entry.heading(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        lines.extend(entry.message.lines().map(|line| Line::from(line.to_string())));
        if !entry.details.is_empty() {
            lines.extend(entry.details.lines().map(|line| {
                Line::from(Span::styled(
                    format!("  {}", line),
                    Style::default().fg(Color::Gray),
                ))
            }));
        }
        lines.push(Line::from(""));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Error log ({}) [C] Clear ", entries.len()))
        .title_style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
        .border_style(Style::default().fg(Color::Red));

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.error_log_scroll, 0));

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

pub fn draw_text_input<B: Backend>(f: &mut Frame, app: &App) {
    let title = match app.input_mode {
        InputMode::Rename => " Rename to ",
        _ => " Go to directory ",
    };
    let area = centered_rect(60, 3, f.size());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(format!("{}_", app.text_input)).block(block);

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}
