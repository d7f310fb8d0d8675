use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState},
    Frame,
};

use crate::app::App;
use crate::device::Progress;
use crate::fs::human_readable_size;
use crate::transfer::{Direction as TransferDirection, JobStatus, TransferJob};

fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Queued => Color::Gray,
        JobStatus::Transferring => Color::Yellow,
        JobStatus::Finished => Color::Green,
        JobStatus::Failed => Color::Red,
        JobStatus::Cancelled => Color::DarkGray,
    }
}

fn job_line(job: &TransferJob, progress: Option<&Progress>) -> Line<'static> {
    let status = job.status();
    let arrow = match job.direction {
        TransferDirection::Upload => "↑",
        TransferDirection::Download => "↓",
    };
    let mut spans = vec![
        Span::styled(
            format!("{:<12}", status.to_string()),
            Style::default().fg(status_color(status)),
        ),
        Span::raw(format!("{} {} ", arrow, job.file_name())),
        Span::styled(
            format!("({})", human_readable_size(job.size)),
            Style::default().fg(Color::Gray),
        ),
    ];

    if let (JobStatus::Transferring, Some(progress)) = (status, progress) {
        spans.push(Span::styled(
            format!(
                "  {:.0}% {} elapsed {} left {}",
                progress.percent, progress.speed, progress.elapsed, progress.remaining
            ),
            Style::default().fg(Color::Cyan),
        ));
    }
    if job.quit_after_transfer() {
        spans.push(Span::styled(
            "  [quit after]",
            Style::default().fg(Color::Magenta),
        ));
    }
    Line::from(spans)
}

pub fn draw_transfers<B: Backend>(f: &mut Frame, app: &App, area: Rect) {
    let turbo = if app.turbo_enabled() { "on" } else { "off" };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Transfers (turbo {}) ", turbo))
        .title_style(Style::default().add_modifier(Modifier::BOLD));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let running = app
        .jobs
        .iter()
        .find(|job| job.status() == JobStatus::Transferring);
    let (ratio, label) = match running {
        Some(job) => {
            let fraction = app
                .progress
                .get(&job.id)
                .map(|progress| progress.fraction())
                .unwrap_or(0.0);
            (
                fraction,
                format!("{:.0}% {}", fraction * 100.0, job.file_name()),
            )
        }
        None => (0.0, "Idle".to_string()),
    };
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(ratio)
        .label(label);
    f.render_widget(gauge, chunks[0]);

    let items: Vec<ListItem> = app
        .jobs
        .iter()
        .map(|job| ListItem::new(job_line(job, app.progress.get(&job.id))))
        .collect();
    let list = List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if !app.jobs.is_empty() {
        state.select(Some(app.transfer_selected));
    }
    f.render_stateful_widget(list, chunks[1], &mut state);
}
