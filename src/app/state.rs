use ratatui::widgets::ListState;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::app::types::{
    App, FileOp, InputMode, PaneState, PanelSide, Prompt, PromptAnswer, TransferPlan,
};
use crate::cache::DirectoryCache;
use crate::config::{AppConfig, ConfigManager};
use crate::device::DeviceClient;
use crate::error::{Error, Result};
use crate::error_log::DeviceErrorLog;
use crate::events::{CacheEvent, TransferEvent};
use crate::fs::{
    sort_rows, update_cache, visible_rows, FileRow, LocalFilesystem, RemoteFilesystem,
};
use crate::transfer::{Direction, JobStatus, TransferJob, TransferQueue, TransferWorker};

/// How long a status message stays on screen.
pub const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run blocking PVR work off the UI thread, on tokio's blocking pool when
/// there is a runtime.
fn spawn_background<F>(work: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(work);
        }
        Err(_) => {
            thread::spawn(work);
        }
    }
}

impl PaneState {
    /// Replace the rows, keeping the cursor on the same name when possible.
    pub fn set_rows(&mut self, mut rows: Vec<FileRow>) {
        let current = self.current_row().map(|row| row.name.clone());
        sort_rows(&mut rows, self.sort_column, self.sort_order);
        self.marked
            .retain(|name| rows.iter().any(|row| &row.name == name));
        self.rows = rows;
        self.selected = current
            .and_then(|name| self.rows.iter().position(|row| row.name == name))
            .unwrap_or(self.selected)
            .min(self.rows.len().saturating_sub(1));
        self.sync_list_state();
    }

    pub fn resort(&mut self) {
        let rows = std::mem::take(&mut self.rows);
        self.set_rows(rows);
    }

    /// Forget cursor and marks, used when the directory changes.
    pub fn reset(&mut self) {
        self.selected = 0;
        self.marked.clear();
        self.list_state = ListState::default();
    }

    fn sync_list_state(&mut self) {
        if self.rows.is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(self.selected));
        }
    }

    pub fn current_row(&self) -> Option<&FileRow> {
        self.rows.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.rows.is_empty() {
            self.selected = (self.selected + 1) % self.rows.len();
            self.sync_list_state();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.rows.is_empty() {
            self.selected = (self.selected + self.rows.len() - 1) % self.rows.len();
            self.sync_list_state();
        }
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.sync_list_state();
    }

    pub fn select_last(&mut self) {
        self.selected = self.rows.len().saturating_sub(1);
        self.sync_list_state();
    }

    pub fn page_down(&mut self, page: usize) {
        self.selected = (self.selected + page).min(self.rows.len().saturating_sub(1));
        self.sync_list_state();
    }

    pub fn page_up(&mut self, page: usize) {
        self.selected = self.selected.saturating_sub(page);
        self.sync_list_state();
    }

    /// Mark or unmark the row under the cursor, then move down.
    pub fn toggle_mark(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        if row.is_parent() {
            return;
        }
        let name = row.name.clone();
        if !self.marked.remove(&name) {
            self.marked.insert(name);
        }
        self.select_next();
    }

    /// Marked rows, or the row under the cursor when nothing is marked.
    pub fn selected_rows(&self) -> Vec<&FileRow> {
        if self.marked.is_empty() {
            self.current_row()
                .filter(|row| !row.is_parent())
                .into_iter()
                .collect()
        } else {
            self.rows
                .iter()
                .filter(|row| self.marked.contains(&row.name))
                .collect()
        }
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected_rows()
            .into_iter()
            .map(|row| row.name.clone())
            .collect()
    }

    pub fn selected_files(&self) -> Vec<String> {
        self.selected_rows()
            .into_iter()
            .filter(|row| !row.is_dir())
            .map(|row| row.name.clone())
            .collect()
    }
}

impl TransferPlan {
    /// Conflicting names still waiting for an answer.
    pub fn conflicts_left(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| self.existing.contains(&job.file_name()))
            .count()
    }
}

impl App {
    pub fn new(config: AppConfig, client: Arc<dyn DeviceClient>) -> Self {
        let local_dir = config
            .last_local_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"));
        let local = LocalFilesystem::new(local_dir);
        let remote = RemoteFilesystem::new(
            client,
            Arc::new(DirectoryCache::new()),
            config.exclusions.clone(),
        );

        let (transfer_sender, transfer_receiver) = mpsc::channel();
        let (cache_sender, cache_receiver) = mpsc::channel();
        let turbo = Arc::new(AtomicBool::new(config.turbo));
        let initial_remote_dir = config.last_remote_dir.clone();

        let mut app = Self {
            should_quit: false,
            config,
            config_manager: None,
            input_mode: InputMode::Normal,
            active_panel: PanelSide::Local,

            status_message: None,
            prompt: None,
            text_input: String::new(),
            rename_target: None,
            help_scroll_position: 0,
            error_log_scroll: 0,

            local,
            remote,
            local_pane: PaneState::default(),
            remote_pane: PaneState::default(),
            local_free: None,
            remote_free: None,
            last_refresh: Instant::now(),

            queue: Arc::new(TransferQueue::new()),
            jobs: Vec::new(),
            progress: HashMap::new(),
            transfer_selected: 0,
            turbo,
            error_log: Arc::new(DeviceErrorLog::new()),
            quitting: false,

            transfer_receiver,
            transfer_sender,
            cache_receiver,
            cache_sender,
            cache_busy: false,
            initial_remote_dir,
            worker: None,
        };
        app.reload_local();
        app
    }

    /// Remember where settings are saved on exit.
    pub fn with_config_manager(mut self, manager: ConfigManager) -> Self {
        self.config_manager = Some(manager);
        self
    }

    /// Start the transfer worker thread. Calling it twice is harmless.
    pub fn start_worker(&mut self) -> io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let worker = TransferWorker::new(
            self.remote.client(),
            Arc::clone(&self.queue),
            self.transfer_sender.clone(),
            Arc::clone(&self.error_log),
            Arc::clone(&self.turbo),
        );
        self.worker = Some(worker.spawn()?);
        tracing::info!("Transfer worker thread started");
        Ok(())
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Put a PVR failure on the status line. A PVR that cannot be reached at
    /// all is also recorded in the error log.
    fn report_device_error(&mut self, what: &str, e: &Error) {
        tracing::warn!("{}: {}", what, e);
        self.set_status_message(format!("Error: {}", e));
        if e.is_unavailable() {
            self.error_log.add(format!("{}:", what), e.diagnostics());
        }
    }

    /// Drop the status message once it has been shown long enough.
    pub fn expire_status_message(&mut self) {
        if let Some((_, shown)) = &self.status_message {
            if shown.elapsed() >= STATUS_MESSAGE_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    pub fn pane(&self, side: PanelSide) -> &PaneState {
        match side {
            PanelSide::Local => &self.local_pane,
            PanelSide::Remote => &self.remote_pane,
        }
    }

    pub fn pane_mut(&mut self, side: PanelSide) -> &mut PaneState {
        match side {
            PanelSide::Local => &mut self.local_pane,
            PanelSide::Remote => &mut self.remote_pane,
        }
    }

    pub fn active_pane(&self) -> &PaneState {
        self.pane(self.active_panel)
    }

    pub fn active_pane_mut(&mut self) -> &mut PaneState {
        self.pane_mut(self.active_panel)
    }

    pub fn switch_panel(&mut self) {
        self.active_panel = self.active_panel.other();
    }

    /// Directory shown in a panel, for titles and path entry.
    pub fn current_dir_label(&self, side: PanelSide) -> String {
        match side {
            PanelSide::Local => self.local.current_dir().display().to_string(),
            PanelSide::Remote => self.remote.current_dir().to_string(),
        }
    }

    // Views

    pub fn reload_local(&mut self) {
        match self.local.list() {
            Ok(rows) => {
                let rows = visible_rows(rows, self.local.has_parent(), self.config.show_hidden);
                self.local_pane.set_rows(rows);
            }
            Err(e) => {
                tracing::warn!("Failed to list local directory: {}", e);
                self.set_status_message(format!("Error: {}", e));
            }
        }
    }

    pub fn reload_remote(&mut self) {
        match self.remote.list() {
            Ok(rows) => {
                let rows =
                    visible_rows(rows, self.remote.has_parent(), self.config.show_hidden);
                self.remote_pane.set_rows(rows);
            }
            Err(e) => {
                tracing::warn!("Failed to list PVR directory: {}", e);
                self.set_status_message(format!("Error: {}", e));
            }
        }
    }

    pub fn reload(&mut self, side: PanelSide) {
        match side {
            PanelSide::Local => self.reload_local(),
            PanelSide::Remote => self.reload_remote(),
        }
    }

    /// Enter the directory under the cursor.
    pub fn open_selected(&mut self) {
        let side = self.active_panel;
        let Some(row) = self.pane(side).current_row().cloned() else {
            return;
        };
        if row.is_dir() {
            self.change_dir(side, &row.name);
        }
    }

    pub fn go_to_parent(&mut self) {
        let has_parent = match self.active_panel {
            PanelSide::Local => self.local.has_parent(),
            PanelSide::Remote => self.remote.has_parent(),
        };
        if has_parent {
            self.change_dir(self.active_panel, "..");
        }
    }

    /// Change directory on one side. A PVR directory that has not been
    /// listed yet is scanned in the background first.
    pub fn change_dir(&mut self, side: PanelSide, dir: &str) {
        match side {
            PanelSide::Local => match self.local.change_dir(dir) {
                Ok(()) => {
                    self.local_pane.reset();
                    self.reload_local();
                    self.local_free = self.local.free_space();
                }
                Err(e) => self.set_status_message(format!("Error: {}", e)),
            },
            PanelSide::Remote => {
                let target = self.remote.resolve(dir);
                if self.remote.needs_scan(&target) {
                    self.request_subtree_rebuild(target);
                    return;
                }
                match self.remote.set_current_dir(&target) {
                    Ok(()) => {
                        self.remote_pane.reset();
                        self.reload_remote();
                    }
                    Err(e) => self.set_status_message(format!("Error: {}", e)),
                }
            }
        }
    }

    pub fn start_path_entry(&mut self) {
        self.text_input = self.current_dir_label(self.active_panel);
        self.input_mode = InputMode::PathEntry;
    }

    pub fn submit_path_entry(&mut self) {
        let path = std::mem::take(&mut self.text_input);
        self.input_mode = InputMode::Normal;
        let path = path.trim();
        if !path.is_empty() {
            self.change_dir(self.active_panel, path);
        }
    }

    pub fn cycle_sort_column(&mut self) {
        let pane = self.active_pane_mut();
        pane.sort_column = pane.sort_column.next();
        pane.resort();
        let label = pane.sort_column.label();
        self.set_status_message(format!("Sorted by {}", label));
    }

    pub fn toggle_sort_order(&mut self) {
        let pane = self.active_pane_mut();
        pane.sort_order = pane.sort_order.toggle();
        pane.resort();
    }

    pub fn toggle_hidden(&mut self) {
        self.config.show_hidden = !self.config.show_hidden;
        self.reload_local();
        self.reload_remote();
        let state = if self.config.show_hidden { "shown" } else { "hidden" };
        self.set_status_message(format!("Hidden files {}", state));
    }

    /// Total bytes of the selected files on one side.
    pub fn selection_size(&self, side: PanelSide) -> u64 {
        let files = self.pane(side).selected_files();
        match side {
            PanelSide::Local => files
                .iter()
                .filter_map(|name| self.local.file_info(name).ok())
                .map(|(size, _)| size)
                .sum(),
            PanelSide::Remote => files
                .iter()
                .filter_map(|name| self.remote.find(name))
                .map(|entry| entry.size)
                .sum(),
        }
    }

    // Background cache work

    /// Rebuild the whole PVR cache without blocking the UI.
    pub fn request_cache_rebuild(&mut self) {
        if self.cache_busy {
            tracing::debug!("Cache rebuild already running");
            return;
        }
        self.cache_busy = true;

        let client = self.remote.client();
        let cache = self.remote.cache();
        let exclusions = self.remote.exclusions().to_vec();
        let sender = self.cache_sender.clone();
        spawn_background(move || {
            let event = match update_cache(client.as_ref(), &cache, &exclusions) {
                Ok(root_readable) => CacheEvent::Rebuilt { root_readable },
                Err(e) => CacheEvent::Error(e),
            };
            let _ = sender.send(event);
        });
    }

    /// List one PVR directory in the background, then move into it.
    pub fn request_subtree_rebuild(&mut self, path: String) {
        if self.cache_busy {
            self.set_status_message("Reading the PVR, try again in a moment");
            return;
        }
        self.cache_busy = true;
        self.set_status_message(format!("Reading {}...", path));

        let client = self.remote.client();
        let cache = self.remote.cache();
        let exclusions = self.remote.exclusions().to_vec();
        let sender = self.cache_sender.clone();
        spawn_background(move || {
            let event = match cache.rebuild_subtree(client.as_ref(), &path, &exclusions) {
                Ok(()) => CacheEvent::SubtreeRebuilt(path),
                Err(e) => CacheEvent::Error(e),
            };
            let _ = sender.send(event);
        });
    }

    pub fn process_cache_events(&mut self) {
        while let Ok(event) = self.cache_receiver.try_recv() {
            self.cache_busy = false;
            match event {
                CacheEvent::Rebuilt { root_readable } => {
                    if !root_readable {
                        self.set_status_message("Could not read the PVR, showing old contents");
                        self.error_log.add(
                            "Failed to read the PVR:",
                            "The root directory could not be listed, showing old contents",
                        );
                    }
                    if let Some(dir) = self.initial_remote_dir.take() {
                        if let Err(e) = self.remote.set_current_dir(&dir) {
                            tracing::debug!("Not restoring PVR directory: {}", e);
                        }
                    }
                    self.remote.ensure_current_dir();
                    self.reload_remote();
                }
                CacheEvent::SubtreeRebuilt(path) => {
                    match self.remote.set_current_dir(&path) {
                        Ok(()) => {
                            self.remote_pane.reset();
                            self.reload_remote();
                            if self.remote.is_unreadable() {
                                self.set_status_message(format!("Could not read {}", path));
                            } else {
                                self.status_message = None;
                            }
                        }
                        Err(e) => self.set_status_message(format!("Error: {}", e)),
                    }
                }
                CacheEvent::Error(e) => self.report_device_error("Failed to read the PVR", &e),
            }
        }
    }

    pub fn update_free_space(&mut self) {
        self.local_free = self.local.free_space();
        match self.remote.free_space() {
            Ok(space) => self.remote_free = Some(space),
            Err(e) if e.is_unavailable() => {
                self.report_device_error("Failed to get the PVR free space", &e)
            }
            Err(e) => tracing::debug!("No PVR free space: {}", e),
        }
    }

    /// Reload both sides and the free space figures.
    pub fn refresh_all(&mut self) {
        self.reload_local();
        self.update_free_space();
        self.request_cache_rebuild();
        self.last_refresh = Instant::now();
    }

    /// Called once per loop iteration of the UI.
    pub fn tick(&mut self) {
        self.process_transfer_events();
        self.process_cache_events();
        self.expire_status_message();

        let interval = Duration::from_secs(self.config.refresh_interval_secs);
        if !self.quitting && self.last_refresh.elapsed() >= interval {
            tracing::debug!("Periodic refresh");
            self.refresh_all();
        }
    }

    // Transfers

    pub fn job(&self, id: u64) -> Option<&Arc<TransferJob>> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Build jobs for the selected files and queue them, asking about low
    /// disk space and existing files first.
    pub fn request_transfer(&mut self, direction: Direction) {
        if self.quitting {
            return;
        }
        let source = match direction {
            Direction::Upload => PanelSide::Local,
            Direction::Download => PanelSide::Remote,
        };
        let names = self.pane(source).selected_files();
        if names.is_empty() {
            self.set_status_message(format!("Select files to {}", direction.verb()));
            return;
        }

        let mut jobs = VecDeque::new();
        for name in names {
            match direction {
                Direction::Download => match self.remote.find(&name) {
                    Some(entry) => jobs.push_back(TransferJob::download(
                        self.remote.abspath(&name),
                        self.local.abspath(&name),
                        entry.date,
                        entry.size,
                    )),
                    None => tracing::warn!("{} is no longer in the PVR cache", name),
                },
                Direction::Upload => match self.local.file_info(&name) {
                    Ok((size, date)) => jobs.push_back(TransferJob::upload(
                        self.local.abspath(&name),
                        self.remote.abspath(&name),
                        date,
                        size,
                    )),
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", name, e);
                        self.set_status_message(format!("Error: {}", e));
                    }
                },
            }
        }
        if jobs.is_empty() {
            return;
        }

        let plan = TransferPlan {
            direction,
            jobs,
            accepted: Vec::new(),
            replace_all: false,
            existing: self.destination_names(direction),
        };

        let needed: u64 = plan.jobs.iter().map(|job| job.size).sum();
        if let Some(free) = self.destination_free_space(direction) {
            if needed > free {
                self.show_prompt(Prompt::LowSpace { plan, needed, free });
                return;
            }
        }
        self.continue_plan(plan);
    }

    fn destination_names(&self, direction: Direction) -> HashSet<String> {
        match direction {
            Direction::Download => self
                .local
                .list()
                .map(|rows| rows.into_iter().map(|row| row.name).collect())
                .unwrap_or_default(),
            Direction::Upload => self.remote.existing_names().unwrap_or_else(|e| {
                tracing::debug!("Using cached PVR names: {}", e);
                self.remote
                    .entries()
                    .map(|entries| entries.into_iter().map(|entry| entry.name).collect())
                    .unwrap_or_default()
            }),
        }
    }

    fn destination_free_space(&mut self, direction: Direction) -> Option<u64> {
        match direction {
            Direction::Download => {
                self.local_free = self.local.free_space();
                self.local_free.map(|space| space.free)
            }
            Direction::Upload => match self.remote.free_space() {
                Ok(space) => {
                    self.remote_free = Some(space);
                    Some(space.free)
                }
                Err(e) => {
                    tracing::debug!("Skipping PVR free space check: {}", e);
                    None
                }
            },
        }
    }

    /// Accept jobs until one needs an overwrite answer, then queue them all.
    fn continue_plan(&mut self, mut plan: TransferPlan) {
        while let Some(job) = plan.jobs.pop_front() {
            let name = job.file_name();
            if !plan.replace_all && plan.existing.contains(&name) {
                plan.jobs.push_front(job);
                self.show_prompt(Prompt::Overwrite { plan, name });
                return;
            }
            plan.accepted.push(job);
        }
        self.enqueue(plan.direction, plan.accepted);
    }

    fn enqueue(&mut self, direction: Direction, jobs: Vec<TransferJob>) {
        if jobs.is_empty() {
            self.set_status_message(format!("Nothing to {}", direction.verb()));
            return;
        }
        let mut queued = 0;
        for job in jobs {
            let job = Arc::new(job);
            if self.queue.push(Arc::clone(&job)) {
                self.jobs.push(job);
                queued += 1;
            }
        }
        tracing::info!("Queued {} {}(s)", queued, direction.verb());
        self.set_status_message(format!("Queued {} file(s) to {}", queued, direction.verb()));
        self.local_pane.marked.clear();
        self.remote_pane.marked.clear();
    }

    /// Cancel a job. A running transfer is also stopped on the PVR.
    pub fn cancel_job(&mut self, id: u64) {
        let Some(job) = self.job(id).cloned() else {
            return;
        };
        let transferring = job.status() == JobStatus::Transferring;
        job.cancel();
        if transferring {
            self.remote.client().cancel_transfer();
        }
        tracing::info!("Cancelled job {}", id);
    }

    pub fn cancel_selected_transfer(&mut self) {
        if let Some(id) = self.jobs.get(self.transfer_selected).map(|job| job.id) {
            self.cancel_job(id);
        }
    }

    pub fn select_next_transfer(&mut self) {
        if !self.jobs.is_empty() {
            self.transfer_selected = (self.transfer_selected + 1) % self.jobs.len();
        }
    }

    pub fn select_previous_transfer(&mut self) {
        if !self.jobs.is_empty() {
            self.transfer_selected =
                (self.transfer_selected + self.jobs.len() - 1) % self.jobs.len();
        }
    }

    /// Flag the last unfinished job so the program exits after it.
    pub fn toggle_quit_after_transfer(&mut self) {
        let Some(job) = self
            .jobs
            .iter()
            .rev()
            .find(|job| !job.status().is_terminal())
            .cloned()
        else {
            self.set_status_message("No transfers queued");
            return;
        };
        let quit = !job.quit_after_transfer();
        job.set_quit_after_transfer(quit);
        if quit {
            self.set_status_message(format!("Quitting after {}", job.file_name()));
        } else {
            self.set_status_message("Quit after transfer cancelled");
        }
    }

    /// Forget finished, failed and cancelled jobs.
    pub fn clear_completed(&mut self) {
        self.queue.drain_completed();
        self.jobs.retain(|job| !job.status().is_terminal());
        let live: HashSet<u64> = self.jobs.iter().map(|job| job.id).collect();
        self.progress.retain(|id, _| live.contains(id));
        self.transfer_selected = self
            .transfer_selected
            .min(self.jobs.len().saturating_sub(1));
    }

    pub fn toggle_turbo(&mut self) {
        let turbo = !self.turbo.load(Ordering::Relaxed);
        self.turbo.store(turbo, Ordering::Relaxed);
        self.config.turbo = turbo;
        let state = if turbo { "on" } else { "off" };
        self.set_status_message(format!("Turbo mode {}", state));
    }

    pub fn turbo_enabled(&self) -> bool {
        self.turbo.load(Ordering::Relaxed)
    }

    pub fn process_transfer_events(&mut self) {
        while let Ok(event) = self.transfer_receiver.try_recv() {
            match event {
                TransferEvent::JobStarted(id) => {
                    if let Some(job) = self.job(id).cloned() {
                        self.set_status_message(format!(
                            "Starting {} of {}",
                            job.direction.verb(),
                            job.file_name()
                        ));
                    }
                }
                TransferEvent::Progress { job_id, progress } => {
                    self.progress.insert(job_id, progress);
                }
                TransferEvent::JobFinished { job_id, status } => {
                    let name = self
                        .job(job_id)
                        .map(|job| job.file_name())
                        .unwrap_or_default();
                    let message = match status {
                        JobStatus::Failed => {
                            format!("Error: transfer of {} failed, press e for details", name)
                        }
                        _ => format!("{}: {}", status, name),
                    };
                    self.set_status_message(message);
                }
                TransferEvent::RefreshViews => {
                    if !self.quitting {
                        self.refresh_all();
                    }
                }
                TransferEvent::Shutdown => {
                    self.join_worker();
                    self.should_quit = true;
                }
            }
        }
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Transfer worker panicked");
            }
        }
    }

    /// Stop all transfers and let the worker wind down. The program exits
    /// once the worker reports that it has stopped.
    pub fn request_quit(&mut self) {
        if self.quitting {
            return;
        }
        self.quitting = true;
        tracing::info!("Quit requested");

        for job in self.queue.drain_pending() {
            job.cancel();
        }
        let in_flight = self
            .jobs
            .iter()
            .filter(|job| job.status() == JobStatus::Transferring)
            .cloned()
            .collect::<Vec<_>>();
        for job in &in_flight {
            job.cancel();
        }
        if !in_flight.is_empty() {
            self.remote.client().cancel_transfer();
        }
        self.queue.push_shutdown();

        if self.worker.is_none() {
            self.should_quit = true;
        } else {
            self.set_status_message("Stopping transfers...");
        }
    }

    /// Write the last directories and toggles back to the config file.
    pub fn save_state(&mut self) -> anyhow::Result<()> {
        self.config.last_local_dir = Some(self.local.current_dir().to_path_buf());
        self.config.last_remote_dir = Some(self.remote.current_dir().to_string());
        self.config.turbo = self.turbo_enabled();
        if let Some(manager) = &self.config_manager {
            manager.save_config(&self.config)?;
        }
        Ok(())
    }

    // File operations

    pub fn make_dir(&mut self) {
        let side = self.active_panel;
        let result = match side {
            PanelSide::Local => self.local.mkdir(),
            PanelSide::Remote => self.remote.mkdir(),
        };
        match result {
            Ok(name) => {
                self.set_status_message(format!("Created {}", name));
                self.after_file_ops(side);
            }
            Err(e) => self.report_device_error("Failed to create a folder", &e),
        }
    }

    pub fn request_delete(&mut self) {
        let side = self.active_panel;
        let names = self.pane(side).selected_names();
        if names.is_empty() {
            return;
        }
        self.show_prompt(Prompt::ConfirmDelete { side, names });
    }

    pub fn start_rename(&mut self) {
        let Some(row) = self.active_pane().current_row().cloned() else {
            return;
        };
        if row.is_parent() {
            return;
        }
        self.text_input = row.name.clone();
        self.rename_target = Some(row.name);
        self.input_mode = InputMode::Rename;
    }

    pub fn submit_rename(&mut self) {
        let new = std::mem::take(&mut self.text_input).trim().to_string();
        self.input_mode = InputMode::Normal;
        let Some(old) = self.rename_target.take() else {
            return;
        };
        if new.is_empty() || new == old {
            return;
        }
        let side = self.active_panel;
        self.run_file_ops(
            side,
            vec![FileOp::Rename {
                old,
                new,
                overwrite: false,
            }],
        );
    }

    pub fn cancel_text_input(&mut self) {
        self.text_input.clear();
        self.rename_target = None;
        self.input_mode = InputMode::Normal;
    }

    fn apply_file_op(&self, side: PanelSide, op: &FileOp) -> Result<()> {
        match (side, op) {
            (PanelSide::Local, FileOp::Delete(name)) => self.local.delete(name),
            (PanelSide::Remote, FileOp::Delete(name)) => self.remote.delete(name),
            (PanelSide::Local, FileOp::Rename { old, new, overwrite }) => {
                self.local.rename(old, new, *overwrite)
            }
            (PanelSide::Remote, FileOp::Rename { old, new, overwrite }) => {
                self.remote.rename(old, new, *overwrite)
            }
        }
    }

    /// Run a batch of deletes and renames. A failure stops the batch on a
    /// prompt that can resume it.
    fn run_file_ops(&mut self, side: PanelSide, ops: Vec<FileOp>) {
        let mut ops = VecDeque::from(ops);
        while let Some(op) = ops.pop_front() {
            match self.apply_file_op(side, &op) {
                Ok(()) => tracing::info!("{:?} on {} done", op, side.label()),
                Err(Error::NameConflict(_)) if matches!(op, FileOp::Rename { .. }) => {
                    if let FileOp::Rename { old, new, .. } = op {
                        self.show_prompt(Prompt::RenameConflict {
                            side,
                            old,
                            new,
                            remaining: ops.into(),
                        });
                    }
                    self.after_file_ops(side);
                    return;
                }
                Err(e) => {
                    tracing::warn!("{:?} on {} failed: {}", op, side.label(), e);
                    if e.is_unavailable() {
                        let (FileOp::Delete(name) | FileOp::Rename { old: name, .. }) = &op;
                        self.error_log
                            .add(format!("Failed to change:\n{}", name), e.diagnostics());
                    }
                    self.show_prompt(Prompt::OperationFailed {
                        side,
                        failed: op,
                        remaining: ops.into(),
                        message: e.to_string(),
                    });
                    self.after_file_ops(side);
                    return;
                }
            }
        }
        self.after_file_ops(side);
    }

    fn after_file_ops(&mut self, side: PanelSide) {
        self.pane_mut(side).marked.clear();
        match side {
            PanelSide::Local => self.reload_local(),
            PanelSide::Remote => {
                let dir = self.remote.current_dir().to_string();
                self.request_subtree_rebuild(dir);
            }
        }
    }

    // Prompts

    fn show_prompt(&mut self, prompt: Prompt) {
        self.prompt = Some(prompt);
        self.input_mode = InputMode::Prompt;
    }

    pub fn answer_prompt(&mut self, answer: PromptAnswer) {
        let Some(prompt) = self.prompt.take() else {
            self.input_mode = InputMode::Normal;
            return;
        };
        self.input_mode = InputMode::Normal;

        match (prompt, answer) {
            (Prompt::LowSpace { plan, .. }, PromptAnswer::Yes) => self.continue_plan(plan),
            (Prompt::LowSpace { .. }, PromptAnswer::No) => {
                self.set_status_message("Transfer cancelled");
            }

            (Prompt::Overwrite { mut plan, .. }, PromptAnswer::Skip | PromptAnswer::No) => {
                plan.jobs.pop_front();
                self.continue_plan(plan);
            }
            (Prompt::Overwrite { mut plan, .. }, PromptAnswer::Replace | PromptAnswer::Yes) => {
                if let Some(job) = plan.jobs.pop_front() {
                    plan.accepted.push(job);
                }
                self.continue_plan(plan);
            }
            (Prompt::Overwrite { mut plan, .. }, PromptAnswer::ReplaceAll) => {
                plan.replace_all = true;
                self.continue_plan(plan);
            }

            (Prompt::ConfirmDelete { side, names }, PromptAnswer::Yes) => {
                let ops = names.into_iter().map(FileOp::Delete).collect();
                self.run_file_ops(side, ops);
            }
            (Prompt::ConfirmDelete { .. }, PromptAnswer::No) => {}

            (
                Prompt::OperationFailed {
                    side,
                    failed,
                    remaining,
                    ..
                },
                PromptAnswer::Retry,
            ) => {
                let mut ops = vec![failed];
                ops.extend(remaining);
                self.run_file_ops(side, ops);
            }
            (
                Prompt::OperationFailed {
                    side, remaining, ..
                },
                PromptAnswer::Skip | PromptAnswer::No,
            ) => self.run_file_ops(side, remaining),

            (
                Prompt::RenameConflict {
                    side,
                    old,
                    new,
                    remaining,
                },
                PromptAnswer::Replace | PromptAnswer::Yes,
            ) => {
                let mut ops = vec![FileOp::Rename {
                    old,
                    new,
                    overwrite: true,
                }];
                ops.extend(remaining);
                self.run_file_ops(side, ops);
            }
            (
                Prompt::RenameConflict {
                    side, remaining, ..
                },
                PromptAnswer::Skip | PromptAnswer::No,
            ) => self.run_file_ops(side, remaining),

            // Not an answer this prompt offers.
            (prompt, _) => self.show_prompt(prompt),
        }
    }

    /// Escape on a prompt: the safe choice for each kind.
    pub fn dismiss_prompt(&mut self) {
        let answer = match &self.prompt {
            Some(Prompt::Overwrite { .. })
            | Some(Prompt::OperationFailed { .. })
            | Some(Prompt::RenameConflict { .. }) => PromptAnswer::Skip,
            _ => PromptAnswer::No,
        };
        self.answer_prompt(answer);
    }

    /// Choices offered by the open prompt, for the popup.
    pub fn prompt_choices(&self) -> Vec<(&'static str, PromptAnswer)> {
        match &self.prompt {
            Some(Prompt::LowSpace { .. }) | Some(Prompt::ConfirmDelete { .. }) => {
                vec![("[y] Yes", PromptAnswer::Yes), ("[n] No", PromptAnswer::No)]
            }
            Some(Prompt::Overwrite { plan, .. }) => {
                let mut choices = vec![
                    ("[s] Skip", PromptAnswer::Skip),
                    ("[r] Replace", PromptAnswer::Replace),
                ];
                if plan.conflicts_left() > 1 {
                    choices.push(("[a] Replace All", PromptAnswer::ReplaceAll));
                }
                choices
            }
            Some(Prompt::OperationFailed { .. }) => vec![
                ("[s] Skip", PromptAnswer::Skip),
                ("[r] Retry", PromptAnswer::Retry),
            ],
            Some(Prompt::RenameConflict { .. }) => vec![
                ("[r] Replace", PromptAnswer::Replace),
                ("[s] Skip", PromptAnswer::Skip),
            ],
            None => Vec::new(),
        }
    }

    // Popups

    pub fn show_error_log(&mut self) {
        self.error_log.mark_seen();
        self.error_log_scroll = 0;
        self.input_mode = InputMode::ErrorLog;
    }

    pub fn show_help(&mut self) {
        self.help_scroll_position = 0;
        self.input_mode = InputMode::Help;
    }

    pub fn close_popup(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    /// Names marked in a pane, for drawing.
    pub fn marked(&self, side: PanelSide) -> &BTreeSet<String> {
        &self.pane(side).marked
    }
}
