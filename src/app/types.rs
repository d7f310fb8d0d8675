use ratatui::widgets::ListState;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::config::{AppConfig, ConfigManager};
use crate::device::{FreeSpace, Progress};
use crate::error_log::DeviceErrorLog;
use crate::events::{CacheEvent, TransferEvent};
use crate::fs::{FileRow, LocalFilesystem, RemoteFilesystem, SortColumn, SortOrder};
use crate::transfer::{Direction, TransferJob, TransferQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    PathEntry,
    Rename,
    Prompt,
    Help,
    ErrorLog,
}

/// Which file panel has the focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelSide {
    Local,
    Remote,
}

impl PanelSide {
    pub fn other(self) -> Self {
        match self {
            PanelSide::Local => PanelSide::Remote,
            PanelSide::Remote => PanelSide::Local,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PanelSide::Local => "Computer",
            PanelSide::Remote => "PVR",
        }
    }
}

/// Rows and cursor of one file panel.
#[derive(Debug, Default)]
pub struct PaneState {
    pub rows: Vec<FileRow>,
    pub selected: usize,
    /// Names marked for a batch operation.
    pub marked: BTreeSet<String>,
    pub sort_column: SortColumn,
    pub sort_order: SortOrder,
    pub list_state: ListState,
}

/// A change to one of the filesystems, kept so it can be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Delete(String),
    Rename {
        old: String,
        new: String,
        overwrite: bool,
    },
}

/// Jobs waiting for the user to settle overwrites before they are queued.
#[derive(Debug)]
pub struct TransferPlan {
    pub direction: Direction,
    /// Jobs not yet looked at, the head may be waiting on a prompt.
    pub jobs: VecDeque<TransferJob>,
    pub accepted: Vec<TransferJob>,
    pub replace_all: bool,
    /// Names already present at the destination.
    pub existing: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    Skip,
    Replace,
    ReplaceAll,
    Retry,
}

#[derive(Debug)]
pub enum Prompt {
    /// The selection does not fit. Continue anyway?
    LowSpace {
        plan: TransferPlan,
        needed: u64,
        free: u64,
    },
    /// Skip / Replace / Replace All.
    Overwrite { plan: TransferPlan, name: String },
    ConfirmDelete { side: PanelSide, names: Vec<String> },
    /// Skip / Retry for a failed delete or rename.
    OperationFailed {
        side: PanelSide,
        failed: FileOp,
        remaining: Vec<FileOp>,
        message: String,
    },
    /// Replace / Skip when a rename target exists.
    RenameConflict {
        side: PanelSide,
        old: String,
        new: String,
        remaining: Vec<FileOp>,
    },
}

pub struct App {
    pub should_quit: bool,
    pub config: AppConfig,
    pub config_manager: Option<ConfigManager>,
    pub input_mode: InputMode,
    pub active_panel: PanelSide,

    pub status_message: Option<(String, Instant)>,
    pub prompt: Option<Prompt>,
    pub text_input: String,
    pub rename_target: Option<String>,
    pub help_scroll_position: u16,
    pub error_log_scroll: u16,

    // File panels
    pub local: LocalFilesystem,
    pub remote: RemoteFilesystem,
    pub local_pane: PaneState,
    pub remote_pane: PaneState,
    pub local_free: Option<FreeSpace>,
    pub remote_free: Option<FreeSpace>,
    pub last_refresh: Instant,

    // Transfers
    pub queue: Arc<TransferQueue>,
    pub jobs: Vec<Arc<TransferJob>>,
    pub progress: HashMap<u64, Progress>,
    pub transfer_selected: usize,
    pub turbo: Arc<AtomicBool>,
    pub error_log: Arc<DeviceErrorLog>,
    pub quitting: bool,

    pub transfer_receiver: Receiver<TransferEvent>,
    pub(super) transfer_sender: Sender<TransferEvent>,
    pub cache_receiver: Receiver<CacheEvent>,
    pub(super) cache_sender: Sender<CacheEvent>,
    pub cache_busy: bool,
    pub(super) initial_remote_dir: Option<String>,
    pub(super) worker: Option<JoinHandle<()>>,
}
