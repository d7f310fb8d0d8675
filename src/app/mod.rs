pub mod keymap;
mod state;
mod types;

pub use state::STATUS_MESSAGE_TIMEOUT;
pub use types::{App, FileOp, InputMode, PaneState, PanelSide, Prompt, PromptAnswer, TransferPlan};
