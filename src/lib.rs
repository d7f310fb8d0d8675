//! Two-pane terminal file manager for Topfield PVRs. The PVR is only reached
//! through the external `puppy` helper.

pub mod app;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod error_log;
pub mod events;
pub mod fs;
pub mod transfer;
pub mod ui;
