pub mod ai;
pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod editing;
pub mod notes;
pub mod search;
pub mod storage;

pub use app::{Workspace, WorkspaceEvent};
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
