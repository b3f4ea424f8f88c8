//! binsort - review images sorted into two label folders
//!
//! This library loads images from the two bucket subdirectories of a root
//! folder, tracks relabeling in a review session, and commits pending changes
//! by moving files between the buckets while keeping an append-only activity
//! log next to them.

pub mod activity_log;
pub mod apply;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod fs;
pub mod label;
pub mod output;
pub mod session;

pub use activity_log::{ActionKind, ActivityLog, JsonLogFile, LogEntry, LogError, LogStore};
pub use apply::{ApplyEngine, ApplyResult, MoveError, PlannedMove};
pub use catalog::{CatalogError, Item};
pub use config::{ConfigError, ReviewConfig, Settings};
pub use fs::{FileSystem, MemoryFs, RealFs};
pub use label::{Buckets, Label};
pub use session::{LabelSession, SessionError};

pub use cli::{Cli, ReviewCommand, run_cli};
