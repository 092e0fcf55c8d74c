//! # runtime-backup
//! Backs up and restores the persistent systems of a runtime deployment, stopping its routing
//! tier for the duration.
//!

pub mod config;
pub mod context;
pub mod director;
pub mod dispatch;
pub mod orchestrator;
pub mod persistence;
pub mod remote;
pub mod toggler;
pub mod topology;

pub use config::{Config, LoadConfigError};
pub use context::{BackupContext, StorageSettings};
pub use orchestrator::{BackupError, Orchestrator, OrchestratorSettings};
