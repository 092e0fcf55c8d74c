//! Runs the dump or import of each persistent system against the run's storage.
//!

use core::fmt;

use artifact_store::StorageError;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    context::BackupContext,
    persistence::{DumpError, IncompleteSystemDump, SystemDump},
    remote::RemoteShell,
};

/// The file extension of artifacts.
pub const ARTIFACT_EXTENSION: &str = "backup";

/// What a run does with each system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Dump each system into its artifact.
    Export,
    /// Restore each system from its artifact.
    Import,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export => f.write_str("backup"),
            Self::Import => f.write_str("restore"),
        }
    }
}

/// The artifact name of `component`.
pub fn artifact_name(component: &str) -> String {
    format!("{component}.{ARTIFACT_EXTENSION}")
}

/// Sequences the drivers of a list of systems.
pub struct Dispatcher<'a> {
    context: &'a BackupContext,
    shell: &'a dyn RemoteShell,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher storing artifacts in `context`, reaching systems through `shell`.
    pub fn new(context: &'a BackupContext, shell: &'a dyn RemoteShell) -> Self {
        Self { context, shell }
    }

    /// Run `action` for each system in order, stopping at the first failure.
    pub fn run_db_action(&self, dumps: &[SystemDump], action: Action) -> Result<(), DispatchError> {
        for dump in dumps {
            debug!("[{action}] [{}/{}] Starting", dump.product, dump.component);

            if let Err(incomplete) = dump.validate() {
                error!("[{action}] [{}] {incomplete}", dump.component);
                return Err(DispatchError::InvalidSystemDump(incomplete));
            }

            self.run_one(dump, action)?;
        }

        Ok(())
    }

    fn run_one(&self, dump: &SystemDump, action: Action) -> Result<(), DispatchError> {
        let component = dump.component.as_str();
        let driver = dump
            .persistence_driver(self.shell)
            .map_err(|source| DispatchError::Driver {
                component: component.to_string(),
                source,
            })?;

        let name = artifact_name(component);
        let path = [self.context.target_directory(), name.as_str()];
        let storage_error = |source| DispatchError::Storage {
            component: component.to_string(),
            source,
        };

        match action {
            Action::Export => {
                info!("[{action}] [{component}] Exporting");
                let mut writer = self.context.provider().writer(&path).map_err(storage_error)?;

                driver
                    .dump(&mut writer)
                    .map_err(|source| DispatchError::Dump {
                        component: component.to_string(),
                        source,
                    })?;

                writer.finish().map_err(storage_error)?;
                info!("[{action}] [{component}] Exported");
            }

            Action::Import => {
                info!("[{action}] [{component}] Restoring");
                let mut reader = match self.context.provider().reader(&path) {
                    Ok(reader) => reader,
                    Err(StorageError::NotFound(artifact)) => {
                        return Err(DispatchError::ArtifactNotFound(artifact));
                    }
                    Err(error) => return Err(storage_error(error)),
                };

                driver
                    .import(&mut reader)
                    .map_err(|source| DispatchError::Import {
                        component: component.to_string(),
                        source,
                    })?;
                info!("[{action}] [{component}] Restored");
            }
        }

        Ok(())
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidSystemDump(IncompleteSystemDump),

    #[error("Failed to create the driver for '{component}': {source}")]
    Driver {
        component: String,
        #[source]
        source: DumpError,
    },

    #[error("Failed to access the artifact of '{component}': {source}")]
    Storage {
        component: String,
        #[source]
        source: StorageError,
    },

    #[error("No backup artifact exists at '{0}'")]
    ArtifactNotFound(String),

    #[error("Failed to dump '{component}': {source}")]
    Dump {
        component: String,
        #[source]
        source: DumpError,
    },

    #[error("Failed to restore '{component}': {source}")]
    Import {
        component: String,
        #[source]
        source: DumpError,
    },
}
