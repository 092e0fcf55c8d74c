use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{DumpError, PersistenceDriver};
use crate::remote::RemoteExecutor;

const STORE_DIRECTORY: &str = "/var/vcap/store";
const ARCHIVE_DIRECTORY: &str = "shared";

/// How much of the blob store is backed up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfsBackupType {
    /// Everything.
    #[default]
    Full,
    /// Everything except the resource cache.
    Lite,
    /// Only the buildpacks.
    Skip,
}

/// The NFS blob store on a deployment VM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NfsTarget {
    /// How much is backed up.
    pub backup_type: NfsBackupType,
}

/// Archives the blob store with `tar`.
pub struct NfsDump {
    target: NfsTarget,
    executor: Box<dyn RemoteExecutor>,
}

impl NfsDump {
    /// Create a driver that runs its commands through `executor`.
    pub fn new(target: NfsTarget, executor: Box<dyn RemoteExecutor>) -> Self {
        Self { target, executor }
    }

    /// The command that writes the gzipped archive to stdout.
    pub fn dump_command(&self) -> String {
        match self.target.backup_type {
            NfsBackupType::Full => format!("cd {STORE_DIRECTORY} && tar cz {ARCHIVE_DIRECTORY}"),
            NfsBackupType::Lite => format!(
                "cd {STORE_DIRECTORY} && tar cz --exclude=cc-resources {ARCHIVE_DIRECTORY}"
            ),
            NfsBackupType::Skip => format!(
                "cd {STORE_DIRECTORY} && tar cz --wildcards '{ARCHIVE_DIRECTORY}/*/cc-buildpacks/*'"
            ),
        }
    }

    /// The command that extracts the archive read from stdin.
    pub fn import_command(&self) -> String {
        format!("cd {STORE_DIRECTORY} && tar zx")
    }
}

impl PersistenceDriver for NfsDump {
    fn dump(&self, sink: &mut dyn Write) -> Result<(), DumpError> {
        info!("Archiving blob store ({:?})", self.target.backup_type);
        self.executor
            .run_to(&self.dump_command(), sink)
            .map_err(|e| DumpError::Execute(e, "archive blob store"))
    }

    fn import(&self, source: &mut dyn Read) -> Result<(), DumpError> {
        info!("Extracting blob store");
        self.executor
            .run_from(&self.import_command(), source)
            .map_err(|e| DumpError::Execute(e, "extract blob store"))
    }
}
