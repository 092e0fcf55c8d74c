use std::io::{Read, Write};

use tracing::info;

use super::{DumpError, DumpUtilities, PersistenceDriver};
use crate::remote::{RemoteExecutor, shell_quote};

/// A mysql server on a deployment VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlTarget {
    /// Where the dump utilities are installed.
    pub utilities: DumpUtilities,
}

/// Dumps every database of a mysql server with `mysqldump`, and restores them with `mysql`.
pub struct MysqlDump {
    target: MysqlTarget,
    user: String,
    password: String,
    executor: Box<dyn RemoteExecutor>,
}

impl MysqlDump {
    /// Create a driver that runs its commands through `executor`.
    pub fn new(
        target: MysqlTarget,
        user: &str,
        password: &str,
        executor: Box<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            target,
            user: user.to_string(),
            password: password.to_string(),
            executor,
        }
    }

    /// The command that writes the dump to stdout.
    pub fn dump_command(&self) -> String {
        format!(
            "{} -u {} -h localhost --password={} --all-databases --single-transaction",
            self.target.utilities.mysqldump,
            shell_quote(&self.user),
            shell_quote(&self.password)
        )
    }

    /// The command that restores the dump read from stdin.
    pub fn import_command(&self) -> String {
        format!(
            "{} -u {} -h localhost --password={}",
            self.target.utilities.mysql,
            shell_quote(&self.user),
            shell_quote(&self.password)
        )
    }
}

impl PersistenceDriver for MysqlDump {
    fn dump(&self, sink: &mut dyn Write) -> Result<(), DumpError> {
        info!("Dumping mysql databases");
        self.executor
            .run_to(&self.dump_command(), sink)
            .map_err(|e| DumpError::Execute(e, "dump mysql databases"))
    }

    fn import(&self, source: &mut dyn Read) -> Result<(), DumpError> {
        info!("Restoring mysql databases");
        self.executor
            .run_from(&self.import_command(), source)
            .map_err(|e| DumpError::Execute(e, "restore mysql databases"))
    }
}
