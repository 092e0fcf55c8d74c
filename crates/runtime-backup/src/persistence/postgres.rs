use std::io::{Read, Write};

use tracing::info;

use super::{DumpError, DumpUtilities, PersistenceDriver};
use crate::remote::{RemoteExecutor, shell_quote};

/// The port the platform's postgres servers listen on.
pub const POSTGRES_PORT: u16 = 2544;

/// A postgres database on a deployment VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresTarget {
    /// The database name.
    pub database: String,
    /// The server port.
    pub port: u16,
    /// Where the dump utilities are installed.
    pub utilities: DumpUtilities,
}

impl PostgresTarget {
    /// A database on the default port.
    pub fn new(database: impl Into<String>, utilities: DumpUtilities) -> Self {
        Self {
            database: database.into(),
            port: POSTGRES_PORT,
            utilities,
        }
    }
}

/// Dumps a postgres database in the custom archive format with `pg_dump`, and restores it with
/// `pg_restore`.
pub struct PostgresDump {
    target: PostgresTarget,
    user: String,
    password: String,
    executor: Box<dyn RemoteExecutor>,
}

impl PostgresDump {
    /// Create a driver that runs its commands through `executor`.
    pub fn new(
        target: PostgresTarget,
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

    fn connection_args(&self) -> String {
        format!(
            "-h localhost -U {} -p {}",
            shell_quote(&self.user),
            self.target.port
        )
    }

    /// The command that writes the dump to stdout.
    pub fn dump_command(&self) -> String {
        format!(
            "PGPASSWORD={} {} -Fc {} {}",
            shell_quote(&self.password),
            self.target.utilities.pg_dump,
            self.connection_args(),
            shell_quote(&self.target.database)
        )
    }

    /// The command that restores the dump read from stdin.
    pub fn import_command(&self) -> String {
        format!(
            "PGPASSWORD={} {} -c {} -d {}",
            shell_quote(&self.password),
            self.target.utilities.pg_restore,
            self.connection_args(),
            shell_quote(&self.target.database)
        )
    }
}

impl PersistenceDriver for PostgresDump {
    fn dump(&self, sink: &mut dyn Write) -> Result<(), DumpError> {
        info!("Dumping postgres database '{}'", self.target.database);
        self.executor
            .run_to(&self.dump_command(), sink)
            .map_err(|e| DumpError::Execute(e, "dump postgres database"))
    }

    fn import(&self, source: &mut dyn Read) -> Result<(), DumpError> {
        info!("Restoring postgres database '{}'", self.target.database);
        self.executor
            .run_from(&self.import_command(), source)
            .map_err(|e| DumpError::Execute(e, "restore postgres database"))
    }
}
