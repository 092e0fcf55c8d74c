//! Persistent systems of a deployment and the drivers that dump and restore them.
//!

use core::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::{ExecuteError, RemoteShell, SshTarget};

mod mysql;
mod nfs;
mod postgres;
mod systems;

pub use mysql::{MysqlDump, MysqlTarget};
pub use nfs::{NfsBackupType, NfsDump, NfsTarget};
pub use postgres::{POSTGRES_PORT, PostgresDump, PostgresTarget};
pub use systems::{ResolveError, SystemsInfo, SystemsSettings};

/// Streams a point in time export of a system, and restores a system from one.
pub trait PersistenceDriver {
    /// Write an export of the system to `sink`.
    fn dump(&self, sink: &mut dyn Write) -> Result<(), DumpError>;

    /// Restore the system from the export read from `source`.
    fn import(&self, source: &mut dyn Read) -> Result<(), DumpError>;
}

/// The platform version, which decides where the dump utilities are installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformVersion {
    /// Version 1.6, with versioned postgres packages.
    #[serde(rename = "1.6")]
    V1_6,

    /// Any later version.
    #[default]
    #[serde(rename = "current")]
    Current,
}

/// Paths of the dump utilities on the database VMs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpUtilities {
    /// `pg_dump`
    pub pg_dump: String,
    /// `pg_restore`
    pub pg_restore: String,
    /// `mysqldump`
    pub mysqldump: String,
    /// `mysql`
    pub mysql: String,
}

impl DumpUtilities {
    /// The utilities installed on `version`.
    pub fn for_version(version: PlatformVersion) -> Self {
        let postgres = match version {
            PlatformVersion::V1_6 => "/var/vcap/packages/postgres-9.4.2/bin",
            PlatformVersion::Current => "/var/vcap/packages/postgres/bin",
        };
        let mariadb = "/var/vcap/packages/mariadb/bin";

        Self {
            pg_dump: format!("{postgres}/pg_dump"),
            pg_restore: format!("{postgres}/pg_restore"),
            mysqldump: format!("{mariadb}/mysqldump"),
            mysql: format!("{mariadb}/mysql"),
        }
    }
}

impl Default for DumpUtilities {
    fn default() -> Self {
        Self::for_version(PlatformVersion::default())
    }
}

/// What kind of system a dump targets. Fixed when the dump is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpKind {
    /// A system with no driver, such as the director.
    Base,
    /// A postgres database.
    Postgres(PostgresTarget),
    /// A mysql server.
    Mysql(MysqlTarget),
    /// The NFS blob store.
    Nfs(NfsTarget),
}

/// A persistent system and the credentials needed to back it up.
#[derive(Clone, PartialEq, Eq)]
pub struct SystemDump {
    /// The product the system belongs to.
    pub product: String,
    /// The job running the system, also names its artifact.
    pub component: String,
    /// The credential identity used to log into the system.
    pub identity: String,
    /// The VM address.
    pub ip: String,
    /// The system user.
    pub user: String,
    /// The system password.
    pub pass: String,
    /// The VM user.
    pub vcap_user: String,
    /// The VM password.
    pub vcap_pass: String,
    /// The kind of system.
    pub kind: DumpKind,
}

impl SystemDump {
    /// Create a dump with no credentials resolved yet.
    pub fn new(
        product: impl Into<String>,
        component: impl Into<String>,
        identity: impl Into<String>,
        kind: DumpKind,
    ) -> Self {
        Self {
            product: product.into(),
            component: component.into(),
            identity: identity.into(),
            ip: String::new(),
            user: String::new(),
            pass: String::new(),
            vcap_user: String::new(),
            vcap_pass: String::new(),
            kind,
        }
    }

    /// Check every field is filled in.
    pub fn validate(&self) -> Result<(), IncompleteSystemDump> {
        let fields = [
            ("product", &self.product),
            ("component", &self.component),
            ("identity", &self.identity),
            ("ip", &self.ip),
            ("user", &self.user),
            ("pass", &self.pass),
            ("vcap_user", &self.vcap_user),
            ("vcap_pass", &self.vcap_pass),
        ];

        let missing: Vec<&'static str> = fields
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(IncompleteSystemDump {
                product: self.product.clone(),
                component: self.component.clone(),
                missing,
            })
        }
    }

    /// The login for the system's VM.
    pub fn ssh_target(&self) -> SshTarget {
        SshTarget {
            host: self.ip.clone(),
            username: self.vcap_user.clone(),
            password: self.vcap_pass.clone(),
        }
    }

    /// Connect to the system's VM and create the driver for its kind.
    pub fn persistence_driver(
        &self,
        shell: &dyn RemoteShell,
    ) -> Result<Box<dyn PersistenceDriver>, DumpError> {
        let connect = || {
            shell
                .connect(&self.ssh_target())
                .map_err(|e| DumpError::Execute(e, "connect to system"))
        };

        let driver: Box<dyn PersistenceDriver> = match &self.kind {
            DumpKind::Base => return Err(DumpError::Unspecialized(self.component.clone())),
            DumpKind::Postgres(target) => Box::new(PostgresDump::new(
                target.clone(),
                &self.user,
                &self.pass,
                connect()?,
            )),
            DumpKind::Mysql(target) => Box::new(MysqlDump::new(
                target.clone(),
                &self.user,
                &self.pass,
                connect()?,
            )),
            DumpKind::Nfs(target) => Box::new(NfsDump::new(*target, connect()?)),
        };

        Ok(driver)
    }
}

impl fmt::Debug for SystemDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDump")
            .field("product", &self.product)
            .field("component", &self.component)
            .field("identity", &self.identity)
            .field("ip", &self.ip)
            .field("user", &self.user)
            .field("vcap_user", &self.vcap_user)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A system dump with empty fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid or incomplete system dump {product}/{component}, missing: {}", .missing.join(", "))]
pub struct IncompleteSystemDump {
    /// The dump's product.
    pub product: String,
    /// The dump's component.
    pub component: String,
    /// The names of the empty fields.
    pub missing: Vec<&'static str>,
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("System '{0}' has no persistence driver")]
    Unspecialized(String),

    #[error("Failed to {1}: {0}")]
    Execute(#[source] ExecuteError, &'static str),
}
