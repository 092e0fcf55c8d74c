//! Runtime backup config
//!

use core::time::Duration;
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    director::{DIRECTOR_PORT, PollSettings},
    orchestrator::{OrchestratorSettings, ROUTING_JOB_PREFIX},
    persistence::{DumpUtilities, NfsBackupType, PlatformVersion, SystemsSettings},
    remote::{OpenSsh, SSH_PORT},
    toggler::ComponentJob,
};

/// The runtime backup config.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// The installation settings document describing the deployment.
    pub installation_settings: PathBuf,

    /// Where artifacts are written to and read from. A key prefix for object stores.
    pub target_directory: String,

    /// The director connection.
    pub director: DirectorConfig,

    /// The SSH connections to deployment VMs.
    pub ssh: SshConfig,

    /// How the persistent systems are dumped.
    pub persistence: PersistenceConfig,

    /// The routing tier stopped around the backup.
    pub routing_tier: RoutingTierConfig,

    /// Where artifacts are stored.
    pub storage: StorageConfig,
}

impl Config {
    /// Tries to load a config from a toml file.
    pub fn load_toml(file_path: PathBuf) -> Result<Self, LoadConfigError> {
        if !file_path.exists() {
            return Err(LoadConfigError::NoFile);
        }

        let contents = fs::read_to_string(file_path).map_err(LoadConfigError::Read)?;
        let config = toml::from_str(&contents)?;

        Ok(config)
    }

    /// The orchestrator settings.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            director_port: self.director.port,
            poll: PollSettings {
                interval: Duration::from_millis(self.director.poll_interval_ms),
                max_attempts: self.director.max_poll_attempts,
                deadline: self.director.task_deadline_secs.map(Duration::from_secs),
            },
            routing_job_prefixes: self.routing_tier.job_prefixes.clone(),
            routing_jobs: self.routing_tier.jobs.clone(),
        }
    }

    /// The settings of the persistent systems.
    pub fn systems_settings(&self) -> SystemsSettings {
        SystemsSettings {
            utilities: DumpUtilities::for_version(self.persistence.platform_version),
            nfs_backup_type: self.persistence.nfs_backup_type,
        }
    }

    /// The remote shell.
    pub fn remote_shell(&self) -> OpenSsh {
        OpenSsh {
            port: self.ssh.port,
            private_key: self.ssh.private_key.clone(),
            connect_timeout: self.ssh.connect_timeout_secs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            installation_settings: PathBuf::from("./installation.json"),
            target_directory: "./backups".to_string(),
            director: DirectorConfig::default(),
            ssh: SshConfig::default(),
            persistence: PersistenceConfig::default(),
            routing_tier: RoutingTierConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// The director connection.
#[derive(Debug, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// The director port.
    pub port: u16,

    /// A PEM file holding the CA that signed the director's certificate. Required when the
    /// director's certificate is self-signed, otherwise the platform roots are trusted.
    pub ca_certificate: Option<PathBuf>,

    /// Milliseconds between task status queries.
    pub poll_interval_ms: u64,

    /// The most status queries made for one task.
    pub max_poll_attempts: u32,

    /// The longest a single task is waited on, in seconds.
    pub task_deadline_secs: Option<u64>,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        let poll = PollSettings::default();

        Self {
            port: DIRECTOR_PORT,
            ca_certificate: None,
            poll_interval_ms: 1000,
            max_poll_attempts: poll.max_attempts,
            task_deadline_secs: None,
        }
    }
}

/// The SSH connections to deployment VMs.
#[derive(Debug, Serialize, Deserialize)]
pub struct SshConfig {
    /// The SSH port.
    pub port: u16,

    /// A private key to log in with instead of the VM password.
    pub private_key: Option<PathBuf>,

    /// Seconds to wait for a connection.
    pub connect_timeout_secs: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: SSH_PORT,
            private_key: None,
            connect_timeout_secs: 30,
        }
    }
}

/// How the persistent systems are dumped.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// The platform version, `1.6` or `current`.
    pub platform_version: PlatformVersion,

    /// How much of the blob store is backed up, `full`, `lite` or `skip`.
    pub nfs_backup_type: NfsBackupType,
}

/// The routing tier.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoutingTierConfig {
    /// Jobs whose names start with any of these are stopped.
    pub job_prefixes: Vec<String>,

    /// Jobs stopped instead of the ones found by prefix, in stop order.
    pub jobs: Option<Vec<ComponentJob>>,
}

impl Default for RoutingTierConfig {
    fn default() -> Self {
        Self {
            job_prefixes: vec![ROUTING_JOB_PREFIX.to_string()],
            jobs: None,
        }
    }
}

/// Where artifacts are stored. Object store credentials are only read from the environment.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The object store domain, when `S3_DOMAIN` is unset.
    pub domain: Option<String>,

    /// The key artifacts are encrypted with, when `BACKUP_ENCRYPTION_KEY` is unset.
    pub encryption_key: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("The file does not exist.")]
    NoFile,

    #[error("Failed to read the file:\n{0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to deserialize the file:\n{0}")]
    Deserialize(#[from] toml::de::Error),
}
