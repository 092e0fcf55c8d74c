//! Where a run's artifacts are stored.
//!

use artifact_store::{
    DiskProvider, EncryptedProvider, ObjectStoreConfig, ObjectStoreProvider, StorageError,
    StorageProvider,
};
use tracing::info;

/// The object store domain used when none is configured.
pub const DEFAULT_DOMAIN: &str = "s3.amazonaws.com";

/// The signing region used for object stores.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Storage settings gathered from the environment and the config.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StorageSettings {
    /// `S3_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,
    /// `S3_SECRET_ACCESS_KEY`
    pub secret_access_key: Option<String>,
    /// `S3_BUCKET_NAME`
    pub bucket_name: Option<String>,
    /// `S3_ACTIVE`
    pub use_remote: bool,
    /// `S3_DOMAIN`
    pub domain: Option<String>,
    /// `BACKUP_ENCRYPTION_KEY`
    pub encryption_key: Option<String>,
}

impl core::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("access_key_id", &self.access_key_id)
            .field("bucket_name", &self.bucket_name)
            .field("use_remote", &self.use_remote)
            .field("domain", &self.domain)
            .field("encrypted", &self.encryption_key.is_some())
            .finish_non_exhaustive()
    }
}

impl StorageSettings {
    /// Read the settings from environment variables. Empty values count as unset.
    pub fn from_env<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut settings = Self::default();

        for (key, value) in vars {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }

            match key.as_ref() {
                "S3_ACCESS_KEY_ID" => settings.access_key_id = Some(value),
                "S3_SECRET_ACCESS_KEY" => settings.secret_access_key = Some(value),
                "S3_BUCKET_NAME" => settings.bucket_name = Some(value),
                "S3_ACTIVE" => settings.use_remote = value.eq_ignore_ascii_case("true"),
                "S3_DOMAIN" => settings.domain = Some(value),
                "BACKUP_ENCRYPTION_KEY" => settings.encryption_key = Some(value),
                _ => {}
            }
        }

        settings
    }

    /// Fill the domain and encryption key from the config where the environment left them unset.
    pub fn with_fallbacks(mut self, domain: Option<String>, encryption_key: Option<String>) -> Self {
        if self.domain.is_none() {
            self.domain = domain.filter(|domain| !domain.is_empty());
        }
        if self.encryption_key.is_none() {
            self.encryption_key = encryption_key.filter(|key| !key.is_empty());
        }
        self
    }

    /// Select the storage. The object store is used only when the access key, secret, bucket
    /// and the remote flag are all present, otherwise the disk is. Either is encrypted when an
    /// encryption key is present.
    pub fn select(&self) -> StorageSelection {
        let backend = match (
            &self.access_key_id,
            &self.secret_access_key,
            &self.bucket_name,
            self.use_remote,
        ) {
            (Some(access_key_id), Some(secret_access_key), Some(bucket), true) => {
                StorageBackend::ObjectStore(ObjectStoreConfig {
                    domain: self
                        .domain
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
                    bucket: bucket.clone(),
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                    region: DEFAULT_REGION.to_string(),
                })
            }
            _ => StorageBackend::Disk,
        };

        StorageSelection {
            backend,
            encryption_key: self.encryption_key.clone().filter(|key| !key.is_empty()),
        }
    }
}

/// The base storage of a run.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// The local filesystem.
    Disk,
    /// An S3 compatible bucket.
    ObjectStore(ObjectStoreConfig),
}

/// The storage of a run.
#[derive(Debug, Clone)]
pub struct StorageSelection {
    /// The base storage.
    pub backend: StorageBackend,
    /// The key the base storage is encrypted with, if any.
    pub encryption_key: Option<String>,
}

impl StorageSelection {
    /// Create the provider for this selection.
    pub fn provider(self) -> Result<Box<dyn StorageProvider>, StorageError> {
        let base: Box<dyn StorageProvider> = match self.backend {
            StorageBackend::Disk => Box::new(DiskProvider::new()),
            StorageBackend::ObjectStore(config) => Box::new(ObjectStoreProvider::new(config)),
        };

        match self.encryption_key {
            Some(key) => Ok(Box::new(EncryptedProvider::new(base, &key)?)),
            None => Ok(base),
        }
    }
}

/// Where a run writes and reads its artifacts.
pub struct BackupContext {
    target_directory: String,
    provider: Box<dyn StorageProvider>,
}

impl BackupContext {
    /// Create a context storing artifacts under `target_directory` in the storage selected by
    /// `settings`.
    pub fn new(
        target_directory: impl Into<String>,
        settings: &StorageSettings,
    ) -> Result<Self, StorageError> {
        let selection = settings.select();
        let target_directory = target_directory.into();

        info!(
            "Storing artifacts under '{target_directory}' in {} storage{}",
            match selection.backend {
                StorageBackend::Disk => "disk",
                StorageBackend::ObjectStore(_) => "object",
            },
            if selection.encryption_key.is_some() {
                ", encrypted"
            } else {
                ""
            }
        );

        Ok(Self::with_provider(target_directory, selection.provider()?))
    }

    /// Create a context storing artifacts under `target_directory` in `provider`.
    pub fn with_provider(
        target_directory: impl Into<String>,
        provider: Box<dyn StorageProvider>,
    ) -> Self {
        Self {
            target_directory: target_directory.into(),
            provider,
        }
    }

    /// The directory, or key prefix, artifacts are stored under.
    pub fn target_directory(&self) -> &str {
        &self.target_directory
    }

    /// The storage.
    pub fn provider(&self) -> &dyn StorageProvider {
        self.provider.as_ref()
    }
}
