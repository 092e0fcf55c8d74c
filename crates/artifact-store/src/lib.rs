//! # artifact-store
//! Uniform read/write access to backup artifacts on local disk, an S3 compatible object store,
//! or an encrypting wrapper around either.
//!

use std::io::{self, Read, Write};

use thiserror::Error;

mod disk;
mod encrypted;
mod memory;
mod object_store;
mod signing;

pub use disk::DiskProvider;
pub use encrypted::EncryptedProvider;
pub use memory::MemoryProvider;
pub use object_store::{ObjectStoreConfig, ObjectStoreProvider};

/// A readable artifact.
pub type ArtifactReader = Box<dyn Read + Send>;

/// A writable artifact.
///
/// Bytes are only guaranteed to be persisted once [`ArtifactWriter::finish`] returns `Ok`.
/// Dropping a writer without finishing it may abandon the artifact.
pub trait ArtifactWriter: Write + Send {
    /// Flush all remaining bytes and close the artifact.
    fn finish(self: Box<Self>) -> Result<(), StorageError>;
}

/// Persists backup artifacts addressed by path segments.
pub trait StorageProvider: Send + Sync {
    /// Open the artifact at `path` for writing, replacing any previous contents.
    fn writer(&self, path: &[&str]) -> Result<Box<dyn ArtifactWriter>, StorageError>;

    /// Open the artifact at `path` for reading.
    ///
    /// Returns [`StorageError::NotFound`] if the artifact does not exist.
    fn reader(&self, path: &[&str]) -> Result<ArtifactReader, StorageError>;
}

impl<P: StorageProvider + ?Sized> StorageProvider for Box<P> {
    fn writer(&self, path: &[&str]) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        (**self).writer(path)
    }

    fn reader(&self, path: &[&str]) -> Result<ArtifactReader, StorageError> {
        (**self).reader(path)
    }
}

/// Join path segments into an object key, skipping empty segments.
pub fn object_key(path: &[&str]) -> String {
    path.iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact '{0}' does not exist")]
    NotFound(String),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),

    #[error("Failed to {1}: {0}")]
    Request(#[source] Box<ureq::Error>, &'static str),

    #[error("Bucket '{0}' is not accessible: status {1}")]
    Bucket(String, u16),

    #[error("An encryption key must not be empty")]
    InvalidKey,

    #[error("Failed to encrypt artifact")]
    Encrypt,

    #[error("Failed to decrypt artifact, it is corrupt or the key is wrong")]
    Decrypt,

    #[error("Artifact is not an encrypted artifact")]
    NotEncrypted,
}

impl StorageError {
    /// If this error means the artifact does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StorageError> for io::Error {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io(error, _) => error,
            StorageError::NotFound(_) => Self::new(io::ErrorKind::NotFound, error),
            StorageError::Decrypt | StorageError::NotEncrypted => {
                Self::new(io::ErrorKind::InvalidData, error)
            }
            error => Self::other(error),
        }
    }
}
