use std::{
    collections::HashMap,
    io::{self, Cursor, Write},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{ArtifactReader, ArtifactWriter, StorageError, StorageProvider, object_key};

/// Keeps artifacts in memory, keyed the same way as the object store.
///
/// Clones share the same artifacts, which lets a caller inspect exactly what a wrapping
/// provider handed down.
#[derive(Debug, Default, Clone)]
pub struct MemoryProvider {
    artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored bytes of an artifact, if it exists.
    pub fn artifact(&self, path: &[&str]) -> Option<Vec<u8>> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&object_key(path))
            .cloned()
    }

    /// The keys of every stored artifact, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl StorageProvider for MemoryProvider {
    fn writer(&self, path: &[&str]) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        Ok(Box::new(MemoryWriter {
            key: object_key(path),
            buffer: Vec::new(),
            artifacts: Arc::clone(&self.artifacts),
        }))
    }

    fn reader(&self, path: &[&str]) -> Result<ArtifactReader, StorageError> {
        let key = object_key(path);
        match self.artifact(path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
            None => Err(StorageError::NotFound(key)),
        }
    }
}

struct MemoryWriter {
    key: String,
    buffer: Vec<u8>,
    artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactWriter for MemoryWriter {
    fn finish(self: Box<Self>) -> Result<(), StorageError> {
        let Self {
            key,
            buffer,
            artifacts,
        } = *self;

        artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, buffer);

        Ok(())
    }
}
