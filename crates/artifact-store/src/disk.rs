use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{ArtifactReader, ArtifactWriter, StorageError, StorageProvider};

/// Stores artifacts as files on the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct DiskProvider;

impl DiskProvider {
    /// Create a new disk provider.
    pub fn new() -> Self {
        Self
    }

    fn join(path: &[&str]) -> PathBuf {
        path.iter().fold(PathBuf::new(), |joined, segment| joined.join(segment))
    }
}

impl StorageProvider for DiskProvider {
    fn writer(&self, path: &[&str]) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        let file_path = Self::join(path);

        if let Some(parent) = file_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            // Check if the directory exists
            match fs::metadata(parent) {
                Ok(metadata) => {
                    if !metadata.is_dir() {
                        return Err(StorageError::Io(
                            io::Error::new(
                                ErrorKind::AlreadyExists,
                                format!("{parent:?} is not a directory"),
                            ),
                            "prepare artifact directory",
                        ));
                    }
                }
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Io(e, "create artifact directory"))?;
                }
                Err(error) => return Err(StorageError::Io(error, "check artifact directory")),
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_path)
            .map_err(|e| StorageError::Io(e, "create artifact"))?;

        debug!("Opened {file_path:?} for writing");

        Ok(Box::new(DiskWriter {
            writer: BufWriter::new(file),
        }))
    }

    fn reader(&self, path: &[&str]) -> Result<ArtifactReader, StorageError> {
        let file_path = Self::join(path);

        let file = File::open(&file_path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => StorageError::NotFound(display(&file_path)),
            _ => StorageError::Io(error, "open artifact"),
        })?;

        debug!("Opened {file_path:?} for reading");

        Ok(Box::new(file))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

struct DiskWriter {
    writer: BufWriter<File>,
}

impl Write for DiskWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ArtifactWriter for DiskWriter {
    fn finish(self: Box<Self>) -> Result<(), StorageError> {
        let file = self
            .writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error(), "flush artifact"))?;

        file.sync_all()
            .map_err(|e| StorageError::Io(e, "sync artifact"))?;

        Ok(())
    }
}
