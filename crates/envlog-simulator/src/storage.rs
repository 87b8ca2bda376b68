//! A host directory standing in for the SD card.
//!
//! The directory is the card: delete it and the logger sees a missing card,
//! create it again and logging resumes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use envlog_core::storage::{LogVolume, StorageError, StorageMedium};
use log::error;

fn io_error(operation: &'static str, path: &Path, e: io::Error) -> StorageError {
    error!("Failed to {} {}: {}", operation, path.display(), e);
    StorageError::Io { operation }
}

pub struct DirVolume {
    root: PathBuf,
}

impl DirVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LogVolume for DirVolume {
    fn append(&mut self, file_name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.root.join(file_name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(data))
            .map_err(|e| io_error("append to", &path, e))
    }

    fn file_len(&mut self, file_name: &str) -> Result<usize, StorageError> {
        let path = self.root.join(file_name);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len() as usize),
            // Nothing logged yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(io_error("stat", &path, e)),
        }
    }

    fn read_at(
        &mut self,
        file_name: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let path = self.root.join(file_name);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error("open", &path, e)),
        };

        file.seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.read(buf))
            .map_err(|e| io_error("read", &path, e))
    }

    fn truncate(&mut self, file_name: &str) -> Result<(), StorageError> {
        let path = self.root.join(file_name);
        File::create(&path)
            .map(|_| ())
            .map_err(|e| io_error("truncate", &path, e))
    }
}

/// Reports the card as present while its directory exists.
pub struct DirMedium {
    root: PathBuf,
}

impl DirMedium {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StorageMedium for DirMedium {
    fn is_inserted(&mut self) -> bool {
        self.root.is_dir()
    }

    fn is_mounted(&mut self) -> bool {
        fs::metadata(&self.root)
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false)
    }
}
