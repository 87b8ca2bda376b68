use alloc::string::String;
use alloc::vec;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use log::{debug, error};

use super::{DEFAULT_LOG_FILE, LogVolume, NO_STORAGE_MESSAGE, StorageError, StorageGate, StorageMedium};
use crate::reading::LogEntry;

/// Longest 8.3 file name.
pub type FileName = heapless::String<12>;

/// Bytes moved per volume read when the log is streamed out.
pub const READ_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// No card; the sample is dropped rather than risking the file.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    Skipped,
}

/// Result of reading the whole log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSnapshot {
    Contents(String),
    NoStorage,
}

impl LogSnapshot {
    /// The text handed to a control-surface caller.
    pub fn as_text(&self) -> &str {
        match self {
            Self::Contents(text) => text,
            Self::NoStorage => NO_STORAGE_MESSAGE,
        }
    }
}

/// Append-only reading log on removable storage.
///
/// Every operation takes the same lock, so appends, reads and clears are
/// totally ordered and a reader never observes half a line. The gate check
/// happens before the lock is taken; if the card disappears in between, the
/// volume operation itself fails and is reported as an I/O error.
pub struct PersistentLog<V, M> {
    gate: StorageGate<M>,
    volume: Mutex<CriticalSectionRawMutex, V>,
    file_name: FileName,
}

impl<V: LogVolume, M: StorageMedium> PersistentLog<V, M> {
    /// `file_name` must be a valid 8.3 name; anything longer falls back to
    /// [`DEFAULT_LOG_FILE`].
    pub fn new(volume: V, gate: StorageGate<M>, file_name: &str) -> Self {
        let file_name = match FileName::try_from(file_name) {
            Ok(name) => name,
            Err(_) => {
                error!(
                    "Log file name {:?} does not fit 8.3, using {}",
                    file_name, DEFAULT_LOG_FILE
                );
                let mut fallback = FileName::new();
                // DEFAULT_LOG_FILE is 8 bytes
                let _ = fallback.push_str(DEFAULT_LOG_FILE);
                fallback
            }
        };

        Self {
            gate,
            volume: Mutex::new(volume),
            file_name,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Append one entry as a line. Silently skipped when no card is present.
    pub async fn append(&self, entry: &LogEntry) -> Result<AppendOutcome, StorageError> {
        if !self.gate.verify().await {
            debug!("Skipping log entry {}", entry);
            return Ok(AppendOutcome::Skipped);
        }

        let line = entry.to_line();
        let mut volume = self.volume.lock().await;
        volume.append(&self.file_name, line.as_bytes())?;
        debug!("Logged {}", entry);

        Ok(AppendOutcome::Written)
    }

    /// Lock the log for reading. `None` without a card.
    ///
    /// The length is fixed when the lock is taken; appends and clears wait
    /// until the reader is dropped.
    pub async fn reader(&self) -> Result<Option<LogReader<'_, V>>, StorageError> {
        if !self.gate.verify().await {
            return Ok(None);
        }

        let mut volume = self.volume.lock().await;
        let len = volume.file_len(&self.file_name)?;

        Ok(Some(LogReader {
            volume,
            file_name: &self.file_name,
            len,
        }))
    }

    /// Full current contents, or [`LogSnapshot::NoStorage`] without a card.
    ///
    /// Buffers the whole file; prefer [`PersistentLog::reader`] for large logs.
    pub async fn read_all(&self) -> Result<LogSnapshot, StorageError> {
        let Some(mut reader) = self.reader().await? else {
            return Ok(LogSnapshot::NoStorage);
        };

        let mut bytes = vec![0u8; reader.len()];
        let mut filled = 0;
        while filled < bytes.len() {
            let read = reader.read_at(filled, &mut bytes[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        bytes.truncate(filled);

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        Ok(LogSnapshot::Contents(text))
    }

    /// Truncate the log to empty. A missing card is a no-op.
    pub async fn clear(&self) -> Result<ClearOutcome, StorageError> {
        if !self.gate.verify().await {
            return Ok(ClearOutcome::Skipped);
        }

        let mut volume = self.volume.lock().await;
        volume.truncate(&self.file_name)?;
        debug!("Cleared {}", self.file_name);

        Ok(ClearOutcome::Cleared)
    }
}

/// Read access to the log while holding its lock.
pub struct LogReader<'a, V> {
    volume: MutexGuard<'a, CriticalSectionRawMutex, V>,
    file_name: &'a str,
    len: usize,
}

impl<V: LogVolume> LogReader<'_, V> {
    /// Size of the log when the lock was taken.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read from `offset` into `buf`. Returns 0 once `offset` reaches [`LogReader::len`].
    pub fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        let remaining = self.len.saturating_sub(offset);
        let want = remaining.min(buf.len());
        if want == 0 {
            return Ok(0);
        }

        self.volume.read_at(self.file_name, offset, &mut buf[..want])
    }
}
