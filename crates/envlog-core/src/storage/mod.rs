//! Removable-storage access for the reading log.
//!
//! Two seams separate the engine from the medium:
//!
//! - [`StorageMedium`] answers "is a card inserted and mounted". It is checked
//!   by the [`StorageGate`] before every file operation, outside the log lock.
//! - [`LogVolume`] performs the actual file operations. It only ever runs
//!   inside the [`PersistentLog`] lock.

pub mod gate;
pub mod log_file;
pub mod ram;
pub mod sd_card;

use thiserror_no_std::Error;

pub use gate::StorageGate;
pub use log_file::{AppendOutcome, ClearOutcome, LogReader, LogSnapshot, PersistentLog, READ_CHUNK};
pub use ram::{MediumSwitch, RamVolume};

/// Text substituted for the log contents when no card is available.
pub const NO_STORAGE_MESSAGE: &str = "No SD card detected.";

/// Default log file name. FAT volumes need an 8.3 name.
pub const DEFAULT_LOG_FILE: &str = "DATA.LOG";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("no storage medium is inserted and mounted")]
    Unavailable,
    #[error("log file I/O failed while trying to {operation}")]
    Io { operation: &'static str },
}

/// Presence of the removable medium.
///
/// Implementations must re-read the hardware state on every call; the gate
/// never caches the answer across operations.
pub trait StorageMedium {
    fn is_inserted(&mut self) -> bool;

    fn is_mounted(&mut self) -> bool;
}

/// File operations on the volume holding the log file.
///
/// Every method is one complete operation: open, act, close. A log file that
/// does not exist yet reads as empty and is created by the first append.
pub trait LogVolume {
    /// Append `data` to the end of `file_name`, creating it if absent.
    fn append(&mut self, file_name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Size of `file_name` in bytes, 0 if it does not exist.
    fn file_len(&mut self, file_name: &str) -> Result<usize, StorageError>;

    /// Read from `offset` into `buf`, returning how many bytes were copied.
    /// Returns 0 at or past the end of the file.
    fn read_at(
        &mut self,
        file_name: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, StorageError>;

    /// Truncate `file_name` to zero length, creating it if absent.
    fn truncate(&mut self, file_name: &str) -> Result<(), StorageError>;
}
