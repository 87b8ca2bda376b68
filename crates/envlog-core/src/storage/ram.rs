//! Volatile storage backend and a manually switched medium.
//!
//! Used by the simulator when no data directory is configured, and by tests
//! that need to pull the card out from under the logger.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::{LogVolume, StorageError, StorageMedium};

/// In-memory volume keyed by file name.
///
/// Shared references implement [`LogVolume`] too, so a test can hand
/// `&volume` to a [`PersistentLog`](super::PersistentLog) and still inspect or
/// fault the files afterwards.
pub struct RamVolume {
    files: BlockingMutex<CriticalSectionRawMutex, RefCell<BTreeMap<String, Vec<u8>>>>,
    faulted: AtomicBool,
}

impl RamVolume {
    pub fn new() -> Self {
        Self {
            files: BlockingMutex::new(RefCell::new(BTreeMap::new())),
            faulted: AtomicBool::new(false),
        }
    }

    /// Make every following operation fail with an I/O error, as a card with
    /// a corrupted filesystem would.
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::Release);
    }

    /// Current content of `file_name`, `None` if it was never created.
    pub fn contents(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .lock(|files| files.borrow().get(file_name).cloned())
    }

    fn check(&self, operation: &'static str) -> Result<(), StorageError> {
        if self.faulted.load(Ordering::Acquire) {
            Err(StorageError::Io { operation })
        } else {
            Ok(())
        }
    }
}

impl Default for RamVolume {
    fn default() -> Self {
        Self::new()
    }
}

impl LogVolume for &RamVolume {
    fn append(&mut self, file_name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.check("append to log file")?;
        self.files.lock(|files| {
            files
                .borrow_mut()
                .entry(String::from(file_name))
                .or_default()
                .extend_from_slice(data);
        });
        Ok(())
    }

    fn file_len(&mut self, file_name: &str) -> Result<usize, StorageError> {
        self.check("read log file")?;
        Ok(self
            .files
            .lock(|files| files.borrow().get(file_name).map_or(0, Vec::len)))
    }

    fn read_at(
        &mut self,
        file_name: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        self.check("read log file")?;
        Ok(self.files.lock(|files| {
            let files = files.borrow();
            let Some(content) = files.get(file_name) else {
                return 0;
            };
            let tail = content.get(offset..).unwrap_or_default();
            let read = tail.len().min(buf.len());
            buf[..read].copy_from_slice(&tail[..read]);
            read
        }))
    }

    fn truncate(&mut self, file_name: &str) -> Result<(), StorageError> {
        self.check("truncate log file")?;
        self.files.lock(|files| {
            files.borrow_mut().insert(String::from(file_name), Vec::new());
        });
        Ok(())
    }
}

impl LogVolume for RamVolume {
    fn append(&mut self, file_name: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut volume = &*self;
        volume.append(file_name, data)
    }

    fn file_len(&mut self, file_name: &str) -> Result<usize, StorageError> {
        let mut volume = &*self;
        volume.file_len(file_name)
    }

    fn read_at(
        &mut self,
        file_name: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let mut volume = &*self;
        volume.read_at(file_name, offset, buf)
    }

    fn truncate(&mut self, file_name: &str) -> Result<(), StorageError> {
        let mut volume = &*self;
        volume.truncate(file_name)
    }
}

/// Storage presence that is flipped by hand.
pub struct MediumSwitch {
    inserted: AtomicBool,
    mounted: AtomicBool,
}

impl MediumSwitch {
    /// A present medium starts out mounted.
    pub const fn new(present: bool) -> Self {
        Self {
            inserted: AtomicBool::new(present),
            mounted: AtomicBool::new(present),
        }
    }

    pub fn insert(&self) {
        self.inserted.store(true, Ordering::Release);
        self.mounted.store(true, Ordering::Release);
    }

    pub fn remove(&self) {
        self.inserted.store(false, Ordering::Release);
        self.mounted.store(false, Ordering::Release);
    }

    pub fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::Release);
    }
}

impl StorageMedium for &MediumSwitch {
    fn is_inserted(&mut self) -> bool {
        self.inserted.load(Ordering::Acquire)
    }

    fn is_mounted(&mut self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }
}

impl StorageMedium for MediumSwitch {
    fn is_inserted(&mut self) -> bool {
        self.inserted.load(Ordering::Acquire)
    }

    fn is_mounted(&mut self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "DATA.LOG";

    #[test]
    fn test_missing_file_reads_empty() {
        let mut volume = RamVolume::new();
        let mut buf = [0u8; 8];
        assert_eq!(volume.file_len(FILE), Ok(0));
        assert_eq!(volume.read_at(FILE, 0, &mut buf), Ok(0));
        assert_eq!(volume.contents(FILE), None);
    }

    #[test]
    fn test_read_at_offsets() {
        let mut volume = RamVolume::new();
        volume.append(FILE, b"abcdef").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(volume.read_at(FILE, 0, &mut buf), Ok(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(volume.read_at(FILE, 4, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(volume.read_at(FILE, 6, &mut buf), Ok(0));
        assert_eq!(volume.read_at(FILE, 60, &mut buf), Ok(0));
        assert_eq!(volume.file_len(FILE), Ok(6));
    }

    #[test]
    fn test_append_creates_then_extends() {
        let mut volume = RamVolume::new();
        volume.append(FILE, b"a\r\n").unwrap();
        volume.append(FILE, b"b\r\n").unwrap();
        assert_eq!(volume.contents(FILE).unwrap(), b"a\r\nb\r\n");
    }

    #[test]
    fn test_truncate_empties_file() {
        let mut volume = RamVolume::new();
        volume.append(FILE, b"a\r\n").unwrap();
        volume.truncate(FILE).unwrap();
        assert_eq!(volume.contents(FILE).unwrap(), b"");
    }

    #[test]
    fn test_faulted_volume_reports_io() {
        let volume = RamVolume::new();
        volume.set_faulted(true);
        let mut shared = &volume;
        assert_eq!(
            shared.append(FILE, b"x"),
            Err(StorageError::Io {
                operation: "append to log file"
            })
        );
        assert_eq!(volume.contents(FILE), None);
    }
}
