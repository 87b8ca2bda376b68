use core::fmt::Debug;

use chrono::{Datelike, Timelike};
use embedded_hal::digital::InputPin;
use embedded_sdmmc::{BlockDevice, File, Mode, TimeSource, VolumeIdx, VolumeManager};
use log::error;

use super::{LogVolume, StorageError, StorageMedium};
use crate::time_sync::Clock;

type SdResult<T, B> = Result<T, embedded_sdmmc::Error<<B as BlockDevice>::Error>>;
type SdFile<'a, B, T> = File<'a, B, T, 4, 4, 1>;

/// FAT volume on a block device, holding the log file in its root directory.
///
/// On the board the device is an [`embedded_sdmmc::SdCard`] on SPI.
/// For NOW, these SD card operations are blocking (as are the sensor reads on
/// the same executor). Each operation opens volume 0 and the root directory,
/// acts, and closes everything again, so a card swapped between operations is
/// picked up without an explicit remount.
pub struct SdCardVolume<B: BlockDevice, T: TimeSource> {
    volume_mgr: VolumeManager<B, T, 4, 4, 1>,
}

impl<B: BlockDevice, T: TimeSource> SdCardVolume<B, T> {
    pub fn new(device: B, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(device, ts);

        Self { volume_mgr }
    }

    fn append_raw(&self, file_name: &str, data: &[u8]) -> SdResult<(), B> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(file_name, Mode::ReadWriteCreateOrAppend)?;

        file.write(data)?;

        // Dropping would close these too, but close explicitly to see the errors
        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    /// Run `f` on `file_name` opened read-only. `None` if the file does not
    /// exist.
    fn with_existing_file<R>(
        &self,
        file_name: &str,
        f: impl FnOnce(&SdFile<'_, B, T>) -> SdResult<R, B>,
    ) -> SdResult<Option<R>, B> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        // The file borrows the directory, so it must be gone before closing it
        let result = {
            let file = match root_dir.open_file_in_dir(file_name, Mode::ReadOnly) {
                Ok(file) => Some(file),
                Err(embedded_sdmmc::Error::NotFound) => None,
                Err(e) => return Err(e),
            };

            match file {
                Some(file) => {
                    let value = f(&file)?;
                    file.close()?;
                    Some(value)
                }
                None => None,
            }
        };

        root_dir.close()?;
        volume0.close()?;

        Ok(result)
    }

    fn len_raw(&self, file_name: &str) -> SdResult<usize, B> {
        let len = self.with_existing_file(file_name, |file| Ok(file.length() as usize))?;
        Ok(len.unwrap_or(0))
    }

    fn read_at_raw(&self, file_name: &str, offset: usize, buf: &mut [u8]) -> SdResult<usize, B> {
        let read = self.with_existing_file(file_name, |file| {
            let Ok(offset) = u32::try_from(offset) else {
                return Ok(0);
            };
            if offset >= file.length() {
                return Ok(0);
            }

            file.seek_from_start(offset)?;
            file.read(buf)
        })?;

        Ok(read.unwrap_or(0))
    }

    fn truncate_raw(&self, file_name: &str) -> SdResult<(), B> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(file_name, Mode::ReadWriteCreateOrTruncate)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }
}

fn io_error<E: Debug>(operation: &'static str, e: embedded_sdmmc::Error<E>) -> StorageError {
    error!("SD card failed to {}: {:?}", operation, e);
    StorageError::Io { operation }
}

impl<B: BlockDevice, T: TimeSource> LogVolume for SdCardVolume<B, T> {
    fn append(&mut self, file_name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.append_raw(file_name, data)
            .map_err(|e| io_error("append to log file", e))
    }

    fn file_len(&mut self, file_name: &str) -> Result<usize, StorageError> {
        self.len_raw(file_name)
            .map_err(|e| io_error("read log file", e))
    }

    fn read_at(
        &mut self,
        file_name: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        self.read_at_raw(file_name, offset, buf)
            .map_err(|e| io_error("read log file", e))
    }

    fn truncate(&mut self, file_name: &str) -> Result<(), StorageError> {
        self.truncate_raw(file_name)
            .map_err(|e| io_error("truncate log file", e))
    }
}

/// Card-detect switch of the SD slot.
///
/// A card on the SPI bus has no separate mount step: the FAT volume is opened
/// by every [`SdCardVolume`] operation, so an inserted card counts as mounted.
pub struct CardDetect<P> {
    pin: P,
    active_low: bool,
}

impl<P: InputPin> CardDetect<P> {
    /// Most slots pull the detect line to ground when a card is inserted.
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }

    pub fn active_high(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }
}

impl<P: InputPin> StorageMedium for CardDetect<P> {
    fn is_inserted(&mut self) -> bool {
        let level = if self.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        };

        level.unwrap_or_else(|e| {
            error!("Failed to read SD card detect pin: {:?}", e);
            false
        })
    }

    fn is_mounted(&mut self) -> bool {
        self.is_inserted()
    }
}

/// Feeds the logger's clock into FAT directory entry timestamps.
pub struct FatClock<'a, C>(pub &'a C);

impl<C: Clock> TimeSource for FatClock<'_, C> {
    fn get_timestamp(&self) -> embedded_sdmmc::Timestamp {
        let now = self.0.now().naive();

        // FAT cannot represent anything before 1980-01-01
        if now.year() < 1980 {
            return embedded_sdmmc::Timestamp {
                year_since_1970: 10,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            };
        }

        embedded_sdmmc::Timestamp {
            year_since_1970: (now.year().min(2107) - 1970) as u8,
            zero_indexed_month: now.month0() as u8,
            zero_indexed_day: now.day0() as u8,
            hours: now.hour() as u8,
            minutes: now.minute() as u8,
            seconds: now.second() as u8,
        }
    }
}
