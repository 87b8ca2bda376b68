//! Sensor readings, their textual log form, and the shared latest-reading store.

use core::cell::Cell;
use core::fmt;

use alloc::string::String;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Line terminator used for every record in the log file.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Calendar time at which a reading was captured.
///
/// Renders as `MM/DD/YYYY HH:MM:SS`. The default value is midnight on
/// 01/01/0001, which is what the store reports before the first measurement
/// ever completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub const fn from_naive(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }

    pub const fn naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Advance by a monotonic duration. `None` only on calendar overflow.
    pub fn checked_add(self, elapsed: embassy_time::Duration) -> Option<Self> {
        let millis = i64::try_from(elapsed.as_millis()).ok()?;
        let delta = chrono::TimeDelta::try_milliseconds(millis)?;
        self.0.checked_add_signed(delta).map(Self)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        NaiveDate::from_ymd_opt(1, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(Self)
            .unwrap_or_else(|| Self(NaiveDateTime::default()))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = &self.0;
        write!(
            f,
            "{:02}/{:02}/{:04} {:02}:{:02}:{:02}",
            dt.month(),
            dt.day(),
            dt.year(),
            dt.hour(),
            dt.minute(),
            dt.second()
        )
    }
}

/// One completed temperature/humidity sample.
///
/// Readings are plain `Copy` values: the store never mutates one in place,
/// it swaps in a whole new value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub temperature_celsius: f32,
    pub relative_humidity_percent: f32,
    pub captured_at: Timestamp,
}

impl Reading {
    pub const fn new(
        temperature_celsius: f32,
        relative_humidity_percent: f32,
        captured_at: Timestamp,
    ) -> Self {
        Self {
            temperature_celsius,
            relative_humidity_percent,
            captured_at,
        }
    }
}

/// `temperature,humidity,timestamp` with two decimals on the numeric fields.
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2},{:.2},{}",
            self.temperature_celsius, self.relative_humidity_percent, self.captured_at
        )
    }
}

/// A reading serialized as one log record (without the line terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry(String);

impl LogEntry {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The exact bytes appended to the log file for this entry.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.0.len() + LINE_TERMINATOR.len());
        line.push_str(&self.0);
        line.push_str(LINE_TERMINATOR);
        line
    }
}

impl From<&Reading> for LogEntry {
    fn from(reading: &Reading) -> Self {
        use core::fmt::Write;

        let mut text = String::new();
        // Writing into a String cannot fail
        let _ = write!(text, "{reading}");
        Self(text)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holds the most recently completed reading.
///
/// Guarded by its own lightweight lock, separate from the log file lock, so
/// control-surface reads never wait behind SD card I/O.
pub struct ReadingStore {
    latest: BlockingMutex<CriticalSectionRawMutex, Cell<Reading>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self {
            latest: BlockingMutex::new(Cell::new(Reading::default())),
        }
    }

    /// Replace the stored reading. Only the sampler's completion path calls this.
    pub fn update(&self, reading: Reading) {
        self.latest.lock(|latest| latest.set(reading));
    }

    /// The most recently completed reading, never a mix of two completions.
    pub fn snapshot(&self) -> Reading {
        self.latest.lock(|latest| latest.get())
    }
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .map(Timestamp::from_naive)
            .unwrap()
    }

    #[test]
    fn test_default_timestamp_renders_year_one() {
        assert_eq!(Timestamp::default().to_string(), "01/01/0001 00:00:00");
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(at(9, 5, 3).to_string(), "03/07/2024 09:05:03");
    }

    #[test]
    fn test_timestamp_advances_by_duration() {
        let later = at(23, 59, 30)
            .checked_add(embassy_time::Duration::from_secs(45))
            .unwrap();
        assert_eq!(later.to_string(), "03/08/2024 00:00:15");
    }

    #[test]
    fn test_log_entry_two_decimal_fields() {
        let reading = Reading::new(21.5, 45.0, at(12, 0, 0));
        let entry = LogEntry::from(&reading);
        assert_eq!(entry.as_str(), "21.50,45.00,03/07/2024 12:00:00");
        assert_eq!(entry.to_line(), "21.50,45.00,03/07/2024 12:00:00\r\n");
    }

    #[test]
    fn test_log_entry_rounds_and_keeps_sign() {
        let reading = Reading::new(-3.456, 99.999, at(0, 0, 0));
        assert_eq!(
            LogEntry::from(&reading).as_str(),
            "-3.46,100.00,03/07/2024 00:00:00"
        );
    }

    #[test]
    fn test_store_starts_zero_valued() {
        let store = ReadingStore::new();
        assert_eq!(store.snapshot(), Reading::default());
        assert_eq!(
            LogEntry::from(&store.snapshot()).as_str(),
            "0.00,0.00,01/01/0001 00:00:00"
        );
    }

    #[test]
    fn test_store_update_replaces_whole_reading() {
        let store = ReadingStore::new();
        store.update(Reading::new(20.0, 40.0, at(1, 0, 0)));
        store.update(Reading::new(22.0, 50.0, at(2, 0, 0)));
        assert_eq!(store.snapshot(), Reading::new(22.0, 50.0, at(2, 0, 0)));
    }

    #[test]
    fn test_snapshot_never_mixes_completions() {
        let store = ReadingStore::new();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..20_000u32 {
                    let v = i as f32;
                    store.update(Reading::new(v, v, at(i % 24, 0, 0)));
                }
            });

            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..20_000 {
                        let r = store.snapshot();
                        assert_eq!(r.temperature_celsius, r.relative_humidity_percent);
                        if r.temperature_celsius > 0.0 {
                            let hour = (r.temperature_celsius as u32) % 24;
                            assert_eq!(r.captured_at, at(hour, 0, 0));
                        }
                    }
                });
            }
        });
    }
}
