//! Wall-clock time and network time synchronization state.
//!
//! The network time service itself lives on the platform side. It reports
//! back through [`TimeSyncTracker`], and sets [`WallClock`] when a server
//! answered.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::reading::Timestamp;

/// Source of capture timestamps for readings.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Tracks whether wall-clock time has ever been synchronized.
///
/// Informational only: nothing in the engine refuses to run unsynchronized,
/// consumers use it to judge whether timestamps are trustworthy.
pub struct TimeSyncTracker {
    synchronized: AtomicBool,
}

impl TimeSyncTracker {
    pub const fn new() -> Self {
        Self {
            synchronized: AtomicBool::new(false),
        }
    }

    pub fn on_sync_succeeded(&self) {
        if self.synchronized.swap(true, Ordering::AcqRel) {
            debug!("Network time refreshed");
        } else {
            info!("Network time received");
        }
    }

    /// Failures never clear an earlier success.
    pub fn on_sync_failed(&self, code: i32) {
        warn!("Error synchronizing system time with NTP server: {}", code);
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::Acquire)
    }
}

impl Default for TimeSyncTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    at: Instant,
    time: Timestamp,
}

/// Calendar clock derived from the monotonic embassy clock.
///
/// Until the first [`WallClock::synchronize`] it counts uptime from the
/// default timestamp (01/01/0001), so unsynchronized stamps stand out.
pub struct WallClock {
    anchor: BlockingMutex<CriticalSectionRawMutex, Cell<Anchor>>,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            anchor: BlockingMutex::new(Cell::new(Anchor {
                at: Instant::from_ticks(0),
                time: Timestamp::default(),
            })),
        }
    }

    /// Pin the calendar time `now` to the current monotonic instant.
    pub fn synchronize(&self, now: Timestamp) {
        let anchor = Anchor {
            at: Instant::now(),
            time: now,
        };
        self.anchor.lock(|cell| cell.set(anchor));
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> Timestamp {
        let anchor = self.anchor.lock(|cell| cell.get());
        let elapsed = Instant::now()
            .checked_duration_since(anchor.at)
            .unwrap_or(Duration::from_ticks(0));
        anchor.time.checked_add(elapsed).unwrap_or(anchor.time)
    }
}

#[cfg(test)]
pub(crate) struct FixedClock(pub Timestamp);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
