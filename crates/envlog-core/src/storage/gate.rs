use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use log::warn;

use super::StorageMedium;

/// Default wait applied when the medium is missing.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Checks storage availability before a file operation and fails closed.
///
/// When the card is missing the caller is held for a fixed backoff before
/// `false` comes back, which throttles the periodic writer instead of letting
/// it spin against an empty slot.
pub struct StorageGate<M> {
    medium: BlockingMutex<CriticalSectionRawMutex, RefCell<M>>,
    backoff: Duration,
}

impl<M: StorageMedium> StorageGate<M> {
    pub fn new(medium: M, backoff: Duration) -> Self {
        Self {
            medium: BlockingMutex::new(RefCell::new(medium)),
            backoff,
        }
    }

    /// `true` only if the medium is inserted and mounted right now.
    pub async fn verify(&self) -> bool {
        let available = self.medium.lock(|medium| {
            let mut medium = medium.borrow_mut();
            medium.is_inserted() && medium.is_mounted()
        });

        if !available {
            warn!("SD card not available, backing off for {} ms", self.backoff.as_millis());
            Timer::after(self.backoff).await;
        }

        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MediumSwitch;
    use embassy_futures::block_on;
    use embassy_time::Instant;

    #[test]
    fn test_verify_passes_when_inserted_and_mounted() {
        let switch = MediumSwitch::new(true);
        let gate = StorageGate::new(&switch, Duration::from_millis(500));

        let start = Instant::now();
        assert!(block_on(gate.verify()));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_verify_fails_closed_after_backoff() {
        let switch = MediumSwitch::new(false);
        let gate = StorageGate::new(&switch, Duration::from_millis(30));

        let start = Instant::now();
        assert!(!block_on(gate.verify()));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_inserted_but_unmounted_is_unavailable() {
        let switch = MediumSwitch::new(true);
        switch.set_mounted(false);
        let gate = StorageGate::new(&switch, Duration::from_millis(1));
        assert!(!block_on(gate.verify()));
    }

    #[test]
    fn test_availability_is_reevaluated_every_call() {
        let switch = MediumSwitch::new(true);
        let gate = StorageGate::new(&switch, Duration::from_millis(1));

        assert!(block_on(gate.verify()));
        switch.remove();
        assert!(!block_on(gate.verify()));
        switch.insert();
        assert!(block_on(gate.verify()));
    }
}
