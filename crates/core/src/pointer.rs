//! Current-pointer sources.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::Pointer;

/// Supplies the pointer at which the next ledger call happens.
///
/// Successive calls must never go backwards.
pub trait PointerSource: Send + Sync {
    fn current(&self) -> Pointer;
}

impl<S> PointerSource for std::sync::Arc<S>
where
    S: PointerSource + ?Sized,
{
    fn current(&self) -> Pointer {
        (**self).current()
    }
}

/// Manually driven counter (block heights fed from outside, tests, replays).
#[derive(Debug)]
pub struct ManualPointer {
    value: AtomicU64,
}

impl ManualPointer {
    /// Start at `initial`, clamped to 1 so the sentinel is never reported.
    pub fn new(initial: Pointer) -> Self {
        Self {
            value: AtomicU64::new(initial.max(1)),
        }
    }

    /// Move forward by `delta` and return the new pointer.
    pub fn advance(&self, delta: u64) -> Pointer {
        let previous = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_add(delta))
            })
            .unwrap_or_else(|v| v);
        previous.saturating_add(delta)
    }

    /// Jump to `target`. Targets behind the current pointer are ignored.
    pub fn set(&self, target: Pointer) -> Pointer {
        let previous = self.value.fetch_max(target, Ordering::AcqRel);
        previous.max(target)
    }
}

impl Default for ManualPointer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PointerSource for ManualPointer {
    fn current(&self) -> Pointer {
        self.value.load(Ordering::Acquire)
    }
}

/// Whole seconds elapsed since `genesis`, offset by one.
///
/// The offset keeps the genesis second itself off the sentinel value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WallClockPointer {
    genesis: DateTime<Utc>,
}

impl WallClockPointer {
    pub fn new(genesis: DateTime<Utc>) -> Self {
        Self { genesis }
    }

    pub fn genesis(&self) -> DateTime<Utc> {
        self.genesis
    }

    /// Pointer for an arbitrary instant; instants before genesis map to 1.
    pub fn pointer_at(&self, at: DateTime<Utc>) -> Pointer {
        let elapsed = (at - self.genesis).num_seconds().max(0) as u64;
        elapsed.saturating_add(1)
    }
}

impl PointerSource for WallClockPointer {
    fn current(&self) -> Pointer {
        self.pointer_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn manual_pointer_never_reports_sentinel_or_moves_back() {
        let p = ManualPointer::new(0);
        assert_eq!(p.current(), 1);
        assert_eq!(p.advance(9), 10);
        assert_eq!(p.set(5), 10);
        assert_eq!(p.set(42), 42);
        assert_eq!(p.current(), 42);
    }

    #[test]
    fn wall_clock_counts_seconds_from_genesis() {
        let genesis = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = WallClockPointer::new(genesis);
        assert_eq!(clock.pointer_at(genesis), 1);
        assert_eq!(clock.pointer_at(genesis + Duration::seconds(90)), 91);
        assert_eq!(clock.pointer_at(genesis - Duration::days(1)), 1);
        assert!(clock.current() > 1);
    }
}
