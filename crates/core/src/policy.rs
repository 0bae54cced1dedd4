//! Windowing policy: pointer → epoch math.
//!
//! The ledger never reads a clock. It asks a `WindowPolicy` which epoch a
//! pointer falls in and which epochs are still inside the validity window.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::{Epoch, Pointer};

/// Inclusive range of epochs that may still hold usable balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochRange {
    pub from: Epoch,
    pub to: Epoch,
}

impl EpochRange {
    pub fn new(from: Epoch, to: Epoch) -> Self {
        debug_assert!(from <= to, "epoch range is inverted");
        Self { from, to }
    }

    pub fn contains(&self, epoch: Epoch) -> bool {
        self.from <= epoch && epoch <= self.to
    }

    /// Epochs in ascending order (oldest first).
    pub fn epochs(&self) -> core::ops::RangeInclusive<Epoch> {
        self.from..=self.to
    }
}

/// Strategy mapping pointers to epochs and defining the validity window.
///
/// Implementations must be pure: the same pointer always maps to the same
/// epoch, and epochs partition the pointer axis into contiguous, ascending,
/// non-overlapping buckets.
pub trait WindowPolicy: Send + Sync {
    /// Bucket containing `pointer`.
    fn epoch_of(&self, pointer: Pointer) -> Epoch;

    /// Length of one epoch in pointer units.
    fn epoch_length(&self) -> u64;

    /// Maximum deposit age, in pointer units, before a deposit expires.
    fn window_length(&self) -> u64;

    /// Epochs that may still hold usable balance at `pointer`.
    ///
    /// The lower bound is the epoch of the oldest pointer that is already
    /// expired, so that epoch is partially valid; every later epoch up to the
    /// current one is fully valid.
    fn epoch_range(&self, pointer: Pointer) -> EpochRange {
        let oldest = pointer.saturating_sub(self.window_length());
        EpochRange::new(self.epoch_of(oldest), self.epoch_of(pointer))
    }

    /// True when a deposit made at `deposit` can no longer be spent at `now`.
    fn is_pointer_expired(&self, deposit: Pointer, now: Pointer) -> bool {
        now.saturating_sub(deposit) >= self.window_length()
    }

    /// Smallest deposit pointer still spendable at `now`.
    fn oldest_valid_pointer(&self, now: Pointer) -> Pointer {
        now.saturating_add(1).saturating_sub(self.window_length())
    }
}

impl<P> WindowPolicy for std::sync::Arc<P>
where
    P: WindowPolicy + ?Sized,
{
    fn epoch_of(&self, pointer: Pointer) -> Epoch {
        (**self).epoch_of(pointer)
    }

    fn epoch_length(&self) -> u64 {
        (**self).epoch_length()
    }

    fn window_length(&self) -> u64 {
        (**self).window_length()
    }

    fn epoch_range(&self, pointer: Pointer) -> EpochRange {
        (**self).epoch_range(pointer)
    }

    fn is_pointer_expired(&self, deposit: Pointer, now: Pointer) -> bool {
        (**self).is_pointer_expired(deposit, now)
    }

    fn oldest_valid_pointer(&self, now: Pointer) -> Pointer {
        (**self).oldest_valid_pointer(now)
    }
}

/// Fixed-size epochs with a window spanning a whole number of them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FixedWindowPolicy {
    epoch_length: u64,
    window_epochs: u64,
}

impl FixedWindowPolicy {
    pub fn new(epoch_length: u64, window_epochs: u64) -> LedgerResult<Self> {
        if epoch_length == 0 {
            return Err(LedgerError::config("epoch length must be positive"));
        }
        if window_epochs == 0 {
            return Err(LedgerError::config("window must span at least one epoch"));
        }
        epoch_length
            .checked_mul(window_epochs)
            .ok_or_else(|| LedgerError::config("window length overflows u64"))?;
        Ok(Self {
            epoch_length,
            window_epochs,
        })
    }

    pub fn window_epochs(&self) -> u64 {
        self.window_epochs
    }
}

impl WindowPolicy for FixedWindowPolicy {
    fn epoch_of(&self, pointer: Pointer) -> Epoch {
        pointer / self.epoch_length
    }

    fn epoch_length(&self) -> u64 {
        self.epoch_length
    }

    fn window_length(&self) -> u64 {
        self.epoch_length * self.window_epochs
    }
}
