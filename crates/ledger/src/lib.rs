//! Expiring balance ledger.
//!
//! Pure domain logic only: no IO, no clocks, no locking. Callers supply the
//! current pointer and serialize access (see `lapse-token`).

pub mod event;
pub mod ledger;
pub mod record;

pub use event::{Burned, LedgerEvent, Minted, Slice, Transferred};
pub use ledger::EpochLedger;
pub use record::{EpochAccountRecord, Eviction, EvictionMode};
