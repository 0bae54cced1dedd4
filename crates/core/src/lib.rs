//! Shared primitives for the expiring ledger.
//!
//! Pure domain types only: identifiers, scalar aliases, the error model and the
//! injected windowing/pointer strategies. No storage or IO.

pub mod config;
pub mod error;
pub mod id;
pub mod policy;
pub mod pointer;

pub use config::{EvictionStrategy, LedgerConfig};
pub use error::{AccountRole, LedgerError, LedgerResult};
pub use id::AccountId;
pub use policy::{EpochRange, FixedWindowPolicy, WindowPolicy};
pub use pointer::{ManualPointer, PointerSource, WallClockPointer};

/// Monotonic "when" marker for deposits (block height, tick, second).
///
/// `0` is reserved as the sentinel and never names a deposit.
pub type Pointer = u64;

/// Bucket id over the pointer axis.
pub type Epoch = u64;

/// Balance and transfer quantities.
pub type Amount = u128;

/// The reserved pointer value.
pub const SENTINEL: Pointer = 0;
