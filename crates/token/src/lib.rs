//! Thread-safe token facade over [`lapse_ledger::EpochLedger`].
//!
//! Reads the current pointer from a [`lapse_core::PointerSource`], serializes
//! writes behind one lock, tracks allowances and publishes every successful
//! write as a sealed [`lapse_events::EventEnvelope`].

pub mod service;

pub use service::{ExpiringToken, LedgerEnvelope};
