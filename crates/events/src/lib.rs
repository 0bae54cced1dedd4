//! Ledger events and their distribution.
//!
//! The ledger state is the source of truth; events describe what a successful
//! call changed so that observers (audit logs, indexers) can follow along.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
