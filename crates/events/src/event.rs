use lapse_core::Pointer;

/// A ledger fact.
///
/// Events are immutable, versioned, and stamped with the pointer at which the
/// call that produced them ran.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "ledger.transferred").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Pointer of the call that produced the event.
    fn pointer(&self) -> Pointer;
}
