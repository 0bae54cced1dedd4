//! Sorted circular index over deposit pointers.
//!
//! Pure data structure: it orders pointers and knows nothing about balances.

pub mod list;

pub use list::{SortedCircularIndex, Walk, compaction_due};
