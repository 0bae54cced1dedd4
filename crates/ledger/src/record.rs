//! Per-(epoch, account) balance record.

use std::collections::HashMap;

use lapse_core::{Amount, EvictionStrategy, LedgerError, LedgerResult, Pointer};
use lapse_index::{SortedCircularIndex, Walk, compaction_due};

/// Deposits one account holds in one epoch.
///
/// `total_balance` always equals the sum of the live entries. An entry is live
/// while its pointer is linked in `list`; amounts left behind for unlinked
/// pointers are stale and read as zero.
#[derive(Debug, Clone, Default)]
pub struct EpochAccountRecord {
    total_balance: Amount,
    balances: HashMap<Pointer, Amount>,
    list: SortedCircularIndex,
}

/// Outcome of detaching expired entries from a record.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Eviction {
    pub entries: usize,
    pub amount: Amount,
    /// Which index operation detached them (`None` when nothing expired).
    pub mode: Option<EvictionMode>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EvictionMode {
    Shrink,
    LazyShrink,
    Clear,
}

impl EpochAccountRecord {
    pub fn total_balance(&self) -> Amount {
        self.total_balance
    }

    /// Live amount deposited at `pointer` (zero for stale or unknown entries).
    pub fn amount_at(&self, pointer: Pointer) -> Amount {
        if !self.list.exists(pointer) {
            return 0;
        }
        self.balances.get(&pointer).copied().unwrap_or(0)
    }

    pub fn index(&self) -> &SortedCircularIndex {
        &self.list
    }

    /// Live pointers, oldest first.
    pub fn pointers(&self) -> Walk<'_> {
        self.list.ascending()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Sum of live entries at or after `oldest_valid`, without touching state.
    pub fn unexpired_balance(&self, oldest_valid: Pointer) -> Amount {
        if self.list.head().is_some_and(|head| head >= oldest_valid) {
            return self.total_balance;
        }
        match self.list.lower_bound(oldest_valid) {
            Some(first) => self.list.walk_from(first).map(|p| self.amount_at(p)).sum(),
            None => 0,
        }
    }

    /// Fails with `Overflow` if crediting `amount` would overflow the record.
    pub(crate) fn check_credit(&self, amount: Amount) -> LedgerResult<()> {
        self.total_balance
            .checked_add(amount)
            .map(|_| ())
            .ok_or(LedgerError::Overflow)
    }

    /// Add `amount` at `pointer`, linking it if it is not live yet.
    pub(crate) fn credit(&mut self, pointer: Pointer, amount: Amount) -> LedgerResult<()> {
        let total = self
            .total_balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let entry = self
            .amount_at(pointer)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        if !self.list.insert(pointer) && !self.list.exists(pointer) {
            return Err(LedgerError::InvalidPointer);
        }
        self.balances.insert(pointer, entry);
        self.total_balance = total;
        Ok(())
    }

    /// Take up to `value` oldest-first. Wholly consumed entries are unlinked;
    /// a partially consumed one keeps its place with the remainder.
    ///
    /// Returns the `(pointer, amount)` slices taken, in order.
    pub(crate) fn consume(&mut self, value: Amount) -> Vec<(Pointer, Amount)> {
        let mut remaining = value;
        let mut taken = Vec::new();

        while remaining > 0 {
            let Some(head) = self.list.head() else {
                break;
            };
            let available = self.amount_at(head);

            if available <= remaining {
                remaining -= available;
                self.total_balance -= available;
                self.list.remove(head);
                self.balances.remove(&head);
                taken.push((head, available));
            } else {
                self.balances.insert(head, available - remaining);
                self.total_balance -= remaining;
                taken.push((head, remaining));
                remaining = 0;
            }
        }

        taken
    }

    /// Detach every entry older than `oldest_valid` and drop its amount from
    /// `total_balance`.
    pub(crate) fn evict_before(
        &mut self,
        oldest_valid: Pointer,
        strategy: EvictionStrategy,
    ) -> Eviction {
        let mut eviction = Eviction::default();
        let mut cursor = self.list.head();
        let mut expired = Vec::new();

        while let Some(pointer) = cursor {
            if pointer >= oldest_valid {
                break;
            }
            eviction.entries += 1;
            eviction.amount += self.amount_at(pointer);
            if strategy == EvictionStrategy::Eager {
                expired.push(pointer);
            }
            cursor = self.list.next(pointer);
        }

        if eviction.entries == 0 {
            return eviction;
        }

        let mode = match cursor {
            None => {
                self.list.clear();
                self.balances.clear();
                EvictionMode::Clear
            }
            Some(first_valid) => {
                let survivors = self.list.size() - eviction.entries;
                let lazy = match strategy {
                    EvictionStrategy::Lazy => true,
                    EvictionStrategy::Eager => false,
                    EvictionStrategy::Adaptive => survivors < eviction.entries,
                };
                if lazy {
                    self.list.lazy_shrink(first_valid);
                    self.compact_balances();
                    EvictionMode::LazyShrink
                } else {
                    self.list.shrink(first_valid);
                    for pointer in expired {
                        self.balances.remove(&pointer);
                    }
                    EvictionMode::Shrink
                }
            }
        };

        self.total_balance -= eviction.amount;
        eviction.mode = Some(mode);
        eviction
    }

    /// Drop amounts left behind for unlinked pointers once they pile up, on
    /// the same schedule the index uses for its detached nodes.
    fn compact_balances(&mut self) {
        if compaction_due(self.list.size(), self.balances.len()) {
            let list = &self.list;
            self.balances.retain(|pointer, _| list.exists(*pointer));
        }
    }

    /// Check that `total_balance` matches the live entries.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let live: Amount = self.pointers().map(|p| self.amount_at(p)).sum();
        assert_eq!(live, self.total_balance, "total_balance drifted from entries");
        assert_eq!(self.pointers().count(), self.list.size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_of(entries: &[(Pointer, Amount)]) -> EpochAccountRecord {
        let mut record = EpochAccountRecord::default();
        for (p, amount) in entries {
            record.credit(*p, *amount).unwrap();
        }
        record
    }

    #[test]
    fn credit_accumulates_per_pointer() {
        let record = record_of(&[(5, 10), (3, 4), (5, 6)]);
        assert_eq!(record.total_balance(), 20);
        assert_eq!(record.amount_at(5), 16);
        assert_eq!(record.pointers().collect::<Vec<_>>(), vec![3, 5]);
        record.assert_consistent();
    }

    #[test]
    fn credit_rejects_sentinel_and_overflow() {
        let mut record = record_of(&[(1, Amount::MAX)]);
        assert_eq!(record.credit(2, 1), Err(LedgerError::Overflow));
        assert_eq!(record.credit(0, 0), Err(LedgerError::InvalidPointer));
        assert_eq!(record.total_balance(), Amount::MAX);
        record.assert_consistent();
    }

    #[test]
    fn consume_takes_oldest_first_and_splits_the_last_entry() {
        let mut record = record_of(&[(1, 10), (2, 20), (3, 30)]);
        let taken = record.consume(25);
        assert_eq!(taken, vec![(1, 10), (2, 15)]);
        assert_eq!(record.amount_at(1), 0);
        assert_eq!(record.amount_at(2), 5);
        assert_eq!(record.total_balance(), 35);
        assert_eq!(record.index().head(), Some(2));
        record.assert_consistent();
    }

    #[test]
    fn unexpired_balance_skips_old_entries() {
        let record = record_of(&[(1, 10), (5, 20), (9, 30)]);
        assert_eq!(record.unexpired_balance(0), 60);
        assert_eq!(record.unexpired_balance(2), 50);
        assert_eq!(record.unexpired_balance(9), 30);
        assert_eq!(record.unexpired_balance(10), 0);
    }

    #[test]
    fn lazy_and_eager_eviction_leave_the_same_balance() {
        let entries: Vec<(Pointer, Amount)> = (1..=10).map(|p| (p, p as Amount)).collect();

        let mut lazy = record_of(&entries);
        let mut eager = record_of(&entries);
        let a = lazy.evict_before(4, EvictionStrategy::Lazy);
        let b = eager.evict_before(4, EvictionStrategy::Eager);

        assert_eq!((a.entries, a.amount), (3, 6));
        assert_eq!((b.entries, b.amount), (3, 6));
        assert_eq!(a.mode, Some(EvictionMode::LazyShrink));
        assert_eq!(b.mode, Some(EvictionMode::Shrink));
        assert_eq!(lazy.total_balance(), eager.total_balance());
        assert_eq!(
            lazy.pointers().collect::<Vec<_>>(),
            eager.pointers().collect::<Vec<_>>()
        );
        // Lazy leaves stale amounts behind; eager drops them.
        assert_eq!(lazy.balances.len(), 10);
        assert_eq!(eager.balances.len(), 7);
        assert_eq!(lazy.amount_at(2), 0);
        lazy.assert_consistent();
        eager.assert_consistent();
    }

    #[test]
    fn lazy_eviction_compacts_stale_amounts_in_bulk() {
        let entries: Vec<(Pointer, Amount)> = (1..=100).map(|p| (p, 1)).collect();
        let mut record = record_of(&entries);

        let e = record.evict_before(91, EvictionStrategy::Lazy);
        assert_eq!(e.mode, Some(EvictionMode::LazyShrink));
        assert_eq!(e.entries, 90);
        assert_eq!(record.balances.len(), 10);
        assert!(record.balances.keys().all(|p| record.index().exists(*p)));
        assert_eq!(record.total_balance(), 10);
        record.assert_consistent();
    }

    #[test]
    fn adaptive_eviction_walks_the_smaller_side() {
        let entries: Vec<(Pointer, Amount)> = (1..=10).map(|p| (p, 1)).collect();

        let mut few_expired = record_of(&entries);
        let e = few_expired.evict_before(3, EvictionStrategy::Adaptive);
        assert_eq!(e.mode, Some(EvictionMode::Shrink));

        let mut most_expired = record_of(&entries);
        let e = most_expired.evict_before(9, EvictionStrategy::Adaptive);
        assert_eq!(e.mode, Some(EvictionMode::LazyShrink));
        assert_eq!(most_expired.total_balance(), 2);
    }

    #[test]
    fn evicting_everything_clears_the_record() {
        let mut record = record_of(&[(1, 1), (2, 2)]);
        let e = record.evict_before(100, EvictionStrategy::Lazy);
        assert_eq!(e.mode, Some(EvictionMode::Clear));
        assert_eq!(e.amount, 3);
        assert!(record.is_empty());
        assert_eq!(record.total_balance(), 0);
        record.assert_consistent();
    }

    #[test]
    fn nothing_to_evict_is_a_no_op() {
        let mut record = record_of(&[(5, 1)]);
        assert_eq!(record.evict_before(5, EvictionStrategy::Eager), Eviction::default());
        assert_eq!(record.total_balance(), 1);
    }
}
