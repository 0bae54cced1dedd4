//! Epoch-bucketed accounting engine.
//!
//! State is nested the same way it is keyed: epoch → account → record, plus a
//! flat pointer → amount world-state table fed by mints.
//!
//! Every write validates first and mutates second, so a failed call leaves
//! the ledger untouched. Expired entries are only detached when a write touches
//! the owning (epoch, account); reads compute the same answer without
//! detaching anything.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use lapse_core::{
    AccountId, AccountRole, Amount, Epoch, EpochRange, EvictionStrategy, FixedWindowPolicy,
    LedgerConfig, LedgerError, LedgerResult, Pointer, SENTINEL, WindowPolicy,
};

use crate::event::{Burned, LedgerEvent, Minted, Slice, Transferred};
use crate::record::{EpochAccountRecord, Eviction};

/// Expiring balance ledger over an injected window policy.
///
/// Every stored amount originates from a mint, so capping the lifetime mint
/// volume at `Amount::MAX` bounds every cross-record sum below it as well.
#[derive(Debug, Clone)]
pub struct EpochLedger<P> {
    policy: P,
    eviction: EvictionStrategy,
    records: BTreeMap<Epoch, HashMap<AccountId, EpochAccountRecord>>,
    world_state: HashMap<Pointer, Amount>,
    /// Sum of `world_state`; mints that would overflow it are rejected.
    minted: Amount,
    /// Amount removed from records by eviction or pruning.
    expired: Amount,
}

impl EpochLedger<FixedWindowPolicy> {
    /// Ledger with fixed-size epochs as described by `config`.
    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        Ok(Self::new(config.policy()?).with_eviction(config.eviction))
    }
}

impl<P: WindowPolicy> EpochLedger<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            eviction: EvictionStrategy::default(),
            records: BTreeMap::new(),
            world_state: HashMap::new(),
            minted: 0,
            expired: 0,
        }
    }

    pub fn with_eviction(mut self, eviction: EvictionStrategy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn eviction(&self) -> EvictionStrategy {
        self.eviction
    }

    pub fn record(&self, epoch: Epoch, account: AccountId) -> Option<&EpochAccountRecord> {
        self.records.get(&epoch)?.get(&account)
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Single state transition at `pointer`: mint when `from` is null, burn
    /// when `to` is null, transfer otherwise.
    pub fn update(
        &mut self,
        pointer: Pointer,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        if value == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        match (from.is_null(), to.is_null()) {
            (true, true) => Err(LedgerError::InvalidAccount(AccountRole::Receiver)),
            (true, false) => self.apply_mint(pointer, to, value),
            (false, _) => self.apply_debit(pointer, from, to, value),
        }
    }

    /// Like [`update`](Self::update) but confined to one still-valid epoch.
    ///
    /// Debits never spill into neighbouring epochs, and minting into a chosen
    /// epoch is not possible (`from` must be a real account).
    pub fn update_at_epoch(
        &mut self,
        pointer: Pointer,
        epoch: Epoch,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        if value == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if from.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Sender));
        }

        let range = self.policy.epoch_range(pointer);
        if epoch < range.from {
            return Err(LedgerError::ExpiredEpoch {
                epoch,
                oldest_valid: range.from,
            });
        }
        if epoch > range.to {
            return Err(LedgerError::FutureEpoch {
                epoch,
                current: range.to,
            });
        }

        let available = self.balance_of_epoch(pointer, epoch, from);
        if available < value {
            return Err(LedgerError::insufficient_balance(available, value));
        }
        self.check_credit(&[epoch], to, value)?;

        self.realize_eviction(pointer, range.from, from);
        let slices = self.consume_epoch(epoch, from, value);
        self.credit_slices(pointer, range.from, to, &slices)?;

        Ok(self.debit_event(pointer, from, to, value, slices))
    }

    pub fn mint(&mut self, pointer: Pointer, to: AccountId, value: Amount) -> LedgerResult<LedgerEvent> {
        if to.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Receiver));
        }
        self.update(pointer, AccountId::NULL, to, value)
    }

    pub fn burn(&mut self, pointer: Pointer, from: AccountId, value: Amount) -> LedgerResult<LedgerEvent> {
        if from.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Sender));
        }
        self.update(pointer, from, AccountId::NULL, value)
    }

    pub fn transfer(
        &mut self,
        pointer: Pointer,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        if from.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Sender));
        }
        if to.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Receiver));
        }
        self.update(pointer, from, to, value)
    }

    /// Drop every record in an epoch that has fully expired at `pointer`.
    ///
    /// The world-state table is kept. Returns the number of epochs dropped.
    pub fn prune_expired(&mut self, pointer: Pointer) -> usize {
        let oldest = self.policy.epoch_range(pointer).from;
        let live = self.records.split_off(&oldest);
        let stale = std::mem::replace(&mut self.records, live);
        let dropped = stale.len();
        let dropped_amount = total_of(
            stale
                .values()
                .flat_map(|accounts| accounts.values())
                .map(EpochAccountRecord::total_balance),
        );
        self.expired = self.expired.saturating_add(dropped_amount);
        if dropped > 0 {
            debug!(pointer, oldest_valid = oldest, dropped, "pruned expired epochs");
        }
        dropped
    }

    fn apply_mint(&mut self, pointer: Pointer, to: AccountId, value: Amount) -> LedgerResult<LedgerEvent> {
        if pointer == SENTINEL {
            return Err(LedgerError::InvalidPointer);
        }

        let epoch = self.policy.epoch_of(pointer);
        let minted = self
            .world_state_balance(pointer)
            .checked_add(value)
            .ok_or(LedgerError::Overflow)?;
        let supply = self.minted.checked_add(value).ok_or(LedgerError::Overflow)?;
        self.check_credit(&[epoch], to, value)?;

        let oldest = self.policy.epoch_range(pointer).from;
        self.realize_eviction(pointer, oldest, to);

        self.records
            .entry(epoch)
            .or_default()
            .entry(to)
            .or_default()
            .credit(pointer, value)?;
        self.world_state.insert(pointer, minted);
        self.minted = supply;

        debug!(%to, pointer, epoch, amount = %value, "minted");
        Ok(LedgerEvent::Minted(Minted {
            to,
            pointer,
            epoch,
            amount: value,
        }))
    }

    /// Burn (`to` null) or transfer across the whole valid range, oldest
    /// epoch first.
    fn apply_debit(
        &mut self,
        pointer: Pointer,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        let range = self.policy.epoch_range(pointer);

        let available = self.balance_over(pointer, range, from);
        if available < value {
            return Err(LedgerError::insufficient_balance(available, value));
        }
        let epochs: Vec<Epoch> = range.epochs().collect();
        self.check_credit(&epochs, to, value)?;

        self.realize_eviction(pointer, range.from, from);

        let mut remaining = value;
        let mut slices = Vec::new();
        for epoch in range.epochs() {
            if remaining == 0 {
                break;
            }
            let taken = self.consume_epoch(epoch, from, remaining);
            remaining -= taken.iter().map(|s| s.amount).sum::<Amount>();
            slices.extend(taken);
        }
        debug_assert_eq!(remaining, 0, "available balance was checked up front");

        self.credit_slices(pointer, range.from, to, &slices)?;
        Ok(self.debit_event(pointer, from, to, value, slices))
    }

    /// Fails with `Overflow` if `to` could not absorb `value` in any of `epochs`.
    fn check_credit(&self, epochs: &[Epoch], to: AccountId, value: Amount) -> LedgerResult<()> {
        if to.is_null() {
            return Ok(());
        }
        for epoch in epochs {
            if let Some(record) = self.record(*epoch, to) {
                record.check_credit(value)?;
            }
        }
        Ok(())
    }

    /// Detach `account`'s expired entries in the oldest valid epoch.
    fn realize_eviction(&mut self, pointer: Pointer, oldest_epoch: Epoch, account: AccountId) -> Eviction {
        let oldest_valid = self.policy.oldest_valid_pointer(pointer);
        let strategy = self.eviction;
        let Some(record) = self
            .records
            .get_mut(&oldest_epoch)
            .and_then(|accounts| accounts.get_mut(&account))
        else {
            return Eviction::default();
        };

        let eviction = record.evict_before(oldest_valid, strategy);
        self.expired = self.expired.saturating_add(eviction.amount);
        if eviction.entries > 0 {
            debug!(
                %account,
                epoch = oldest_epoch,
                entries = eviction.entries,
                amount = %eviction.amount,
                mode = ?eviction.mode,
                "evicted expired entries"
            );
        }
        eviction
    }

    fn consume_epoch(&mut self, epoch: Epoch, from: AccountId, value: Amount) -> Vec<Slice> {
        let Some(record) = self
            .records
            .get_mut(&epoch)
            .and_then(|accounts| accounts.get_mut(&from))
        else {
            return Vec::new();
        };

        record
            .consume(value)
            .into_iter()
            .map(|(pointer, amount)| Slice {
                epoch,
                pointer,
                amount,
            })
            .collect()
    }

    /// Credit each slice to `to` under its original epoch and pointer, so the
    /// recipient inherits the deposit age.
    fn credit_slices(
        &mut self,
        pointer: Pointer,
        oldest_epoch: Epoch,
        to: AccountId,
        slices: &[Slice],
    ) -> LedgerResult<()> {
        if to.is_null() || slices.is_empty() {
            return Ok(());
        }
        self.realize_eviction(pointer, oldest_epoch, to);
        for slice in slices {
            self.records
                .entry(slice.epoch)
                .or_default()
                .entry(to)
                .or_default()
                .credit(slice.pointer, slice.amount)?;
        }
        Ok(())
    }

    fn debit_event(
        &self,
        pointer: Pointer,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        slices: Vec<Slice>,
    ) -> LedgerEvent {
        debug!(%from, %to, pointer, amount = %amount, slices = slices.len(), "debited");
        if to.is_null() {
            LedgerEvent::Burned(Burned {
                from,
                pointer,
                amount,
                slices,
            })
        } else {
            LedgerEvent::Transferred(Transferred {
                from,
                to,
                pointer,
                amount,
                slices,
            })
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn current_epoch(&self, pointer: Pointer) -> Epoch {
        self.policy.epoch_of(pointer)
    }

    pub fn epoch_range(&self, pointer: Pointer) -> EpochRange {
        self.policy.epoch_range(pointer)
    }

    pub fn epoch_length(&self) -> u64 {
        self.policy.epoch_length()
    }

    /// Validity window in pointer units.
    pub fn validity_duration(&self) -> u64 {
        self.policy.window_length()
    }

    pub fn is_epoch_expired(&self, pointer: Pointer, epoch: Epoch) -> bool {
        epoch < self.policy.epoch_range(pointer).from
    }

    /// Spendable balance of `account` in `epoch` at `pointer`, zero when
    /// `epoch` is outside the valid range.
    pub fn balance_of_epoch(&self, pointer: Pointer, epoch: Epoch, account: AccountId) -> Amount {
        self.epoch_balance(pointer, self.policy.epoch_range(pointer), epoch, account)
    }

    /// Spendable balance across every valid epoch.
    pub fn balance_of(&self, pointer: Pointer, account: AccountId) -> Amount {
        self.balance_over(pointer, self.policy.epoch_range(pointer), account)
    }

    /// Same as [`balance_of_epoch`](Self::balance_of_epoch).
    pub fn balance_of_at_epoch(&self, pointer: Pointer, epoch: Epoch, account: AccountId) -> Amount {
        self.balance_of_epoch(pointer, epoch, account)
    }

    /// Total ever minted at `pointer`.
    pub fn world_state_balance(&self, pointer: Pointer) -> Amount {
        self.world_state.get(&pointer).copied().unwrap_or(0)
    }

    /// Live pointers of `account` in `epoch`, ascending. Unbounded; prefer
    /// [`token_list_page`](Self::token_list_page) for large histories.
    pub fn token_list(&self, epoch: Epoch, account: AccountId) -> Vec<Pointer> {
        self.record(epoch, account)
            .map(|record| record.pointers().collect())
            .unwrap_or_default()
    }

    /// Up to `limit` live pointers strictly after `after` (from the start when
    /// `None`), ascending.
    pub fn token_list_page(
        &self,
        epoch: Epoch,
        account: AccountId,
        after: Option<Pointer>,
        limit: usize,
    ) -> Vec<Pointer> {
        let Some(record) = self.record(epoch, account) else {
            return Vec::new();
        };
        let index = record.index();
        let start = match after {
            None => index.head(),
            Some(after) => after.checked_add(1).and_then(|p| index.lower_bound(p)),
        };
        match start {
            Some(start) => index.walk_from(start).take(limit).collect(),
            None => Vec::new(),
        }
    }

    /// Spendable balance summed over every account.
    pub fn total_supply(&self, pointer: Pointer) -> Amount {
        let range = self.policy.epoch_range(pointer);
        total_of(
            self.records
                .range(range.from..=range.to)
                .flat_map(|(epoch, accounts)| {
                    accounts
                        .keys()
                        .map(move |account| self.epoch_balance(pointer, range, *epoch, *account))
                }),
        )
    }

    /// Sum of every record's stored total, expired or not.
    pub fn recorded_total(&self) -> Amount {
        total_of(
            self.records
                .values()
                .flat_map(|accounts| accounts.values())
                .map(EpochAccountRecord::total_balance),
        )
    }

    /// Sum of the world-state table.
    pub fn minted_total(&self) -> Amount {
        self.minted
    }

    /// Amount that left the records through eviction or pruning.
    pub fn expired_total(&self) -> Amount {
        self.expired
    }

    /// Only the oldest valid epoch can hold expired-but-attached entries, so
    /// it is summed from its first unexpired entry; any later epoch's stored
    /// total is already exact.
    fn epoch_balance(
        &self,
        pointer: Pointer,
        range: EpochRange,
        epoch: Epoch,
        account: AccountId,
    ) -> Amount {
        if !range.contains(epoch) {
            return 0;
        }
        let Some(record) = self.record(epoch, account) else {
            return 0;
        };
        if epoch == range.from {
            record.unexpired_balance(self.policy.oldest_valid_pointer(pointer))
        } else {
            record.total_balance()
        }
    }

    fn balance_over(&self, pointer: Pointer, range: EpochRange, account: AccountId) -> Amount {
        total_of(
            range
                .epochs()
                .map(|epoch| self.epoch_balance(pointer, range, epoch, account)),
        )
    }
}

/// Sum that cannot overflow while lifetime minting is capped at `Amount::MAX`;
/// saturates rather than panicking if that bound is ever broken.
fn total_of(amounts: impl Iterator<Item = Amount>) -> Amount {
    amounts.fold(0, Amount::saturating_add)
}
