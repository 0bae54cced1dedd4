//! Token service: atomic calls over the ledger.
//!
//! ## Call model
//!
//! ```text
//! call
//!   ↓
//! 1. Take the write lock (one critical section per call)
//!   ↓
//! 2. Read the current pointer from the PointerSource
//!   ↓
//! 3. Validate and apply on the EpochLedger (nothing changes on error)
//!   ↓
//! 4. Seal the event with the next sequence number and publish it
//! ```
//!
//! Queries take the read lock and never change state. The pointer is read
//! under the lock, so pointers observed by successive writes never decrease
//! as long as the source itself is monotonic.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use lapse_core::{
    AccountId, AccountRole, Amount, Epoch, FixedWindowPolicy, LedgerConfig, LedgerError,
    LedgerResult, Pointer, PointerSource, WindowPolicy,
};
use lapse_events::{Event, EventBus, EventEnvelope};
use lapse_ledger::{EpochLedger, LedgerEvent};

/// What the token publishes for every successful write.
pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

#[derive(Debug)]
struct TokenState<P> {
    ledger: EpochLedger<P>,
    /// (owner, spender) → remaining allowance.
    allowances: HashMap<(AccountId, AccountId), Amount>,
    /// Sequence number of the last published envelope.
    sequence: u64,
}

/// Expiring token with allowances.
///
/// - `P`: window policy driving the ledger's epoch math
/// - `S`: source of the current pointer
/// - `B`: bus receiving a [`LedgerEnvelope`] per successful write
///
/// Publication is best effort: the ledger is the source of truth, so a bus
/// failure is logged and the call still succeeds.
#[derive(Debug)]
pub struct ExpiringToken<P, S, B> {
    state: RwLock<TokenState<P>>,
    clock: S,
    bus: B,
}

impl<S, B> ExpiringToken<FixedWindowPolicy, S, B>
where
    S: PointerSource,
    B: EventBus<LedgerEnvelope>,
{
    pub fn from_config(config: &LedgerConfig, clock: S, bus: B) -> LedgerResult<Self> {
        Ok(Self::new(EpochLedger::from_config(config)?, clock, bus))
    }
}

impl<P, S, B> ExpiringToken<P, S, B>
where
    P: WindowPolicy,
    S: PointerSource,
    B: EventBus<LedgerEnvelope>,
{
    pub fn new(ledger: EpochLedger<P>, clock: S, bus: B) -> Self {
        Self {
            state: RwLock::new(TokenState {
                ledger,
                allowances: HashMap::new(),
                sequence: 0,
            }),
            clock,
            bus,
        }
    }

    pub fn clock(&self) -> &S {
        &self.clock
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, TokenState<P>>> {
        self.state.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, TokenState<P>>> {
        self.state.write().map_err(|_| LedgerError::Poisoned)
    }

    /// Seal and publish under the caller's write guard so sequence numbers
    /// reach subscribers in order.
    fn publish(&self, state: &mut TokenState<P>, event: LedgerEvent) -> LedgerEvent {
        state.sequence += 1;
        let envelope = EventEnvelope::seal(state.sequence, event.clone());
        if let Err(err) = self.bus.publish(envelope) {
            warn!(
                sequence = state.sequence,
                event_type = event.event_type(),
                error = %err,
                "failed to publish ledger event"
            );
        }
        event
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    pub fn mint(&self, to: AccountId, value: Amount) -> LedgerResult<LedgerEvent> {
        let mut state = self.write()?;
        let pointer = self.clock.current();
        let event = state.ledger.mint(pointer, to, value)?;
        info!(%to, pointer, amount = %value, "mint");
        Ok(self.publish(&mut state, event))
    }

    pub fn burn(&self, from: AccountId, value: Amount) -> LedgerResult<LedgerEvent> {
        let mut state = self.write()?;
        let pointer = self.clock.current();
        let event = state.ledger.burn(pointer, from, value)?;
        info!(%from, pointer, amount = %value, "burn");
        Ok(self.publish(&mut state, event))
    }

    pub fn transfer(&self, from: AccountId, to: AccountId, value: Amount) -> LedgerResult<LedgerEvent> {
        let mut state = self.write()?;
        let pointer = self.clock.current();
        let event = state.ledger.transfer(pointer, from, to, value)?;
        info!(%from, %to, pointer, amount = %value, "transfer");
        Ok(self.publish(&mut state, event))
    }

    /// Transfer confined to `epoch`; the debit never spills into other epochs.
    pub fn transfer_at_epoch(
        &self,
        epoch: Epoch,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        if to.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Receiver));
        }
        let mut state = self.write()?;
        let pointer = self.clock.current();
        let event = state.ledger.update_at_epoch(pointer, epoch, from, to, value)?;
        info!(%from, %to, pointer, epoch, amount = %value, "transfer at epoch");
        Ok(self.publish(&mut state, event))
    }

    /// Transfer on behalf of `from`, spending `spender`'s allowance.
    ///
    /// The allowance is checked first and debited only once the ledger
    /// accepted the transfer. An allowance of `Amount::MAX` is never debited.
    pub fn transfer_from(
        &self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        let mut state = self.write()?;
        let allowance = Self::check_allowance(&state, spender, from, value)?;
        let pointer = self.clock.current();
        let event = state.ledger.transfer(pointer, from, to, value)?;
        Self::spend_allowance(&mut state, spender, from, allowance, value);
        info!(%spender, %from, %to, pointer, amount = %value, "transfer from");
        Ok(self.publish(&mut state, event))
    }

    pub fn transfer_from_at_epoch(
        &self,
        spender: AccountId,
        epoch: Epoch,
        from: AccountId,
        to: AccountId,
        value: Amount,
    ) -> LedgerResult<LedgerEvent> {
        if to.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Receiver));
        }
        let mut state = self.write()?;
        let allowance = Self::check_allowance(&state, spender, from, value)?;
        let pointer = self.clock.current();
        let event = state.ledger.update_at_epoch(pointer, epoch, from, to, value)?;
        Self::spend_allowance(&mut state, spender, from, allowance, value);
        info!(%spender, %from, %to, pointer, epoch, amount = %value, "transfer from at epoch");
        Ok(self.publish(&mut state, event))
    }

    /// Set (not add to) the amount `spender` may move out of `owner`.
    pub fn approve(&self, owner: AccountId, spender: AccountId, value: Amount) -> LedgerResult<()> {
        if owner.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Sender));
        }
        if spender.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Spender));
        }
        let mut state = self.write()?;
        if value == 0 {
            state.allowances.remove(&(owner, spender));
        } else {
            state.allowances.insert((owner, spender), value);
        }
        info!(%owner, %spender, amount = %value, "approve");
        Ok(())
    }

    /// Drop every record in a fully expired epoch. Returns the epochs dropped.
    pub fn prune_expired(&self) -> LedgerResult<usize> {
        let mut state = self.write()?;
        let pointer = self.clock.current();
        let dropped = state.ledger.prune_expired(pointer);
        if dropped > 0 {
            info!(pointer, dropped, "prune expired epochs");
        }
        Ok(dropped)
    }

    fn check_allowance(
        state: &TokenState<P>,
        spender: AccountId,
        from: AccountId,
        value: Amount,
    ) -> LedgerResult<Amount> {
        if spender.is_null() {
            return Err(LedgerError::InvalidAccount(AccountRole::Spender));
        }
        let allowance = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if allowance < value {
            return Err(LedgerError::InsufficientAllowance {
                allowance,
                requested: value,
            });
        }
        Ok(allowance)
    }

    fn spend_allowance(
        state: &mut TokenState<P>,
        spender: AccountId,
        from: AccountId,
        allowance: Amount,
        value: Amount,
    ) {
        if allowance == Amount::MAX {
            return;
        }
        let remaining = allowance - value;
        if remaining == 0 {
            state.allowances.remove(&(from, spender));
        } else {
            state.allowances.insert((from, spender), remaining);
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> LedgerResult<Amount> {
        Ok(self
            .read()?
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0))
    }

    pub fn current_pointer(&self) -> Pointer {
        self.clock.current()
    }

    pub fn balance_of(&self, account: AccountId) -> LedgerResult<Amount> {
        let state = self.read()?;
        Ok(state.ledger.balance_of(self.clock.current(), account))
    }

    pub fn balance_of_at_epoch(&self, epoch: Epoch, account: AccountId) -> LedgerResult<Amount> {
        let state = self.read()?;
        Ok(state
            .ledger
            .balance_of_at_epoch(self.clock.current(), epoch, account))
    }

    pub fn total_supply(&self) -> LedgerResult<Amount> {
        let state = self.read()?;
        Ok(state.ledger.total_supply(self.clock.current()))
    }

    pub fn current_epoch(&self) -> LedgerResult<Epoch> {
        let state = self.read()?;
        Ok(state.ledger.current_epoch(self.clock.current()))
    }

    pub fn epoch_length(&self) -> LedgerResult<u64> {
        Ok(self.read()?.ledger.epoch_length())
    }

    pub fn validity_duration(&self) -> LedgerResult<u64> {
        Ok(self.read()?.ledger.validity_duration())
    }

    pub fn is_epoch_expired(&self, epoch: Epoch) -> LedgerResult<bool> {
        let state = self.read()?;
        Ok(state.ledger.is_epoch_expired(self.clock.current(), epoch))
    }

    pub fn world_state_balance(&self, pointer: Pointer) -> LedgerResult<Amount> {
        Ok(self.read()?.ledger.world_state_balance(pointer))
    }

    pub fn token_list(&self, epoch: Epoch, account: AccountId) -> LedgerResult<Vec<Pointer>> {
        Ok(self.read()?.ledger.token_list(epoch, account))
    }

    pub fn token_list_page(
        &self,
        epoch: Epoch,
        account: AccountId,
        after: Option<Pointer>,
        limit: usize,
    ) -> LedgerResult<Vec<Pointer>> {
        Ok(self
            .read()?
            .ledger
            .token_list_page(epoch, account, after, limit))
    }

    /// Sequence number of the last published envelope (0 before any write).
    pub fn sequence(&self) -> LedgerResult<u64> {
        Ok(self.read()?.sequence)
    }
}
