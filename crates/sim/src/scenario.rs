use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use lapse_core::{AccountId, Amount, Epoch, FixedWindowPolicy, LedgerConfig, ManualPointer, Pointer};
use lapse_events::{EventBus, InMemoryEventBus, Subscription};
use lapse_token::{ExpiringToken, LedgerEnvelope};

/// Number of rounds to simulate.
pub const ENV_ROUNDS: &str = "LAPSE_SIM_ROUNDS";

const ACCOUNTS: u128 = 3;

type Bus = Arc<InMemoryEventBus<LedgerEnvelope>>;
type Token = ExpiringToken<FixedWindowPolicy, Arc<ManualPointer>, Bus>;

/// State of the token after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub config: LedgerConfig,
    pub pointer: Pointer,
    pub current_epoch: Epoch,
    pub validity_duration: u64,
    pub events_published: usize,
    pub total_supply: Amount,
    pub accounts: Vec<AccountSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub balance: Amount,
    /// Linked deposit pointers per epoch (non-empty epochs only).
    pub deposits: BTreeMap<Epoch, Vec<Pointer>>,
}

/// Round-robin workload over a few fixed accounts.
///
/// Each round mints to one account, moves half of it on, and every few rounds
/// also spends an allowance, burns, or prunes. Time advances by one epoch per
/// round, so early deposits age out while the run is still going.
pub struct Scenario {
    config: LedgerConfig,
    token: Token,
    clock: Arc<ManualPointer>,
    events: Subscription<LedgerEnvelope>,
    accounts: Vec<AccountId>,
    rounds: u64,
}

impl Scenario {
    pub const DEFAULT_ROUNDS: u64 = 12;

    pub fn new(config: LedgerConfig, rounds: u64) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualPointer::default());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let events = bus.subscribe();
        let token = ExpiringToken::from_config(&config, clock.clone(), bus)?;

        Ok(Self {
            config,
            token,
            clock,
            events,
            accounts: (1..=ACCOUNTS).map(AccountId::from_u128).collect(),
            rounds,
        })
    }

    pub fn run(self) -> anyhow::Result<Snapshot> {
        let n = self.accounts.len();
        let half_epoch = (self.config.epoch_length / 2).max(1);

        for round in 0..self.rounds {
            let r = round as usize;
            let holder = self.accounts[r % n];
            let next = self.accounts[(r + 1) % n];
            let spender = self.accounts[(r + 2) % n];
            let minted = 100 * Amount::from(round + 1);

            self.token.mint(holder, minted)?;
            self.clock.advance(half_epoch);
            self.token.transfer(holder, next, minted / 2)?;

            if round % 3 == 0 {
                self.token.approve(next, spender, 10)?;
                self.token.transfer_from(spender, next, holder, 10)?;
            }
            if round % 4 == 0 {
                self.token.burn(holder, 1)?;
            }
            if round % 5 == 4 {
                let dropped = self.token.prune_expired()?;
                debug!(round, dropped, "pruned");
            }

            self.clock.advance(half_epoch);
        }

        let snapshot = self.snapshot()?;
        info!(
            pointer = snapshot.pointer,
            events = snapshot.events_published,
            total_supply = %snapshot.total_supply,
            "simulation finished"
        );
        Ok(snapshot)
    }

    fn snapshot(&self) -> anyhow::Result<Snapshot> {
        let current_epoch = self.token.current_epoch()?;

        let mut accounts = Vec::with_capacity(self.accounts.len());
        for id in &self.accounts {
            let mut deposits = BTreeMap::new();
            for epoch in 0..=current_epoch {
                let pointers = self.token.token_list(epoch, *id)?;
                if !pointers.is_empty() {
                    deposits.insert(epoch, pointers);
                }
            }
            accounts.push(AccountSnapshot {
                id: *id,
                balance: self.token.balance_of(*id)?,
                deposits,
            });
        }

        Ok(Snapshot {
            config: self.config,
            pointer: self.token.current_pointer(),
            current_epoch,
            validity_duration: self.token.validity_duration()?,
            events_published: self.events.drain().len(),
            total_supply: self.token.total_supply()?,
            accounts,
        })
    }
}
