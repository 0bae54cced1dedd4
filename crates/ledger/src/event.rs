use serde::{Deserialize, Serialize};

use lapse_core::{AccountId, Amount, Epoch, Pointer};
use lapse_events::Event;

/// One deposit entry (or part of one) that moved during a debit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub epoch: Epoch,
    /// Original deposit pointer; the recipient inherits it unchanged.
    pub pointer: Pointer,
    pub amount: Amount,
}

/// Event: Minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minted {
    pub to: AccountId,
    pub pointer: Pointer,
    pub epoch: Epoch,
    pub amount: Amount,
}

/// Event: Burned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burned {
    pub from: AccountId,
    pub pointer: Pointer,
    pub amount: Amount,
    pub slices: Vec<Slice>,
}

/// Event: Transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transferred {
    pub from: AccountId,
    pub to: AccountId,
    pub pointer: Pointer,
    pub amount: Amount,
    pub slices: Vec<Slice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Minted(Minted),
    Burned(Burned),
    Transferred(Transferred),
}

impl LedgerEvent {
    pub fn amount(&self) -> Amount {
        match self {
            LedgerEvent::Minted(e) => e.amount,
            LedgerEvent::Burned(e) => e.amount,
            LedgerEvent::Transferred(e) => e.amount,
        }
    }

    /// Entries debited from the sender (empty for mints).
    pub fn slices(&self) -> &[Slice] {
        match self {
            LedgerEvent::Minted(_) => &[],
            LedgerEvent::Burned(e) => &e.slices,
            LedgerEvent::Transferred(e) => &e.slices,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Minted(_) => "ledger.minted",
            LedgerEvent::Burned(_) => "ledger.burned",
            LedgerEvent::Transferred(_) => "ledger.transferred",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn pointer(&self) -> Pointer {
        match self {
            LedgerEvent::Minted(e) => e.pointer,
            LedgerEvent::Burned(e) => e.pointer,
            LedgerEvent::Transferred(e) => e.pointer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_namespaced() {
        let minted = LedgerEvent::Minted(Minted {
            to: AccountId::from_u128(7),
            pointer: 12,
            epoch: 1,
            amount: 5,
        });
        assert_eq!(minted.event_type(), "ledger.minted");
        assert_eq!(minted.pointer(), 12);
        assert!(minted.slices().is_empty());
    }

    #[test]
    fn transfer_round_trips_through_json() {
        let event = LedgerEvent::Transferred(Transferred {
            from: AccountId::from_u128(1),
            to: AccountId::from_u128(2),
            pointer: 40,
            amount: 9,
            slices: vec![Slice {
                epoch: 3,
                pointer: 31,
                amount: 9,
            }],
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: LedgerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.amount(), 9);
    }
}
