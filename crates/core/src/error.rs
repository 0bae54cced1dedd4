//! Ledger error model.

use thiserror::Error;

use crate::{Amount, Epoch};

/// Result type used across the ledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Which side of an operation carried an invalid account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AccountRole {
    Sender,
    Receiver,
    Spender,
}

impl core::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            AccountRole::Sender => "sender",
            AccountRole::Receiver => "receiver",
            AccountRole::Spender => "spender",
        };
        f.write_str(name)
    }
}

/// Ledger-level error.
///
/// Every variant is terminal for the call that produced it: the ledger is left
/// exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The null account was used where a real one is required.
    #[error("invalid {0} account")]
    InvalidAccount(AccountRole),

    /// The requested amount exceeds what is available in the relevant range.
    #[error("insufficient balance (available: {available}, requested: {requested})")]
    InsufficientBalance { available: Amount, requested: Amount },

    /// The spender has not been approved for the requested amount.
    #[error("insufficient allowance (allowance: {allowance}, requested: {requested})")]
    InsufficientAllowance { allowance: Amount, requested: Amount },

    /// The targeted epoch is below the currently valid range.
    #[error("epoch {epoch} expired (oldest valid: {oldest_valid})")]
    ExpiredEpoch { epoch: Epoch, oldest_valid: Epoch },

    /// The targeted epoch has not started yet.
    #[error("epoch {epoch} is ahead of the current epoch {current}")]
    FutureEpoch { epoch: Epoch, current: Epoch },

    #[error("amount must be non-zero")]
    ZeroAmount,

    /// Pointer 0 is the index sentinel and cannot carry a deposit.
    #[error("pointer 0 is reserved")]
    InvalidPointer,

    #[error("arithmetic overflow")]
    Overflow,

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Invalid or unparsable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A lock guarding ledger state was poisoned by a panicking writer.
    #[error("ledger state lock poisoned")]
    Poisoned,
}

impl LedgerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_balance(available: Amount, requested: Amount) -> Self {
        Self::InsufficientBalance {
            available,
            requested,
        }
    }
}
