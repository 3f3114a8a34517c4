//! Error types for the vault, the share token surface, the native asset,
//! and the runtime that ties them together.

use thiserror::Error;

use crate::types::{Address, Amount};

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Failures of the deposit and withdraw engines.
///
/// Every variant aborts the whole call with no state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The principal quantity of the operation was zero.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// A debit or redemption exceeds the caller's balance. Also covers
    /// redeeming everything when there is nothing to redeem.
    #[error("insufficient shares: balance {balance}, requested {requested}")]
    InsufficientShares {
        /// The holder's current share balance.
        balance: Amount,
        /// The amount the caller tried to debit.
        requested: Amount,
    },

    /// Crediting would push a balance or the total supply past `u128::MAX`.
    #[error("share supply overflow")]
    SupplyOverflow,
}

impl VaultError {
    /// Stable name of the variant, as surfaced to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::ZeroAmount => "ZeroAmount",
            VaultError::InsufficientShares { .. } => "InsufficientShares",
            VaultError::SupplyOverflow => "SupplyOverflow",
        }
    }
}

// ---------------------------------------------------------------------------
// Share token
// ---------------------------------------------------------------------------

/// Failures of share transfers and allowances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: {sender} has {balance}, needs {needed}")]
    InsufficientBalance {
        sender: Address,
        balance: Amount,
        needed: Amount,
    },

    #[error("insufficient allowance: {spender} may spend {allowance}, needs {needed}")]
    InsufficientAllowance {
        spender: Address,
        allowance: Amount,
        needed: Amount,
    },

    /// Shares cannot be sent to the zero address. Burning goes through
    /// withdrawal.
    #[error("invalid receiver: {0}")]
    InvalidReceiver(Address),

    #[error("invalid sender: {0}")]
    InvalidSender(Address),
}

impl TokenError {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::InsufficientBalance { .. } => "InsufficientBalance",
            TokenError::InsufficientAllowance { .. } => "InsufficientAllowance",
            TokenError::InvalidReceiver(_) => "InvalidReceiver",
            TokenError::InvalidSender(_) => "InvalidSender",
        }
    }
}

// ---------------------------------------------------------------------------
// Native asset
// ---------------------------------------------------------------------------

/// Failures moving the native asset between accounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("insufficient funds: {account} has {available}, needs {needed}")]
    InsufficientFunds {
        account: Address,
        available: Amount,
        needed: Amount,
    },

    #[error("native balance overflow for {0}")]
    Overflow(Address),
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Anything that can abort a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Bank(#[from] BankError),

    /// Re-entrant calls nested deeper than the runtime allows.
    #[error("call depth exceeded: limit {0}")]
    CallDepthExceeded(usize),

    /// A recipient hook refused the incoming value.
    #[error("recipient rejected transfer: {0}")]
    HookRejected(String),
}

impl ExecutionError {
    /// Stable name of the failure for API clients, e.g. `"ZeroAmount"`.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Vault(e) => e.kind(),
            ExecutionError::Token(e) => e.kind(),
            ExecutionError::Bank(BankError::InsufficientFunds { .. }) => "InsufficientFunds",
            ExecutionError::Bank(BankError::Overflow(_)) => "BalanceOverflow",
            ExecutionError::CallDepthExceeded(_) => "CallDepthExceeded",
            ExecutionError::HookRejected(_) => "HookRejected",
        }
    }

    /// The vault error, if this failure came from the deposit or withdraw
    /// engines.
    pub fn as_vault(&self) -> Option<&VaultError> {
        match self {
            ExecutionError::Vault(e) => Some(e),
            _ => None,
        }
    }
}
