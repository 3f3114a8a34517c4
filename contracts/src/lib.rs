// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # LendVault Contracts
//!
//! The share-accounting engine behind LendVault: a pooled-deposit vault where
//! users put in the native asset and get back `LEND` shares, redeemable later
//! for a proportional cut of whatever the pool holds at that moment.
//!
//! - **ledger**: per-holder share balances and the total supply.
//! - **vault**: deposit, withdraw (all or partial), passive receive, and the
//!   ERC-20 style share token surface.
//! - **bank**: the native asset the pool is denominated in.
//! - **runtime**: sequential, all-or-nothing execution of calls, including
//!   the outbound payout and any re-entrant call it triggers.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Wrapping arithmetic and
//!    money do not mix.
//! 2. Payouts round down. The pool can never owe more than it holds.
//! 3. Shares are debited before value leaves the vault, and the types make
//!    it impossible to do otherwise.
//! 4. Every data type is serializable (serde) so the node can ship it over
//!    the wire untouched.

pub mod bank;
pub mod config;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod math;
pub mod runtime;
pub mod types;
pub mod vault;

pub use bank::{Bank, NativeAsset};
pub use config::VaultConfig;
pub use errors::{BankError, ExecutionError, TokenError, VaultError};
pub use events::{EventLog, EventRecord, VaultEvent};
pub use ledger::ShareLedger;
pub use runtime::{Call, HookContext, PayoutHook, Receipt, Runtime, Transaction};
pub use types::{Address, Amount};
pub use vault::{LendingVault, Redemption, RedemptionKind, VaultCheckpoint};
