//! # Vault Events
//!
//! Append-only records emitted by the vault. The engine never reads them
//! back; they exist so clients can refresh balances and index activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{amount_str, Address, Amount};

/// Everything the vault can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    /// Shares minted 1:1 against deposited value.
    Deposit {
        holder: Address,
        #[serde(with = "amount_str")]
        value: Amount,
    },
    /// The holder's entire balance was redeemed.
    Withdraw {
        holder: Address,
        #[serde(with = "amount_str")]
        shares: Amount,
    },
    /// Part of the holder's balance was redeemed.
    PartialWithdraw {
        holder: Address,
        #[serde(with = "amount_str")]
        shares: Amount,
    },
    /// Shares moved. `from` is zero on mint, `to` is zero on burn.
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "amount_str")]
        value: Amount,
    },
    /// An allowance was set.
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "amount_str")]
        value: Amount,
    },
}

impl VaultEvent {
    /// Short event name, matching the variant.
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::Deposit { .. } => "Deposit",
            VaultEvent::Withdraw { .. } => "Withdraw",
            VaultEvent::PartialWithdraw { .. } => "PartialWithdraw",
            VaultEvent::Transfer { .. } => "Transfer",
            VaultEvent::Approval { .. } => "Approval",
        }
    }
}

/// An event together with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based, strictly increasing.
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    pub event: VaultEvent,
}

/// The vault's event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its sequence number.
    pub fn emit(&mut self, event: VaultEvent) -> u64 {
        let sequence = self.records.len() as u64;
        tracing::debug!(sequence, event = event.name(), "vault event");
        self.records.push(EventRecord {
            sequence,
            emitted_at: Utc::now(),
            event,
        });
        sequence
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records with `sequence >= since`.
    pub fn since(&self, since: u64) -> &[EventRecord] {
        let start = (since as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    /// Drops every record with `sequence >= len`.
    pub fn truncate(&mut self, len: u64) {
        self.records.truncate(len as usize);
    }
}
