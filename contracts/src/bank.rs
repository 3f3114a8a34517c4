//! # Native Asset
//!
//! The vault is denominated in the chain's native asset. Its pooled balance
//! is not a field of the vault: it is whatever the vault's account holds,
//! read through [`NativeAsset`] at the moment a redemption is priced.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::BankError;
use crate::types::{Address, Amount};

/// Read and move native value between accounts.
pub trait NativeAsset {
    /// Native balance held by `account`.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Moves `amount` from `from` to `to`. All-or-nothing.
    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount)
        -> Result<(), BankError>;
}

/// In-memory native asset accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bank {
    accounts: HashMap<Address, Amount>,
    total_issuance: Amount,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `amount` out of thin air in `account`. Used for genesis
    /// funding only.
    pub fn mint(&mut self, account: &Address, amount: Amount) -> Result<(), BankError> {
        let issuance = self
            .total_issuance
            .checked_add(amount)
            .ok_or(BankError::Overflow(*account))?;
        let balance = self.accounts.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(BankError::Overflow(*account))?;
        self.total_issuance = issuance;
        Ok(())
    }

    /// Total native value in existence.
    pub fn total_issuance(&self) -> Amount {
        self.total_issuance
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl NativeAsset for Bank {
    fn balance_of(&self, account: &Address) -> Amount {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), BankError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(BankError::InsufficientFunds {
                account: *from,
                available,
                needed: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let receiver = self.balance_of(to);
        let new_receiver = receiver
            .checked_add(amount)
            .ok_or(BankError::Overflow(*to))?;
        self.accounts.insert(*from, available - amount);
        self.accounts.insert(*to, new_receiver);
        Ok(())
    }
}
