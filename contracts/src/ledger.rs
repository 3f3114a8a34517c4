//! # Share Ledger
//!
//! Per-holder share balances plus the aggregate supply. This is pure
//! bookkeeping: no zero checks and no events. The engines above it decide
//! what is a valid operation; the ledger only guarantees that
//! `total_supply == sum(balances)` and that no balance goes negative.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::VaultError;
use crate::types::{Address, Amount};

/// Share balances keyed by holder.
///
/// A holder that was never credited and one whose balance went back to
/// zero are indistinguishable from the outside: both read as `0`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareLedger {
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to `holder` and to the total supply.
    ///
    /// # Errors
    ///
    /// [`VaultError::SupplyOverflow`] if either sum would exceed `u128::MAX`.
    /// Nothing is modified in that case.
    pub fn credit(&mut self, holder: &Address, amount: Amount) -> Result<(), VaultError> {
        let new_total = self
            .total_supply
            .checked_add(amount)
            .ok_or(VaultError::SupplyOverflow)?;
        let balance = self.balances.entry(*holder).or_insert(0);
        // Every balance is bounded by the total, so this cannot fail once the
        // total has been checked.
        *balance += amount;
        self.total_supply = new_total;
        Ok(())
    }

    /// Removes `amount` from `holder` and from the total supply.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientShares`] if the holder has less than
    /// `amount`. Nothing is modified in that case.
    pub fn debit(&mut self, holder: &Address, amount: Amount) -> Result<(), VaultError> {
        let balance = self.balance_of(holder);
        if balance < amount {
            return Err(VaultError::InsufficientShares {
                balance,
                requested: amount,
            });
        }
        if let Some(entry) = self.balances.get_mut(holder) {
            *entry -= amount;
        }
        self.total_supply -= amount;
        Ok(())
    }

    /// Moves shares between holders. The total supply is unchanged.
    pub fn move_shares(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), VaultError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(VaultError::InsufficientShares {
                balance,
                requested: amount,
            });
        }
        if let Some(entry) = self.balances.get_mut(from) {
            *entry -= amount;
        }
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Holders with a non-zero balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter().filter(|(_, amount)| **amount > 0)
    }

    pub fn holder_count(&self) -> usize {
        self.holders().count()
    }

    /// Sum of every balance, or `None` if it overflows (which would itself
    /// be a broken invariant).
    pub fn sum_of_balances(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(0u128, |acc, v| acc.checked_add(*v))
    }

    /// `true` when the total supply equals the sum of all balances.
    pub fn is_conserved(&self) -> bool {
        self.sum_of_balances() == Some(self.total_supply)
    }

    /// Panics if the conservation invariant is broken. A mismatch means a
    /// bug in this crate, not a user error, so there is nothing to recover.
    pub fn assert_conserved(&self) {
        assert!(
            self.is_conserved(),
            "share ledger out of balance: total_supply {} != sum of balances {:?}",
            self.total_supply,
            self.sum_of_balances()
        );
    }
}
