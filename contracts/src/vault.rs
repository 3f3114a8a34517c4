//! # Lending Vault
//!
//! The share-accounting engine. Users deposit native value and are minted
//! `LEND` shares 1:1; shares are later redeemed for a pro-rata slice of the
//! pool:
//!
//! ```text
//! payout = floor(shares * pool_balance / total_shares)
//! ```
//!
//! Value sent to the vault without a deposit raises `pool_balance` but not
//! `total_shares`, so every outstanding share becomes worth more. That is
//! intended.
//!
//! ## Withdrawal ordering
//!
//! A withdrawal is split in two so the outbound transfer can only happen
//! after the shares are gone:
//!
//! 1. [`begin_withdraw_all`](LendingVault::begin_withdraw_all) /
//!    [`begin_withdraw_partial`](LendingVault::begin_withdraw_partial)
//!    validate, price and burn the shares, and hand back a [`Redemption`].
//! 2. The caller (see [`crate::runtime`]) pays the redemption out. Any code
//!    that runs on receipt and calls back into the vault sees the debited
//!    balance.
//! 3. [`settle`](LendingVault::settle) emits the withdrawal event.
//!
//! The vault never holds native value itself, so it cannot skip step 1.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use crate::errors::{TokenError, VaultError};
use crate::events::{EventLog, VaultEvent};
use crate::ledger::ShareLedger;
use crate::math;
use crate::types::{amount_str, Address, Amount};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which withdrawal produced a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionKind {
    /// The holder's entire balance.
    All,
    /// An explicit share amount.
    Partial,
}

/// Shares that have already been burned and the native value owed for them.
///
/// Only the vault can build one, and only after debiting the holder.
#[must_use = "a redemption must be paid out and then settled"]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    holder: Address,
    #[serde(with = "amount_str")]
    shares: Amount,
    #[serde(with = "amount_str")]
    payout: Amount,
    kind: RedemptionKind,
}

impl Redemption {
    pub fn holder(&self) -> Address {
        self.holder
    }

    pub fn shares(&self) -> Amount {
        self.shares
    }

    pub fn payout(&self) -> Amount {
        self.payout
    }

    pub fn kind(&self) -> RedemptionKind {
        self.kind
    }
}

/// The vault's complete state.
/// Pre-transaction vault state, from [`LendingVault::checkpoint`].
#[derive(Debug, Clone)]
pub struct VaultCheckpoint {
    ledger: ShareLedger,
    allowances: HashMap<Address, HashMap<Address, Amount>>,
    events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingVault {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    ledger: ShareLedger,
    /// `owner -> spender -> remaining allowance`.
    allowances: HashMap<Address, HashMap<Address, Amount>>,
    events: EventLog,
}

impl LendingVault {
    /// Deploys a vault at `address`.
    ///
    /// A non-zero `config.initial_supply` is minted to the vault's own
    /// address, so `balance_of(address) == total_supply()` straight after
    /// construction.
    pub fn new(address: Address, config: VaultConfig) -> Result<Self, VaultError> {
        let mut vault = Self {
            address,
            name: config.name,
            symbol: config.symbol,
            decimals: config.decimals,
            ledger: ShareLedger::new(),
            allowances: HashMap::new(),
            events: EventLog::new(),
        };

        if config.initial_supply > 0 {
            vault.ledger.credit(&address, config.initial_supply)?;
            vault.events.emit(VaultEvent::Transfer {
                from: Address::ZERO,
                to: address,
                value: config.initial_supply,
            });
        }

        tracing::info!(
            %address,
            symbol = %vault.symbol,
            initial_supply = %config.initial_supply,
            "vault deployed"
        );
        Ok(vault)
    }

    // -- Metadata ---------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.ledger.balance_of(holder)
    }

    pub fn ledger(&self) -> &ShareLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // -- Deposit engine ---------------------------------------------------

    /// Mints `value` shares to `caller` for `value` native units that have
    /// already been moved into the vault's account.
    ///
    /// # Errors
    ///
    /// [`VaultError::ZeroAmount`] if `value == 0`.
    pub fn deposit(&mut self, caller: Address, value: Amount) -> Result<(), VaultError> {
        if value == 0 {
            return Err(VaultError::ZeroAmount);
        }

        self.ledger.credit(&caller, value)?;
        self.events.emit(VaultEvent::Transfer {
            from: Address::ZERO,
            to: caller,
            value,
        });
        self.events.emit(VaultEvent::Deposit {
            holder: caller,
            value,
        });

        tracing::info!(holder = %caller, value = %value, "deposit");
        Ok(())
    }

    // -- Withdraw engine --------------------------------------------------

    /// Burns the caller's whole balance and prices it against `pool_balance`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientShares`] if the caller holds no shares.
    pub fn begin_withdraw_all(
        &mut self,
        caller: Address,
        pool_balance: Amount,
    ) -> Result<Redemption, VaultError> {
        let balance = self.ledger.balance_of(&caller);
        if balance == 0 {
            return Err(VaultError::InsufficientShares {
                balance,
                requested: balance,
            });
        }
        self.redeem(caller, balance, RedemptionKind::All, pool_balance)
    }

    /// Burns exactly `amount` of the caller's shares and prices them against
    /// `pool_balance`.
    ///
    /// # Errors
    ///
    /// [`VaultError::ZeroAmount`] if `amount == 0`,
    /// [`VaultError::InsufficientShares`] if `amount` exceeds the balance.
    pub fn begin_withdraw_partial(
        &mut self,
        caller: Address,
        amount: Amount,
        pool_balance: Amount,
    ) -> Result<Redemption, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.redeem(caller, amount, RedemptionKind::Partial, pool_balance)
    }

    fn redeem(
        &mut self,
        caller: Address,
        shares: Amount,
        kind: RedemptionKind,
        pool_balance: Amount,
    ) -> Result<Redemption, VaultError> {
        let balance = self.ledger.balance_of(&caller);
        let insufficient = VaultError::InsufficientShares {
            balance,
            requested: shares,
        };
        if shares > balance {
            return Err(insufficient);
        }

        // Priced against the supply before the burn. `0 < shares <= balance
        // <= total` keeps the divisor non-zero.
        let payout = math::redemption_payout(shares, pool_balance, self.ledger.total_supply())
            .ok_or(insufficient)?;

        self.ledger.debit(&caller, shares)?;
        self.events.emit(VaultEvent::Transfer {
            from: caller,
            to: Address::ZERO,
            value: shares,
        });

        tracing::debug!(
            holder = %caller,
            shares = %shares,
            payout = %payout,
            ?kind,
            "shares burned for redemption"
        );

        Ok(Redemption {
            holder: caller,
            shares,
            payout,
            kind,
        })
    }

    /// Records a paid-out redemption and returns the event it emitted.
    pub fn settle(&mut self, redemption: Redemption) -> VaultEvent {
        let event = match redemption.kind {
            RedemptionKind::All => VaultEvent::Withdraw {
                holder: redemption.holder,
                shares: redemption.shares,
            },
            RedemptionKind::Partial => VaultEvent::PartialWithdraw {
                holder: redemption.holder,
                shares: redemption.shares,
            },
        };
        self.events.emit(event.clone());

        tracing::info!(
            holder = %redemption.holder,
            shares = %redemption.shares,
            payout = %redemption.payout,
            kind = ?redemption.kind,
            "withdrawal settled"
        );
        event
    }

    /// Native value `shares` would redeem for right now.
    pub fn preview_redeem(&self, shares: Amount, pool_balance: Amount) -> Amount {
        math::redemption_payout(shares, pool_balance, self.ledger.total_supply()).unwrap_or(0)
    }

    // -- Passive receiver -------------------------------------------------

    /// Native value arrived without a deposit. The bank already holds it;
    /// the ledger is left alone.
    pub fn receive(&self, from: Address, value: Amount) {
        tracing::info!(%from, value = %value, "unsolicited value retained in pool");
    }

    // -- Rollback ---------------------------------------------------------

    /// Captures the mutable state a failed transaction must undo. The event
    /// log is append-only, so only its length is kept.
    pub fn checkpoint(&self) -> VaultCheckpoint {
        VaultCheckpoint {
            ledger: self.ledger.clone(),
            allowances: self.allowances.clone(),
            events: self.events.len() as u64,
        }
    }

    /// Rewinds to `checkpoint`, dropping every event emitted since.
    pub fn restore(&mut self, checkpoint: VaultCheckpoint) {
        self.ledger = checkpoint.ledger;
        self.allowances = checkpoint.allowances;
        self.events.truncate(checkpoint.events);
    }

    // -- Share token ------------------------------------------------------

    /// Moves `amount` shares from `caller` to `to`.
    pub fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.move_shares(caller, to, amount)
    }

    /// Sets `spender`'s allowance over `caller`'s shares.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if caller.is_zero() {
            return Err(TokenError::InvalidSender(caller));
        }
        if spender.is_zero() {
            return Err(TokenError::InvalidReceiver(spender));
        }
        self.allowances
            .entry(caller)
            .or_default()
            .insert(spender, amount);
        self.events.emit(VaultEvent::Approval {
            owner: caller,
            spender,
            value: amount,
        });
        Ok(())
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|s| s.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Moves `amount` of `from`'s shares to `to` on `caller`'s allowance.
    /// An allowance of `u128::MAX` is never decreased.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(&from, &caller);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                spender: caller,
                allowance,
                needed: amount,
            });
        }

        self.move_shares(from, to, amount)?;

        if allowance != Amount::MAX {
            self.allowances
                .entry(from)
                .or_default()
                .insert(caller, allowance - amount);
        }
        Ok(())
    }

    fn move_shares(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if from.is_zero() {
            return Err(TokenError::InvalidSender(from));
        }
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver(to));
        }
        self.ledger
            .move_shares(&from, &to, amount)
            .map_err(|_| TokenError::InsufficientBalance {
                sender: from,
                balance: self.ledger.balance_of(&from),
                needed: amount,
            })?;
        self.events.emit(VaultEvent::Transfer {
            from,
            to,
            value: amount,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: Amount = 1_000_000_000_000_000_000;

    fn vault() -> LendingVault {
        LendingVault::new(Address::from_low_u8(0xee), VaultConfig::default()).unwrap()
    }

    fn alice() -> Address {
        Address::from_low_u8(0xa1)
    }

    fn bob() -> Address {
        Address::from_low_u8(0xb0)
    }

    #[test]
    fn metadata_matches_config() {
        let v = vault();
        assert_eq!(v.name(), "LendToken");
        assert_eq!(v.symbol(), "LEND");
        assert_eq!(v.decimals(), 18);
        assert_eq!(v.total_supply(), 0);
    }

    #[test]
    fn initial_supply_is_held_by_the_vault() {
        let address = Address::from_low_u8(0xee);
        let v = LendingVault::new(address, VaultConfig::default().with_initial_supply(1_000))
            .unwrap();
        assert_eq!(v.balance_of(&address), 1_000);
        assert_eq!(v.total_supply(), v.balance_of(&address));
    }

    #[test]
    fn deposit_mints_one_to_one() {
        let mut v = vault();
        v.deposit(alice(), ONE).unwrap();
        assert_eq!(v.balance_of(&alice()), ONE);
        assert_eq!(v.total_supply(), ONE);
        assert_eq!(
            v.events().last().unwrap().event,
            VaultEvent::Deposit {
                holder: alice(),
                value: ONE
            }
        );
    }

    #[test]
    fn zero_deposit_is_rejected() {
        let mut v = vault();
        assert_eq!(v.deposit(alice(), 0), Err(VaultError::ZeroAmount));
        assert_eq!(v.total_supply(), 0);
        assert!(v.events().is_empty());
    }

    #[test]
    fn withdraw_all_burns_everything() {
        let mut v = vault();
        v.deposit(alice(), ONE).unwrap();
        let r = v.begin_withdraw_all(alice(), ONE).unwrap();
        assert_eq!(r.shares(), ONE);
        assert_eq!(r.payout(), ONE);
        assert_eq!(v.balance_of(&alice()), 0);
        assert_eq!(v.total_supply(), 0);
        assert_eq!(
            v.settle(r),
            VaultEvent::Withdraw {
                holder: alice(),
                shares: ONE
            }
        );
    }

    #[test]
    fn withdraw_all_with_nothing_is_insufficient() {
        let mut v = vault();
        let err = v.begin_withdraw_all(alice(), 0).unwrap_err();
        assert!(matches!(err, VaultError::InsufficientShares { .. }));
    }

    #[test]
    fn partial_withdraw_keeps_remainder() {
        let mut v = vault();
        v.deposit(alice(), ONE).unwrap();
        let r = v.begin_withdraw_partial(alice(), ONE / 2, ONE).unwrap();
        assert_eq!(r.payout(), ONE / 2);
        assert_eq!(r.kind(), RedemptionKind::Partial);
        assert_eq!(v.balance_of(&alice()), ONE / 2);
        assert_eq!(
            v.settle(r),
            VaultEvent::PartialWithdraw {
                holder: alice(),
                shares: ONE / 2
            }
        );
    }

    #[test]
    fn partial_withdraw_validation() {
        let mut v = vault();
        assert_eq!(
            v.begin_withdraw_partial(alice(), 0, 0),
            Err(VaultError::ZeroAmount)
        );
        v.deposit(alice(), ONE).unwrap();
        assert_eq!(
            v.begin_withdraw_partial(alice(), 2 * ONE, ONE),
            Err(VaultError::InsufficientShares {
                balance: ONE,
                requested: 2 * ONE
            })
        );
        assert_eq!(v.balance_of(&alice()), ONE);
    }

    #[test]
    fn payout_follows_pool_not_deposits() {
        let mut v = vault();
        v.deposit(alice(), 100).unwrap();
        v.deposit(bob(), 300).unwrap();
        // Pool received 400 in deposits plus 100 unsolicited.
        let r = v.begin_withdraw_all(alice(), 500).unwrap();
        assert_eq!(r.payout(), 125);
        assert_eq!(v.preview_redeem(300, 375), 375);
    }

    #[test]
    fn payout_rounds_down() {
        let mut v = vault();
        v.deposit(alice(), 1).unwrap();
        v.deposit(bob(), 2).unwrap();
        let r = v.begin_withdraw_all(alice(), 10).unwrap();
        assert_eq!(r.payout(), 3);
    }

    #[test]
    fn transfer_moves_shares() {
        let mut v = vault();
        v.deposit(alice(), 10).unwrap();
        v.transfer(alice(), bob(), 4).unwrap();
        assert_eq!(v.balance_of(&alice()), 6);
        assert_eq!(v.balance_of(&bob()), 4);
        assert_eq!(v.total_supply(), 10);
    }

    #[test]
    fn transfer_rejects_zero_receiver_and_overdraft() {
        let mut v = vault();
        v.deposit(alice(), 10).unwrap();
        assert_eq!(
            v.transfer(alice(), Address::ZERO, 1),
            Err(TokenError::InvalidReceiver(Address::ZERO))
        );
        assert_eq!(
            v.transfer(alice(), bob(), 11),
            Err(TokenError::InsufficientBalance {
                sender: alice(),
                balance: 10,
                needed: 11
            })
        );
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let mut v = vault();
        v.deposit(alice(), 10).unwrap();
        v.approve(alice(), bob(), 6).unwrap();
        assert_eq!(v.allowance(&alice(), &bob()), 6);

        v.transfer_from(bob(), alice(), bob(), 4).unwrap();
        assert_eq!(v.allowance(&alice(), &bob()), 2);
        assert_eq!(v.balance_of(&bob()), 4);

        assert_eq!(
            v.transfer_from(bob(), alice(), bob(), 3),
            Err(TokenError::InsufficientAllowance {
                spender: bob(),
                allowance: 2,
                needed: 3
            })
        );
    }

    #[test]
    fn unlimited_allowance_is_not_decremented() {
        let mut v = vault();
        v.deposit(alice(), 10).unwrap();
        v.approve(alice(), bob(), Amount::MAX).unwrap();
        v.transfer_from(bob(), alice(), bob(), 10).unwrap();
        assert_eq!(v.allowance(&alice(), &bob()), Amount::MAX);
    }

    #[test]
    fn failed_transfer_from_keeps_allowance() {
        let mut v = vault();
        v.deposit(alice(), 1).unwrap();
        v.approve(alice(), bob(), 5).unwrap();
        assert!(v.transfer_from(bob(), alice(), bob(), 5).is_err());
        assert_eq!(v.allowance(&alice(), &bob()), 5);
    }

    #[test]
    fn restore_rewinds_ledger_allowances_and_events() {
        let mut v = vault();
        v.deposit(alice(), 10).unwrap();
        let checkpoint = v.checkpoint();

        v.deposit(bob(), 3).unwrap();
        v.approve(alice(), bob(), 4).unwrap();
        v.transfer(alice(), bob(), 2).unwrap();
        v.restore(checkpoint);

        assert_eq!(v.balance_of(&alice()), 10);
        assert_eq!(v.balance_of(&bob()), 0);
        assert_eq!(v.total_supply(), 10);
        assert_eq!(v.allowance(&alice(), &bob()), 0);
        assert_eq!(v.events().len(), 2);
        assert_eq!(v.events().last().unwrap().event.name(), "Deposit");
    }
}
