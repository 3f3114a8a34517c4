//! # Execution Runtime
//!
//! Runs calls against the vault one at a time, each to completion or not
//! at all. The runtime owns the native asset [`Bank`], the deployed
//! [`LendingVault`], and any [`PayoutHook`]s: code living at an address
//! that runs whenever that address receives native value, and which may
//! call straight back into the runtime before the outer call returns.
//!
//! A failed transaction restores the bank and the vault to their state
//! before the call, events included. Hooks keep their own state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::{Bank, NativeAsset};
use crate::config::{VaultConfig, DEPLOYER, MAX_CALL_DEPTH};
use crate::errors::{BankError, ExecutionError, VaultError};
use crate::events::EventRecord;
use crate::types::{amount_str, Address, Amount};
use crate::vault::{LendingVault, Redemption};

// ---------------------------------------------------------------------------
// Calls & Receipts
// ---------------------------------------------------------------------------

/// Everything a caller can ask the runtime to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    /// Attach `value` native units and mint shares for them.
    Deposit {
        #[serde(with = "amount_str")]
        value: Amount,
    },
    /// Redeem the caller's whole share balance.
    WithdrawAll,
    /// Redeem exactly `amount` shares.
    WithdrawPartial {
        #[serde(with = "amount_str")]
        amount: Amount,
    },
    /// Plain native transfer. When `to` is the vault, the value is kept in
    /// the pool without minting anything.
    Send {
        to: Address,
        #[serde(with = "amount_str")]
        value: Amount,
    },
    TransferShares {
        to: Address,
        #[serde(with = "amount_str")]
        amount: Amount,
    },
    Approve {
        spender: Address,
        #[serde(with = "amount_str")]
        amount: Amount,
    },
    TransferSharesFrom {
        from: Address,
        to: Address,
        #[serde(with = "amount_str")]
        amount: Amount,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::Deposit { .. } => "deposit",
            Call::WithdrawAll => "withdraw",
            Call::WithdrawPartial { .. } => "withdraw_partial",
            Call::Send { .. } => "send",
            Call::TransferShares { .. } => "transfer",
            Call::Approve { .. } => "approve",
            Call::TransferSharesFrom { .. } => "transfer_from",
        }
    }
}

/// A call together with the account making it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub caller: Address,
    pub call: Call,
}

impl Transaction {
    pub fn new(caller: Address, call: Call) -> Self {
        Self { caller, call }
    }
}

/// Outcome of a successful transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_id: Uuid,
    pub caller: Address,
    pub call: Call,
    /// Native value paid to the caller by a withdrawal.
    #[serde(with = "amount_str::option")]
    pub payout: Option<Amount>,
    /// Events emitted by this transaction, nested calls included.
    pub events: Vec<EventRecord>,
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Code that runs when its address receives native value.
///
/// The hook may issue further calls through [`HookContext::call`], always
/// as the address it is installed at. Returning an error aborts the whole
/// transaction.
pub trait PayoutHook: Send {
    fn on_receive(
        &mut self,
        ctx: &mut HookContext<'_>,
        from: Address,
        value: Amount,
    ) -> Result<(), ExecutionError>;
}

/// A running hook's view of the runtime.
pub struct HookContext<'a> {
    runtime: &'a mut Runtime,
    address: Address,
}

impl HookContext<'_> {
    /// The address the hook is installed at.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn runtime(&self) -> &Runtime {
        &*self.runtime
    }

    /// Calls back into the runtime inside the current transaction, with the
    /// hook's address as the caller.
    pub fn call(&mut self, call: Call) -> Result<Option<Amount>, ExecutionError> {
        self.runtime.call(self.address, call)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Sequential executor for vault transactions.
pub struct Runtime {
    bank: Bank,
    vault: LendingVault,
    hooks: HashMap<Address, Box<dyn PayoutHook>>,
    depth: usize,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("vault", &self.vault.address())
            .field("total_supply", &self.vault.total_supply())
            .field("pool_balance", &self.pool_balance())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Runtime {
    /// Deploys a vault from [`DEPLOYER`] at nonce 0 with an empty bank.
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let address = Address::derive(&DEPLOYER, 0);
        Ok(Self {
            bank: Bank::new(),
            vault: LendingVault::new(address, config)?,
            hooks: HashMap::new(),
            depth: 0,
        })
    }

    // -- Setup ------------------------------------------------------------

    /// Credits native value to `account` outside of any transaction.
    pub fn fund(&mut self, account: &Address, amount: Amount) -> Result<(), BankError> {
        self.bank.mint(account, amount)?;
        tracing::debug!(%account, amount = %amount, "account funded");
        Ok(())
    }

    /// Installs `hook` at `address`, replacing any previous one.
    pub fn register_hook(&mut self, address: Address, hook: Box<dyn PayoutHook>) {
        self.hooks.insert(address, hook);
    }

    // -- Queries ----------------------------------------------------------

    pub fn vault(&self) -> &LendingVault {
        &self.vault
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn vault_address(&self) -> Address {
        self.vault.address()
    }

    /// Native value held by the vault. The source of truth for redemptions.
    pub fn pool_balance(&self) -> Amount {
        self.bank.balance_of(&self.vault.address())
    }

    pub fn native_balance(&self, account: &Address) -> Amount {
        self.bank.balance_of(account)
    }

    pub fn share_balance(&self, holder: &Address) -> Amount {
        self.vault.balance_of(holder)
    }

    // -- Execution --------------------------------------------------------

    /// Executes `tx` atomically.
    ///
    /// On failure the bank and vault are rolled back and the error is
    /// returned unchanged.
    pub fn execute(&mut self, tx: Transaction) -> Result<Receipt, ExecutionError> {
        let tx_id = Uuid::new_v4();
        let checkpoint = self.vault.checkpoint();
        let bank = self.bank.clone();
        let first_event = self.vault.events().len() as u64;

        match self.call(tx.caller, tx.call.clone()) {
            Ok(payout) => {
                self.vault.ledger().assert_conserved();
                let events = self.vault.events().since(first_event).to_vec();
                tracing::info!(
                    %tx_id,
                    caller = %tx.caller,
                    call = tx.call.name(),
                    events = events.len(),
                    "transaction executed"
                );
                Ok(Receipt {
                    tx_id,
                    caller: tx.caller,
                    call: tx.call,
                    payout,
                    events,
                })
            }
            Err(err) => {
                self.bank = bank;
                self.vault.restore(checkpoint);
                tracing::warn!(
                    %tx_id,
                    caller = %tx.caller,
                    call = tx.call.name(),
                    error = %err,
                    "transaction reverted"
                );
                Err(err)
            }
        }
    }

    /// Runs a call inside the current transaction. Does not roll anything
    /// back by itself. Returns the payout for withdrawals.
    fn call(&mut self, caller: Address, call: Call) -> Result<Option<Amount>, ExecutionError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutionError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        self.depth += 1;
        let result = self.dispatch(caller, call);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, caller: Address, call: Call) -> Result<Option<Amount>, ExecutionError> {
        let vault_address = self.vault.address();
        match call {
            Call::Deposit { value } => {
                self.bank.transfer(&caller, &vault_address, value)?;
                self.vault.deposit(caller, value)?;
                Ok(None)
            }
            Call::WithdrawAll => {
                let pool = self.pool_balance();
                let redemption = self.vault.begin_withdraw_all(caller, pool)?;
                self.pay_out(redemption).map(Some)
            }
            Call::WithdrawPartial { amount } => {
                let pool = self.pool_balance();
                let redemption = self.vault.begin_withdraw_partial(caller, amount, pool)?;
                self.pay_out(redemption).map(Some)
            }
            Call::Send { to, value } => {
                self.send_value(caller, to, value)?;
                Ok(None)
            }
            Call::TransferShares { to, amount } => {
                self.vault.transfer(caller, to, amount)?;
                Ok(None)
            }
            Call::Approve { spender, amount } => {
                self.vault.approve(caller, spender, amount)?;
                Ok(None)
            }
            Call::TransferSharesFrom { from, to, amount } => {
                self.vault.transfer_from(caller, from, to, amount)?;
                Ok(None)
            }
        }
    }

    /// Sends a redemption's payout and settles it. The shares are already
    /// burned by the time this runs.
    fn pay_out(&mut self, redemption: Redemption) -> Result<Amount, ExecutionError> {
        let payout = redemption.payout();
        self.send_value(self.vault.address(), redemption.holder(), payout)?;
        self.vault.settle(redemption);
        Ok(payout)
    }

    fn send_value(
        &mut self,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<(), ExecutionError> {
        self.bank.transfer(&from, &to, value)?;

        if to == self.vault.address() && from != to {
            self.vault.receive(from, value);
        }

        if let Some(mut hook) = self.hooks.remove(&to) {
            let mut ctx = HookContext {
                runtime: self,
                address: to,
            };
            let outcome = hook.on_receive(&mut ctx, from, value);
            self.hooks.insert(to, hook);
            outcome?;
        }
        Ok(())
    }
}
