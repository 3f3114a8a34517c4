//! # Vault Configuration & Constants
//!
//! Token metadata defaults and runtime limits. The defaults reproduce the
//! deployed `LendToken` exactly; everything else is a devnet convenience.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, DECIMALS};

/// Version of the engine, reported by the node.
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default share token name.
pub const DEFAULT_NAME: &str = "LendToken";

/// Default share token symbol.
pub const DEFAULT_SYMBOL: &str = "LEND";

/// Account that deploys the vault. The vault's own address is derived from
/// it at nonce 0.
pub const DEPLOYER: Address = Address::from_low_u8(0x01);

/// Maximum nesting of re-entrant calls inside one transaction.
pub const MAX_CALL_DEPTH: usize = 8;

/// Construction parameters for a [`LendingVault`](crate::vault::LendingVault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Shares minted to the vault's own address at construction. Zero unless
    /// an operator has a reason to seed the supply.
    pub initial_supply: Amount,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            decimals: DECIMALS,
            initial_supply: 0,
        }
    }
}

impl VaultConfig {
    pub fn with_initial_supply(mut self, initial_supply: Amount) -> Self {
        self.initial_supply = initial_supply;
        self
    }
}
