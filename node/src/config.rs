//! # Node Configuration
//!
//! TOML file describing the vault to deploy and the devnet accounts to fund
//! at startup. Amounts are decimal strings in whole units (`"1.5"` is
//! `1.5 * 10^18`) so they survive TOML's 64-bit integers.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lendvault_contracts::types::{parse_units, UnitsError, DECIMALS};
use lendvault_contracts::{Address, Amount, VaultConfig};

/// Errors loading or writing a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid amount in `{field}`: {source}")]
    Amount {
        field: String,
        #[source]
        source: UnitsError,
    },
}

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network label reported by `/status`.
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default)]
    pub vault: VaultSection,
    /// Accounts credited with native value before the API starts.
    #[serde(default)]
    pub genesis: Vec<GenesisAccount>,
}

/// `[vault]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSection {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Shares pre-minted to the vault itself, in whole units.
    pub initial_supply: String,
}

/// `[[genesis]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    /// Native balance in whole units.
    pub balance: String,
}

fn default_network() -> String {
    "devnet".to_string()
}

impl Default for VaultSection {
    fn default() -> Self {
        let defaults = VaultConfig::default();
        Self {
            name: defaults.name,
            symbol: defaults.symbol,
            decimals: defaults.decimals,
            initial_supply: "0".to_string(),
        }
    }
}

impl Default for NodeConfig {
    /// A devnet with three funded accounts, 1000 units each.
    fn default() -> Self {
        Self {
            network: default_network(),
            vault: VaultSection::default(),
            genesis: (0x0a..=0x0c)
                .map(|n| GenesisAccount {
                    address: Address::from_low_u8(n),
                    balance: "1000".to_string(),
                })
                .collect(),
        }
    }
}

impl NodeConfig {
    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(raw)?;
        // Surface bad amounts at load time rather than at deploy time.
        config.vault_config()?;
        config.genesis_balances()?;
        Ok(config)
    }

    /// Writes the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// The vault construction parameters.
    pub fn vault_config(&self) -> Result<VaultConfig, ConfigError> {
        let initial_supply = parse_units(&self.vault.initial_supply, self.vault.decimals)
            .map_err(|source| ConfigError::Amount {
                field: "vault.initial_supply".into(),
                source,
            })?;
        Ok(VaultConfig {
            name: self.vault.name.clone(),
            symbol: self.vault.symbol.clone(),
            decimals: self.vault.decimals,
            initial_supply,
        })
    }

    /// Genesis balances in smallest units.
    pub fn genesis_balances(&self) -> Result<Vec<(Address, Amount)>, ConfigError> {
        self.genesis
            .iter()
            .map(|account| {
                parse_units(&account.balance, DECIMALS)
                    .map(|amount| (account.address, amount))
                    .map_err(|source| ConfigError::Amount {
                        field: format!("genesis[{}].balance", account.address),
                        source,
                    })
            })
            .collect()
    }
}
