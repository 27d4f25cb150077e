//! Process-wide ledger configuration
//!
//! Built once at startup (from CLI arguments, environment and an optional
//! catalog file) and handed to the ledger by value. Nothing in the crate
//! reads configuration from globals.

use std::collections::HashMap;
use std::time::Duration;

use clap::ValueEnum;

use crate::types::Coins;

/// Balance credited to every newly registered account
pub const DEFAULT_STARTING_BALANCE: Coins = 1000;

/// Lifetime of issued access tokens
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// bcrypt work factor for stored credentials
pub const DEFAULT_CREDENTIAL_COST: u32 = bcrypt::DEFAULT_COST;

/// How the ledger treats a transfer whose sender and receiver are the same
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SelfTransferPolicy {
    /// Accept it: the balance is unchanged and a history record is written
    #[default]
    Allow,
    /// Reject it with `InvalidInput`
    Reject,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "coin-ledger-development-secret".to_string(),
            ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

/// Configuration for the ledger engine
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Coins credited at registration
    pub starting_balance: Coins,

    /// Item name to price; read-only reference data
    pub catalog: HashMap<String, Coins>,

    pub token: TokenConfig,

    /// bcrypt work factor used when registering credentials
    pub credential_cost: u32,

    pub self_transfer: SelfTransferPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: DEFAULT_STARTING_BALANCE,
            catalog: default_catalog(),
            token: TokenConfig::default(),
            credential_cost: DEFAULT_CREDENTIAL_COST,
            self_transfer: SelfTransferPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn with_catalog(mut self, catalog: HashMap<String, Coins>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_credential_cost(mut self, cost: u32) -> Self {
        self.credential_cost = cost;
        self
    }

    pub fn with_self_transfer(mut self, policy: SelfTransferPolicy) -> Self {
        self.self_transfer = policy;
        self
    }
}

/// The shop's merchandise
pub fn default_catalog() -> HashMap<String, Coins> {
    [
        ("t-shirt", 80),
        ("cup", 20),
        ("book", 50),
        ("pen", 10),
        ("powerbank", 200),
        ("hoody", 300),
        ("umbrella", 200),
        ("socks", 10),
        ("wallet", 50),
        ("pink-hoody", 500),
    ]
    .into_iter()
    .map(|(item, price)| (item.to_string(), price))
    .collect()
}
