//! Account-related types for the coin ledger
//!
//! This module defines the account, inventory and transfer history records
//! managed by the ledger, together with the receipts returned by each
//! business operation.

use serde::Serialize;

use crate::auth::Principal;

/// Coin amount
///
/// Balances, prices and transfer amounts are whole, non-negative coin units.
pub type Coins = u64;

/// Account balance row
///
/// One account exists per registered username. Accounts are created at
/// registration and never deleted; the balance only moves through debit and
/// credit operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Unique account key
    pub username: String,

    /// Current balance in coins
    pub coins: Coins,
}

impl Account {
    pub fn new(username: impl Into<String>, coins: Coins) -> Self {
        Account {
            username: username.into(),
            coins,
        }
    }
}

/// A user's owned quantity of one catalog item
///
/// At most one line exists per `(username, item)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryLine {
    pub item: String,
    pub quantity: u64,
}

/// Immutable audit entry for one peer-to-peer coin movement
///
/// `id` is assigned when the owning transaction commits, so ids are
/// creation-ordered across the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    pub id: u64,
    pub from_user: String,
    pub to_user: String,
    pub amount: Coins,
}

/// A transfer as seen by its receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedTransfer {
    pub from_user: String,
    pub amount: Coins,
}

/// A transfer as seen by its sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentTransfer {
    pub to_user: String,
    pub amount: Coins,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoinHistory {
    pub received: Vec<ReceivedTransfer>,
    pub sent: Vec<SentTransfer>,
}

impl CoinHistory {
    /// Total coins received across all recorded transfers
    pub fn total_received(&self) -> Coins {
        self.received.iter().map(|t| t.amount).sum()
    }

    /// Total coins sent across all recorded transfers
    pub fn total_sent(&self) -> Coins {
        self.sent.iter().map(|t| t.amount).sum()
    }
}

/// Consistent view of one account: balance, inventory and coin history
///
/// All three parts are read inside a single transaction scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub username: String,
    pub coins: Coins,
    pub inventory: Vec<InventoryLine>,
    pub coin_history: CoinHistory,
}

/// Result of a successful login or registration
#[derive(Debug, Clone)]
pub struct Session {
    /// The authenticated identity
    pub principal: Principal,

    /// Signed access token for subsequent operations
    pub token: String,

    /// Whether this login created the account
    pub registered: bool,
}

/// Result of a successful purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub item: String,
    pub price: Coins,
    /// Buyer balance after the debit
    pub balance: Coins,
    /// Quantity of the item now held by the buyer
    pub quantity: u64,
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub from_user: String,
    pub to_user: String,
    pub amount: Coins,
    /// Sender balance after the debit
    pub balance: Coins,
}
