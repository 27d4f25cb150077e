//! Store contracts used by the ledger engine
//!
//! This module defines the trait abstractions the ledger is written against.
//! A backend exposes transactions ([`Backend`], [`Transaction`]) and the
//! account, credential, inventory, history and catalog stores on top of them.
//!
//! Every store method takes a [`Context`]. When the context carries a
//! transaction the call participates in it; otherwise the call runs on its
//! own and commits immediately.
//!
//! Inside a transaction, [`AccountStore::balance`] locks the account row until
//! the transaction ends, so a read-check-debit sequence cannot lose an update
//! to a concurrent debit of the same account.

use async_trait::async_trait;

use super::context::Context;
use crate::types::{Account, Coins, InventoryLine, StoreError, TransferRecord};

/// A unit of work against a backend
#[async_trait]
pub trait Transaction: Send + 'static {
    /// Make every write of the transaction visible and release its locks
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard every write of the transaction and release its locks
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Storage that can open transactions
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Context type used with backend `B`
pub type Ctx<B> = Context<<B as Backend>::Tx>;

/// Account balances
#[async_trait]
pub trait AccountStore: Backend {
    /// Insert a new account row
    ///
    /// Fails with `Conflict` if the username is taken.
    async fn create(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        starting_balance: Coins,
    ) -> Result<(), StoreError>;

    /// Current balance; `NotFound` for unknown users
    async fn balance(&self, ctx: &Context<Self::Tx>, username: &str) -> Result<Coins, StoreError>;

    async fn credit(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        amount: Coins,
    ) -> Result<(), StoreError>;

    /// Decrease a balance
    ///
    /// Fails with `InsufficientBalance` instead of going below zero.
    async fn debit(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        amount: Coins,
    ) -> Result<(), StoreError>;

    /// Snapshot of every account
    async fn accounts(&self, ctx: &Context<Self::Tx>) -> Result<Vec<Account>, StoreError>;
}

/// Stored login credentials
#[async_trait]
pub trait CredentialStore: Backend {
    async fn insert_credential(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        credential: &str,
    ) -> Result<(), StoreError>;

    async fn credential(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
    ) -> Result<String, StoreError>;
}

/// Per-user item quantities
#[async_trait]
pub trait InventoryStore: Backend {
    async fn exists(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        item: &str,
    ) -> Result<bool, StoreError>;

    /// Insert a new inventory line
    ///
    /// Fails with `Conflict` if the line already exists.
    async fn create_line(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        item: &str,
        quantity: u64,
    ) -> Result<(), StoreError>;

    /// Add one to an existing line and return the new quantity
    async fn increment_quantity(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
        item: &str,
    ) -> Result<u64, StoreError>;

    /// Every line held by `username`, ordered by item name
    async fn list(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
    ) -> Result<Vec<InventoryLine>, StoreError>;
}

/// Append-only transfer history
#[async_trait]
pub trait HistoryStore: Backend {
    async fn append(
        &self,
        ctx: &Context<Self::Tx>,
        from_user: &str,
        to_user: &str,
        amount: Coins,
    ) -> Result<(), StoreError>;

    /// Transfers sent by `username`, in creation order
    ///
    /// Inside a transaction the result includes the transaction's own
    /// uncommitted appends. Their ids are provisional: records get their
    /// final id when the transaction commits.
    async fn sent(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
    ) -> Result<Vec<TransferRecord>, StoreError>;

    /// Transfers received by `username`, in creation order
    ///
    /// Same visibility and id rules as [`sent`](Self::sent).
    async fn received(
        &self,
        ctx: &Context<Self::Tx>,
        username: &str,
    ) -> Result<Vec<TransferRecord>, StoreError>;
}

/// Read-only item prices
#[async_trait]
pub trait ItemCatalog: Backend {
    /// Price of `item`; `NotFound` for unknown items
    async fn price_of(&self, ctx: &Context<Self::Tx>, item: &str) -> Result<Coins, StoreError>;
}

/// Everything the ledger engine needs from storage
pub trait LedgerStore:
    AccountStore + CredentialStore + InventoryStore + HistoryStore + ItemCatalog
{
}

impl<T> LedgerStore for T where
    T: AccountStore + CredentialStore + InventoryStore + HistoryStore + ItemCatalog
{
}
