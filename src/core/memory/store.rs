//! In-memory implementation of every ledger store
//!
//! All tables live in one [`MemoryStore`] so a single [`MemoryTransaction`]
//! can span balances, credentials, inventory and history.
//!
//! # Locking
//!
//! Inside a transaction every row a call touches is locked on first touch and
//! stays locked until commit or rollback (strict two-phase locking). Reads
//! lock too, which is what turns `balance` then `debit` into an atomic
//! read-modify-write. Callers must acquire rows in one global order:
//!
//! ```text
//! credentials -> accounts (sorted by username) -> inventory lines
//! ```
//!
//! Without a transaction each call locks its row only for the duration of
//! the call and its write is visible immediately. The one exception is
//! [`AccountStore::accounts`], which locks every account row in username
//! order, reads them all, then releases them, so the snapshot never mixes
//! balances from before and after a transfer.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::table::{RowLocks, Table};
use super::transaction::{InventoryKey, MemoryTransaction, PendingTransfer, TransferLog};
use crate::core::context::Context;
use crate::core::traits::{
    AccountStore, Backend, CredentialStore, HistoryStore, InventoryStore, ItemCatalog,
};
use crate::types::{Account, Coins, Entity, InventoryLine, StoreError, TransferRecord};

type Ctx = Context<MemoryTransaction>;

/// Transactional in-memory store
pub struct MemoryStore {
    credentials: Arc<Table<String, String>>,
    accounts: Arc<Table<String, Coins>>,
    inventory: Arc<Table<InventoryKey, u64>>,
    log: Arc<TransferLog>,
    catalog: HashMap<String, Coins>,
    next_tx: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store selling the items of `catalog`
    pub fn new(catalog: HashMap<String, Coins>) -> Self {
        Self {
            credentials: Arc::new(Table::new()),
            accounts: Arc::new(Table::new()),
            inventory: Arc::new(Table::new()),
            log: Arc::new(TransferLog::default()),
            catalog,
            next_tx: AtomicU64::new(0),
        }
    }

    /// Run `f` on one row, inside the context's transaction if it has one
    ///
    /// # Arguments
    ///
    /// * `ctx` - Caller context
    /// * `table` - Table holding the row
    /// * `locks` - Picks the transaction's lock set for `table`
    /// * `key` - Row key
    /// * `f` - Reads or writes the row; must not write when it returns `Err`
    async fn with_row<K, V, R, F>(
        &self,
        ctx: &Ctx,
        table: &Arc<Table<K, V>>,
        locks: fn(&mut MemoryTransaction) -> &mut RowLocks<K, V>,
        key: K,
        f: F,
    ) -> Result<R, StoreError>
    where
        K: Eq + Hash + Clone + Send + Sync,
        V: Clone + Send + Sync,
        F: FnOnce(&mut Option<V>) -> Result<R, StoreError> + Send,
    {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        match ctx.transaction() {
            Some(handle) => {
                let mut tx = handle.lock().await;
                tx.ensure_active()?;
                let row = locks(&mut *tx).acquire(table, &key).await;
                f(row)
            }
            None => {
                let slot = table.slot(&key);
                let result = {
                    let mut row = slot.lock().await;
                    f(&mut row)
                };
                drop(slot);
                table.prune(&key);
                result
            }
        }
    }

    /// Read one row without keeping it locked
    ///
    /// Rows already held by `tx` are read from the transaction; other rows
    /// are locked just long enough to copy them.
    async fn peek<K, V>(
        &self,
        tx: &MemoryTransaction,
        table: &Table<K, V>,
        locks: fn(&MemoryTransaction) -> &RowLocks<K, V>,
        key: &K,
    ) -> Option<V>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        if let Some(row) = locks(tx).get(key) {
            return row.clone();
        }
        match table.existing(key) {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    /// Every account in `usernames` (sorted), read under one set of locks
    async fn locked_snapshot(&self, usernames: Vec<String>) -> Vec<Account> {
        let mut guards = Vec::with_capacity(usernames.len());
        for username in usernames {
            if let Some(slot) = self.accounts.existing(&username) {
                guards.push((username, slot.lock_owned().await));
            }
        }

        let accounts = guards
            .iter()
            .filter_map(|(username, row)| row.map(|coins| Account::new(username.clone(), coins)))
            .collect();

        for (username, guard) in guards {
            drop(guard);
            self.accounts.prune(&username);
        }
        accounts
    }

    fn inventory_key(username: &str, item: &str) -> InventoryKey {
        (username.to_string(), item.to_string())
    }
}

fn account_locks(tx: &mut MemoryTransaction) -> &mut RowLocks<String, Coins> {
    &mut tx.accounts
}

fn held_accounts(tx: &MemoryTransaction) -> &RowLocks<String, Coins> {
    &tx.accounts
}

fn credential_locks(tx: &mut MemoryTransaction) -> &mut RowLocks<String, String> {
    &mut tx.credentials
}

fn inventory_locks(tx: &mut MemoryTransaction) -> &mut RowLocks<InventoryKey, u64> {
    &mut tx.inventory
}

#[async_trait]
impl Backend for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MemoryTransaction::new(id, Arc::clone(&self.log)))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create(
        &self,
        ctx: &Ctx,
        username: &str,
        starting_balance: Coins,
    ) -> Result<(), StoreError> {
        let key = username.to_string();
        self.with_row(ctx, &self.accounts, account_locks, key, |row| {
            if row.is_some() {
                return Err(StoreError::conflict(Entity::Account, username));
            }
            *row = Some(starting_balance);
            Ok(())
        })
        .await
    }

    async fn balance(&self, ctx: &Ctx, username: &str) -> Result<Coins, StoreError> {
        let key = username.to_string();
        self.with_row(ctx, &self.accounts, account_locks, key, |row| {
            row.ok_or_else(|| StoreError::not_found(Entity::Account, username))
        })
        .await
    }

    async fn credit(&self, ctx: &Ctx, username: &str, amount: Coins) -> Result<(), StoreError> {
        let key = username.to_string();
        self.with_row(ctx, &self.accounts, account_locks, key, |row| {
            let coins = row
                .as_mut()
                .ok_or_else(|| StoreError::not_found(Entity::Account, username))?;
            *coins = coins.checked_add(amount).ok_or_else(|| StoreError::Overflow {
                username: username.to_string(),
            })?;
            Ok(())
        })
        .await
    }

    async fn debit(&self, ctx: &Ctx, username: &str, amount: Coins) -> Result<(), StoreError> {
        let key = username.to_string();
        self.with_row(ctx, &self.accounts, account_locks, key, |row| {
            let coins = row
                .as_mut()
                .ok_or_else(|| StoreError::not_found(Entity::Account, username))?;
            if *coins < amount {
                return Err(StoreError::insufficient_balance(username, *coins, amount));
            }
            *coins -= amount;
            Ok(())
        })
        .await
    }

    async fn accounts(&self, ctx: &Ctx) -> Result<Vec<Account>, StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut usernames = self.accounts.keys_where(|_| true);
        usernames.sort();

        let tx = match ctx.transaction() {
            Some(handle) => handle.lock().await,
            None => return Ok(self.locked_snapshot(usernames).await),
        };
        tx.ensure_active()?;

        let mut accounts = Vec::with_capacity(usernames.len());
        for username in usernames {
            let coins = self
                .peek(&tx, &self.accounts, held_accounts, &username)
                .await;
            if let Some(coins) = coins {
                accounts.push(Account::new(username, coins));
            }
        }
        Ok(accounts)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_credential(
        &self,
        ctx: &Ctx,
        username: &str,
        credential: &str,
    ) -> Result<(), StoreError> {
        let key = username.to_string();
        self.with_row(ctx, &self.credentials, credential_locks, key, |row| {
            if row.is_some() {
                return Err(StoreError::conflict(Entity::Credential, username));
            }
            *row = Some(credential.to_string());
            Ok(())
        })
        .await
    }

    async fn credential(&self, ctx: &Ctx, username: &str) -> Result<String, StoreError> {
        let key = username.to_string();
        self.with_row(ctx, &self.credentials, credential_locks, key, |row| {
            row.clone()
                .ok_or_else(|| StoreError::not_found(Entity::Credential, username))
        })
        .await
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn exists(&self, ctx: &Ctx, username: &str, item: &str) -> Result<bool, StoreError> {
        let key = Self::inventory_key(username, item);
        self.with_row(ctx, &self.inventory, inventory_locks, key, |row| {
            Ok(row.is_some())
        })
        .await
    }

    async fn create_line(
        &self,
        ctx: &Ctx,
        username: &str,
        item: &str,
        quantity: u64,
    ) -> Result<(), StoreError> {
        let key = Self::inventory_key(username, item);
        self.with_row(ctx, &self.inventory, inventory_locks, key, |row| {
            if row.is_some() {
                return Err(StoreError::conflict(
                    Entity::InventoryLine,
                    format!("{username}/{item}"),
                ));
            }
            *row = Some(quantity);
            Ok(())
        })
        .await
    }

    async fn increment_quantity(
        &self,
        ctx: &Ctx,
        username: &str,
        item: &str,
    ) -> Result<u64, StoreError> {
        let key = Self::inventory_key(username, item);
        self.with_row(ctx, &self.inventory, inventory_locks, key, |row| {
            let quantity = row.as_mut().ok_or_else(|| {
                StoreError::not_found(Entity::InventoryLine, format!("{username}/{item}"))
            })?;
            *quantity = quantity.checked_add(1).ok_or_else(|| StoreError::Overflow {
                username: username.to_string(),
            })?;
            Ok(*quantity)
        })
        .await
    }

    async fn list(&self, ctx: &Ctx, username: &str) -> Result<Vec<InventoryLine>, StoreError> {
        let mut keys = self.inventory.keys_where(|(owner, _)| owner == username);
        keys.sort();

        let mut lines = Vec::with_capacity(keys.len());
        for key in keys {
            let item = key.1.clone();
            let quantity = self
                .with_row(ctx, &self.inventory, inventory_locks, key, |row| Ok(*row))
                .await?;
            if let Some(quantity) = quantity {
                lines.push(InventoryLine { item, quantity });
            }
        }
        Ok(lines)
    }
}

impl MemoryStore {
    async fn transfers_where(
        &self,
        ctx: &Ctx,
        filter: impl Fn(&TransferRecord) -> bool,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut records = self.log.matching(&filter);
        if let Some(handle) = ctx.transaction() {
            let tx = handle.lock().await;
            tx.ensure_active()?;
            records.extend(tx.pending_records().into_iter().filter(|r| filter(r)));
        }
        Ok(records)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(
        &self,
        ctx: &Ctx,
        from_user: &str,
        to_user: &str,
        amount: Coins,
    ) -> Result<(), StoreError> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let transfer = PendingTransfer {
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            amount,
        };
        match ctx.transaction() {
            Some(handle) => {
                let mut tx = handle.lock().await;
                tx.ensure_active()?;
                tx.transfers.push(transfer);
            }
            None => self.log.publish([transfer]),
        }
        Ok(())
    }

    async fn sent(&self, ctx: &Ctx, username: &str) -> Result<Vec<TransferRecord>, StoreError> {
        self.transfers_where(ctx, |record| record.from_user == username)
            .await
    }

    async fn received(&self, ctx: &Ctx, username: &str) -> Result<Vec<TransferRecord>, StoreError> {
        self.transfers_where(ctx, |record| record.to_user == username)
            .await
    }
}

#[async_trait]
impl ItemCatalog for MemoryStore {
    async fn price_of(&self, _ctx: &Ctx, item: &str) -> Result<Coins, StoreError> {
        self.catalog
            .get(item)
            .copied()
            .ok_or_else(|| StoreError::not_found(Entity::Item, item))
    }
}
