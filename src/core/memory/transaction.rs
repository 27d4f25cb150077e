//! Transactions of the in-memory store

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::trace;

use super::table::RowLocks;
use crate::core::traits::Transaction;
use crate::types::{Coins, StoreError, TransferRecord};

pub(crate) type InventoryKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// A transfer appended inside a transaction, not yet published
#[derive(Debug, Clone)]
pub(crate) struct PendingTransfer {
    pub(crate) from_user: String,
    pub(crate) to_user: String,
    pub(crate) amount: Coins,
}

/// Append-only transfer log shared by the store and its transactions
#[derive(Debug, Default)]
pub(crate) struct TransferLog {
    records: Mutex<Vec<TransferRecord>>,
}

impl TransferLog {
    /// Append `pending` in order, assigning sequence ids
    pub(crate) fn publish(&self, pending: impl IntoIterator<Item = PendingTransfer>) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for transfer in pending {
            let id = records.len() as u64 + 1;
            records.push(TransferRecord {
                id,
                from_user: transfer.from_user,
                to_user: transfer.to_user,
                amount: transfer.amount,
            });
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn matching(&self, filter: impl Fn(&TransferRecord) -> bool) -> Vec<TransferRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| filter(record))
            .cloned()
            .collect()
    }
}

/// A transaction against [`MemoryStore`](super::MemoryStore)
///
/// Holds every row lock it has taken until commit or rollback. Dropping an
/// active transaction rolls it back.
pub struct MemoryTransaction {
    id: u64,
    state: TxState,
    pub(crate) credentials: RowLocks<String, String>,
    pub(crate) accounts: RowLocks<String, Coins>,
    pub(crate) inventory: RowLocks<InventoryKey, u64>,
    pub(crate) transfers: Vec<PendingTransfer>,
    log: Arc<TransferLog>,
}

impl MemoryTransaction {
    pub(crate) fn new(id: u64, log: Arc<TransferLog>) -> Self {
        Self {
            id,
            state: TxState::Active,
            credentials: RowLocks::new(),
            accounts: RowLocks::new(),
            inventory: RowLocks::new(),
            transfers: Vec::new(),
            log,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    pub(crate) fn ensure_active(&self) -> Result<(), StoreError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed { id: self.id })
        }
    }

    /// Transfers appended by this transaction, numbered after the log
    ///
    /// The ids are provisional. Another transaction may publish first, in
    /// which case [`TransferLog::publish`] assigns later ids at commit.
    pub(crate) fn pending_records(&self) -> Vec<TransferRecord> {
        let base = self.log.len() as u64;
        self.transfers
            .iter()
            .zip(1u64..)
            .map(|(transfer, offset)| TransferRecord {
                id: base + offset,
                from_user: transfer.from_user.clone(),
                to_user: transfer.to_user.clone(),
                amount: transfer.amount,
            })
            .collect()
    }

    fn undo(&mut self) {
        self.inventory.restore();
        self.accounts.restore();
        self.credentials.restore();
        self.transfers.clear();
        self.state = TxState::RolledBack;
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_active()?;
        // Publish before unlocking so no reader sees balances without history.
        self.log.publish(self.transfers.drain(..));
        self.inventory.release();
        self.accounts.release();
        self.credentials.release();
        self.state = TxState::Committed;
        trace!(tx = self.id, "memory transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_active()?;
        self.undo();
        trace!(tx = self.id, "memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.undo();
        }
    }
}
