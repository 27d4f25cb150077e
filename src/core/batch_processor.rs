//! Batch processing with user-based partitioning
//!
//! This module provides the `BatchProcessor` struct, which feeds batches of
//! operation records through the dispatch pool into the ledger.
//!
//! # Design
//!
//! The `BatchProcessor` partitions a batch by acting user. Operations of one
//! user are dispatched one after another, so a user's script keeps its order
//! (a purchase never overtakes the login before it); operations of different
//! users are in flight at the same time and meet only at the ledger's row
//! locks.
//!
//! A `send` reaches into another user's account. Before partitioning, the
//! batch is cut into segments so that within a segment no two partitions
//! touch the same account; segments run one after another. The outcome of a
//! batch is therefore the same as applying its records in script order.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     ├── Ledger<S>                 (business operations)
//!     ├── Arc<DispatchPool>         (bounded execution)
//!     └── DashMap<user, token>      (sessions opened by `login` records)
//! ```
//!
//! Every operation except `login` authenticates with the token issued by the
//! user's last successful login, exactly as a remote caller would.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::context::Context;
use super::dispatch::DispatchPool;
use super::ledger::Ledger;
use super::traits::LedgerStore;
use crate::types::{
    AccountInfo, LedgerError, Operation, OperationRecord, PurchaseReceipt, TransferReceipt,
};

const SESSION: &str = "auth.session";

/// What a successfully applied operation produced
#[derive(Debug, Clone)]
pub enum Outcome {
    LoggedIn { registered: bool },
    Purchased(PurchaseReceipt),
    Transferred(TransferReceipt),
    Info(AccountInfo),
}

/// Result of processing a single operation record
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The record that was processed
    pub record: OperationRecord,

    /// The result of processing (outcome or error)
    pub result: Result<Outcome, LedgerError>,
}

/// Batch processor with user-based partitioning
pub struct BatchProcessor<S> {
    ledger: Ledger<S>,
    pool: Arc<DispatchPool>,
    sessions: Arc<DashMap<String, String>>,
    cancel: CancellationToken,
}

impl<S> Clone for BatchProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            pool: Arc::clone(&self.pool),
            sessions: Arc::clone(&self.sessions),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: LedgerStore> BatchProcessor<S> {
    /// Create a new BatchProcessor
    ///
    /// # Arguments
    ///
    /// * `ledger` - Ledger the operations are applied to
    /// * `pool` - Dispatch pool that executes them
    /// * `cancel` - Cancels every operation not yet started
    pub fn new(ledger: Ledger<S>, pool: Arc<DispatchPool>, cancel: CancellationToken) -> Self {
        Self {
            ledger,
            pool,
            sessions: Arc::new(DashMap::new()),
            cancel,
        }
    }

    /// Partition a batch of records by acting user
    ///
    /// Records keep their relative order within each user's partition.
    pub fn partition_by_user(
        &self,
        batch: Vec<OperationRecord>,
    ) -> HashMap<String, Vec<OperationRecord>> {
        let mut user_batches: HashMap<String, Vec<OperationRecord>> = HashMap::new();

        for record in batch {
            user_batches
                .entry(record.user.clone())
                .or_default()
                .push(record);
        }

        user_batches
    }

    /// Process one user's records sequentially
    pub async fn process_user_operations(
        &self,
        records: Vec<OperationRecord>,
    ) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(records.len());

        for record in records {
            let result = self.apply(&record).await;
            results.push(ProcessingResult { record, result });
        }

        results
    }

    /// Split a batch into segments whose user partitions touch disjoint accounts
    ///
    /// A record that touches an account already claimed by another user's
    /// partition in the current segment starts a new segment.
    pub fn segment(&self, batch: Vec<OperationRecord>) -> Vec<Vec<OperationRecord>> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for record in batch {
            let touched = touched_accounts(&record);
            let conflicts = touched
                .iter()
                .any(|account| owners.get(*account).is_some_and(|owner| *owner != record.user));
            if conflicts {
                segments.push(std::mem::take(&mut current));
                owners.clear();
            }
            for account in touched {
                owners.insert(account.to_string(), record.user.clone());
            }
            current.push(record);
        }

        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }

    /// Process a batch, different users concurrently
    ///
    /// # Returns
    ///
    /// One result per record, ordered by record line
    pub async fn process_batch(&self, batch: Vec<OperationRecord>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(batch.len());
        for segment in self.segment(batch) {
            results.extend(self.process_segment(segment).await);
        }

        results.sort_by_key(|r| r.record.line);
        results
    }

    async fn process_segment(&self, segment: Vec<OperationRecord>) -> Vec<ProcessingResult> {
        let user_batches = self.partition_by_user(segment);

        let mut tasks = Vec::with_capacity(user_batches.len());
        for (_user, records) in user_batches {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_user_operations(records).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(user_results) => results.extend(user_results),
                Err(e) => error!(error = %e, "user partition task failed"),
            }
        }

        results
    }

    async fn apply(&self, record: &OperationRecord) -> Result<Outcome, LedgerError> {
        let ledger = self.ledger.clone();
        let cancel = self.cancel.clone();
        let user = record.user.clone();

        if let Operation::Login { password } = &record.operation {
            let password = password.clone();
            let session = self
                .pool
                .run(cancel.clone(), move || async move {
                    let ctx = Context::with_cancellation(cancel);
                    ledger.login(&ctx, &user, &password).await
                })
                .await?;
            self.sessions
                .insert(record.user.clone(), session.token.clone());
            return Ok(Outcome::LoggedIn {
                registered: session.registered,
            });
        }

        let token = self
            .sessions
            .get(&record.user)
            .map(|token| token.value().clone())
            .ok_or_else(|| LedgerError::unauthorized(SESSION, "no session, log in first"))?;
        let principal = self.ledger.authenticate(&token)?;
        let operation = record.operation.clone();

        self.pool
            .run(cancel.clone(), move || async move {
                let ctx = Context::with_cancellation(cancel);
                match operation {
                    Operation::Buy { item } => ledger
                        .purchase(&ctx, &principal, &item)
                        .await
                        .map(Outcome::Purchased),
                    Operation::Send { to_user, amount } => ledger
                        .transfer(&ctx, &principal, &to_user, amount)
                        .await
                        .map(Outcome::Transferred),
                    Operation::Info => ledger.info(&ctx, &principal).await.map(Outcome::Info),
                    Operation::Login { .. } => {
                        Err(LedgerError::internal(SESSION, "login routed as session operation"))
                    }
                }
            })
            .await
    }
}

fn touched_accounts(record: &OperationRecord) -> Vec<&str> {
    match &record.operation {
        Operation::Send { to_user, .. } => vec![record.user.as_str(), to_user.as_str()],
        _ => vec![record.user.as_str()],
    }
}
