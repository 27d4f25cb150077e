//! Core business logic module
//!
//! This module contains the ledger and everything it runs on:
//! - `traits` - Store and transaction contracts
//! - `context` - Per-call context carrying cancellation and the active transaction
//! - `coordinator` - Transaction Coordinator: commit/rollback scoping
//! - `ledger` - Ledger Engine: register, purchase, transfer, info
//! - `memory` - In-memory transactional backend
//! - `dispatch` - Dispatch Pool: bounded workers and result hand-off
//! - `batch_processor` - Fans operation batches out over the pool

pub mod batch_processor;
pub mod context;
pub mod coordinator;
pub mod dispatch;
pub mod ledger;
pub mod memory;
pub mod traits;

pub use batch_processor::{BatchProcessor, Outcome, ProcessingResult};
pub use context::Context;
pub use coordinator::TransactionCoordinator;
pub use dispatch::{DispatchConfig, DispatchPool};
pub use ledger::Ledger;
pub use memory::{MemoryStore, MemoryTransaction};
pub use traits::{
    AccountStore, Backend, CredentialStore, Ctx, HistoryStore, InventoryStore, ItemCatalog,
    LedgerStore, Transaction,
};
