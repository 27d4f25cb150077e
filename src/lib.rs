//! Coin Ledger Library
//! # Overview
//!
//! This library implements the transactional core of an internal coin
//! economy: users register and receive a starting balance, buy catalog items
//! with coins and transfer coins to each other.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, InventoryLine, TransferRecord, errors)
//! - [`config`] - Ledger configuration built once at startup
//! - [`auth`] - Access tokens and credential hashing
//! - [`core`] - Business logic components:
//!   - [`core::ledger`] - Register-and-Credit, Purchase and Transfer
//!   - [`core::coordinator`] - Transaction scoping with commit/rollback
//!   - [`core::dispatch`] - Bounded worker pool with result hand-off
//!   - [`core::memory`] - In-memory transactional store
//! - [`io`] - CSV operation scripts, catalogs and account summaries
//! - [`replay`] - End-to-end replay of an operation script
//! - [`cli`] - CLI arguments parsing
//!
//! # Operations
//!
//! - **Login**: Authenticate, registering and crediting the account on first login
//! - **Buy**: Debit the item price and add one unit to the buyer's inventory
//! - **Send**: Move coins between two registered users and record the transfer
//! - **Info**: Read balance, inventory and coin history as one consistent view
//!
//! # Guarantees
//!
//! Every business operation is atomic: a failure at any step leaves no
//! partial effect. Balances never go negative, and coins only enter the
//! system through registration credits.

// Module declarations
pub mod auth;
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod replay;
pub mod types;

pub use config::{LedgerConfig, SelfTransferPolicy};
pub use core::{DispatchConfig, DispatchPool, Ledger, MemoryStore, TransactionCoordinator};
pub use io::write_accounts_csv;
pub use replay::{replay, ReplayError, ReplayOptions, ReplayReport};
pub use types::{
    Account, AccountInfo, Coins, ErrorKind, LedgerError, Operation, OperationRecord,
    PurchaseReceipt, TransferReceipt,
};
