//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account, inventory and transfer history types
//! - `operation`: Operation records fed into the ledger
//! - `error`: Error types for the store, dispatch and ledger layers

pub mod account;
pub mod error;
pub mod operation;

pub use account::{
    Account, AccountInfo, Coins, CoinHistory, InventoryLine, PurchaseReceipt, ReceivedTransfer,
    SentTransfer, Session, TransferReceipt, TransferRecord,
};
pub use error::{DispatchError, Entity, ErrorKind, LedgerError, StoreError};
pub use operation::{Operation, OperationRecord};
