//! Error types for the coin ledger
//!
//! This module defines all error types that can occur while executing ledger
//! operations.
//!
//! # Error Layers
//!
//! - **StoreError**: faults raised by a store or by the transaction
//!   coordinator (missing rows, uniqueness conflicts, constraint violations)
//! - **DispatchError**: faults raised by the dispatch pool (closed intake,
//!   cancellation, panics inside a unit of work)
//! - **LedgerError**: the user-facing taxonomy returned by every ledger
//!   operation. Lower-level errors are wrapped with the operation name and
//!   keep their kind.

use std::fmt;

use thiserror::Error;

use super::account::Coins;

/// Kind of row a store error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Account,
    Credential,
    InventoryLine,
    Item,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Account => "account",
            Entity::Credential => "credential",
            Entity::InventoryLine => "inventory line",
            Entity::Item => "item",
        };
        f.write_str(name)
    }
}

/// Error raised by a store operation or by the transaction coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested row does not exist
    #[error("{entity} '{key}' not found")]
    NotFound {
        /// Kind of row that was looked up
        entity: Entity,
        /// Key that was looked up
        key: String,
    },

    /// A row with the same unique key already exists
    #[error("{entity} '{key}' already exists")]
    Conflict {
        /// Kind of row that was inserted
        entity: Entity,
        /// Duplicated key
        key: String,
    },

    /// A debit would have driven a balance below zero
    ///
    /// Mirrors a `CHECK (coins >= 0)` constraint; the statement is rejected
    /// and the balance is left untouched.
    #[error("balance of '{username}' cannot cover {amount}: balance is {balance}")]
    InsufficientBalance {
        username: String,
        balance: Coins,
        amount: Coins,
    },

    /// A credit would overflow the balance column
    #[error("balance of '{username}' would overflow")]
    Overflow { username: String },

    /// The transaction handle was used after commit or rollback
    #[error("transaction {id} is no longer active")]
    TransactionClosed { id: u64 },

    /// The surrounding context was cancelled before the transaction committed
    #[error("transaction cancelled")]
    Cancelled,

    /// The backing storage could not serve the request
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Create a NotFound error
    pub fn not_found(entity: Entity, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(entity: Entity, key: impl Into<String>) -> Self {
        StoreError::Conflict {
            entity,
            key: key.into(),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(username: &str, balance: Coins, amount: Coins) -> Self {
        StoreError::InsufficientBalance {
            username: username.to_string(),
            balance,
            amount,
        }
    }

    /// Whether this error reports a missing row
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Whether this error reports a uniqueness conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Error raised by the dispatch pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Work was submitted after the pool was shut down
    #[error("dispatch pool is shut down")]
    Closed,

    /// The submitting context was cancelled before the unit of work started
    #[error("unit of work cancelled before it started")]
    Cancelled,

    /// The unit of work panicked; the worker survived
    #[error("unit of work panicked: {message}")]
    Panicked { message: String },

    /// The unit of work finished without reporting a result
    #[error("unit of work finished without reporting a result")]
    Abandoned,
}

/// Coarse classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    InvalidInput,
    Conflict,
    Unauthorized,
    Cancelled,
    Internal,
}

/// Main error type for ledger operations
///
/// Every variant carries the name of the operation that failed
/// (`"ledger.purchase"`, `"ledger.transfer"`, ...). `Internal` details are
/// meant for logs only; callers should surface them as an opaque failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Unknown user or item
    #[error("{operation}: {entity} '{key}' not found")]
    NotFound {
        operation: &'static str,
        entity: Entity,
        key: String,
    },

    /// Balance below the amount required by the operation
    ///
    /// The operation is rolled back and the balance stays unchanged.
    #[error("{operation}: insufficient funds for '{username}': balance {balance}, required {required}")]
    InsufficientFunds {
        operation: &'static str,
        username: String,
        balance: Coins,
        required: Coins,
    },

    /// Non-positive amount, empty field or a request rejected by policy
    #[error("{operation}: invalid input: {reason}")]
    InvalidInput {
        operation: &'static str,
        reason: String,
    },

    /// Duplicate resource created by a concurrent request
    #[error("{operation}: {entity} '{key}' already exists")]
    Conflict {
        operation: &'static str,
        entity: Entity,
        key: String,
    },

    /// Credentials or token rejected
    #[error("{operation}: unauthorized: {reason}")]
    Unauthorized {
        operation: &'static str,
        reason: String,
    },

    /// The caller gave up before the operation committed
    #[error("{operation}: cancelled")]
    Cancelled { operation: &'static str },

    /// Store or transport fault
    #[error("{operation}: internal error: {message}")]
    Internal {
        operation: &'static str,
        message: String,
    },
}

impl LedgerError {
    /// Create an InsufficientFunds error
    pub fn insufficient_funds(
        operation: &'static str,
        username: &str,
        balance: Coins,
        required: Coins,
    ) -> Self {
        LedgerError::InsufficientFunds {
            operation,
            username: username.to_string(),
            balance,
            required,
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(operation: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::InvalidInput {
            operation,
            reason: reason.into(),
        }
    }

    /// Create an Unauthorized error
    pub fn unauthorized(operation: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::Unauthorized {
            operation,
            reason: reason.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(operation: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Internal {
            operation,
            message: message.into(),
        }
    }

    /// Wrap a store error with the name of the failing operation
    ///
    /// The kind of the store error is preserved: missing rows stay
    /// `NotFound`, uniqueness violations stay `Conflict`, a rejected debit
    /// becomes `InsufficientFunds`. Everything else is `Internal`.
    pub fn from_store(operation: &'static str, error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, key } => LedgerError::NotFound {
                operation,
                entity,
                key,
            },
            StoreError::Conflict { entity, key } => LedgerError::Conflict {
                operation,
                entity,
                key,
            },
            StoreError::InsufficientBalance {
                username,
                balance,
                amount,
            } => LedgerError::InsufficientFunds {
                operation,
                username,
                balance,
                required: amount,
            },
            StoreError::Cancelled => LedgerError::Cancelled { operation },
            other => LedgerError::internal(operation, other.to_string()),
        }
    }

    /// Wrap a dispatch error with the name of the failing operation
    pub fn from_dispatch(operation: &'static str, error: DispatchError) -> Self {
        match error {
            DispatchError::Cancelled => LedgerError::Cancelled { operation },
            other => LedgerError::internal(operation, other.to_string()),
        }
    }

    /// Re-attribute the error to `operation`
    pub fn in_operation(mut self, operation: &'static str) -> Self {
        match &mut self {
            LedgerError::NotFound { operation: op, .. }
            | LedgerError::InsufficientFunds { operation: op, .. }
            | LedgerError::InvalidInput { operation: op, .. }
            | LedgerError::Conflict { operation: op, .. }
            | LedgerError::Unauthorized { operation: op, .. }
            | LedgerError::Cancelled { operation: op }
            | LedgerError::Internal { operation: op, .. } => *op = operation,
        }
        self
    }

    /// Name of the operation that failed
    pub fn operation(&self) -> &'static str {
        match self {
            LedgerError::NotFound { operation, .. }
            | LedgerError::InsufficientFunds { operation, .. }
            | LedgerError::InvalidInput { operation, .. }
            | LedgerError::Conflict { operation, .. }
            | LedgerError::Unauthorized { operation, .. }
            | LedgerError::Cancelled { operation }
            | LedgerError::Internal { operation, .. } => operation,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidInput { .. } => ErrorKind::InvalidInput,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LedgerError::Cancelled { .. } => ErrorKind::Cancelled,
            LedgerError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the error is the caller's fault ("bad request" class)
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal | ErrorKind::Cancelled)
    }
}

/// Coordinator faults (begin, commit, cancellation) carry no operation name of
/// their own; the ledger re-attributes them with [`LedgerError::in_operation`].
impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        LedgerError::from_store("transaction", error)
    }
}

impl From<DispatchError> for LedgerError {
    fn from(error: DispatchError) -> Self {
        LedgerError::from_dispatch("dispatch", error)
    }
}
