//! Operation records fed into the ledger
//!
//! An operation script is a sequence of records, each naming the acting
//! user and one of the ledger's business operations. Records are read from
//! CSV by the `io` module and fanned out over the dispatch pool by the batch
//! processor.

use super::account::Coins;

/// A single ledger operation requested by `user`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Authenticate, registering and crediting the account on first login
    Login { password: String },

    /// Buy one unit of a catalog item
    Buy { item: String },

    /// Transfer coins to another registered user
    Send { to_user: String, amount: Coins },

    /// Read balance, inventory and coin history
    Info,
}

impl Operation {
    /// Short lowercase name used in logs and CSV
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Login { .. } => "login",
            Operation::Buy { .. } => "buy",
            Operation::Send { .. } => "send",
            Operation::Info => "info",
        }
    }
}

/// Input operation record
///
/// `line` is the 1-based position of the record in its script, used to
/// report per-record outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub line: u64,
    /// The acting user; every operation except `login` requires a session
    pub user: String,
    pub operation: Operation,
}

impl OperationRecord {
    pub fn new(line: u64, user: impl Into<String>, operation: Operation) -> Self {
        Self {
            line,
            user: user.into(),
            operation,
        }
    }
}
