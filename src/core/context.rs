//! Operation context
//!
//! A [`Context`] travels with every store call. It carries the caller's
//! cancellation token and, inside a transaction scope, the shared handle of
//! the active transaction. Store implementations look at the handle to decide
//! whether a call joins the transaction or auto-commits on its own.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared handle to an active transaction
pub type TxHandle<Tx> = Arc<Mutex<Tx>>;

pub struct Context<Tx> {
    tx: Option<TxHandle<Tx>>,
    cancel: CancellationToken,
}

impl<Tx> Context<Tx> {
    /// A context with no transaction and a token nobody cancels
    pub fn background() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { tx: None, cancel }
    }

    /// Derive a context bound to `tx`, sharing this context's cancellation
    pub(crate) fn with_transaction(&self, tx: TxHandle<Tx>) -> Self {
        Self {
            tx: Some(tx),
            cancel: self.cancel.clone(),
        }
    }

    pub fn transaction(&self) -> Option<&TxHandle<Tx>> {
        self.tx.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// Manual impls: `Tx` itself need not be `Clone` or `Debug`.
impl<Tx> Clone for Context<Tx> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<Tx> std::fmt::Debug for Context<Tx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("in_transaction", &self.in_transaction())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
