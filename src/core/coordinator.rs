//! Transaction Coordinator
//!
//! Scopes a sequence of store calls so that they commit or roll back
//! together. The closure passed to [`TransactionCoordinator::run`] receives a
//! [`Context`] carrying the transaction handle; every store call made with
//! that context joins the transaction without the caller threading the
//! handle through by hand.
//!
//! # Outcomes
//!
//! | closure result | effect                              |
//! |----------------|-------------------------------------|
//! | `Ok`           | commit                              |
//! | `Err`          | rollback, error returned unchanged  |
//! | panic          | rollback, panic resumed             |
//! | cancelled      | rollback, `StoreError::Cancelled`   |

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::context::Context;
use super::traits::{Backend, Ctx, Transaction};
use crate::types::StoreError;

enum Outcome<T, E> {
    Finished(Result<T, E>),
    Panicked(Box<dyn std::any::Any + Send>),
    Cancelled,
}

/// Runs closures inside backend transactions
pub struct TransactionCoordinator<B> {
    backend: Arc<B>,
}

impl<B> Clone for TransactionCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> TransactionCoordinator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Run `f` inside a transaction
    ///
    /// If `ctx` already carries a transaction, `f` runs in it directly and the
    /// outer scope decides whether to commit. Otherwise a new transaction is
    /// begun and finished according to how `f` completes.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Caller context; its cancellation token is honoured until commit
    /// * `f` - Unit of work, handed a context bound to the transaction
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - `f` succeeded and the transaction committed
    /// * `Err(E)` - `f` failed, the context was cancelled, or begin/commit failed
    pub async fn run<T, E, F, Fut>(&self, ctx: &Ctx<B>, f: F) -> Result<T, E>
    where
        F: FnOnce(Ctx<B>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        if ctx.in_transaction() {
            return f(ctx.clone()).await;
        }

        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled.into());
        }

        let tx = self.backend.begin().await?;
        let handle = Arc::new(Mutex::new(tx));
        let scoped: Context<B::Tx> = ctx.with_transaction(Arc::clone(&handle));
        debug!("transaction started");

        let work = AssertUnwindSafe(f(scoped)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Outcome::Cancelled,
            result = work => match result {
                Ok(result) => Outcome::Finished(result),
                Err(payload) => Outcome::Panicked(payload),
            },
        };

        let mut tx = handle.lock().await;
        match outcome {
            Outcome::Finished(Ok(value)) if !ctx.is_cancelled() => {
                tx.commit().await?;
                debug!("transaction committed");
                Ok(value)
            }
            Outcome::Finished(Ok(_)) | Outcome::Cancelled => {
                rollback(&mut *tx, "cancelled").await;
                Err(StoreError::Cancelled.into())
            }
            Outcome::Finished(Err(e)) => {
                rollback(&mut *tx, "failed").await;
                Err(e)
            }
            Outcome::Panicked(payload) => {
                rollback(&mut *tx, "panicked").await;
                drop(tx);
                panic::resume_unwind(payload)
            }
        }
    }
}

async fn rollback<Tx: Transaction>(tx: &mut Tx, reason: &'static str) {
    match tx.rollback().await {
        Ok(()) => debug!(reason, "transaction rolled back"),
        Err(e) => warn!(reason, error = %e, "rollback failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entity;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Journal {
        events: StdMutex<Vec<&'static str>>,
    }

    impl Journal {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    struct RecordingTx {
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Transaction for RecordingTx {
        async fn commit(&mut self) -> Result<(), StoreError> {
            self.journal.push("commit");
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), StoreError> {
            self.journal.push("rollback");
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        type Tx = RecordingTx;

        async fn begin(&self) -> Result<RecordingTx, StoreError> {
            self.journal.push("begin");
            Ok(RecordingTx {
                journal: Arc::clone(&self.journal),
            })
        }
    }

    fn coordinator() -> (TransactionCoordinator<RecordingBackend>, Arc<Journal>) {
        let backend = Arc::new(RecordingBackend::default());
        let journal = Arc::clone(&backend.journal);
        (TransactionCoordinator::new(backend), journal)
    }

    #[tokio::test]
    async fn test_success_commits() {
        let (coordinator, journal) = coordinator();
        let ctx = Context::background();

        let result: Result<u32, StoreError> = coordinator
            .run(&ctx, |scoped| async move {
                assert!(scoped.in_transaction());
                Ok(7)
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(journal.events(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn test_error_rolls_back_and_is_returned_unchanged() {
        let (coordinator, journal) = coordinator();
        let ctx = Context::background();

        let result: Result<(), StoreError> = coordinator
            .run(&ctx, |_| async { Err(StoreError::conflict(Entity::Account, "bob")) })
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(journal.events(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn test_nested_scope_reuses_outer_transaction() {
        let (coordinator, journal) = coordinator();
        let ctx = Context::background();
        let inner = coordinator.clone();

        let result: Result<(), StoreError> = coordinator
            .run(&ctx, |scoped| async move {
                inner
                    .run(&scoped, |nested| async move {
                        assert!(nested.in_transaction());
                        Ok(())
                    })
                    .await
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(journal.events(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn test_cancelled_context_never_begins() {
        let (coordinator, journal) = coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = Context::with_cancellation(cancel);

        let result: Result<(), StoreError> = coordinator.run(&ctx, |_| async { Ok(()) }).await;

        assert_eq!(result, Err(StoreError::Cancelled));
        assert!(journal.events().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_work_rolls_back() {
        let (coordinator, journal) = coordinator();
        let cancel = CancellationToken::new();
        let ctx = Context::with_cancellation(cancel.clone());

        let result: Result<(), StoreError> = coordinator
            .run(&ctx, |_| async move {
                cancel.cancel();
                futures::future::pending::<()>().await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(StoreError::Cancelled));
        assert_eq!(journal.events(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn test_panic_rolls_back_and_resumes() {
        let (coordinator, journal) = coordinator();
        let ctx = Context::background();

        let caught = AssertUnwindSafe(coordinator.run(&ctx, |_| async {
            if std::hint::black_box(true) {
                panic!("boom");
            }
            Ok::<(), StoreError>(())
        }))
        .catch_unwind()
        .await;

        assert!(caught.is_err());
        assert_eq!(journal.events(), vec!["begin", "rollback"]);
    }
}
