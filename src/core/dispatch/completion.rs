//! Result hand-off between a unit of work and its submitter
//!
//! A unit of work gets a [`Reporter`] and the submitter keeps the matching
//! [`Completion`]. The reporter owns two single-slot channels, one for
//! success and one for failure, and consumes itself on use, so exactly one
//! value is ever written. The submitter waits on both and takes whichever
//! resolves first.

use tokio::sync::oneshot;

use crate::types::DispatchError;

/// Create a connected reporter/completion pair
pub fn completion<T, E>() -> (Reporter<T, E>, Completion<T, E>) {
    let (success_tx, success_rx) = oneshot::channel();
    let (failure_tx, failure_rx) = oneshot::channel();
    (
        Reporter {
            success: success_tx,
            failure: failure_tx,
        },
        Completion {
            success: success_rx,
            failure: failure_rx,
        },
    )
}

/// Writing half, handed to the unit of work
#[derive(Debug)]
pub struct Reporter<T, E> {
    success: oneshot::Sender<T>,
    failure: oneshot::Sender<E>,
}

impl<T, E> Reporter<T, E> {
    pub fn report(self, result: Result<T, E>) {
        match result {
            Ok(value) => self.succeed(value),
            Err(error) => self.fail(error),
        }
    }

    pub fn succeed(self, value: T) {
        // The submitter may have stopped waiting; nothing to do then.
        let _ = self.success.send(value);
    }

    pub fn fail(self, error: E) {
        let _ = self.failure.send(error);
    }
}

/// Waiting half, kept by the submitter
#[derive(Debug)]
pub struct Completion<T, E> {
    success: oneshot::Receiver<T>,
    failure: oneshot::Receiver<E>,
}

impl<T, E> Completion<T, E>
where
    E: From<DispatchError>,
{
    /// Wait for the unit of work to report
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - the unit of work succeeded
    /// * `Err(E)` - it failed, or it was dropped without reporting
    ///   (`DispatchError::Abandoned`)
    pub async fn wait(self) -> Result<T, E> {
        let Completion {
            mut success,
            mut failure,
        } = self;

        tokio::select! {
            Ok(value) = &mut success => Ok(value),
            Ok(error) = &mut failure => Err(error),
            else => Err(DispatchError::Abandoned.into()),
        }
    }
}
