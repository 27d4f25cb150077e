//! Dispatch Pool
//!
//! Decouples accepting an operation from executing it. Callers package an
//! operation as a unit of work, hand it to the [`DispatchPool`] and wait on
//! the [`Completion`] for its result.

pub mod completion;
pub mod pool;

pub use completion::{completion, Completion, Reporter};
pub use pool::{DispatchConfig, DispatchPool, DEFAULT_QUEUE_CAPACITY};
