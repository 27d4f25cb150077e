//! In-memory transactional backend
//!
//! The default backend of the binary and the store the tests run against.
//! It implements every store trait with row-level locking so that the
//! ledger's concurrency guarantees can be exercised without a database.
//!
//! - **table**: row slots and per-transaction lock sets
//! - **transaction**: [`MemoryTransaction`] with undo images and buffered history
//! - **store**: [`MemoryStore`], the store trait implementations

mod store;
mod table;
mod transaction;

pub use store::MemoryStore;
pub use transaction::MemoryTransaction;
