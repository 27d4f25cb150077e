//! Operation script replay
//!
//! Drives a whole operation script through the ledger and writes the final
//! account report.
//!
//! # Architecture
//!
//! ```text
//! replay
//!     ├── ReplayOptions (batch_size, DispatchConfig, LedgerConfig)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (user partitioning)
//!     │   └── DispatchPool → Ledger<MemoryStore>
//!     └── write_accounts_csv (final summaries)
//! ```
//!
//! Batches are processed one after another so a user's operations keep their
//! script order across batch boundaries; inside a batch, different users run
//! concurrently on the pool.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::Principal;
use crate::config::LedgerConfig;
use crate::core::{BatchProcessor, Context, DispatchConfig, DispatchPool, Ledger, MemoryStore};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{read_catalog_csv, write_accounts_csv, AccountSummary};
use crate::types::{Coins, LedgerError};

/// Default number of operation records read per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Fatal replay failures
///
/// Failures of individual operations are never fatal; they are logged and
/// counted in the [`ReplayReport`].
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to create tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to open file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("failed to build account summary: {0}")]
    Summary(#[from] LedgerError),

    #[error("{0}")]
    Output(String),
}

/// Configuration for one replay run
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Operation records read per batch
    pub batch_size: usize,
    pub dispatch: DispatchConfig,
    pub ledger: LedgerConfig,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dispatch: DispatchConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl ReplayOptions {
    /// Create ReplayOptions, replacing a zero batch size with the default
    pub fn new(batch_size: usize, dispatch: DispatchConfig, ledger: LedgerConfig) -> Self {
        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = DEFAULT_BATCH_SIZE,
                "invalid batch size, using default"
            );
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };

        Self {
            batch_size,
            dispatch,
            ledger,
        }
    }
}

/// Counts of what happened to the script's records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: u64,
    pub rejected: u64,
    /// Rows that never reached the ledger because they could not be parsed
    pub skipped: u64,
}

/// Load an `item,price` catalog file
pub fn load_catalog(path: &Path) -> Result<HashMap<String, Coins>, ReplayError> {
    let file = std::fs::File::open(path).map_err(|source| ReplayError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_catalog_csv(file).map_err(ReplayError::Catalog)
}

/// Replay an operation script and write the final account summaries
///
/// # Arguments
///
/// * `input_path` - Path to the operation script CSV
/// * `output` - Writer receiving the account summary CSV
/// * `options` - Batch, pool and ledger configuration
///
/// # Returns
///
/// * `Ok(ReplayReport)` once every record was processed and the report written
/// * `Err(ReplayError)` if a fatal error occurred
pub fn replay(
    input_path: &Path,
    output: &mut dyn Write,
    options: &ReplayOptions,
) -> Result<ReplayReport, ReplayError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(options.dispatch.workers)
        .enable_all()
        .build()
        .map_err(ReplayError::Runtime)?;

    runtime.block_on(async {
        let store = Arc::new(MemoryStore::new(options.ledger.catalog.clone()));
        let ledger = Ledger::new(Arc::clone(&store), options.ledger.clone());
        let pool = Arc::new(DispatchPool::new(options.dispatch.clone()));
        let cancel = CancellationToken::new();
        let processor = BatchProcessor::new(ledger.clone(), Arc::clone(&pool), cancel);

        let file = tokio::fs::File::open(input_path)
            .await
            .map_err(|source| ReplayError::Open {
                path: input_path.to_path_buf(),
                source,
            })?;
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let mut reader = AsyncReader::new(compat_file);

        let mut report = ReplayReport::default();
        loop {
            let batch = reader.read_batch(options.batch_size).await;
            if batch.is_empty() {
                break;
            }

            for result in processor.process_batch(batch).await {
                match result.result {
                    Ok(_) => report.applied += 1,
                    Err(_) => report.rejected += 1,
                }
            }
        }
        report.skipped = reader.skipped();

        pool.shutdown().await;

        let ctx = Context::background();
        let mut summaries = Vec::new();
        for account in ledger.accounts(&ctx).await? {
            let principal = Principal::new(account.username);
            summaries.push(AccountSummary::from(ledger.info(&ctx, &principal).await?));
        }
        debug!(accounts = summaries.len(), "writing account summaries");

        write_accounts_csv(&summaries, output).map_err(ReplayError::Output)?;

        info!(
            applied = report.applied,
            rejected = report.rejected,
            skipped = report.skipped,
            "replay finished"
        );
        Ok(report)
    })
}
