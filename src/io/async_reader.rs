//! Asynchronous CSV reader with stream interface
//!
//! Provides a streaming interface over operation records from a CSV script.
//! Supports batch reading for efficient async processing.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - tokio for async runtime and concurrency primitives
//! - Batch reading for efficient processing
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of OperationRecords
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```
//!
//! Every data row consumes a line number, including rows that are skipped,
//! so line numbers always match the row's position in the script.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::OperationRecord;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
///
/// Provides batch reading interface over operation records.
/// Maintains streaming behavior with constant memory usage.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    next_line: u64,
    skipped: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data with an `op,user,target,amount` header
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            next_line: 1,
            skipped: 0,
        }
    }

    /// Number of rows skipped so far because they could not be parsed
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Read a batch of operation records
    ///
    /// This method reads up to `batch_size` records from the CSV script,
    /// converting them to OperationRecords. Invalid records are logged
    /// and skipped.
    ///
    /// # Arguments
    ///
    /// * `batch_size` - Maximum number of records to read
    ///
    /// # Returns
    ///
    /// A vector of successfully converted operation records.
    /// Returns an empty vector when the end of the file is reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<OperationRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            let Some(row) = records.next().await else {
                break;
            };
            let line = self.next_line;
            self.next_line += 1;

            match row {
                Ok(csv_record) => match convert_csv_record(line, csv_record) {
                    Ok(record) => batch.push(record),
                    Err(e) => {
                        self.skipped += 1;
                        warn!(line, error = %e, "skipping operation record");
                    }
                },
                Err(e) => {
                    self.skipped += 1;
                    warn!(line, error = %e, "CSV parse error");
                }
            }
        }

        batch
    }
}
