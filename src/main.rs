//! Coin Ledger CLI
//!
//! Replays an operation script through the coin ledger and prints the final
//! account summaries.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > accounts.csv
//! cargo run -- --workers 8 --batch-size 500 operations.csv > accounts.csv
//! cargo run -- --catalog shop.csv --self-transfer reject operations.csv > accounts.csv
//! RUST_LOG=coin_ledger=info cargo run -- operations.csv > accounts.csv
//! ```
//!
//! Account summaries go to stdout; logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, invalid catalog, etc.)

use coin_ledger::{cli, replay};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let options = match args.to_replay_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut output = std::io::stdout();
    if let Err(e) = replay::replay(&args.input_file, &mut output, &options) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
