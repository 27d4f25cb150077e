use crate::config::{LedgerConfig, SelfTransferPolicy, TokenConfig};
use crate::core::DispatchConfig;
use crate::replay::{load_catalog, ReplayError, ReplayOptions, DEFAULT_BATCH_SIZE};
use crate::types::Coins;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay coin-economy operation scripts against the ledger
#[derive(Parser, Debug)]
#[command(name = "coin-ledger")]
#[command(about = "Replay coin-economy operation scripts against the ledger", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing operation records
    #[arg(value_name = "INPUT", help = "Path to the operation script CSV")]
    pub input_file: PathBuf,

    /// Number of dispatch pool workers
    #[arg(
        long = "workers",
        value_name = "COUNT",
        env = "COIN_LEDGER_WORKERS",
        help = "Number of dispatch pool workers (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    /// Dispatch queue capacity
    #[arg(
        long = "queue-capacity",
        value_name = "SLOTS",
        env = "COIN_LEDGER_QUEUE_CAPACITY",
        help = "Units of work queued before submission waits (default: 1024)"
    )]
    pub queue_capacity: Option<usize>,

    /// Number of operations per batch
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        env = "COIN_LEDGER_BATCH_SIZE",
        help = "Number of operations read per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "starting-balance",
        value_name = "COINS",
        env = "COIN_LEDGER_STARTING_BALANCE",
        help = "Coins credited to every new account (default: 1000)"
    )]
    pub starting_balance: Option<Coins>,

    /// Catalog CSV replacing the built-in merchandise
    #[arg(
        long = "catalog",
        value_name = "CSV",
        env = "COIN_LEDGER_CATALOG",
        help = "Item catalog CSV with columns item,price"
    )]
    pub catalog: Option<PathBuf>,

    #[arg(
        long = "token-secret",
        value_name = "SECRET",
        env = "COIN_LEDGER_TOKEN_SECRET",
        hide_env_values = true,
        help = "Secret used to sign access tokens"
    )]
    pub token_secret: Option<String>,

    #[arg(
        long = "token-ttl-secs",
        value_name = "SECONDS",
        env = "COIN_LEDGER_TOKEN_TTL_SECS",
        help = "Access token lifetime in seconds (default: 86400)"
    )]
    pub token_ttl_secs: Option<u64>,

    /// bcrypt work factor for stored credentials
    #[arg(
        long = "credential-cost",
        value_name = "COST",
        env = "COIN_LEDGER_CREDENTIAL_COST",
        value_parser = clap::value_parser!(u32).range(4..=31),
        help = "bcrypt work factor for stored credentials, 4 to 31 (default: 12)"
    )]
    pub credential_cost: Option<u32>,

    #[arg(
        long = "self-transfer",
        value_name = "POLICY",
        env = "COIN_LEDGER_SELF_TRANSFER",
        default_value = "allow",
        help = "How transfers to oneself are treated: 'allow' or 'reject'"
    )]
    pub self_transfer: SelfTransferPolicy,
}

impl CliArgs {
    /// Create a DispatchConfig from CLI arguments
    ///
    /// Missing values use the defaults; zero values fall back to the
    /// defaults with a warning.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        if self.workers.is_some() || self.queue_capacity.is_some() {
            let default = DispatchConfig::default();
            DispatchConfig::new(
                self.workers.unwrap_or(default.workers),
                self.queue_capacity.unwrap_or(default.queue_capacity),
            )
        } else {
            DispatchConfig::default()
        }
    }

    /// Create a LedgerConfig from CLI arguments
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerConfig)` with overrides applied
    /// * `Err(ReplayError)` if the catalog file cannot be read or is invalid
    pub fn to_ledger_config(&self) -> Result<LedgerConfig, ReplayError> {
        let mut config = LedgerConfig::default().with_self_transfer(self.self_transfer);

        if let Some(starting_balance) = self.starting_balance {
            config.starting_balance = starting_balance;
        }
        if let Some(path) = &self.catalog {
            config = config.with_catalog(load_catalog(path)?);
        }
        if let Some(cost) = self.credential_cost {
            config = config.with_credential_cost(cost);
        }

        let default_token = TokenConfig::default();
        config.token = TokenConfig {
            secret: self.token_secret.clone().unwrap_or(default_token.secret),
            ttl: self
                .token_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(default_token.ttl),
        };

        Ok(config)
    }

    /// Create the full ReplayOptions from CLI arguments
    pub fn to_replay_options(&self) -> Result<ReplayOptions, ReplayError> {
        Ok(ReplayOptions::new(
            self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            self.to_dispatch_config(),
            self.to_ledger_config()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_CREDENTIAL_COST, DEFAULT_STARTING_BALANCE};
    use crate::core::dispatch::DEFAULT_QUEUE_CAPACITY;
    use rstest::rstest;
    use std::io::Write;

    // Individual config option tests
    #[rstest]
    #[case::workers(&["program", "--workers", "8", "input.csv"], Some(8), None, None)]
    #[case::queue_capacity(&["program", "--queue-capacity", "64", "input.csv"], None, Some(64), None)]
    #[case::batch_size(&["program", "--batch-size", "2000", "input.csv"], None, None, Some(2000))]
    #[case::no_options(&["program", "input.csv"], None, None, None)]
    #[case::all_options(
        &["program", "--workers", "8", "--queue-capacity", "64", "--batch-size", "2000", "input.csv"],
        Some(8),
        Some(64),
        Some(2000)
    )]
    fn test_config_options(
        #[case] args: &[&str],
        #[case] workers: Option<usize>,
        #[case] queue_capacity: Option<usize>,
        #[case] batch_size: Option<usize>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.workers, workers);
        assert_eq!(parsed.queue_capacity, queue_capacity);
        assert_eq!(parsed.batch_size, batch_size);
    }

    // DispatchConfig conversion tests with valid values
    #[rstest]
    #[case::all_defaults(&["program", "input.csv"], num_cpus::get(), DEFAULT_QUEUE_CAPACITY)]
    #[case::custom_workers(&["program", "--workers", "8", "input.csv"], 8, DEFAULT_QUEUE_CAPACITY)]
    #[case::custom_capacity(&["program", "--queue-capacity", "16", "input.csv"], num_cpus::get(), 16)]
    // Zero values fall back to defaults
    #[case::zero_workers(&["program", "--workers", "0", "input.csv"], num_cpus::get(), DEFAULT_QUEUE_CAPACITY)]
    #[case::zero_capacity(&["program", "--queue-capacity", "0", "input.csv"], num_cpus::get(), DEFAULT_QUEUE_CAPACITY)]
    fn test_dispatch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_workers: usize,
        #[case] expected_capacity: usize,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_dispatch_config();

        assert_eq!(config.workers, expected_workers);
        assert_eq!(config.queue_capacity, expected_capacity);
    }

    #[test]
    fn test_ledger_config_defaults() {
        let parsed = CliArgs::try_parse_from(["program", "input.csv"]).unwrap();
        let config = parsed.to_ledger_config().unwrap();

        assert_eq!(config.starting_balance, DEFAULT_STARTING_BALANCE);
        assert_eq!(config.self_transfer, SelfTransferPolicy::Allow);
        assert_eq!(config.catalog["pink-hoody"], 500);
        assert_eq!(config.token.ttl, TokenConfig::default().ttl);
        assert_eq!(config.credential_cost, DEFAULT_CREDENTIAL_COST);
    }

    #[test]
    fn test_ledger_config_overrides() {
        let mut catalog = tempfile::NamedTempFile::new().unwrap();
        catalog.write_all(b"item,price\nsticker,5\n").unwrap();
        catalog.flush().unwrap();
        let catalog_path = catalog.path().to_str().unwrap().to_string();

        let parsed = CliArgs::try_parse_from([
            "program",
            "--starting-balance",
            "50",
            "--catalog",
            &catalog_path,
            "--token-secret",
            "s3cret",
            "--token-ttl-secs",
            "60",
            "--credential-cost",
            "4",
            "--self-transfer",
            "reject",
            "input.csv",
        ])
        .unwrap();
        let config = parsed.to_ledger_config().unwrap();

        assert_eq!(config.starting_balance, 50);
        assert_eq!(config.catalog.len(), 1);
        assert_eq!(config.catalog["sticker"], 5);
        assert_eq!(config.token.secret, "s3cret");
        assert_eq!(config.token.ttl, Duration::from_secs(60));
        assert_eq!(config.self_transfer, SelfTransferPolicy::Reject);
        assert_eq!(config.credential_cost, 4);
    }

    #[test]
    fn test_missing_catalog_is_an_error() {
        let parsed =
            CliArgs::try_parse_from(["program", "--catalog", "no-such-catalog.csv", "input.csv"])
                .unwrap();
        assert!(matches!(
            parsed.to_ledger_config(),
            Err(ReplayError::Open { .. })
        ));
    }

    #[test]
    fn test_replay_options_batch_size() {
        let parsed =
            CliArgs::try_parse_from(["program", "--batch-size", "0", "input.csv"]).unwrap();
        assert_eq!(
            parsed.to_replay_options().unwrap().batch_size,
            DEFAULT_BATCH_SIZE
        );
    }

    // Error handling tests
    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_policy(&["program", "--self-transfer", "sometimes", "input.csv"])]
    #[case::negative_balance(&["program", "--starting-balance", "-1", "input.csv"])]
    #[case::cost_too_low(&["program", "--credential-cost", "3", "input.csv"])]
    #[case::cost_too_high(&["program", "--credential-cost", "32", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
