//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! test fixtures. Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Replays all operations through the dispatch pool into the ledger
//! 3. Generates the account summary CSV
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path scenarios
//! - Insufficient funds for purchases and transfers
//! - Unknown recipients and items, zero amounts
//! - Operations without a valid session
//! - Interleaved users with cross transfers
//! - Malformed rows
//! - Self-transfers and repeated purchases
//!
//! Each fixture is replayed with several batch sizes; the result must not
//! depend on how the script is cut into batches.

#[cfg(test)]
mod tests {
    use coin_ledger::auth::MIN_CREDENTIAL_COST;
    use coin_ledger::config::LedgerConfig;
    use coin_ledger::core::DispatchConfig;
    use coin_ledger::replay::{replay, ReplayOptions};
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Run a test fixture by replaying input.csv and comparing with expected.csv
    ///
    /// # Arguments
    ///
    /// * `fixture_name` - Name of the fixture directory (e.g., "happy_path")
    /// * `batch_size` - Operations read per batch
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Input or expected files cannot be read
    /// - Output doesn't match expected
    fn run_test_fixture(fixture_name: &str, batch_size: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let ledger = LedgerConfig::default().with_credential_cost(MIN_CREDENTIAL_COST);
        let options = ReplayOptions::new(batch_size, DispatchConfig::new(4, 16), ledger);

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        replay(Path::new(&input_path), &mut temp_output, &options)
            .unwrap_or_else(|e| panic!("Failed to replay operations: {}", e));

        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));

        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (batch size: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, batch_size, actual_output, expected_output
        );
    }

    /// End-to-end test for all fixtures with several batch sizes
    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("unknown_references")]
    #[case("unauthorized")]
    #[case("multiple_users")]
    #[case("malformed_data")]
    #[case("self_transfer")]
    #[case("repeat_purchases")]
    fn test_fixtures(#[case] fixture: &str, #[values(1, 3, 1000)] batch_size: usize) {
        run_test_fixture(fixture, batch_size);
    }
}
