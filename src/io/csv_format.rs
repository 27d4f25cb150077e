//! CSV format handling for operation scripts, catalogs and account output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserializing operation scripts
//! - Conversion from CSV records to domain types
//! - Catalog parsing (`item,price`)
//! - Account summary serialization
//!
//! All functions work on in-memory readers and writers for easy testing.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::Deserialize;

use crate::types::{AccountInfo, Coins, InventoryLine, Operation, OperationRecord};

/// CSV record structure for deserialization
///
/// Matches the operation script format with columns: op, user, target, amount.
/// `target` is the password for `login`, the item for `buy` and the recipient
/// for `send`; `amount` is only used by `send`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    pub user: String,
    pub target: Option<String>,
    pub amount: Option<String>,
}

fn required(value: Option<String>, what: &str, op: &str, line: u64) -> Result<String, String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(format!("{} operation on line {} requires {}", op, line, what)),
    }
}

/// Convert a CsvRecord to an OperationRecord
///
/// # Arguments
///
/// * `line` - 1-based position of the record in the script
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// * `Ok(OperationRecord)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_csv_record(line: u64, csv_record: CsvRecord) -> Result<OperationRecord, String> {
    let user = csv_record.user.trim();
    if user.is_empty() {
        return Err(format!("Missing user on line {}", line));
    }

    let op = csv_record.op.trim().to_lowercase();
    let operation = match op.as_str() {
        "login" => Operation::Login {
            password: required(csv_record.target, "a password", &op, line)?,
        },
        "buy" => Operation::Buy {
            item: required(csv_record.target, "an item", &op, line)?,
        },
        "send" => {
            let to_user = required(csv_record.target, "a recipient", &op, line)?;
            let amount_str = required(csv_record.amount, "an amount", &op, line)?;
            let amount = amount_str
                .parse::<Coins>()
                .map_err(|_| format!("Invalid amount '{}' on line {}", amount_str, line))?;
            Operation::Send { to_user, amount }
        }
        "info" => Operation::Info,
        _ => {
            return Err(format!(
                "Invalid operation: '{}' on line {}",
                csv_record.op, line
            ))
        }
    };

    Ok(OperationRecord::new(line, user, operation))
}

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    item: String,
    price: Coins,
}

/// Read an item catalog with columns: item, price
///
/// # Returns
///
/// * `Ok(HashMap)` - item name to price
/// * `Err(String)` - unreadable row, blank item, zero price or duplicate item
pub fn read_catalog_csv(input: impl Read) -> Result<HashMap<String, Coins>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut catalog = HashMap::new();
    for (index, row) in reader.deserialize::<CatalogRecord>().enumerate() {
        let line = index + 1;
        let record = row.map_err(|e| format!("Invalid catalog row {}: {}", line, e))?;
        if record.item.is_empty() {
            return Err(format!("Missing item name on catalog row {}", line));
        }
        if record.price == 0 {
            return Err(format!(
                "Price of '{}' must be positive (catalog row {})",
                record.item, line
            ));
        }
        if catalog.insert(record.item.clone(), record.price).is_some() {
            return Err(format!("Duplicate catalog item '{}'", record.item));
        }
    }

    Ok(catalog)
}

/// One row of the final account report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub username: String,
    pub coins: Coins,
    pub inventory: Vec<InventoryLine>,
    /// Total coins sent to other users
    pub sent: Coins,
    /// Total coins received from other users
    pub received: Coins,
}

impl From<AccountInfo> for AccountSummary {
    fn from(info: AccountInfo) -> Self {
        Self {
            sent: info.coin_history.total_sent(),
            received: info.coin_history.total_received(),
            username: info.username,
            coins: info.coins,
            inventory: info.inventory,
        }
    }
}

fn format_inventory(inventory: &[InventoryLine]) -> String {
    let mut lines: Vec<&InventoryLine> = inventory.iter().collect();
    lines.sort_by(|a, b| a.item.cmp(&b.item));
    lines
        .iter()
        .map(|line| format!("{}:{}", line.item, line.quantity))
        .collect::<Vec<_>>()
        .join(";")
}

/// Write account summaries to CSV format
///
/// Writes accounts with columns: username, coins, inventory, sent, received.
/// Accounts are sorted by username and inventory lines by item for
/// deterministic output.
///
/// # Arguments
///
/// * `summaries` - Slice of account summaries to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_accounts_csv(
    summaries: &[AccountSummary],
    output: &mut dyn Write,
) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["username", "coins", "inventory", "sent", "received"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&AccountSummary> = summaries.iter().collect();
    sorted.sort_by(|a, b| a.username.cmp(&b.username));

    for summary in sorted {
        writer
            .write_record(&[
                summary.username.clone(),
                summary.coins.to_string(),
                format_inventory(&summary.inventory),
                summary.sent.to_string(),
                summary.received.to_string(),
            ])
            .map_err(|e| format!("Failed to write account record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn csv_record(op: &str, user: &str, target: Option<&str>, amount: Option<&str>) -> CsvRecord {
        CsvRecord {
            op: op.to_string(),
            user: user.to_string(),
            target: target.map(str::to_string),
            amount: amount.map(str::to_string),
        }
    }

    #[rstest]
    #[case::login(
        csv_record("login", "alice", Some("pw"), None),
        Operation::Login { password: "pw".to_string() }
    )]
    #[case::buy(
        csv_record("buy", "alice", Some("cup"), None),
        Operation::Buy { item: "cup".to_string() }
    )]
    #[case::send(
        csv_record("send", "alice", Some("bob"), Some("25")),
        Operation::Send { to_user: "bob".to_string(), amount: 25 }
    )]
    #[case::send_zero_is_left_to_the_ledger(
        csv_record("send", "alice", Some("bob"), Some("0")),
        Operation::Send { to_user: "bob".to_string(), amount: 0 }
    )]
    #[case::info(csv_record("info", "alice", None, None), Operation::Info)]
    #[case::case_insensitive(
        csv_record("BUY", "alice", Some("pen"), None),
        Operation::Buy { item: "pen".to_string() }
    )]
    fn test_convert_csv_record_valid(#[case] record: CsvRecord, #[case] expected: Operation) {
        let converted = convert_csv_record(7, record).unwrap();
        assert_eq!(converted, OperationRecord::new(7, "alice", expected));
    }

    #[rstest]
    #[case::invalid_op(csv_record("steal", "alice", Some("cup"), None), "Invalid operation")]
    #[case::missing_user(csv_record("info", " ", None, None), "Missing user")]
    #[case::login_without_password(csv_record("login", "alice", None, None), "requires a password")]
    #[case::buy_blank_item(csv_record("buy", "alice", Some("  "), None), "requires an item")]
    #[case::send_without_amount(csv_record("send", "alice", Some("bob"), None), "requires an amount")]
    #[case::send_negative(csv_record("send", "alice", Some("bob"), Some("-5")), "Invalid amount")]
    #[case::send_fraction(csv_record("send", "alice", Some("bob"), Some("1.5")), "Invalid amount")]
    fn test_convert_csv_record_errors(#[case] record: CsvRecord, #[case] expected_error: &str) {
        let err = convert_csv_record(1, record).unwrap_err();
        assert!(err.contains(expected_error), "unexpected error: {}", err);
    }

    #[test]
    fn test_read_catalog_csv() {
        let input = "item,price\ncup, 20\n pen ,10\n";
        let catalog = read_catalog_csv(input.as_bytes()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog["cup"], 20);
        assert_eq!(catalog["pen"], 10);
    }

    #[rstest]
    #[case::zero_price("item,price\ncup,0\n", "must be positive")]
    #[case::negative_price("item,price\ncup,-3\n", "Invalid catalog row 1")]
    #[case::duplicate("item,price\ncup,1\ncup,2\n", "Duplicate catalog item")]
    #[case::blank_item("item,price\n,5\n", "Missing item name")]
    fn test_read_catalog_csv_errors(#[case] input: &str, #[case] expected_error: &str) {
        let err = read_catalog_csv(input.as_bytes()).unwrap_err();
        assert!(err.contains(expected_error), "unexpected error: {}", err);
    }

    fn summary(username: &str, coins: Coins, inventory: &[(&str, u64)]) -> AccountSummary {
        AccountSummary {
            username: username.to_string(),
            coins,
            inventory: inventory
                .iter()
                .map(|(item, quantity)| InventoryLine {
                    item: item.to_string(),
                    quantity: *quantity,
                })
                .collect(),
            sent: 0,
            received: 0,
        }
    }

    #[rstest]
    #[case::empty_accounts(vec![], "username,coins,inventory,sent,received\n")]
    #[case::single_account(
        vec![summary("alice", 1000, &[])],
        "username,coins,inventory,sent,received\nalice,1000,,0,0\n"
    )]
    #[case::sorted_by_username(
        vec![summary("carol", 3, &[]), summary("alice", 1, &[]), summary("bob", 2, &[])],
        "username,coins,inventory,sent,received\nalice,1,,0,0\nbob,2,,0,0\ncarol,3,,0,0\n"
    )]
    #[case::inventory_sorted_by_item(
        vec![summary("alice", 870, &[("pen", 3), ("cup", 1)])],
        "username,coins,inventory,sent,received\nalice,870,cup:1;pen:3,0,0\n"
    )]
    fn test_write_accounts_csv(
        #[case] summaries: Vec<AccountSummary>,
        #[case] expected_output: &str,
    ) {
        let mut output = Vec::new();
        write_accounts_csv(&summaries, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }

    #[test]
    fn test_summary_from_info_totals_history() {
        use crate::types::{CoinHistory, ReceivedTransfer, SentTransfer};

        let info = AccountInfo {
            username: "alice".to_string(),
            coins: 900,
            inventory: vec![],
            coin_history: CoinHistory {
                received: vec![ReceivedTransfer {
                    from_user: "bob".to_string(),
                    amount: 50,
                }],
                sent: vec![
                    SentTransfer {
                        to_user: "bob".to_string(),
                        amount: 100,
                    },
                    SentTransfer {
                        to_user: "carol".to_string(),
                        amount: 50,
                    },
                ],
            },
        };

        let summary = AccountSummary::from(info);
        assert_eq!(summary.sent, 150);
        assert_eq!(summary.received, 50);
    }
}
