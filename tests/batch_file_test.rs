use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;
use tradebook::batch::{read_batch, write_result, BatchError};
use tradebook::{process_batch, AccountId, Currency, EngineConfig, PortfolioResult};

const BATCH: &str = r#"[
  {
    "id": "t-2",
    "userId": "user-1",
    "accountId": "acct-1",
    "timestamp": "2025-11-04T15:00:00Z",
    "instrumentKind": "SHARES",
    "ticker": "AAPL",
    "side": "SELL",
    "qty": "10",
    "price": "160",
    "fees": "1",
    "currency": "USD"
  },
  {
    "id": "t-1",
    "userId": "user-1",
    "accountId": "acct-1",
    "timestamp": "2025-11-03T15:00:00Z",
    "instrumentKind": "SHARES",
    "ticker": "AAPL",
    "side": "BUY",
    "qty": "10",
    "price": "150",
    "fees": "1",
    "currency": "USD",
    "memo": "opening lot"
  },
  {
    "id": "t-0",
    "userId": "user-1",
    "accountId": "acct-1",
    "timestamp": "2025-11-01T09:00:00Z",
    "instrumentKind": "CASH",
    "qty": "5000",
    "currency": "usd"
  }
]"#;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[test]
fn test_read_process_write_round_trip() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("batch.json");
    let output = dir.path().join("result.json");
    std::fs::write(&input, BATCH).unwrap();

    let raws = read_batch(&input).unwrap();
    assert_eq!(raws.len(), 3);
    assert_eq!(raws[1].memo.as_deref(), Some("opening lot"));
    assert_eq!(raws[2].fees, Decimal::ZERO);

    let result = process_batch(&raws, &EngineConfig::default()).unwrap();
    assert_eq!(
        result
            .balance(&AccountId::new("acct-1"), Currency::Usd)
            .unwrap()
            .amount(),
        d("5098.00")
    );

    write_result(Some(&output), &result).unwrap();
    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("\"cashDelta\""));
    assert!(written.contains("\"realizedPnlTotal\""));

    let reread: PortfolioResult = serde_json::from_str(&written).unwrap();
    assert_eq!(reread, result);
    assert_eq!(reread.digest().unwrap(), result.digest().unwrap());
}

#[test]
fn test_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    match read_batch(&missing) {
        Err(BatchError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("Expected Io error, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_malformed_json_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.json");
    std::fs::write(&input, "[{\"id\": \"t-1\"}]").unwrap();
    assert!(matches!(read_batch(&input), Err(BatchError::Json(_))));
}
