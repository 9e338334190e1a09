use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use tradebook::{
    build_ledger, normalize_batch, AccountId, Currency, LedgerConfig, Money, NormalizedTransaction,
    RawTransaction,
};

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn raw(id: &str, account: &str, secs: i64, kind: &str, qty: &str, ccy: &str) -> RawTransaction {
    RawTransaction::new(
        id,
        account,
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap(),
        kind,
        d(qty),
        ccy,
    )
}

fn mixed_batch() -> Vec<NormalizedTransaction> {
    let raws = vec![
        raw("a-1", "acct-a", 0, "CASH", "2500", "USD"),
        raw("a-2", "acct-a", 10, "SHARES", "20", "USD")
            .with_ticker("MSFT")
            .with_side("BUY")
            .with_price(d("101.25"))
            .with_fees(d("0.99")),
        raw("a-3", "acct-a", 20, "CASH", "-300", "USD"),
        raw("a-4", "acct-a", 30, "SHARES", "5", "USD")
            .with_ticker("MSFT")
            .with_side("SELL")
            .with_price(d("99.10"))
            .with_fees(d("0.99")),
        raw("b-1", "acct-b", 5, "CASH", "100000", "JPY"),
        raw("b-2", "acct-b", 15, "SHARES", "10", "JPY")
            .with_ticker("7203")
            .with_side("BUY")
            .with_price(d("2850.5"))
            .with_fees(d("100")),
        raw("b-3", "acct-b", 25, "CASH", "-1000", "EUR"),
        raw("b-4", "acct-b", 35, "SHARES", "1", "EUR").with_side("BUY").with_price(d("10")),
    ];
    normalize_batch(&raws)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn assert_conserves(txns: &[NormalizedTransaction], config: &LedgerConfig) {
    let ledger = build_ledger(txns, config).unwrap();

    let mut sums: BTreeMap<(AccountId, Currency), Money> = BTreeMap::new();
    let mut last: BTreeMap<(AccountId, Currency), Money> = BTreeMap::new();
    for row in ledger.accepted_rows() {
        let delta = row.cash_delta.unwrap();
        let key = (row.account_id.clone(), delta.currency());
        let sum = match sums.get(&key) {
            Some(s) => s.try_add(&delta).unwrap(),
            None => delta,
        };
        sums.insert(key.clone(), sum);
        last.insert(key, row.balance_after.unwrap());
    }

    assert_eq!(sums, last);
    for ((account, currency), sum) in &sums {
        assert_eq!(ledger.balances[account][currency], *sum);
    }
}

#[test]
fn test_balances_equal_sum_of_accepted_deltas() {
    let txns = mixed_batch();
    assert_conserves(&txns, &LedgerConfig::default());
    assert_conserves(
        &txns,
        &LedgerConfig {
            reject_negative_balance: true,
        },
    );
}

#[test]
fn test_rows_follow_timestamp_order() {
    let mut txns = mixed_batch();
    txns.reverse();
    let ledger = build_ledger(&txns, &LedgerConfig::default()).unwrap();
    let ids: Vec<&str> = ledger.rows.iter().map(|r| r.txn_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["a-1", "b-1", "a-2", "b-2", "a-3", "b-3", "a-4", "b-4"]
    );
}

#[test]
fn test_jpy_balance_has_no_minor_units() {
    let ledger = build_ledger(&mixed_batch(), &LedgerConfig::default()).unwrap();
    let jpy = ledger.balances[&AccountId::new("acct-b")][&Currency::Jpy];
    // 100000 - (28505 + 100)
    assert_eq!(jpy.amount(), d("71395"));
    assert_eq!(jpy.amount().scale(), 0);
}

#[test]
fn test_rejected_rows_are_retained_with_reason() {
    let ledger = build_ledger(
        &mixed_batch(),
        &LedgerConfig {
            reject_negative_balance: true,
        },
    )
    .unwrap();

    let rejected: Vec<_> = ledger.rows.iter().filter(|r| !r.accepted).collect();
    let ids: Vec<&str> = rejected.iter().map(|r| r.txn_id.as_str()).collect();
    assert_eq!(ids, vec!["b-3", "b-4"]);

    let overdraft = rejected[0];
    assert!(overdraft.error.as_deref().unwrap().contains("negative"));
    assert_eq!(overdraft.cash_delta.unwrap().amount(), d("-1000.00"));
    assert!(overdraft.balance_after.unwrap().is_zero());

    let no_ticker = rejected[1];
    assert!(no_ticker.error.as_deref().unwrap().contains("ticker"));
    assert!(!ledger.accepted_ids().contains(&no_ticker.txn_id));
}

#[test]
fn test_lenient_mode_allows_overdraft() {
    let ledger = build_ledger(&mixed_batch(), &LedgerConfig::default()).unwrap();
    let eur = ledger.balances[&AccountId::new("acct-b")][&Currency::Eur];
    assert_eq!(eur.amount(), d("-1000.00"));
}
