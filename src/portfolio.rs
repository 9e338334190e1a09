//! Batch pipeline: raw transactions -> ledger -> episodes.
//!
//! This module provides:
//! - [`process_batch`], the single entry point that wires normalization,
//!   ledger building and episode aggregation together
//! - [`PortfolioResult`], the immutable output handed to persistence
//! - A content digest for checking that two runs produced identical output

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{sorted_refs, AccountId, Currency, Money, MoneyError, RawTransaction};
use crate::engine::{
    aggregate_episodes, normalize, AggregationConfig, Balances, LedgerBuilder, LedgerConfig,
    LedgerRow, PositionEpisode,
};
use crate::error::EngineError;

/// Knobs for one run of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    pub aggregation: AggregationConfig,
}

/// Everything derived from one batch of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioResult {
    pub ledger: Vec<LedgerRow>,
    pub balances: Balances,
    pub episodes: Vec<PositionEpisode>,
}

impl PortfolioResult {
    /// Final balance of an (account, currency) pair, if it was ever touched.
    pub fn balance(&self, account: &AccountId, currency: Currency) -> Option<Money> {
        self.balances
            .get(account)
            .and_then(|by_currency| by_currency.get(&currency))
            .copied()
    }

    pub fn open_episodes(&self) -> impl Iterator<Item = &PositionEpisode> {
        self.episodes.iter().filter(|e| e.is_open())
    }

    pub fn rejected_rows(&self) -> impl Iterator<Item = &LedgerRow> {
        self.ledger.iter().filter(|r| !r.accepted)
    }

    /// Realized P&L of an account, one total per currency.
    pub fn realized_pnl_by_currency(
        &self,
        account: &AccountId,
    ) -> Result<BTreeMap<Currency, Money>, MoneyError> {
        let mut totals: BTreeMap<Currency, Money> = BTreeMap::new();
        for episode in self.episodes.iter().filter(|e| &e.account_id == account) {
            let pnl = episode.realized_pnl_total;
            let total = match totals.get(&pnl.currency()) {
                Some(existing) => existing.try_add(&pnl)?,
                None => pnl,
            };
            totals.insert(pnl.currency(), total);
        }
        Ok(totals)
    }

    /// SHA-256 (hex) of the canonical JSON rendering.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        use sha2::{Digest, Sha256};

        let bytes = serde_json::to_vec(self)?;
        let hash = Sha256::digest(&bytes);
        Ok(hex::encode(hash))
    }
}

/// Run the full pipeline over one batch.
///
/// Transactions are processed in (timestamp, id) order. Normalization
/// failures become rejected ledger rows and the batch continues.
///
/// # Errors
/// Ledger or aggregation invariant violations abort the run.
pub fn process_batch(
    raws: &[RawTransaction],
    config: &EngineConfig,
) -> Result<PortfolioResult, EngineError> {
    let mut builder = LedgerBuilder::new(config.ledger.clone());
    let mut normalized = Vec::with_capacity(raws.len());

    for raw in sorted_refs(raws) {
        match normalize(raw) {
            Ok(txn) => {
                builder.apply(&txn)?;
                normalized.push(txn);
            }
            Err(err) => builder.reject_unnormalized(raw, &err),
        }
    }

    let ledger = builder.into_ledger();
    let accepted = ledger.accepted_ids();
    let episodes = aggregate_episodes(&normalized, &accepted, &config.aggregation)?;

    tracing::info!(
        transactions = raws.len(),
        accepted = accepted.len(),
        rejected = ledger.rows.len() - ledger.accepted_rows().count(),
        episodes = episodes.len(),
        "Batch processed"
    );

    Ok(PortfolioResult {
        ledger: ledger.rows,
        balances: ledger.balances,
        episodes,
    })
}
