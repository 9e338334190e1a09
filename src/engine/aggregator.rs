//! Folds ledger-accepted transactions into position episodes.

use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

use crate::domain::{sorted_refs, AccountId, InstrumentKind, Money, NormalizedTransaction, TxnId};
use crate::error::EngineError;

use super::episode_tracker::{EpisodeIds, EpisodeTracker};
use super::{ActionTerm, EpisodeTxn, PositionEpisode};

/// How option rolls are recognized.
///
/// A roll is a closing trade that takes an option episode to zero, followed
/// by the next accepted transaction for the same (account, ticker, right)
/// opening a different (expiry, strike), no later than `max_gap` after the
/// close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollDetection {
    pub enabled: bool,
    pub max_gap: Duration,
}

impl Default for RollDetection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_gap: Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationConfig {
    pub roll_detection: RollDetection,
}

/// Routes transactions to one [`EpisodeTracker`] per (account, episode key).
pub struct EpisodeAggregator {
    config: AggregationConfig,
    ids: EpisodeIds,
    trackers: BTreeMap<(AccountId, String), EpisodeTracker>,
    cash_episodes: Vec<PositionEpisode>,
    folded: HashSet<TxnId>,
}

impl EpisodeAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            ids: EpisodeIds::new(),
            trackers: BTreeMap::new(),
            cash_episodes: Vec::new(),
            folded: HashSet::new(),
        }
    }

    /// Fold one transaction. Callers feed transactions in (timestamp, id) order.
    pub fn process(&mut self, txn: &NormalizedTransaction) -> Result<(), EngineError> {
        if !self.folded.insert(txn.id.clone()) {
            tracing::debug!(txn_id = %txn.id, "Skipping repeated transaction id");
            return Ok(());
        }

        match txn.instrument_kind {
            InstrumentKind::Cash => {
                let episode = cash_episode(txn, self.ids.next_id());
                self.cash_episodes.push(episode);
                Ok(())
            }
            InstrumentKind::Shares | InstrumentKind::Call | InstrumentKind::Put => {
                let key = txn.episode_key().ok_or_else(|| {
                    EngineError::AggregationInvariantViolation {
                        txn_id: txn.id.clone(),
                        reason: format!("{} transaction has no ticker", txn.instrument_kind),
                    }
                })?;
                self.trackers
                    .entry((txn.account_id.clone(), key))
                    .or_default()
                    .process(txn, &mut self.ids, &self.config.roll_detection)
            }
        }
    }

    /// All episodes in creation order.
    pub fn finish(self) -> Vec<PositionEpisode> {
        let mut episodes = self.cash_episodes;
        for tracker in self.trackers.into_values() {
            episodes.extend(tracker.into_episodes());
        }
        episodes.sort_by_key(|e| e.id);
        episodes
    }
}

/// Every cash movement is its own closed episode.
fn cash_episode(txn: &NormalizedTransaction, id: u64) -> PositionEpisode {
    let zero = Money::zero(txn.currency);
    PositionEpisode {
        id,
        account_id: txn.account_id.clone(),
        episode_key: "CASH".to_string(),
        instrument_kind: InstrumentKind::Cash,
        ticker: None,
        open_timestamp: txn.timestamp,
        close_timestamp: Some(txn.timestamp),
        qty: Decimal::ZERO,
        avg_price: txn.price,
        total_fees: txn.fees,
        cash_total: txn.total_value,
        realized_pnl_total: zero,
        rolled: false,
        current_instrument_key: None,
        current_strike: None,
        current_expiry: None,
        txns: vec![EpisodeTxn {
            txn_id: txn.id.clone(),
            timestamp: txn.timestamp,
            action_term: ActionTerm::for_cash(&txn.total_value),
            qty_delta: Decimal::ZERO,
            qty_after: Decimal::ZERO,
            price: txn.price,
            fees: txn.fees,
            cash_value: txn.total_value,
            realized_pnl_delta: zero,
            strike: None,
            expiry: None,
        }],
    }
}

/// Aggregate the accepted subset of `txns` into episodes.
///
/// # Errors
/// Fatal for the whole run: option fields missing, SHARES quantity going
/// negative, or currencies mixed within one episode. The error names the
/// offending transaction.
pub fn aggregate_episodes(
    txns: &[NormalizedTransaction],
    accepted: &HashSet<TxnId>,
    config: &AggregationConfig,
) -> Result<Vec<PositionEpisode>, EngineError> {
    let mut aggregator = EpisodeAggregator::new(config.clone());
    for txn in sorted_refs(txns) {
        if accepted.contains(&txn.id) {
            aggregator.process(txn)?;
        }
    }
    Ok(aggregator.finish())
}
