use super::types::{LapRecord, MergeOutcome, PairKey, ScrapedRow};
use crate::error::SyncResult;
use crate::events::{DomainEvent, EventBus};
use crate::store::Store;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of reconciling one scraped row against the stored record
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordDiff {
    Insert(LapRecord),
    Improve { previous: LapRecord, current: LapRecord },
    Unchanged,
}

impl RecordDiff {
    pub fn into_record(self) -> Option<LapRecord> {
        match self {
            Self::Insert(record) | Self::Improve { current: record, .. } => Some(record),
            Self::Unchanged => None,
        }
    }
}

/// Best-time-wins: a stored record is only replaced by a strictly faster lap.
pub fn reconcile(pair: PairKey, existing: Option<&LapRecord>, row: &ScrapedRow) -> RecordDiff {
    match existing {
        None => RecordDiff::Insert(LapRecord::from_row(pair, row)),
        Some(previous) if row.lap_time_ms < previous.lap_time_ms => RecordDiff::Improve {
            previous: previous.clone(),
            current: LapRecord::from_row(pair, row),
        },
        Some(_) => RecordDiff::Unchanged,
    }
}

/// Keeps one row per player: the fastest, ties going to the latest upload.
pub fn collapse_rows(rows: &[ScrapedRow]) -> Vec<&ScrapedRow> {
    let mut best: HashMap<&str, &ScrapedRow> = HashMap::with_capacity(rows.len());
    let mut order: Vec<&str> = Vec::with_capacity(rows.len());

    for row in rows {
        match best.get(row.player_id.as_str()) {
            None => {
                order.push(row.player_id.as_str());
                best.insert(row.player_id.as_str(), row);
            }
            Some(kept) => {
                let faster = row.lap_time_ms < kept.lap_time_ms;
                let newer_tie = row.lap_time_ms == kept.lap_time_ms && row.upload_date > kept.upload_date;
                if faster || newer_tie {
                    best.insert(row.player_id.as_str(), row);
                }
            }
        }
    }

    order.into_iter().filter_map(|player| best.get(player).copied()).collect()
}

/// Computes the changes a set of rows would make to one pair's stored records.
pub fn plan_merge(pair: PairKey, existing: &[LapRecord], rows: &[ScrapedRow]) -> Vec<RecordDiff> {
    let stored: HashMap<&str, &LapRecord> =
        existing.iter().map(|record| (record.player_id.as_str(), record)).collect();

    collapse_rows(rows)
        .into_iter()
        .map(|row| reconcile(pair, stored.get(row.player_id.as_str()).copied(), row))
        .filter(|diff| !matches!(diff, RecordDiff::Unchanged))
        .collect()
}

/// Reconciles freshly scraped rows against the stored best-known results of a pair
pub struct ResultMerger {
    store: Arc<dyn Store>,
    events: EventBus,
}

impl ResultMerger {
    pub fn new(store: Arc<dyn Store>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Applies all inserts and improvements for `pair` in one store transaction,
    /// then publishes events. Nothing is published if the commit fails.
    pub async fn merge(&self, pair: PairKey, rows: &[ScrapedRow]) -> SyncResult<MergeOutcome> {
        if rows.is_empty() {
            debug!("{}: no rows to merge", pair);
            return Ok(MergeOutcome::default());
        }

        let existing = self.store.get_records(pair).await?;
        let diffs = plan_merge(pair, &existing, rows);

        let mut outcome = MergeOutcome::default();
        for diff in &diffs {
            match diff {
                RecordDiff::Insert(_) => outcome.inserted += 1,
                RecordDiff::Improve { .. } => outcome.updated += 1,
                RecordDiff::Unchanged => {}
            }
        }

        if outcome.is_empty() {
            info!("{}: nothing to update ({} rows checked)", pair, rows.len());
            return Ok(outcome);
        }

        let followed = self.store.followed_players().await?;
        let changed: Vec<LapRecord> = diffs.iter().cloned().filter_map(RecordDiff::into_record).collect();
        self.store.commit_merge(pair, changed).await?;

        info!(
            "{}: found {} new and {} updated lap records",
            pair, outcome.inserted, outcome.updated
        );

        self.publish_events(diffs, &followed);
        Ok(outcome)
    }

    fn publish_events(&self, diffs: Vec<RecordDiff>, followed: &HashSet<String>) {
        for diff in diffs {
            match diff {
                RecordDiff::Insert(record) => {
                    if followed.contains(&record.player_id) {
                        self.events.publish(&DomainEvent::NewRecord { record });
                    }
                }
                RecordDiff::Improve { previous, current } => {
                    let followed = followed.contains(&current.player_id);
                    self.events.publish(&DomainEvent::ImprovedRecord {
                        record: current,
                        previous_lap_time_ms: previous.lap_time_ms,
                        followed,
                    });
                }
                RecordDiff::Unchanged => {}
            }
        }
    }
}
