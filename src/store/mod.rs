/// Persistence seam
///
/// The scheduler and merger only depend on the [`Store`] trait. Every
/// mutating call is all-or-nothing: a failed `commit_merge` leaves the
/// pair's records exactly as they were.
pub mod memory;

use crate::logic::types::{LapRecord, PairKey, PairSchedule, TrackedPair};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("tracked pair not found: {0}")]
    PairNotFound(PairKey),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Pairs with an interval that were never polled or whose `next_update <= now`,
    /// ordered by `next_update` ascending with nulls first. `limit == 0` means unbounded.
    async fn list_due_pairs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TrackedPair>, StoreError>;

    /// All pairs with a non-null interval.
    async fn list_scheduled_pairs(&self) -> Result<Vec<TrackedPair>, StoreError>;

    async fn get_pair(&self, pair: PairKey) -> Result<Option<TrackedPair>, StoreError>;

    async fn get_records(&self, pair: PairKey) -> Result<Vec<LapRecord>, StoreError>;

    async fn upsert_record(&self, record: LapRecord) -> Result<(), StoreError>;

    /// Upserts every record of one pair's merge as a single transaction.
    async fn commit_merge(&self, pair: PairKey, records: Vec<LapRecord>) -> Result<(), StoreError>;

    async fn update_pair_schedule(&self, pair: PairKey, schedule: PairSchedule) -> Result<(), StoreError>;

    /// Changes only the interval (and `next_update` when the pair has been polled before).
    async fn update_pair_interval(
        &self,
        pair: PairKey,
        interval_hours: u32,
        next_update: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn followed_players(&self) -> Result<HashSet<String>, StoreError>;
}
