use super::{Store, StoreError};
use crate::logic::types::{LapRecord, PairKey, PairSchedule, TrackedPair};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    pairs: BTreeMap<PairKey, TrackedPair>,
    records: HashMap<PairKey, HashMap<String, LapRecord>>,
    followed: HashSet<String>,
}

/// In-process [`Store`] backed by a single lock, so every call is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pair(&self, pair: TrackedPair) {
        let mut state = self.state.write().await;
        state.records.entry(pair.key).or_default();
        state.pairs.insert(pair.key, pair);
    }

    pub async fn follow_player(&self, player_id: impl Into<String>) {
        self.state.write().await.followed.insert(player_id.into());
    }

    pub async fn unfollow_player(&self, player_id: &str) -> bool {
        self.state.write().await.followed.remove(player_id)
    }

    pub async fn record(&self, pair: PairKey, player_id: &str) -> Option<LapRecord> {
        let state = self.state.read().await;
        state.records.get(&pair).and_then(|records| records.get(player_id)).cloned()
    }

    pub async fn record_count(&self, pair: PairKey) -> usize {
        let state = self.state.read().await;
        state.records.get(&pair).map_or(0, HashMap::len)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_due_pairs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TrackedPair>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<TrackedPair> = state.pairs.values().filter(|p| p.is_due(now)).cloned().collect();
        // None sorts before Some, so never-polled pairs come first.
        due.sort_by(|a, b| a.next_update.cmp(&b.next_update).then(a.key.cmp(&b.key)));
        if limit > 0 {
            due.truncate(limit);
        }
        Ok(due)
    }

    async fn list_scheduled_pairs(&self) -> Result<Vec<TrackedPair>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .pairs
            .values()
            .filter(|p| p.update_interval_hours.is_some())
            .cloned()
            .collect())
    }

    async fn get_pair(&self, pair: PairKey) -> Result<Option<TrackedPair>, StoreError> {
        Ok(self.state.read().await.pairs.get(&pair).cloned())
    }

    async fn get_records(&self, pair: PairKey) -> Result<Vec<LapRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<LapRecord> = state
            .records
            .get(&pair)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.lap_time_ms.cmp(&b.lap_time_ms).then_with(|| a.player_id.cmp(&b.player_id)));
        Ok(records)
    }

    async fn upsert_record(&self, record: LapRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.pairs.contains_key(&record.pair) {
            return Err(StoreError::PairNotFound(record.pair));
        }
        state
            .records
            .entry(record.pair)
            .or_default()
            .insert(record.player_id.clone(), record);
        Ok(())
    }

    async fn commit_merge(&self, pair: PairKey, records: Vec<LapRecord>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.pairs.contains_key(&pair) {
            return Err(StoreError::PairNotFound(pair));
        }
        if let Some(stray) = records.iter().find(|r| r.pair != pair) {
            return Err(StoreError::Backend(format!(
                "record for {} in merge of {}",
                stray.pair, pair
            )));
        }
        let stored = state.records.entry(pair).or_default();
        for record in records {
            stored.insert(record.player_id.clone(), record);
        }
        Ok(())
    }

    async fn update_pair_schedule(&self, pair: PairKey, schedule: PairSchedule) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let tracked = state.pairs.get_mut(&pair).ok_or(StoreError::PairNotFound(pair))?;
        tracked.update_interval_hours = Some(schedule.interval_hours);
        tracked.last_update = Some(schedule.last_update);
        tracked.next_update = Some(schedule.next_update);
        Ok(())
    }

    async fn update_pair_interval(
        &self,
        pair: PairKey,
        interval_hours: u32,
        next_update: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let tracked = state.pairs.get_mut(&pair).ok_or(StoreError::PairNotFound(pair))?;
        tracked.update_interval_hours = Some(interval_hours);
        if next_update.is_some() {
            tracked.next_update = next_update;
        }
        Ok(())
    }

    async fn followed_players(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.state.read().await.followed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap()
    }

    fn record(pair: PairKey, player: &str, lap_time_ms: u32) -> LapRecord {
        LapRecord {
            pair,
            player_id: player.to_string(),
            player_name: player.to_uppercase(),
            lap_time_ms,
            sectors_ms: None,
            controller: None,
            upload_date: at(0),
        }
    }

    #[tokio::test]
    async fn test_due_pairs_order_nulls_first() {
        let store = MemoryStore::new();

        let mut polled_early = TrackedPair::scheduled(PairKey::new(1, 1), 6);
        polled_early.advance(6, at(0)); // next at 06:00
        let mut polled_late = TrackedPair::scheduled(PairKey::new(1, 2), 6);
        polled_late.advance(6, at(2)); // next at 08:00
        let mut not_due = TrackedPair::scheduled(PairKey::new(1, 3), 48);
        not_due.advance(48, at(0));

        store.insert_pair(polled_late).await;
        store.insert_pair(polled_early).await;
        store.insert_pair(not_due).await;
        store.insert_pair(TrackedPair::scheduled(PairKey::new(2, 9), 6)).await;
        store.insert_pair(TrackedPair::new(PairKey::new(3, 3))).await;

        let due = store.list_due_pairs(at(10), 0).await.unwrap();
        let keys: Vec<PairKey> = due.iter().map(|p| p.key).collect();
        assert_eq!(keys, vec![PairKey::new(2, 9), PairKey::new(1, 1), PairKey::new(1, 2)]);

        let limited = store.list_due_pairs(at(10), 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].key, PairKey::new(2, 9));
    }

    #[tokio::test]
    async fn test_commit_merge_rejects_foreign_records_atomically() {
        let store = MemoryStore::new();
        let pair = PairKey::new(4, 4);
        store.insert_pair(TrackedPair::scheduled(pair, 6)).await;

        let batch = vec![record(pair, "a", 1000), record(PairKey::new(9, 9), "b", 900)];
        assert!(store.commit_merge(pair, batch).await.is_err());
        assert_eq!(store.record_count(pair).await, 0);

        store.commit_merge(pair, vec![record(pair, "a", 1000)]).await.unwrap();
        assert_eq!(store.record(pair, "a").await.unwrap().lap_time_ms, 1000);
    }

    #[tokio::test]
    async fn test_unknown_pair_is_reported() {
        let store = MemoryStore::new();
        let pair = PairKey::new(5, 5);
        let err = store
            .update_pair_schedule(pair, PairSchedule::starting_at(6, at(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PairNotFound(p) if p == pair));
        assert!(store.upsert_record(record(pair, "x", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_followed_players() {
        let store = MemoryStore::new();
        store.follow_player("765").await;
        assert!(store.followed_players().await.unwrap().contains("765"));
        assert!(store.unfollow_player("765").await);
        assert!(store.followed_players().await.unwrap().is_empty());
    }
}
