use crate::data_sync::config::SyncConfig;
use crate::data_sync::fetcher::PageFetcher;
use crate::data_sync::page::PageParser;
use crate::data_sync::transport::PageTransport;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::events::{DomainEvent, EventBus};
use crate::logic::interval_policy::{IntervalPolicy, Tier};
use crate::logic::merger::ResultMerger;
use crate::logic::types::{MergeOutcome, PairKey, PairSchedule, PairState, TrackedPair};
use crate::store::{Store, StoreError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A pair that could not complete its poll this cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFailure {
    pub pair: PairKey,
    pub kind: ErrorKind,
    pub message: String,
}

/// A pair that completed its poll and was rescheduled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairOutcome {
    pub pair: PairKey,
    pub merge: MergeOutcome,
    pub tier: Tier,
    pub schedule: PairSchedule,
}

/// Operator-facing summary of one scheduler pass
#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    pub pairs_due: usize,
    pub pairs_succeeded: usize,
    pub pairs_failed: usize,
    /// Pairs already being polled by another cycle
    pub pairs_skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<PairFailure>,
    pub outcomes: Vec<PairOutcome>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Pairs the source rejected outright; these are not fixed by retrying.
    pub fn needs_review(&self) -> Vec<PairKey> {
        self.failures
            .iter()
            .filter(|f| f.kind == ErrorKind::InvalidEntity)
            .map(|f| f.pair)
            .collect()
    }

    pub fn failure_for(&self, pair: PairKey) -> Option<&PairFailure> {
        self.failures.iter().find(|f| f.pair == pair)
    }

    pub fn outcome_for(&self, pair: PairKey) -> Option<&PairOutcome> {
        self.outcomes.iter().find(|o| o.pair == pair)
    }
}

/// Summary of one reclassification sweep
#[derive(Clone, Debug, Default)]
pub struct SweepReport {
    pub examined: usize,
    pub changed: usize,
    /// Pairs being polled when the sweep reached them
    pub skipped: usize,
    pub failures: Vec<PairFailure>,
}

enum PairResult {
    Done(PairOutcome),
    Skipped,
    Failed(SyncError),
}

/// Releases a pair's in-flight claim when the poll ends, however it ends.
struct InFlightGuard<'a> {
    registry: &'a DashMap<PairKey, ()>,
    pair: PairKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.pair);
    }
}

/// Selects due pairs, drives fetch and merge for each, and reschedules them
pub struct Scheduler {
    store: Arc<dyn Store>,
    fetcher: PageFetcher,
    merger: ResultMerger,
    policy: IntervalPolicy,
    events: EventBus,
    max_concurrent_pairs: usize,
    pair_timeout: Duration,
    in_flight: DashMap<PairKey, ()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: PageFetcher,
        policy: IntervalPolicy,
        events: EventBus,
        max_concurrent_pairs: usize,
        pair_timeout: Duration,
    ) -> Self {
        let merger = ResultMerger::new(Arc::clone(&store), events.clone());
        Self {
            store,
            fetcher,
            merger,
            policy,
            events,
            max_concurrent_pairs: max_concurrent_pairs.max(1),
            pair_timeout,
            in_flight: DashMap::new(),
        }
    }

    pub fn from_config(
        config: &SyncConfig,
        store: Arc<dyn Store>,
        transport: Arc<dyn PageTransport>,
        parser: Arc<dyn PageParser>,
        events: EventBus,
    ) -> Self {
        Self::new(
            store,
            PageFetcher::from_config(config, transport, parser),
            IntervalPolicy::from_config(config),
            events,
            config.max_concurrent_pairs,
            config.pair_timeout(),
        )
    }

    pub fn policy(&self) -> &IntervalPolicy {
        &self.policy
    }

    /// Number of pairs currently being polled
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pair_state(&self, pair: &TrackedPair, now: DateTime<Utc>) -> PairState {
        if self.in_flight.contains_key(&pair.key) {
            PairState::Polling
        } else {
            pair.state(now)
        }
    }

    /// Runs one pass over the due pairs. `limit == 0` means unbounded.
    ///
    /// Only a store failure while selecting due pairs aborts the cycle;
    /// per-pair failures are collected in the report.
    pub async fn run_cycle(&self, limit: usize) -> SyncResult<CycleReport> {
        self.run_cycle_at(Utc::now(), limit).await
    }

    pub async fn run_cycle_at(&self, now: DateTime<Utc>, limit: usize) -> SyncResult<CycleReport> {
        let start_time = Instant::now();
        let due = self.store.list_due_pairs(now, limit).await?;

        let mut report = CycleReport {
            pairs_due: due.len(),
            ..CycleReport::default()
        };
        if due.is_empty() {
            debug!("No tracked pairs due");
            return Ok(report);
        }
        info!("Update cycle started: {} pair(s) due", due.len());

        let results: Vec<(PairKey, PairResult)> = stream::iter(due)
            .map(|pair| async move {
                let key = pair.key;
                (key, self.process_pair(pair, now).await)
            })
            .buffer_unordered(self.max_concurrent_pairs)
            .collect()
            .await;

        for (pair, result) in results {
            match result {
                PairResult::Done(outcome) => {
                    report.pairs_succeeded += 1;
                    report.inserted += outcome.merge.inserted;
                    report.updated += outcome.merge.updated;
                    report.outcomes.push(outcome);
                }
                PairResult::Skipped => report.pairs_skipped += 1,
                PairResult::Failed(err) => {
                    report.pairs_failed += 1;
                    report.failures.push(PairFailure {
                        pair,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }
        report.failures.sort_by_key(|f| f.pair);
        report.outcomes.sort_by_key(|o| o.pair);
        report.elapsed = start_time.elapsed();

        info!(
            "Update cycle finished in {:?}: {} due, {} succeeded, {} failed, {} skipped ({} new, {} updated records)",
            report.elapsed,
            report.pairs_due,
            report.pairs_succeeded,
            report.pairs_failed,
            report.pairs_skipped,
            report.inserted,
            report.updated
        );
        Ok(report)
    }

    /// Polls one pair right away, due or not. Fails if the pair is unknown or already polling.
    pub async fn poll_pair(&self, pair: PairKey) -> SyncResult<PairOutcome> {
        let tracked = self
            .store
            .get_pair(pair)
            .await?
            .ok_or(StoreError::PairNotFound(pair))?;
        match self.process_pair(tracked, Utc::now()).await {
            PairResult::Done(outcome) => Ok(outcome),
            PairResult::Failed(err) => Err(err),
            PairResult::Skipped => Err(SyncError::Transport(format!("{pair} is already being polled"))),
        }
    }

    async fn process_pair(&self, pair: TrackedPair, now: DateTime<Utc>) -> PairResult {
        let Some(_guard) = self.claim(pair.key) else {
            debug!("{}: already polling, skipped", pair.key);
            return PairResult::Skipped;
        };

        match self.poll(&pair, now).await {
            Ok(outcome) => PairResult::Done(outcome),
            Err(err) => {
                match err.kind() {
                    ErrorKind::InvalidEntity => error!("{}: {} (needs manual review)", pair.key, err),
                    _ => warn!("{}: poll failed, schedule left unchanged: {}", pair.key, err),
                }
                PairResult::Failed(err)
            }
        }
    }

    /// Fetch, merge, reclassify, reschedule. Any error leaves the schedule untouched.
    async fn poll(&self, pair: &TrackedPair, now: DateTime<Utc>) -> SyncResult<PairOutcome> {
        let rows = timeout(self.pair_timeout, self.fetcher.fetch(pair.key))
            .await
            .map_err(|_| SyncError::Timeout {
                what: format!("fetch of {}", pair.key),
                after: self.pair_timeout,
            })??;

        let merge = self.merger.merge(pair.key, &rows).await?;
        let (tier, schedule) = self.reschedule(pair, now).await?;

        Ok(PairOutcome {
            pair: pair.key,
            merge,
            tier,
            schedule,
        })
    }

    async fn classify(&self, pair: &TrackedPair) -> SyncResult<Tier> {
        let records = self.store.get_records(pair.key).await?;
        let followed = self.store.followed_players().await?;
        let has_followed = records.iter().any(|r| followed.contains(&r.player_id));
        Ok(self.policy.classify(pair, records.len(), has_followed))
    }

    async fn reschedule(&self, pair: &TrackedPair, now: DateTime<Utc>) -> SyncResult<(Tier, PairSchedule)> {
        let tier = self.classify(pair).await?;
        let hours = self.policy.hours_for(tier);
        let schedule = PairSchedule::starting_at(hours, now);

        self.store.update_pair_schedule(pair.key, schedule).await?;
        self.note_interval_change(pair, tier, hours);
        Ok((tier, schedule))
    }

    fn note_interval_change(&self, pair: &TrackedPair, tier: Tier, hours: u32) {
        let previous = pair.update_interval_hours;
        if previous == Some(hours) {
            return;
        }
        info!("{}: update interval {:?}h -> {}h ({})", pair.key, previous, hours, tier);
        if previous.is_some_and(|prev| hours < prev) {
            self.events.publish(&DomainEvent::IntervalEscalated {
                pair: pair.key,
                from: previous.and_then(|prev| self.policy.tier_for_hours(prev)),
                to: tier,
                interval_hours: hours,
            });
        }
    }

    /// Recomputes the tier of every scheduled pair from stored records, without fetching.
    ///
    /// Each pair is claimed like a poll, so a sweep and a cycle never write the
    /// same pair's schedule concurrently. Pairs already polling are skipped;
    /// a store error on one pair is recorded and the sweep moves on.
    pub async fn reclassify_all(&self) -> SyncResult<SweepReport> {
        let pairs = self.store.list_scheduled_pairs().await?;
        let mut report = SweepReport {
            examined: pairs.len(),
            ..SweepReport::default()
        };

        for listed in pairs {
            let Some(_guard) = self.claim(listed.key) else {
                debug!("{}: polling, left out of reclassification", listed.key);
                report.skipped += 1;
                continue;
            };
            match self.reclassify(listed.key).await {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!("{}: reclassification failed: {}", listed.key, err);
                    report.failures.push(PairFailure {
                        pair: listed.key,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Reclassified tracked pairs: {} examined, {} changed, {} skipped, {} failed",
            report.examined,
            report.changed,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    /// Must run under the pair's claim. Reads the pair fresh so a poll that
    /// finished after the listing is not rolled back to an older `last_update`.
    async fn reclassify(&self, key: PairKey) -> SyncResult<bool> {
        let Some(pair) = self.store.get_pair(key).await? else {
            return Ok(false);
        };
        if pair.update_interval_hours.is_none() {
            return Ok(false);
        }
        let tier = self.classify(&pair).await?;
        let hours = self.policy.hours_for(tier);
        if pair.update_interval_hours == Some(hours) {
            return Ok(false);
        }
        let next_update = pair
            .last_update
            .map(|last| last + ChronoDuration::hours(i64::from(hours)));
        self.store.update_pair_interval(key, hours, next_update).await?;
        self.note_interval_change(&pair, tier, hours);
        Ok(true)
    }

    fn claim(&self, pair: PairKey) -> Option<InFlightGuard<'_>> {
        match self.in_flight.entry(pair) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    registry: &self.in_flight,
                    pair,
                })
            }
        }
    }
}
