use super::lap_time::format_lap_time;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use strum_macros::Display as StrumDisplay;

/// Identity of a tracked (track, vehicle) combination
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub track_id: u32,
    pub vehicle_id: u32,
}

impl PairKey {
    pub fn new(track_id: u32, vehicle_id: u32) -> Self {
        Self { track_id, vehicle_id }
    }
}

impl Display for PairKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "track {} / vehicle {}", self.track_id, self.vehicle_id)
    }
}

/// Lifecycle position of a tracked pair as seen by the scheduler
#[derive(Copy, Clone, Debug, StrumDisplay, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PairState {
    Unscheduled,
    Scheduled,
    Due,
    Polling,
}

/// A (track, vehicle) combination under periodic observation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPair {
    pub key: PairKey,
    /// `None` means the pair is not actively polled
    pub update_interval_hours: Option<u32>,
    pub last_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
}

impl TrackedPair {
    /// An unscheduled pair; never selected until an interval is set
    pub fn new(key: PairKey) -> Self {
        Self {
            key,
            update_interval_hours: None,
            last_update: None,
            next_update: None,
        }
    }

    /// A pair that has never been polled and is therefore immediately due
    pub fn scheduled(key: PairKey, interval_hours: u32) -> Self {
        Self {
            update_interval_hours: Some(interval_hours),
            ..Self::new(key)
        }
    }

    /// Selection predicate: interval set and either never polled or overdue.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.update_interval_hours.is_none() {
            return false;
        }
        if self.last_update.is_none() {
            return true;
        }
        matches!(self.next_update, Some(next) if next <= now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> PairState {
        if self.update_interval_hours.is_none() {
            PairState::Unscheduled
        } else if self.is_due(now) {
            PairState::Due
        } else {
            PairState::Scheduled
        }
    }

    /// Marks a completed poll at `now` with the given interval.
    pub fn advance(&mut self, interval_hours: u32, now: DateTime<Utc>) {
        self.update_interval_hours = Some(interval_hours);
        self.last_update = Some(now);
        self.next_update = Some(now + ChronoDuration::hours(i64::from(interval_hours)));
    }
}

/// Schedule fields written back after a completed poll
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PairSchedule {
    pub interval_hours: u32,
    pub last_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
}

impl PairSchedule {
    pub fn starting_at(interval_hours: u32, last_update: DateTime<Utc>) -> Self {
        Self {
            interval_hours,
            last_update,
            next_update: last_update + ChronoDuration::hours(i64::from(interval_hours)),
        }
    }
}

/// A single result row as decoded from a leaderboard page. Never persisted directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedRow {
    pub player_id: String,
    pub player_name: String,
    pub lap_time_ms: u32,
    pub sectors_ms: [u32; 3],
    pub controller: Option<String>,
    pub upload_date: DateTime<Utc>,
}

/// Best-known result of one player on one tracked pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapRecord {
    pub pair: PairKey,
    pub player_id: String,
    /// Denormalized, may be stale
    pub player_name: String,
    pub lap_time_ms: u32,
    pub sectors_ms: Option<[u32; 3]>,
    pub controller: Option<String>,
    pub upload_date: DateTime<Utc>,
}

impl LapRecord {
    pub fn from_row(pair: PairKey, row: &ScrapedRow) -> Self {
        Self {
            pair,
            player_id: row.player_id.clone(),
            player_name: row.player_name.clone(),
            lap_time_ms: row.lap_time_ms,
            sectors_ms: Some(row.sectors_ms),
            controller: row.controller.clone(),
            upload_date: row.upload_date,
        }
    }
}

impl Display for LapRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} by {} on {}",
            format_lap_time(self.lap_time_ms),
            self.player_name,
            self.pair
        )
    }
}

/// Counts returned by a merge
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_unscheduled_pair_is_never_due() {
        let pair = TrackedPair::new(PairKey::new(1, 2));
        assert!(!pair.is_due(at(12)));
        assert_eq!(pair.state(at(12)), PairState::Unscheduled);
    }

    #[test]
    fn test_never_polled_pair_is_due() {
        let pair = TrackedPair::scheduled(PairKey::new(1, 2), 24);
        assert!(pair.is_due(at(0)));
    }

    #[test]
    fn test_advance_keeps_schedule_invariant() {
        let mut pair = TrackedPair::scheduled(PairKey::new(1, 2), 24);
        pair.advance(6, at(3));
        assert_eq!(pair.last_update, Some(at(3)));
        assert_eq!(pair.next_update, Some(at(9)));
        assert_eq!(pair.state(at(8)), PairState::Scheduled);
        assert_eq!(pair.state(at(9)), PairState::Due);
    }

    #[test]
    fn test_schedule_starting_at() {
        let schedule = PairSchedule::starting_at(12, at(0));
        assert_eq!(schedule.next_update, at(12));
    }
}
