use super::types::TrackedPair;
use crate::data_sync::config::SyncConfig;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use tracing::debug;

/// Polling urgency. `High` urgency maps to the *shortest* interval.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Low,
    Mid,
    High,
}

/// Maps observed activity on a tracked pair to a polling tier and its interval
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IntervalPolicy {
    pub low_update_threshold: usize,
    pub low_interval_hours: u32,
    pub mid_interval_hours: u32,
    pub high_interval_hours: u32,
}

impl IntervalPolicy {
    pub fn new(
        low_update_threshold: usize,
        low_interval_hours: u32,
        mid_interval_hours: u32,
        high_interval_hours: u32,
    ) -> Self {
        Self {
            low_update_threshold,
            low_interval_hours,
            mid_interval_hours,
            high_interval_hours,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.low_update_threshold,
            config.low_update_interval_hours,
            config.mid_update_interval_hours,
            config.high_update_interval_hours,
        )
    }

    /// Followed-player presence wins; otherwise the record count picks MID over LOW.
    pub fn classify(&self, pair: &TrackedPair, lap_record_count: usize, has_followed_player_record: bool) -> Tier {
        let tier = if has_followed_player_record {
            Tier::High
        } else if lap_record_count > self.low_update_threshold {
            Tier::Mid
        } else {
            Tier::Low
        };
        debug!(
            "{}: {} records, followed={} -> {}",
            pair.key, lap_record_count, has_followed_player_record, tier
        );
        tier
    }

    pub fn hours_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Low => self.low_interval_hours,
            Tier::Mid => self.mid_interval_hours,
            Tier::High => self.high_interval_hours,
        }
    }

    /// Reverse lookup of a stored interval; unknown values yield `None`.
    pub fn tier_for_hours(&self, hours: u32) -> Option<Tier> {
        if hours == self.high_interval_hours {
            Some(Tier::High)
        } else if hours == self.mid_interval_hours {
            Some(Tier::Mid)
        } else if hours == self.low_interval_hours {
            Some(Tier::Low)
        } else {
            None
        }
    }
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
