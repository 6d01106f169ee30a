/// Domain events and the sinks they are pushed to
///
/// Sinks are injected into the merger and scheduler through an [`EventBus`];
/// delivery order follows the order in which sinks were added.
pub mod sinks;

use crate::logic::interval_policy::Tier;
use crate::logic::lap_time::format_lap_time;
use crate::logic::types::{LapRecord, PairKey};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use strum_macros::Display as StrumDisplay;

pub use sinks::{ChannelSink, LogSink};

#[derive(Copy, Clone, Debug, StrumDisplay, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    NewRecord,
    ImprovedRecord,
    IntervalEscalated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A followed player appeared on a pair for the first time.
    NewRecord { record: LapRecord },
    /// A stored record was replaced by a strictly faster lap.
    ImprovedRecord {
        record: LapRecord,
        previous_lap_time_ms: u32,
        followed: bool,
    },
    /// A pair moved to a more urgent polling tier.
    IntervalEscalated {
        pair: PairKey,
        from: Option<Tier>,
        to: Tier,
        interval_hours: u32,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewRecord { .. } => EventKind::NewRecord,
            Self::ImprovedRecord { .. } => EventKind::ImprovedRecord,
            Self::IntervalEscalated { .. } => EventKind::IntervalEscalated,
        }
    }

    pub fn pair(&self) -> PairKey {
        match self {
            Self::NewRecord { record } | Self::ImprovedRecord { record, .. } => record.pair,
            Self::IntervalEscalated { pair, .. } => *pair,
        }
    }
}

impl Display for DomainEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewRecord { record } => write!(f, "new record: {record}"),
            Self::ImprovedRecord { record, previous_lap_time_ms, .. } => write!(
                f,
                "improved record: {} (was {}, -{})",
                record,
                format_lap_time(*previous_lap_time_ms),
                format_lap_time(previous_lap_time_ms.saturating_sub(record.lap_time_ms))
            ),
            Self::IntervalEscalated { pair, to, interval_hours, .. } => {
                write!(f, "{pair} escalated to {to} ({interval_hours}h)")
            }
        }
    }
}

/// Receiver of domain events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &DomainEvent);
}

/// Ordered fan-out to every registered sink
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn publish(&self, event: &DomainEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("sinks", &self.sinks.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct Recorder {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl EventSink for Recorder {
        fn publish(&self, event: &DomainEvent) {
            self.seen.lock().unwrap().push(format!("{}:{}", self.tag, event.kind()));
        }
    }

    #[test]
    fn test_bus_delivers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new()
            .with_sink(Arc::new(Recorder { tag: "a", seen: seen.clone() }))
            .with_sink(Arc::new(Recorder { tag: "b", seen: seen.clone() }));

        bus.publish(&DomainEvent::IntervalEscalated {
            pair: PairKey::new(1, 1),
            from: Some(Tier::Low),
            to: Tier::High,
            interval_hours: 6,
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:INTERVAL_ESCALATED".to_string(), "b:INTERVAL_ESCALATED".to_string()]
        );
    }

    #[test]
    fn test_improved_record_display() {
        let record = LapRecord {
            pair: PairKey::new(2, 3),
            player_id: "1".to_string(),
            player_name: "Sam".to_string(),
            lap_time_ms: 61_000,
            sectors_ms: None,
            controller: None,
            upload_date: Utc::now(),
        };
        let event = DomainEvent::ImprovedRecord { record, previous_lap_time_ms: 62_500, followed: true };
        assert_eq!(
            event.to_string(),
            "improved record: 01:01.000 by Sam on track 2 / vehicle 3 (was 01:02.500, -00:01.500)"
        );
        assert_eq!(event.pair(), PairKey::new(2, 3));
    }
}
