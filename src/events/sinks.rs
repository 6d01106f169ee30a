use super::{DomainEvent, EventSink};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Forwards events to a bounded channel consumed by notifier tasks.
/// Events are dropped with a warning when the channel is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DomainEvent>,
}

impl ChannelSink {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &DomainEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    warn!("Event channel is full, dropping {} for {}", event.kind(), event.pair());
                }
                mpsc::error::TrySendError::Closed(event) => {
                    warn!("Event channel is closed, dropping {} for {}", event.kind(), event.pair());
                }
            }
        }
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &DomainEvent) {
        info!(kind = %event.kind(), "{}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::interval_policy::Tier;
    use crate::logic::types::PairKey;

    fn escalation(track_id: u32) -> DomainEvent {
        DomainEvent::IntervalEscalated {
            pair: PairKey::new(track_id, 1),
            from: None,
            to: Tier::Mid,
            interval_hours: 48,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.publish(&escalation(1));
        assert_eq!(rx.recv().await, Some(escalation(1)));
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.publish(&escalation(1));
        sink.publish(&escalation(2));
        assert_eq!(rx.recv().await, Some(escalation(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        sink.publish(&escalation(1));
    }
}
