//! Broadcast of [`InstancesEvent`]s to subscribers.

use instances_core::InstancesEvent;
use tokio::sync::broadcast;

/// Events buffered per subscriber before it starts lagging.
const CAPACITY: usize = 256;

/// Fans subsystem events out to every subscriber.
///
/// `emit` never waits. A receiver that falls behind is lagged instead of
/// holding up the sender.
pub struct EventEmitter {
    tx: broadcast::Sender<InstancesEvent>,
}

impl EventEmitter {
    /// Create an emitter with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Send `event` to all subscribers.
    ///
    /// Returns the number of receivers that got it (0 without subscribers).
    pub fn emit(&self, event: InstancesEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<InstancesEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(id: &str) -> InstancesEvent {
        InstancesEvent::JoinIssued {
            session_id: id.into(),
            world_id: "w".into(),
        }
    }

    #[test]
    fn emit_with_no_subscribers() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(InstancesEvent::StateChanged), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives() {
        let emitter = EventEmitter::new();
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        assert_eq!(emitter.emit(joined("s1")), 2);

        let received = rx1.recv().await.unwrap();
        assert_eq!(received.session_id(), Some("s1"));
        assert_eq!(received.event_type(), "join_issued");
        assert_eq!(rx2.recv().await.unwrap(), received);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        for i in 0..=CAPACITY {
            let _ = emitter.emit(joined(&format!("s{i}")));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[test]
    fn events_before_subscribe_are_not_replayed() {
        let emitter = EventEmitter::new();
        let _ = emitter.emit(InstancesEvent::StateChanged);
        let mut rx = emitter.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
