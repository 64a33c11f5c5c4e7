//! Balance-change event fan-out.
//!
//! Fire-and-forget: the ledger publishes after every successful commit and
//! moves on. Listeners (the reconciler's relay loop, websocket fan-out in
//! the platform layer) subscribe and must tolerate lag or missed events.

use tokio::sync::broadcast;

use dust_core::BalanceChanged;

/// Default buffered capacity per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast channel for balance-change notifications.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BalanceChanged>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a change event. Never fails: publishing with no subscribers
    /// is a no-op, and delivery is never on the critical path.
    pub fn publish(&self, event: BalanceChanged) {
        let receivers = self.sender.receiver_count();
        if self.sender.send(event).is_err() {
            tracing::trace!("Balance event dropped: no subscribers");
        } else {
            tracing::trace!(receivers, "Balance event published");
        }
    }

    /// Subscribe to balance-change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceChanged> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dust_core::{TransactionId, TransactionType, UserId};

    fn event(delta: i64) -> BalanceChanged {
        BalanceChanged {
            user_id: UserId::generate(),
            delta,
            balance: 100,
            transaction_id: TransactionId::generate(),
            tx_type: TransactionType::Grant,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(event(50));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.delta, 50);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(event(-4));
    }
}
