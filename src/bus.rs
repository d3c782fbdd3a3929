//! Hot stream of raw advertisements between the radio and the decoders.
//!
//! The bus is a bounded broadcast channel. Publishing never blocks: when a
//! receiver falls behind by more than the capacity, the oldest buffered
//! events are overwritten and the receiver skips ahead. Receivers only see
//! events published after they subscribed.

use crate::config::MAX_BUS_CAPACITY;
use crate::device_id::DeviceId;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// One advertisement as delivered by the radio driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiscoveryEvent {
    pub device: DeviceId,
    pub payload: Vec<u8>,
    pub observed_at: SystemTime,
}

impl RawDiscoveryEvent {
    pub fn new(device: DeviceId, payload: impl Into<Vec<u8>>, observed_at: SystemTime) -> Self {
        Self {
            device,
            payload: payload.into(),
            observed_at,
        }
    }
}

/// Shared handle to the process-wide discovery bus.
///
/// Cloning is cheap and every clone refers to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RawDiscoveryEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering at least `capacity` events.
    ///
    /// The buffer is rounded up to the next power of two and clamped to
    /// `1..=MAX_BUS_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity
            .clamp(1, MAX_BUS_CAPACITY)
            .checked_next_power_of_two()
            .unwrap_or(MAX_BUS_CAPACITY);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Effective buffer size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A producer handle for the radio driver.
    pub fn publisher(&self) -> Publisher {
        Publisher {
            sender: self.sender.clone(),
        }
    }

    /// Attach a new consumer. It sees only events published from now on.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            receiver: self.sender.subscribe(),
            dropped: 0,
        }
    }

    /// Publish without blocking. See [`Publisher::publish`].
    pub fn publish(&self, event: RawDiscoveryEvent) -> usize {
        publish(&self.sender, event)
    }

}

/// Producer side of the bus, handed to radio callbacks.
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: broadcast::Sender<RawDiscoveryEvent>,
}

impl Publisher {
    /// Enqueue `event` without blocking.
    ///
    /// Returns the number of receivers the event was queued for. Zero means
    /// nobody is listening and the event was discarded.
    pub fn publish(&self, event: RawDiscoveryEvent) -> usize {
        publish(&self.sender, event)
    }
}

fn publish(sender: &broadcast::Sender<RawDiscoveryEvent>, event: RawDiscoveryEvent) -> usize {
    sender.send(event).unwrap_or(0)
}

/// Consumer side of the bus.
#[derive(Debug)]
pub struct BusReceiver {
    receiver: broadcast::Receiver<RawDiscoveryEvent>,
    dropped: u64,
}

impl BusReceiver {
    /// Wait for the next event.
    ///
    /// Overflow is absorbed here: events overwritten while this receiver was
    /// behind are counted in [`dropped`](Self::dropped) and skipped. Returns
    /// `None` once every producer handle is gone.
    pub async fn recv(&mut self) -> Option<RawDiscoveryEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<RawDiscoveryEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Total events this receiver lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        tracing::debug!(
            skipped,
            total = self.dropped,
            "bus receiver lagged, oldest events dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_DEVICE, VALID_PAYLOAD};
    use std::time::Duration;

    fn event(seq: u8) -> RawDiscoveryEvent {
        RawDiscoveryEvent::new(
            TEST_DEVICE,
            vec![seq, 0, 0, 0],
            SystemTime::UNIX_EPOCH + Duration::from_millis(u64::from(seq)),
        )
    }

    #[test]
    fn test_capacity_rounds_up() {
        assert_eq!(EventBus::new(64).capacity(), 64);
        assert_eq!(EventBus::new(100).capacity(), 128);
        assert_eq!(EventBus::new(0).capacity(), 1);
    }

    #[test]
    fn test_oversized_capacity_is_clamped() {
        assert_eq!(EventBus::new(MAX_BUS_CAPACITY + 1).capacity(), MAX_BUS_CAPACITY);
        assert_eq!(EventBus::new(usize::MAX).capacity(), MAX_BUS_CAPACITY);
    }

    #[test]
    fn test_publish_without_receivers_is_discarded() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(event(1)), 0);
        assert_eq!(bus.publisher().publish(event(2)), 0);
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let bus = EventBus::new(8);
        let mut early = bus.subscribe();
        bus.publish(event(1));

        let mut late = bus.subscribe();
        bus.publish(event(2));

        assert_eq!(early.try_recv(), Some(event(1)));
        assert_eq!(early.try_recv(), Some(event(2)));
        assert_eq!(late.try_recv(), Some(event(2)));
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let publisher = bus.publisher();

        // Publishing never waits on the consumer.
        for seq in 0..100u8 {
            assert_eq!(publisher.publish(event(seq)), 1);
        }

        let received: Vec<u8> = std::iter::from_fn(|| rx.try_recv())
            .map(|e| e.payload[0])
            .collect();

        assert_eq!(received, (92..100).collect::<Vec<u8>>());
        assert_eq!(rx.dropped(), 92);
    }

    #[test]
    fn test_memory_bounded_under_concurrent_producers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = bus.publisher();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        publisher.publish(RawDiscoveryEvent::new(
                            TEST_DEVICE,
                            VALID_PAYLOAD,
                            SystemTime::now(),
                        ));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let received = std::iter::from_fn(|| rx.try_recv()).count();
        assert!(received <= bus.capacity());
        assert_eq!(received as u64 + rx.dropped(), 4000);
    }

    #[tokio::test]
    async fn test_recv_skips_lag_and_ends_when_closed() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for seq in 0..5u8 {
            bus.publish(event(seq));
        }

        assert_eq!(rx.recv().await, Some(event(3)));
        assert_eq!(rx.recv().await, Some(event(4)));
        assert_eq!(rx.dropped(), 3);

        drop(bus);
        assert_eq!(rx.recv().await, None);
    }
}
