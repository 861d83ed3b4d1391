// MIT License

//! Asynchronous events decoded from `'M'` frames, and the bounded queue that
//! carries them from the reader task to the panel model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::warn;

use crate::devices::{AreaState, ZoneFlags, ZoneState};
use crate::protocol::PanelTimestamp;

/// A zone changed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEvent {
    pub zone_number: u16,
    pub state: ZoneState,
    pub flags: ZoneFlags,
}

/// An area changed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaEvent {
    pub area_number: u8,
    pub state: AreaState,
    /// Part-arm level when the new state is part-armed; 0 otherwise.
    pub part_arm: u8,
}

/// An entry from the panel event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub event_type: u8,
    pub group_type: u8,
    pub parameter: u16,
    pub areas: u16,
    pub time: PanelTimestamp,
    pub description: String,
}

/// Everything the panel reports asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Zone(ZoneEvent),
    Area(AreaEvent),
    Log(LogEvent),
}

struct Channel {
    queue: Mutex<VecDeque<PanelEvent>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Sending half of the event queue, held by the reader task.
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Channel>,
}

/// Receiving half of the event queue. Single consumer.
pub struct EventReceiver {
    shared: Arc<Channel>,
}

/// Create a bounded event queue. When full, the oldest event is dropped and
/// the overflow counter increments, so a stalled consumer sees the most
/// recent `capacity` events.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let shared = Arc::new(Channel {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        notify: Notify::new(),
        capacity,
        dropped: AtomicU64::new(0),
        closed: AtomicBool::new(false),
    });
    (
        EventSender { shared: shared.clone() },
        EventReceiver { shared },
    )
}

impl EventSender {
    /// Enqueue an event, evicting the oldest if the queue is full.
    pub fn send(&self, event: PanelEvent) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= self.shared.capacity {
                queue.pop_front();
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Event queue full, dropped oldest event (total dropped: {})", dropped);
            }
            queue.push_back(event);
        }
        self.shared.notify.notify_one();
    }

    /// Close the queue. Idempotent; wakes a blocked receiver.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
        self.shared.notify.notify_one();
    }

    /// Number of events evicted due to overflow.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl EventReceiver {
    /// Receive the next event, or `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<PanelEvent> {
        loop {
            if let Some(event) = self.shared.queue.lock().unwrap().pop_front() {
                return Some(event);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Number of events evicted due to overflow.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone_event(n: u16) -> PanelEvent {
        PanelEvent::Zone(ZoneEvent {
            zone_number: n,
            state: ZoneState::Active,
            flags: ZoneFlags::empty(),
        })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = event_channel(10);
        for n in 1..=3 {
            tx.send(zone_event(n));
        }
        for n in 1..=3u16 {
            match rx.recv().await {
                Some(PanelEvent::Zone(z)) => assert_eq!(z.zone_number, n),
                other => panic!("Unexpected: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let (tx, mut rx) = event_channel(100);
        // Stalled consumer: inject 200 events before the first recv.
        for n in 0..200 {
            tx.send(zone_event(n));
        }
        assert_eq!(tx.dropped(), 100);

        // The 100 survivors are the newest 100, in order.
        for n in 100..200u16 {
            match rx.recv().await {
                Some(PanelEvent::Zone(z)) => assert_eq!(z.zone_number, n),
                other => panic!("Unexpected: {:?}", other),
            }
        }
        tx.close();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_receiver() {
        let (tx, mut rx) = event_channel(10);
        let handle = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.close();
        assert!(handle.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drains_after_close() {
        let (tx, mut rx) = event_channel(10);
        tx.send(zone_event(1));
        tx.close();
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
