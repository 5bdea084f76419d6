//! Fan-out of training progress to WebSocket subscribers
//!
//! Each connection owns an unbounded channel of JSON text. Connections may
//! join a session to receive that session's events; every connection
//! receives broadcasts. Delivery is at-most-once with no replay, and a
//! connection whose channel is closed is dropped on the next send.

mod event;

pub use event::{ProgressEvent, Stage};

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Opaque handle of one subscriber connection
pub type ConnectionId = u64;

#[derive(Default)]
struct Subscribers {
    connections: HashMap<ConnectionId, UnboundedSender<String>>,
    sessions: HashMap<String, HashSet<ConnectionId>>,
}

/// Registry of live subscriber connections keyed by session
#[derive(Default)]
pub struct ProgressHub {
    inner: Mutex<Subscribers>,
    next_id: AtomicU64,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, optionally joined to a session
    pub fn subscribe(&self, sender: UnboundedSender<String>, session_id: Option<&str>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.connections.insert(id, sender);
        if let Some(session) = session_id {
            inner.sessions.entry(session.to_string()).or_default().insert(id);
        }
        debug!(connection = id, session = ?session_id, "Subscriber connected");
        id
    }

    /// Remove a connection from the global set and from every session
    pub fn unsubscribe(&self, id: ConnectionId) {
        let mut inner = self.inner.lock();
        Self::remove_locked(&mut inner, id);
        debug!(connection = id, "Subscriber disconnected");
    }

    fn remove_locked(inner: &mut Subscribers, id: ConnectionId) {
        inner.connections.remove(&id);
        inner.sessions.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }

    /// Send an event to every subscriber of its session; returns the number
    /// of connections that accepted it
    pub fn publish(&self, event: &ProgressEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize progress event");
                return 0;
            }
        };

        let mut inner = self.inner.lock();
        let Some(members) = inner.sessions.get(&event.session_id) else {
            return 0;
        };
        let mut members: Vec<ConnectionId> = members.iter().copied().collect();
        members.sort_unstable();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in members {
            match inner.connections.get(&id) {
                Some(sender) if sender.send(payload.clone()).is_ok() => delivered += 1,
                _ => dead.push(id),
            }
        }
        for id in dead {
            warn!(connection = id, session = %event.session_id, "Dropping dead subscriber");
            Self::remove_locked(&mut inner, id);
        }
        delivered
    }

    /// Send a raw message to every connection
    pub fn broadcast(&self, message: &str) -> usize {
        let mut inner = self.inner.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (&id, sender) in &inner.connections {
            if sender.send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            Self::remove_locked(&mut inner, id);
        }
        delivered
    }

    pub fn session_count(&self, session_id: &str) -> usize {
        self.inner.lock().sessions.get(session_id).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_publish_reaches_session_only() {
        let hub = ProgressHub::new();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        hub.subscribe(tx_a, Some("s1"));
        hub.subscribe(tx_b, Some("s2"));

        let delivered = hub.publish(&ProgressEvent::new("s1", 10, Stage::Preprocessing, "Preparing data..."));
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().unwrap().contains("\"session_id\":\"s1\""));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_stops_delivery_to_that_connection() {
        let hub = ProgressHub::new();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let a = hub.subscribe(tx_a, Some("s"));
        hub.subscribe(tx_b, Some("s"));

        hub.unsubscribe(a);
        assert_eq!(hub.session_count("s"), 1);
        assert_eq!(hub.publish(&ProgressEvent::new("s", 20, Stage::Preprocessing, "x")), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_dead_subscriber_pruned() {
        let hub = ProgressHub::new();
        let (tx, rx) = unbounded_channel();
        hub.subscribe(tx, Some("s"));
        drop(rx);

        assert_eq!(hub.publish(&ProgressEvent::new("s", 10, Stage::Preprocessing, "x")), 0);
        assert_eq!(hub.session_count("s"), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let hub = ProgressHub::new();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        hub.subscribe(tx_a, None);
        hub.subscribe(tx_b, Some("s"));

        assert_eq!(hub.broadcast("hello"), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let hub = ProgressHub::new();
        let (tx, mut rx) = unbounded_channel();
        hub.subscribe(tx, Some("s"));
        for p in [10u8, 20, 30] {
            hub.publish(&ProgressEvent::new("s", p, Stage::Preprocessing, "x"));
        }
        let order: Vec<u8> = (0..3)
            .map(|_| {
                let msg = rx.try_recv().unwrap();
                serde_json::from_str::<ProgressEvent>(&msg).unwrap().progress
            })
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
    }
}
