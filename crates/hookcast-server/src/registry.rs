use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Registry-issued connection identifier. Increases with registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Failure writing to a single subscriber.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("connection closed")]
    Closed,
}

/// Write half of a live subscriber channel.
#[async_trait]
pub trait Subscriber: Send + 'static {
    /// Deliver one text message.
    async fn send_text(&mut self, payload: &str) -> Result<(), SubscriberError>;

    /// Release the underlying channel. Called exactly once, by whoever
    /// removed the connection from the registry.
    async fn close(&mut self);
}

/// Registry of all active subscriber connections.
///
/// One lock covers insert, remove, and the whole of a broadcast, so a
/// broadcast always sees a consistent set of connections.
pub struct ConnectionRegistry {
    connections: Mutex<BTreeMap<ConnectionId, Box<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a freshly upgraded connection and mark it active.
    pub async fn register(&self, subscriber: Box<dyn Subscriber>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let total = {
            let mut conns = self.connections.lock().await;
            conns.insert(id, subscriber);
            conns.len()
        };
        tracing::info!(conn_id = %id, subscribers = total, "subscriber registered");
        id
    }

    /// Remove a connection and close it.
    ///
    /// Returns `false` when the connection was already gone, e.g. because a
    /// broadcast dropped it first.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let (removed, total) = {
            let mut conns = self.connections.lock().await;
            let removed = conns.remove(id);
            (removed, conns.len())
        };

        match removed {
            Some(mut subscriber) => {
                subscriber.close().await;
                tracing::info!(conn_id = %id, subscribers = total, "subscriber unregistered");
                true
            }
            None => {
                tracing::debug!(conn_id = %id, "subscriber already removed");
                false
            }
        }
    }

    /// Write `payload` to every registered connection, in registration order.
    ///
    /// A connection whose write fails is closed and removed before the next
    /// one is attempted. The lock is held for the whole loop, so a slow
    /// subscriber delays everyone behind it.
    pub async fn broadcast(&self, payload: &str) {
        let mut conns = self.connections.lock().await;
        let ids: Vec<ConnectionId> = conns.keys().copied().collect();
        let mut delivered = 0usize;
        let mut dropped = 0usize;

        for id in ids {
            let Some(subscriber) = conns.get_mut(&id) else {
                continue;
            };
            match subscriber.send_text(payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(conn_id = %id, error = %e, "failed to send to subscriber");
                    if let Some(mut dead) = conns.remove(&id) {
                        dead.close().await;
                    }
                    dropped += 1;
                }
            }
        }

        tracing::debug!(
            delivered,
            dropped,
            subscribers = conns.len(),
            bytes = payload.len(),
            "broadcast complete"
        );
    }

    /// Number of active connections.
    pub async fn count(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_active(&self, id: &ConnectionId) -> bool {
        self.connections.lock().await.contains_key(id)
    }

    /// Close and remove every connection. Used on shutdown.
    pub async fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.connections.lock().await);
        let closed = drained.len();
        for (_, mut subscriber) in drained {
            subscriber.close().await;
        }
        if closed > 0 {
            tracing::info!(closed, "closed all subscribers");
        }
        closed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// In-memory subscriber that can be told to fail its next writes.
    struct MockSubscriber {
        tx: mpsc::UnboundedSender<String>,
        fail: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
    }

    struct MockHandle {
        rx: mpsc::UnboundedReceiver<String>,
        fail: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
    }

    fn mock() -> (Box<dyn Subscriber>, MockHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fail = Arc::new(AtomicBool::new(false));
        let closes = Arc::new(AtomicUsize::new(0));
        let sub = MockSubscriber {
            tx,
            fail: Arc::clone(&fail),
            closes: Arc::clone(&closes),
        };
        (Box::new(sub), MockHandle { rx, fail, closes })
    }

    #[async_trait]
    impl Subscriber for MockSubscriber {
        async fn send_text(&mut self, payload: &str) -> Result<(), SubscriberError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SubscriberError::Send("broken pipe".into()));
            }
            self.tx
                .send(payload.to_string())
                .map_err(|_| SubscriberError::Closed)
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn_7");
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.count().await, 0);

        let (a, _ha) = mock();
        let (b, hb) = mock();
        let id_a = registry.register(a).await;
        let id_b = registry.register(b).await;
        assert_ne!(id_a, id_b);
        assert!(id_a < id_b);
        assert_eq!(registry.count().await, 2);

        assert!(registry.unregister(&id_b).await);
        assert_eq!(registry.count().await, 1);
        assert!(!registry.is_active(&id_b).await);
        assert_eq!(hb.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_unregister_is_noop() {
        let registry = ConnectionRegistry::new();
        let (sub, handle) = mock();
        let id = registry.register(sub).await;

        assert!(registry.unregister(&id).await);
        assert!(!registry.unregister(&id).await);
        assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let registry = ConnectionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let (sub, handle) = mock();
            registry.register(sub).await;
            handles.push(handle);
        }

        registry.broadcast(r#"{"from":"628111@s.whatsapp.net"}"#).await;

        for handle in &mut handles {
            assert_eq!(
                handle.rx.try_recv().unwrap(),
                r#"{"from":"628111@s.whatsapp.net"}"#
            );
        }
    }

    #[tokio::test]
    async fn failed_write_drops_only_that_subscriber() {
        let registry = ConnectionRegistry::new();
        let mut ids = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let (sub, handle) = mock();
            ids.push(registry.register(sub).await);
            handles.push(handle);
        }
        handles[1].fail.store(true, Ordering::SeqCst);

        registry.broadcast("hello").await;

        assert!(!registry.is_active(&ids[1]).await);
        assert_eq!(registry.count().await, 3);
        assert_eq!(handles[1].closes.load(Ordering::SeqCst), 1);
        assert!(handles[1].rx.try_recv().is_err());
        for k in [0, 2, 3] {
            assert_eq!(handles[k].rx.try_recv().unwrap(), "hello");
            assert!(registry.is_active(&ids[k]).await);
        }

        // Read loop noticing the close later must not close it again.
        assert!(!registry.unregister(&ids[1]).await);
        assert_eq!(handles[1].closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_receiver_counts_as_failure() {
        let registry = ConnectionRegistry::new();
        let (sub, handle) = mock();
        let id = registry.register(sub).await;
        let closes = Arc::clone(&handle.closes);
        drop(handle);

        registry.broadcast("hello").await;
        assert!(!registry.is_active(&id).await);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry() {
        let registry = ConnectionRegistry::new();
        registry.broadcast("nobody listening").await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn close_all_drains_registry() {
        let registry = ConnectionRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let (sub, handle) = mock();
            registry.register(sub).await;
            handles.push(handle);
        }

        assert_eq!(registry.close_all().await, 3);
        assert_eq!(registry.count().await, 0);
        for handle in &handles {
            assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_operations_keep_count_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..50 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (sub, handle) = mock();
                let id = registry.register(sub).await;
                registry.broadcast("tick").await;
                // Every third task leaves again; the rest stay registered.
                let left = if i % 3 == 0 {
                    registry.unregister(&id).await
                } else {
                    false
                };
                (left, handle)
            }));
        }

        let mut unregistered = 0;
        let mut handles = Vec::new();
        for task in tasks {
            let (left, handle) = task.await.unwrap();
            if left {
                unregistered += 1;
            }
            handles.push(handle);
        }

        assert_eq!(unregistered, 17);
        assert_eq!(registry.count().await, 50 - unregistered);
        for handle in &handles {
            assert!(handle.closes.load(Ordering::SeqCst) <= 1);
        }
    }
}
