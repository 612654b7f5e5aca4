//! Change notification sinks.
//!
//! Sinks are fire-and-forget: they return nothing and can not fail the
//! write that triggered them.

use std::sync::RwLock;

use metable_store::MetaRecord;
use tokio::sync::broadcast;

/// Receives notifications about committed metadata changes.
pub trait MetaObserver: Send + Sync {
    /// A record was persisted (inserted or amended).
    fn on_meta_added(&self, record: &MetaRecord);

    /// A key was deleted; `record` is the value that was current just before.
    fn on_meta_removed(&self, record: &MetaRecord);
}

/// A committed change.
#[derive(Clone, Debug)]
pub enum MetaEvent {
    Added(MetaRecord),
    Removed(MetaRecord),
}

impl MetaEvent {
    pub fn record(&self) -> &MetaRecord {
        match self {
            Self::Added(r) | Self::Removed(r) => r,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl MetaObserver for NullObserver {
    fn on_meta_added(&self, _record: &MetaRecord) {}

    fn on_meta_removed(&self, _record: &MetaRecord) {}
}

/// Keeps every notification in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RwLock<Vec<MetaEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetaEvent> {
        self.events.read().expect("lock poisoned").clone()
    }

    pub fn added(&self) -> Vec<MetaRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MetaEvent::Added(r) => Some(r),
                MetaEvent::Removed(_) => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<MetaRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MetaEvent::Removed(r) => Some(r),
                MetaEvent::Added(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.write().expect("lock poisoned").clear();
    }

    fn push(&self, event: MetaEvent) {
        self.events.write().expect("lock poisoned").push(event);
    }
}

impl MetaObserver for RecordingObserver {
    fn on_meta_added(&self, record: &MetaRecord) {
        self.push(MetaEvent::Added(record.clone()));
    }

    fn on_meta_removed(&self, record: &MetaRecord) {
        self.push(MetaEvent::Removed(record.clone()));
    }
}

/// Fans notifications out over a `tokio` broadcast channel.
///
/// Sending with no live receivers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    sender: broadcast::Sender<MetaEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetaEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl MetaObserver for BroadcastObserver {
    fn on_meta_added(&self, record: &MetaRecord) {
        let _ = self.sender.send(MetaEvent::Added(record.clone()));
    }

    fn on_meta_removed(&self, record: &MetaRecord) {
        let _ = self.sender.send(MetaEvent::Removed(record.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str) -> MetaRecord {
        MetaRecord::new("post", key)
    }

    #[test]
    fn recording_keeps_order() {
        let observer = RecordingObserver::new();
        observer.on_meta_added(&record("a"));
        observer.on_meta_removed(&record("b"));
        observer.on_meta_added(&record("c"));
        let keys: Vec<_> = observer.events().iter().map(|e| e.record().key().to_string()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(observer.added().len(), 2);
        assert_eq!(observer.removed()[0].key(), "b");
        observer.clear();
        assert!(observer.events().is_empty());
    }

    #[test]
    fn broadcast_without_receivers_is_silent() {
        let observer = BroadcastObserver::new(8);
        assert_eq!(observer.receiver_count(), 0);
        observer.on_meta_added(&record("a"));
    }

    #[tokio::test]
    async fn broadcast_fans_out() {
        let observer = BroadcastObserver::new(8);
        let mut first = observer.subscribe();
        let mut second = observer.subscribe();
        observer.on_meta_added(&record("a"));
        observer.on_meta_removed(&record("a"));

        for rx in [&mut first, &mut second] {
            let added = rx.recv().await.unwrap();
            assert!(added.is_added());
            let removed = rx.recv().await.unwrap();
            assert!(!removed.is_added());
            assert_eq!(removed.record().key(), "a");
        }
        assert!(first.try_recv().is_err());
    }
}
