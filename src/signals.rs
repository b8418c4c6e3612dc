//! Change-notification signals (spec.md §4.8 "container-changed /
//! metadata-changed"): a fan-out of [`tokio::sync::mpsc`] channels, one per
//! subscriber, mirroring the teacher's `System::idle` idler-list pattern in
//! `system.rs` rather than a broadcast channel.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::objectid::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    ContainerChanged(ObjectId),
    MetadataChanged(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Topic {
    Container,
    Metadata,
}

/// Holds the subscriber list and hands out receivers; cloned cheaply and
/// shared between the browse/metadata orchestrators that raise signals.
#[derive(Debug, Default, Clone)]
pub struct SignalHub {
    subscribers: std::sync::Arc<std::sync::Mutex<HashMap<Topic, Vec<mpsc::Sender<Signal>>>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every signal this source raises.
    pub fn subscribe(&self) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(16);
        let mut subs = self.subscribers.lock().expect("signal hub mutex poisoned");
        subs.entry(Topic::Container).or_default().push(tx.clone());
        subs.entry(Topic::Metadata).or_default().push(tx);
        rx
    }

    fn broadcast(&self, topic: Topic, signal: Signal) {
        let mut subs = self.subscribers.lock().expect("signal hub mutex poisoned");
        if let Some(senders) = subs.get_mut(&topic) {
            senders.retain(|tx| tx.try_send(signal.clone()).is_ok() || !tx.is_closed());
        }
    }

    pub fn container_changed(&self, id: ObjectId) {
        self.broadcast(Topic::Container, Signal::ContainerChanged(id));
    }

    pub fn metadata_changed(&self, id: ObjectId) {
        self.broadcast(Topic::Metadata, Signal::MetadataChanged(id));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::objectid::encode;

    #[tokio::test]
    async fn subscriber_receives_container_changed() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let id = encode(&["music".to_string()]);
        hub.container_changed(id.clone());
        assert_eq!(rx.recv().await, Some(Signal::ContainerChanged(id)));
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let hub = SignalHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        let id = encode(&["music".to_string(), "albums".to_string()]);
        hub.metadata_changed(id.clone());
        assert_eq!(a.recv().await, Some(Signal::MetadataChanged(id.clone())));
        assert_eq!(b.recv().await, Some(Signal::MetadataChanged(id)));
    }
}
