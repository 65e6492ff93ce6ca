//! In-process event bus.

use super::{CacheJobEventBus, EventEnvelope};
use crate::config::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::model::{CacheJobStatus, InstanceId};
use crate::registry::CacheJobRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// [`CacheJobEventBus`] implementation for instances living in one process.
///
/// Events ride a single `tokio::sync::broadcast` channel, which preserves
/// publish order for all receivers and therefore trivially satisfies the
/// per-job ordering contract. Snapshots are answered synchronously from the
/// joined members' registries.
///
/// Used by the test suites and by single-process deployments that still
/// want the full coordination protocol; a networked deployment provides its
/// own [`CacheJobEventBus`] instead.
pub struct LocalEventBus {
    sender: broadcast::Sender<EventEnvelope>,
    members: DashMap<InstanceId, Arc<CacheJobRegistry>>,
}

impl LocalEventBus {
    /// Creates a bus with the default event channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Creates a bus whose broadcast channel buffers `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: DashMap::new(),
        }
    }

    /// Number of currently joined members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheJobEventBus for LocalEventBus {
    fn join(
        &self,
        instance: &InstanceId,
        registry: Arc<CacheJobRegistry>,
    ) -> broadcast::Receiver<EventEnvelope> {
        self.members.insert(instance.clone(), registry);
        self.sender.subscribe()
    }

    fn leave(&self, instance: &InstanceId) {
        self.members.remove(instance);
    }

    fn publish(&self, envelope: EventEnvelope) {
        trace!(origin = %envelope.origin, event = %envelope.event, "publishing");
        // send() errors only when no receiver exists, which just means no
        // other member is joined yet
        let _ = self.sender.send(envelope);
    }

    fn snapshot(&self, requester: &InstanceId) -> Vec<CacheJobStatus> {
        self.members
            .iter()
            .filter(|entry| entry.key() != requester)
            .flat_map(|entry| entry.value().alive())
            .collect()
    }
}
