//! Event bus collaborator trait.

use super::EventEnvelope;
use crate::model::{CacheJobStatus, InstanceId};
use crate::registry::CacheJobRegistry;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Transport seam between the coordination core and the cluster.
///
/// Delivery contract an implementation must honor:
///
/// - at-least-once: duplicates are allowed (the core applies events
///   idempotently), silent drops are not;
/// - ordered per job id: for one job, created → status changes → pruned
///   arrive in that relative order at every member;
/// - broadcast: every joined member eventually receives every event.
///
/// Joining hands the bus the member's registry so the bus can answer
/// [`snapshot`](CacheJobEventBus::snapshot) requests from other members;
/// leaving drops the subscription, so an instance that left receives
/// nothing and serves no snapshots.
pub trait CacheJobEventBus: Send + Sync {
    /// Registers `instance` as a cluster member and returns its event
    /// stream. Re-joining an already-joined instance returns a fresh
    /// stream.
    fn join(
        &self,
        instance: &InstanceId,
        registry: Arc<CacheJobRegistry>,
    ) -> broadcast::Receiver<EventEnvelope>;

    /// Deregisters `instance`; no-op when not joined.
    fn leave(&self, instance: &InstanceId);

    /// Broadcasts an event to every joined member, including the origin
    /// (origins filter their own events out on receipt).
    fn publish(&self, envelope: EventEnvelope);

    /// Point-in-time catch-up exchange for a joining member: the
    /// non-terminal jobs currently known to the other members. Called
    /// exactly once per join.
    fn snapshot(&self, requester: &InstanceId) -> Vec<CacheJobStatus>;
}
