//! Job lifecycle events and the broadcast bus abstraction.
//!
//! Instances coordinate purely through three event kinds — job created,
//! status changed, job pruned — each wrapped in an [`EventEnvelope`] tagging
//! its origin instance. The envelope's origin drives self-origin
//! suppression: an instance never applies or re-broadcasts an event it
//! produced itself.
//!
//! The [`CacheJobEventBus`] trait is the transport seam. The crate ships
//! [`LocalEventBus`], an in-process implementation used by tests and
//! single-process deployments; a production deployment plugs in a real
//! message bus with the same delivery contract (at-least-once, ordered per
//! job id).

mod bus;
mod local;

pub use bus::CacheJobEventBus;
pub use local::LocalEventBus;

use crate::model::{CacheJobInfo, InstanceId, JobId, JobState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A job lifecycle event, replicated to every joined instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CacheJobEvent {
    /// A job was launched; carries its full immutable identity.
    JobCreated { info: CacheJobInfo },
    /// A job's lifecycle state changed.
    JobStatusChanged { job_id: JobId, state: JobState },
    /// A terminal job was removed from the cluster view.
    JobPruned { job_id: JobId },
}

impl CacheJobEvent {
    /// The id of the job this event concerns.
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::JobCreated { info } => &info.id,
            Self::JobStatusChanged { job_id, .. } | Self::JobPruned { job_id } => job_id,
        }
    }
}

impl fmt::Display for CacheJobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobCreated { info } => write!(f, "created {}", info.id),
            Self::JobStatusChanged { job_id, state } => write!(f, "{} -> {}", job_id, state),
            Self::JobPruned { job_id } => write!(f, "pruned {}", job_id),
        }
    }
}

/// A [`CacheJobEvent`] tagged with the instance that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Instance the event originated from.
    pub origin: InstanceId,
    /// The event itself.
    pub event: CacheJobEvent,
}

impl EventEnvelope {
    /// Wraps an event with its origin.
    pub fn new(origin: InstanceId, event: CacheJobEvent) -> Self {
        Self { origin, event }
    }

    /// Whether this envelope was produced by `instance`.
    pub fn is_from(&self, instance: &InstanceId) -> bool {
        &self.origin == instance
    }
}
