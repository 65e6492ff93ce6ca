//! Job and instance identity.

use super::request::CacheJobRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Process-wide counter feeding [`JobId::next`].
static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Identifies one manager instance within the cluster.
///
/// Instance ids tag every broadcast event with its origin, which is what
/// makes self-origin suppression possible.
#[derive(Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an instance id from an externally assigned value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh cluster-unique instance id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the string value of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used when embedding the instance id in job ids and logs.
    pub(crate) fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster-wide unique identifier for a job.
///
/// Assigned once by the launching instance and propagated by value; the id
/// embeds a prefix of the origin instance id so two instances can never
/// collide.
#[derive(Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job id from an existing string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates the next job id for the given launching instance.
    pub fn next(origin: &InstanceId) -> Self {
        let seq = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{}", origin.short(), seq))
    }

    /// Returns the string value of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The immutable identity of a launched job.
///
/// Created exactly once, by the launching instance, and never mutated;
/// every replica of the job's status carries the same info.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheJobInfo {
    /// Cluster-wide unique job id.
    pub id: JobId,
    /// The request this job was launched for.
    pub request: CacheJobRequest,
    /// Instance that launched the job (and runs its execution).
    pub origin: InstanceId,
    /// When the launching instance accepted the job.
    pub launched_at: DateTime<Utc>,
}

impl CacheJobInfo {
    /// Creates the info record for a newly launched job.
    pub fn new(id: JobId, request: CacheJobRequest, origin: InstanceId) -> Self {
        Self {
            id,
            request,
            origin,
            launched_at: Utc::now(),
        }
    }
}

impl fmt::Display for CacheJobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.request)
    }
}
