//! Replicated job status.
//!
//! [`CacheJobStatus`] is the one mutable record per job. Every instance in
//! the cluster holds its own copy; copies may transiently diverge but
//! converge once all broadcast events have been applied.

use super::job::{CacheJobInfo, InstanceId, JobId};
use super::request::CacheJobRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a cache job.
///
/// Valid transitions are `Scheduled → Running → {Complete | Failed}` and
/// `{Scheduled | Running} → Aborting → Aborted`. `Aborting` also accepts
/// `Complete`/`Failed` because the execution may finish before it honors
/// the cancellation. `Complete`, `Failed` and `Aborted` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Accepted and registered, execution not yet started.
    #[default]
    Scheduled,
    /// Execution in progress on the origin instance.
    Running,
    /// Cancel requested; execution not yet confirmed stopped.
    Aborting,
    /// Finished successfully.
    Complete,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Aborted,
}

impl JobState {
    /// Returns true for states from which no further transition occurs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Aborted)
    }

    /// Returns true while the job still occupies the executor.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether a transition from this state to `next` is allowed.
    ///
    /// Same-state "transitions" are not accepted here; callers treat them
    /// as idempotent no-ops instead.
    pub fn accepts(&self, next: JobState) -> bool {
        match self {
            Self::Scheduled => matches!(
                next,
                Self::Running | Self::Aborting | Self::Complete | Self::Failed
            ),
            Self::Running => matches!(next, Self::Aborting | Self::Complete | Self::Failed),
            Self::Aborting => matches!(next, Self::Aborted | Self::Complete | Self::Failed),
            Self::Complete | Self::Failed | Self::Aborted => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Aborting => "aborting",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// The mutable, replicated status record of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheJobStatus {
    /// Immutable job identity.
    pub info: CacheJobInfo,
    /// Current lifecycle state.
    pub state: JobState,
    /// Completed fraction reported by the execution, when known.
    pub progress: Option<f32>,
    /// When this replica last changed the record.
    pub last_updated: DateTime<Utc>,
    /// True for entries synthesized from a status event for a job this
    /// instance never saw created; upgraded in place once the authoritative
    /// info arrives.
    pub provisional: bool,
}

impl CacheJobStatus {
    /// Fresh status for a newly launched job.
    pub fn new(info: CacheJobInfo) -> Self {
        Self {
            info,
            state: JobState::Scheduled,
            progress: None,
            last_updated: Utc::now(),
            provisional: false,
        }
    }

    /// Minimal entry for a job only known through a status event.
    ///
    /// Carries a placeholder request and an unattributed origin; only the id
    /// and state are meaningful. Exists so abort signals for jobs missed
    /// during catch-up are not dropped.
    pub fn provisional(job_id: JobId, state: JobState) -> Self {
        let info = CacheJobInfo {
            id: job_id,
            request: CacheJobRequest::placeholder(),
            origin: InstanceId::new(""),
            launched_at: Utc::now(),
        };
        Self {
            info,
            state,
            progress: None,
            last_updated: Utc::now(),
            provisional: true,
        }
    }

    /// The job's id.
    pub fn job_id(&self) -> &JobId {
        &self.info.id
    }

    /// Returns true once the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

impl fmt::Display for CacheJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.info.id, self.state)
    }
}
