//! Tile seeder collaborator.
//!
//! The coordination core never walks a tile grid itself; it hands each
//! launched job to a [`TileSeeder`] and observes the execution through
//! [`SeederUpdate`] callbacks. Those callbacks are the only path by which a
//! job transitions to running, complete, failed or aborted locally.
//!
//! Cancellation is cooperative: aborting a job cancels the
//! `CancellationToken` in the seeder's [`SeedContext`]; the seeder is
//! expected to notice and resolve to [`SeedOutcome::Aborted`] (or to
//! `Complete`/`Failed` if it finished first).

mod simulated;

pub use simulated::SimulatedSeeder;

use crate::model::{CacheJobInfo, JobId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How an execution ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    /// All requested tiles were processed.
    Complete,
    /// The execution gave up; the reason is logged, never thrown.
    Failed(String),
    /// The execution observed the cancellation and stopped.
    Aborted,
}

impl fmt::Display for SeedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Callback messages from an execution to its manager.
#[derive(Clone, Debug, PartialEq)]
pub enum SeederUpdate {
    /// The execution started doing work.
    Started { job_id: JobId },
    /// Fraction of the job completed so far, in `0.0..=1.0`.
    Progress { job_id: JobId, fraction: f32 },
    /// The execution finished.
    Finished { job_id: JobId, outcome: SeedOutcome },
}

/// Execution-side view of one job: cancellation and progress reporting.
#[derive(Clone)]
pub struct SeedContext {
    job_id: JobId,
    cancellation: CancellationToken,
    updates: mpsc::UnboundedSender<SeederUpdate>,
}

impl SeedContext {
    pub(crate) fn new(
        job_id: JobId,
        cancellation: CancellationToken,
        updates: mpsc::UnboundedSender<SeederUpdate>,
    ) -> Self {
        Self {
            job_id,
            cancellation,
            updates,
        }
    }

    /// The job this context belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Reports that the execution started; drives the scheduled → running
    /// transition.
    pub fn report_started(&self) {
        let _ = self.updates.send(SeederUpdate::Started {
            job_id: self.job_id.clone(),
        });
    }

    /// Reports execution progress as a completed fraction.
    pub fn report_progress(&self, fraction: f32) {
        let _ = self.updates.send(SeederUpdate::Progress {
            job_id: self.job_id.clone(),
            fraction,
        });
    }
}

/// Boxed future produced by a seeder for one job.
pub type SeedFuture = Pin<Box<dyn Future<Output = SeedOutcome> + Send>>;

/// Executes cache jobs.
///
/// `seed` must return promptly with a future for the actual work; the
/// manager spawns the future and returns from launch without waiting on it.
pub trait TileSeeder: Send + Sync {
    /// Builds the execution future for `info`.
    ///
    /// The implementation should call `ctx.report_started()` once work
    /// begins, `ctx.report_progress()` as it advances, and watch
    /// `ctx.cancelled()` for cooperative aborts. The terminal
    /// [`SeedOutcome`] is delivered by the manager, not the seeder.
    fn seed(&self, info: &CacheJobInfo, ctx: SeedContext) -> SeedFuture;
}
