//! Per-instance job registry.
//!
//! [`CacheJobRegistry`] maps job ids to [`CacheJobStatus`] and is each
//! instance's single source of truth for its view of cluster job state.
//! Mutations are serialized behind one coarse lock; registries are small
//! and mutations brief, so a per-key lock buys nothing here.
//!
//! Every mutation is idempotent: applying the same insert, state change or
//! removal twice leaves the registry identical to applying it once. That is
//! what lets the cluster layer apply at-least-once event delivery without
//! bookkeeping.

use crate::model::{CacheJobInfo, CacheJobStatus, JobId, JobState};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Outcome of a state-change attempt on a registered job.
#[derive(Clone, Debug)]
pub struct Transition {
    /// The job's status after the attempt.
    pub status: CacheJobStatus,
    /// True when the attempt actually changed the state.
    pub changed: bool,
}

/// Thread-safe map of job id to replicated job status.
#[derive(Debug, Default)]
pub struct CacheJobRegistry {
    jobs: RwLock<HashMap<JobId, CacheJobStatus>>,
}

impl CacheJobRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job, keeping the first authoritative info per id.
    ///
    /// Re-inserting a known job is a no-op and returns the stored status.
    /// The one exception is a provisional entry (synthesized from a status
    /// event, see [`CacheJobStatus::provisional`]): the authoritative info
    /// replaces the placeholder while the already-learned state and
    /// progress are preserved.
    pub fn insert(&self, status: CacheJobStatus) -> CacheJobStatus {
        let mut jobs = self.jobs.write();
        match jobs.entry(status.info.id.clone()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.provisional && !status.provisional {
                    let state = existing.state;
                    let progress = existing.progress;
                    *existing = status;
                    existing.state = state;
                    existing.progress = progress;
                    existing.last_updated = Utc::now();
                }
                existing.clone()
            }
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(status).clone(),
        }
    }

    /// Attempts a state change for `job_id`.
    ///
    /// Returns `None` when the job is unknown. A same-state change is an
    /// idempotent no-op; a change the current state does not
    /// [accept](JobState::accepts) (e.g. leaving a terminal state) keeps
    /// the record untouched. Both report `changed == false`.
    pub fn set_state(&self, job_id: &JobId, state: JobState) -> Option<Transition> {
        let mut jobs = self.jobs.write();
        let status = jobs.get_mut(job_id)?;
        if status.state == state || !status.state.accepts(state) {
            return Some(Transition {
                status: status.clone(),
                changed: false,
            });
        }
        status.state = state;
        status.last_updated = Utc::now();
        Some(Transition {
            status: status.clone(),
            changed: true,
        })
    }

    /// Records execution progress for `job_id`, if known and still active.
    pub fn set_progress(&self, job_id: &JobId, fraction: f32) {
        let mut jobs = self.jobs.write();
        if let Some(status) = jobs.get_mut(job_id) {
            if status.state.is_active() {
                status.progress = Some(fraction.clamp(0.0, 1.0));
                status.last_updated = Utc::now();
            }
        }
    }

    /// Returns the status of `job_id`, if registered.
    pub fn status(&self, job_id: &JobId) -> Option<CacheJobStatus> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Snapshot of every registered job's identity.
    pub fn jobs(&self) -> Vec<CacheJobInfo> {
        self.jobs.read().values().map(|s| s.info.clone()).collect()
    }

    /// Snapshot of every registered status.
    pub fn statuses(&self) -> Vec<CacheJobStatus> {
        self.jobs.read().values().cloned().collect()
    }

    /// Snapshot of every non-terminal status.
    pub fn alive(&self) -> Vec<CacheJobStatus> {
        self.jobs
            .read()
            .values()
            .filter(|s| !s.is_finished())
            .cloned()
            .collect()
    }

    /// Removes and returns every terminal status.
    pub fn prune_terminal(&self) -> Vec<CacheJobStatus> {
        let mut jobs = self.jobs.write();
        let pruned: Vec<JobId> = jobs
            .iter()
            .filter(|(_, s)| s.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        pruned
            .iter()
            .filter_map(|id| jobs.remove(id))
            .collect()
    }

    /// Removes `job_id`; no-op when absent.
    pub fn remove(&self, job_id: &JobId) -> Option<CacheJobStatus> {
        self.jobs.write().remove(job_id)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.jobs.write().clear();
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether the registry holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CacheAction, CacheIdentifier, CacheJobRequest, InstanceId, ZoomRange};

    fn status(id: &str) -> CacheJobStatus {
        let origin = InstanceId::generate();
        let info = CacheJobInfo::new(
            JobId::new(id),
            CacheJobRequest {
                action: CacheAction::Seed,
                cache: CacheIdentifier {
                    layer_name: "test:layer1".to_string(),
                    gridset_id: "EPSG:3857".to_string(),
                    format: "image/png".to_string(),
                    parameters_id: None,
                },
                zoom: ZoomRange::new(0, 10),
                bounds: None,
            },
            origin,
        );
        CacheJobStatus::new(info)
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = CacheJobRegistry::new();
        registry.insert(status("j1"));
        assert_eq!(registry.len(), 1);
        assert!(registry.status(&JobId::new("j1")).is_some());
        assert!(registry.status(&JobId::new("j2")).is_none());
    }

    #[test]
    fn test_insert_is_idempotent_and_keeps_first_info() {
        let registry = CacheJobRegistry::new();
        let first = status("j1");
        registry.insert(first.clone());
        registry.set_state(&JobId::new("j1"), JobState::Running);

        // duplicate delivery of the same creation must not reset state
        let stored = registry.insert(first.clone());
        assert_eq!(stored.state, JobState::Running);
        assert_eq!(stored.info, first.info);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_upgrades_provisional_entry() {
        let registry = CacheJobRegistry::new();
        registry.insert(CacheJobStatus::provisional(
            JobId::new("j1"),
            JobState::Aborting,
        ));

        let authoritative = status("j1");
        let stored = registry.insert(authoritative.clone());
        assert!(!stored.provisional);
        assert_eq!(stored.info, authoritative.info);
        // the state learned from the status event survives the upgrade
        assert_eq!(stored.state, JobState::Aborting);
    }

    #[test]
    fn test_set_state_transitions() {
        let registry = CacheJobRegistry::new();
        registry.insert(status("j1"));
        let id = JobId::new("j1");

        let t = registry.set_state(&id, JobState::Running).unwrap();
        assert!(t.changed);
        assert_eq!(t.status.state, JobState::Running);

        // idempotent re-application
        let t = registry.set_state(&id, JobState::Running).unwrap();
        assert!(!t.changed);

        let t = registry.set_state(&id, JobState::Complete).unwrap();
        assert!(t.changed);

        // terminal states are sticky
        let t = registry.set_state(&id, JobState::Running).unwrap();
        assert!(!t.changed);
        assert_eq!(t.status.state, JobState::Complete);
    }

    #[test]
    fn test_set_state_unknown_job() {
        let registry = CacheJobRegistry::new();
        assert!(registry
            .set_state(&JobId::new("nope"), JobState::Running)
            .is_none());
    }

    #[test]
    fn test_progress_ignored_once_finished() {
        let registry = CacheJobRegistry::new();
        registry.insert(status("j1"));
        let id = JobId::new("j1");

        registry.set_progress(&id, 0.5);
        assert_eq!(registry.status(&id).unwrap().progress, Some(0.5));

        registry.set_state(&id, JobState::Complete);
        registry.set_progress(&id, 0.9);
        assert_eq!(registry.status(&id).unwrap().progress, Some(0.5));
    }

    #[test]
    fn test_prune_removes_only_terminal() {
        let registry = CacheJobRegistry::new();
        registry.insert(status("scheduled"));
        registry.insert(status("running"));
        registry.insert(status("aborting"));
        registry.insert(status("complete"));
        registry.insert(status("failed"));
        registry.insert(status("aborted"));

        registry.set_state(&JobId::new("running"), JobState::Running);
        registry.set_state(&JobId::new("aborting"), JobState::Aborting);
        registry.set_state(&JobId::new("complete"), JobState::Complete);
        registry.set_state(&JobId::new("failed"), JobState::Failed);
        registry.set_state(&JobId::new("aborting"), JobState::Aborting);
        registry.set_state(&JobId::new("aborted"), JobState::Aborting);
        registry.set_state(&JobId::new("aborted"), JobState::Aborted);

        let pruned = registry.prune_terminal();
        assert_eq!(pruned.len(), 3);
        assert_eq!(registry.len(), 3);
        assert!(registry.status(&JobId::new("complete")).is_none());
        assert!(registry.status(&JobId::new("scheduled")).is_some());
        assert!(registry.status(&JobId::new("aborting")).is_some());

        // pruning again finds nothing
        assert!(registry.prune_terminal().is_empty());
    }

    #[test]
    fn test_alive_excludes_terminal() {
        let registry = CacheJobRegistry::new();
        registry.insert(status("j1"));
        registry.insert(status("j2"));
        registry.set_state(&JobId::new("j2"), JobState::Failed);

        let alive = registry.alive();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].job_id(), &JobId::new("j1"));
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = CacheJobRegistry::new();
        registry.insert(status("j1"));
        registry.insert(status("j2"));

        assert!(registry.remove(&JobId::new("j1")).is_some());
        assert!(registry.remove(&JobId::new("j1")).is_none());

        registry.clear();
        assert!(registry.is_empty());
    }
}
