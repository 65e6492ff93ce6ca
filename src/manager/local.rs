//! Single-instance job lifecycle engine.

use crate::builder::{CacheJobRequestBuilder, TileLayerCatalog};
use crate::model::{CacheJobInfo, CacheJobRequest, CacheJobStatus, InstanceId, JobId, JobState};
use crate::registry::CacheJobRegistry;
use crate::seeder::{SeedContext, SeedOutcome, SeederUpdate, TileSeeder};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observer of locally-caused job state changes.
///
/// The manager emits exactly one callback per effective change, in per-job
/// order: `job_created` once at launch, `status_changed` for every later
/// transition, `job_pruned` when a terminal job is removed. Idempotent
/// no-ops (re-aborting an aborting job, duplicate executor callbacks) emit
/// nothing. Remote events applied to the registry bypass the sink entirely,
/// which is what keeps received events from being re-broadcast.
pub trait JobStatusSink: Send + Sync {
    /// A job was launched on this instance.
    fn job_created(&self, status: &CacheJobStatus);

    /// A locally-caused transition changed a job's state.
    fn status_changed(&self, status: &CacheJobStatus);

    /// A terminal job was removed by a local prune.
    fn job_pruned(&self, status: &CacheJobStatus);
}

/// Sink for standalone deployments that coordinate with nobody.
pub struct NullStatusSink;

impl JobStatusSink for NullStatusSink {
    fn job_created(&self, _status: &CacheJobStatus) {}
    fn status_changed(&self, _status: &CacheJobStatus) {}
    fn job_pruned(&self, _status: &CacheJobStatus) {}
}

/// Runs cache jobs on one instance.
///
/// `launch` returns as soon as the job is registered and dispatched; the
/// seeder's callbacks, applied by a single driver task, are the only path
/// to the running and terminal states. The driver serializes all
/// executor-driven mutations, so concurrent launches, aborts and callbacks
/// never corrupt the registry.
pub struct LocalCacheJobManager {
    instance_id: InstanceId,
    registry: Arc<CacheJobRegistry>,
    seeder: Arc<dyn TileSeeder>,
    catalog: Arc<dyn TileLayerCatalog>,
    sink: Arc<dyn JobStatusSink>,
    executions: Arc<DashMap<JobId, CancellationToken>>,
    updates: mpsc::UnboundedSender<SeederUpdate>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LocalCacheJobManager {
    /// Creates a manager and starts its callback driver task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        instance_id: InstanceId,
        seeder: Arc<dyn TileSeeder>,
        catalog: Arc<dyn TileLayerCatalog>,
        sink: Arc<dyn JobStatusSink>,
    ) -> Self {
        let registry = Arc::new(CacheJobRegistry::new());
        let executions = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();
        let (updates, updates_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(drive_updates(
            updates_rx,
            registry.clone(),
            sink.clone(),
            executions.clone(),
            shutdown.clone(),
        ));

        Self {
            instance_id,
            registry,
            seeder,
            catalog,
            sink,
            executions,
            updates,
            shutdown,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// This instance's id.
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// The registry backing this manager.
    pub fn registry(&self) -> Arc<CacheJobRegistry> {
        self.registry.clone()
    }

    /// A fresh request builder bound to this manager's layer catalog.
    pub fn new_request_builder(&self) -> CacheJobRequestBuilder {
        CacheJobRequestBuilder::new(self.catalog.clone())
    }

    /// Launches a job for `request`: assigns an id, registers it as
    /// scheduled, dispatches execution, and returns without waiting.
    pub fn launch(&self, request: CacheJobRequest) -> CacheJobInfo {
        let id = JobId::next(&self.instance_id);
        let info = CacheJobInfo::new(id, request, self.instance_id.clone());
        let status = self.registry.insert(CacheJobStatus::new(info.clone()));
        info!(job = %info.id, request = %info.request, "launching job");
        self.sink.job_created(&status);
        self.dispatch(&info);
        info
    }

    /// Registers a job learned from elsewhere (remote create or snapshot
    /// catch-up) without dispatching execution and without emitting to the
    /// sink. Idempotent.
    pub fn resume(&self, status: CacheJobStatus) {
        debug!(job = %status.info.id, state = %status.state, "registering job from cluster");
        self.registry.insert(status);
    }

    /// Requests a cooperative abort of `job_id`.
    ///
    /// A known non-terminal job transitions to aborting and its execution
    /// token (if this instance runs it) is cancelled; the terminal aborted
    /// state arrives later through the executor callback. Unknown ids
    /// return `None`; re-aborting is an idempotent no-op.
    pub fn abort(&self, job_id: &JobId) -> Option<CacheJobStatus> {
        let transition = self.registry.set_state(job_id, JobState::Aborting)?;
        if transition.changed {
            info!(job = %job_id, "abort requested");
            self.cancel_execution(job_id);
            self.sink.status_changed(&transition.status);
        }
        Some(transition.status)
    }

    /// Aborts every non-terminal job; returns their statuses.
    pub fn abort_all(&self) -> Vec<CacheJobStatus> {
        self.registry
            .alive()
            .iter()
            .filter_map(|status| self.abort(status.job_id()))
            .collect()
    }

    /// Removes and returns every terminal job, emitting one `job_pruned`
    /// per removal.
    pub fn prune(&self) -> Vec<CacheJobStatus> {
        let pruned = self.registry.prune_terminal();
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "pruned terminal jobs");
        }
        for status in &pruned {
            self.sink.job_pruned(status);
        }
        pruned
    }

    /// Applies a state learned from a remote event, bypassing the sink.
    ///
    /// Unknown jobs get a provisional entry so abort signals for jobs
    /// missed during catch-up are not dropped. A remotely-requested abort
    /// of a job executing here cancels the local execution.
    pub fn apply_remote_state(&self, job_id: &JobId, state: JobState) {
        match self.registry.set_state(job_id, state) {
            None => {
                debug!(job = %job_id, %state, "status for unknown job, synthesizing entry");
                self.registry
                    .insert(CacheJobStatus::provisional(job_id.clone(), state));
            }
            Some(transition) => {
                if transition.changed && state == JobState::Aborting {
                    self.cancel_execution(job_id);
                }
            }
        }
    }

    /// Drops `job_id` from the registry (remote prune); no-op when absent.
    pub fn forget(&self, job_id: &JobId) {
        self.registry.remove(job_id);
    }

    /// Status of `job_id`, if known here.
    pub fn status(&self, job_id: &JobId) -> Option<CacheJobStatus> {
        self.registry.status(job_id)
    }

    /// Identity of every job known here.
    pub fn jobs(&self) -> Vec<CacheJobInfo> {
        self.registry.jobs()
    }

    /// Number of executions currently running on this instance.
    pub fn active_executions(&self) -> usize {
        self.executions.len()
    }

    /// Drops every registry entry.
    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Cancels all in-flight executions and stops the callback driver.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }
    }

    fn dispatch(&self, info: &CacheJobInfo) {
        let token = self.shutdown.child_token();
        self.executions.insert(info.id.clone(), token.clone());

        // an abort may have landed in the window before the token existed
        // (e.g. a remote Aborting applied during the job_created emission);
        // its cancel found nothing, so honor it now
        if let Some(status) = self.registry.status(&info.id) {
            if status.state == JobState::Aborting {
                token.cancel();
            }
        }

        let ctx = SeedContext::new(info.id.clone(), token, self.updates.clone());
        let execution = self.seeder.seed(info, ctx);
        let job_id = info.id.clone();
        let updates = self.updates.clone();
        tokio::spawn(async move {
            let outcome = execution.await;
            let _ = updates.send(SeederUpdate::Finished { job_id, outcome });
        });
    }

    fn cancel_execution(&self, job_id: &JobId) {
        if let Some(entry) = self.executions.get(job_id) {
            entry.value().cancel();
        }
    }
}

/// Applies executor callbacks to the registry, one at a time.
async fn drive_updates(
    mut updates: mpsc::UnboundedReceiver<SeederUpdate>,
    registry: Arc<CacheJobRegistry>,
    sink: Arc<dyn JobStatusSink>,
    executions: Arc<DashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            _ = shutdown.cancelled() => break,
            update = updates.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };
        match update {
            SeederUpdate::Started { job_id } => {
                if let Some(transition) = registry.set_state(&job_id, JobState::Running) {
                    if transition.changed {
                        sink.status_changed(&transition.status);
                    }
                }
            }
            SeederUpdate::Progress { job_id, fraction } => {
                registry.set_progress(&job_id, fraction);
            }
            SeederUpdate::Finished { job_id, outcome } => {
                executions.remove(&job_id);
                let state = match &outcome {
                    SeedOutcome::Complete => JobState::Complete,
                    SeedOutcome::Failed(reason) => {
                        warn!(job = %job_id, %reason, "job execution failed");
                        JobState::Failed
                    }
                    SeedOutcome::Aborted => JobState::Aborted,
                };
                if let Some(transition) = registry.set_state(&job_id, state) {
                    if transition.changed {
                        info!(job = %job_id, state = %state, "job finished");
                        sink.status_changed(&transition.status);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MemoryTileLayerCatalog;
    use crate::model::{CacheAction, CacheIdentifier, ZoomRange};
    use crate::seeder::SimulatedSeeder;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    /// Sink recording every emission for assertions.
    #[derive(Default)]
    struct RecordingSink {
        created: SyncMutex<Vec<CacheJobStatus>>,
        changed: SyncMutex<Vec<CacheJobStatus>>,
        pruned: SyncMutex<Vec<CacheJobStatus>>,
    }

    impl JobStatusSink for RecordingSink {
        fn job_created(&self, status: &CacheJobStatus) {
            self.created.lock().push(status.clone());
        }
        fn status_changed(&self, status: &CacheJobStatus) {
            self.changed.lock().push(status.clone());
        }
        fn job_pruned(&self, status: &CacheJobStatus) {
            self.pruned.lock().push(status.clone());
        }
    }

    /// Sink that marks every new job aborting from inside the creation
    /// callback, before the manager has registered an execution token.
    #[derive(Default)]
    struct AbortOnCreateSink {
        registry: SyncMutex<Option<Arc<CacheJobRegistry>>>,
    }

    impl JobStatusSink for AbortOnCreateSink {
        fn job_created(&self, status: &CacheJobStatus) {
            if let Some(registry) = &*self.registry.lock() {
                registry.set_state(status.job_id(), JobState::Aborting);
            }
        }
        fn status_changed(&self, _status: &CacheJobStatus) {}
        fn job_pruned(&self, _status: &CacheJobStatus) {}
    }

    fn request() -> CacheJobRequest {
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
        }
    }

    fn manager(seeder: SimulatedSeeder, sink: Arc<dyn JobStatusSink>) -> LocalCacheJobManager {
        LocalCacheJobManager::new(
            InstanceId::generate(),
            Arc::new(seeder),
            Arc::new(MemoryTileLayerCatalog::new()),
            sink,
        )
    }

    async fn await_state(manager: &LocalCacheJobManager, job_id: &JobId, state: JobState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            if manager.status(job_id).map(|s| s.state) == Some(state) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} never reached {}",
                job_id,
                state
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_launch_registers_scheduled_and_emits_created() {
        let sink = Arc::new(RecordingSink::default());
        let manager = manager(SimulatedSeeder::holding(), sink.clone());

        let info = manager.launch(request());
        let status = manager.status(&info.id).unwrap();
        assert_eq!(status.state, JobState::Scheduled);
        assert_eq!(status.info, info);
        assert_eq!(sink.created.lock().len(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_execution_drives_running_then_complete() {
        let sink = Arc::new(RecordingSink::default());
        let manager = manager(
            SimulatedSeeder::completing(2, Duration::from_millis(2)),
            sink.clone(),
        );

        let info = manager.launch(request());
        await_state(&manager, &info.id, JobState::Complete).await;

        let states: Vec<JobState> = sink.changed.lock().iter().map(|s| s.state).collect();
        assert_eq!(states, vec![JobState::Running, JobState::Complete]);
        assert_eq!(manager.active_executions(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_execution_failure_becomes_failed_status() {
        let manager = manager(
            SimulatedSeeder::failing_at(3, Duration::from_millis(1), 0),
            Arc::new(NullStatusSink),
        );

        let info = manager.launch(request());
        await_state(&manager, &info.id, JobState::Failed).await;

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_is_cooperative_and_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let manager = manager(SimulatedSeeder::running_until_cancelled(), sink.clone());

        let info = manager.launch(request());
        await_state(&manager, &info.id, JobState::Running).await;

        let aborting = manager.abort(&info.id).unwrap();
        assert_eq!(aborting.state, JobState::Aborting);

        // idempotent: second abort reports aborting again, emits nothing new
        let emitted = sink.changed.lock().len();
        let again = manager.abort(&info.id).unwrap();
        assert_eq!(again.state, JobState::Aborting);
        assert_eq!(sink.changed.lock().len(), emitted);

        await_state(&manager, &info.id, JobState::Aborted).await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_unknown_job_returns_none() {
        let manager = manager(SimulatedSeeder::holding(), Arc::new(NullStatusSink));
        assert!(manager.abort(&JobId::new("nope")).is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_prune_removes_only_terminal_jobs() {
        let manager = manager(SimulatedSeeder::holding(), Arc::new(NullStatusSink));

        let keep = manager.launch(request());
        let done = manager.launch(request());
        manager.registry().set_state(&done.id, JobState::Complete);

        let pruned = manager.prune();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].job_id(), &done.id);
        assert!(manager.status(&done.id).is_none());
        assert!(manager.status(&keep.id).is_some());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_apply_remote_state_synthesizes_unknown_job() {
        let sink = Arc::new(RecordingSink::default());
        let manager = manager(SimulatedSeeder::holding(), sink.clone());

        let ghost = JobId::new("ghost-1");
        manager.apply_remote_state(&ghost, JobState::Aborting);

        let status = manager.status(&ghost).unwrap();
        assert!(status.provisional);
        assert_eq!(status.state, JobState::Aborting);
        // remote application never re-emits
        assert!(sink.changed.lock().is_empty());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_landing_before_dispatch_still_cancels_execution() {
        let sink = Arc::new(AbortOnCreateSink::default());
        let manager = manager(SimulatedSeeder::running_until_cancelled(), sink.clone());
        *sink.registry.lock() = Some(manager.registry());

        // the sink flips the job to aborting before dispatch registers the
        // execution token; the job must still converge to aborted instead
        // of parking forever
        let info = manager.launch(request());
        await_state(&manager, &info.id, JobState::Aborted).await;
        assert_eq!(manager.active_executions(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_prune_emits_one_event_per_removed_job() {
        let sink = Arc::new(RecordingSink::default());
        let manager = manager(SimulatedSeeder::holding(), sink.clone());

        let keep = manager.launch(request());
        let done = manager.launch(request());
        manager.registry().set_state(&done.id, JobState::Complete);

        manager.prune();
        let pruned = sink.pruned.lock();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].job_id(), &done.id);
        drop(pruned);
        assert!(manager.status(&keep.id).is_some());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_abort_cancels_local_execution() {
        let manager = manager(
            SimulatedSeeder::running_until_cancelled(),
            Arc::new(NullStatusSink),
        );

        let info = manager.launch(request());
        await_state(&manager, &info.id, JobState::Running).await;

        manager.apply_remote_state(&info.id, JobState::Aborting);
        await_state(&manager, &info.id, JobState::Aborted).await;

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_all() {
        let manager = manager(SimulatedSeeder::holding(), Arc::new(NullStatusSink));
        let a = manager.launch(request());
        let b = manager.launch(request());
        let done = manager.launch(request());
        manager.registry().set_state(&done.id, JobState::Complete);

        let aborting = manager.abort_all();
        assert_eq!(aborting.len(), 2);
        for info in [&a, &b] {
            await_state(&manager, &info.id, JobState::Aborted).await;
        }
        assert_eq!(manager.status(&done.id).unwrap().state, JobState::Complete);

        manager.shutdown().await;
    }
}
