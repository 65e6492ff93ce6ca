//! Cluster-aware job coordination.

use crate::builder::{CacheJobRequestBuilder, TileLayerCatalog};
use crate::config::ManagerConfig;
use crate::error::JobManagerError;
use crate::events::{CacheJobEvent, CacheJobEventBus, EventEnvelope};
use crate::manager::local::{JobStatusSink, LocalCacheJobManager};
use crate::model::{CacheJobInfo, CacheJobRequest, CacheJobStatus, InstanceId, JobId};
use crate::registry::CacheJobRegistry;
use crate::seeder::TileSeeder;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sink that broadcasts locally-caused changes to the cluster.
///
/// Gated on the joined flag so nothing leaks onto the bus before
/// `join_cluster` completes or after `leave_cluster` starts.
struct ClusterEventSink {
    origin: InstanceId,
    joined: Arc<AtomicBool>,
    bus: Arc<dyn CacheJobEventBus>,
}

impl ClusterEventSink {
    fn publish(&self, event: CacheJobEvent) {
        if !self.joined.load(Ordering::SeqCst) {
            return;
        }
        debug!(instance = %self.origin, %event, "broadcasting");
        self.bus
            .publish(EventEnvelope::new(self.origin.clone(), event));
    }
}

impl JobStatusSink for ClusterEventSink {
    fn job_created(&self, status: &CacheJobStatus) {
        self.publish(CacheJobEvent::JobCreated {
            info: status.info.clone(),
        });
    }

    fn status_changed(&self, status: &CacheJobStatus) {
        self.publish(CacheJobEvent::JobStatusChanged {
            job_id: status.info.id.clone(),
            state: status.state,
        });
    }

    fn job_pruned(&self, status: &CacheJobStatus) {
        self.publish(CacheJobEvent::JobPruned {
            job_id: status.info.id.clone(),
        });
    }
}

struct ReceiveLoopHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Coordinates cache jobs across a cluster of instances.
///
/// Wraps a [`LocalCacheJobManager`] with membership: while joined, every
/// locally-caused lifecycle change is broadcast, and events from other
/// members are applied idempotently to the local registry, so all joined
/// members converge on the same view of every job. Mutating operations
/// require membership; reads work regardless.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(LocalEventBus::new());
/// let manager = ClusteringCacheJobManager::new(seeder, catalog, bus, ManagerConfig::default());
/// manager.join_cluster();
///
/// let requests = manager
///     .new_request_builder()
///     .action(CacheAction::Seed)
///     .layer("osm:roads")
///     .build()?;
/// for request in requests {
///     manager.launch_job(request)?;
/// }
/// ```
pub struct ClusteringCacheJobManager {
    instance_id: InstanceId,
    config: ManagerConfig,
    local: Arc<LocalCacheJobManager>,
    bus: Arc<dyn CacheJobEventBus>,
    joined: Arc<AtomicBool>,
    receive_loop: Mutex<Option<ReceiveLoopHandle>>,
}

impl ClusteringCacheJobManager {
    /// Creates a manager with a fresh instance id, not yet joined.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        seeder: Arc<dyn TileSeeder>,
        catalog: Arc<dyn TileLayerCatalog>,
        bus: Arc<dyn CacheJobEventBus>,
        config: ManagerConfig,
    ) -> Self {
        let instance_id = InstanceId::generate();
        let joined = Arc::new(AtomicBool::new(false));
        let sink = Arc::new(ClusterEventSink {
            origin: instance_id.clone(),
            joined: joined.clone(),
            bus: bus.clone(),
        });
        let local = Arc::new(LocalCacheJobManager::new(
            instance_id.clone(),
            seeder,
            catalog,
            sink,
        ));
        Self {
            instance_id,
            config,
            local,
            bus,
            joined,
            receive_loop: Mutex::new(None),
        }
    }

    /// This instance's cluster-unique id.
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Whether this instance is currently a joined cluster member.
    pub fn is_running(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    /// The registry backing this instance's view of the cluster.
    pub fn registry(&self) -> Arc<CacheJobRegistry> {
        self.local.registry()
    }

    /// A fresh request builder bound to this instance's layer catalog.
    pub fn new_request_builder(&self) -> CacheJobRequestBuilder {
        self.local.new_request_builder()
    }

    /// Joins the cluster: subscribes to the event stream, then catches up
    /// from a membership snapshot. Subscribing first means events racing
    /// the snapshot are seen at least once; duplicates are harmless
    /// because application is idempotent. Idempotent when already joined.
    pub fn join_cluster(&self) {
        if self
            .joined
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let receiver = self.bus.join(&self.instance_id, self.local.registry());
        let stop = CancellationToken::new();
        let task = tokio::spawn(receive_loop(
            receiver,
            stop.clone(),
            self.instance_id.clone(),
            self.joined.clone(),
            self.local.clone(),
        ));
        *self.receive_loop.lock() = Some(ReceiveLoopHandle { stop, task });

        let snapshot = self.bus.snapshot(&self.instance_id);
        info!(
            instance = %self.instance_id,
            jobs = snapshot.len(),
            "joined cluster"
        );
        for status in snapshot {
            if !status.is_finished() {
                self.local.resume(status);
            }
        }
    }

    /// Leaves the cluster: stops receiving, aborts this instance's
    /// in-flight executions, waits a bounded time for them to wind down,
    /// and clears the local view. Idempotent when not joined.
    pub async fn leave_cluster(&self) {
        if self
            .joined
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.bus.leave(&self.instance_id);
        let handle = self.receive_loop.lock().take();
        if let Some(handle) = handle {
            handle.stop.cancel();
            let _ = handle.task.await;
        }

        let aborting = self.local.abort_all();
        if !aborting.is_empty() {
            debug!(
                instance = %self.instance_id,
                jobs = aborting.len(),
                "aborting in-flight jobs before leaving"
            );
            self.drain_executions().await;
        }
        self.local.clear();
        info!(instance = %self.instance_id, "left cluster");
    }

    /// Launches a job on this instance and announces it to the cluster.
    pub fn launch_job(&self, request: CacheJobRequest) -> Result<CacheJobInfo, JobManagerError> {
        self.ensure_running()?;
        Ok(self.local.launch(request))
    }

    /// Requests an abort of `job_id`, wherever it executes. Returns the
    /// job's status after the request, or `None` for unknown ids.
    pub fn abort_job(&self, job_id: &JobId) -> Result<Option<CacheJobStatus>, JobManagerError> {
        self.ensure_running()?;
        Ok(self.local.abort(job_id))
    }

    /// Removes terminal jobs cluster-wide; returns those removed here.
    ///
    /// The per-job prune events flow through the same membership-gated
    /// sink as every other locally-caused change.
    pub fn prune_jobs(&self) -> Result<Vec<CacheJobStatus>, JobManagerError> {
        self.ensure_running()?;
        Ok(self.local.prune())
    }

    /// Identity of every job in this instance's view. Empty when not
    /// joined.
    pub fn get_jobs(&self) -> Vec<CacheJobInfo> {
        self.local.jobs()
    }

    /// Status of `job_id` in this instance's view.
    pub fn get_job_status(&self, job_id: &JobId) -> Option<CacheJobStatus> {
        self.local.status(job_id)
    }

    /// Leaves the cluster and releases the local manager's tasks.
    pub async fn shutdown(&self) {
        self.leave_cluster().await;
        self.local.shutdown().await;
    }

    fn ensure_running(&self) -> Result<(), JobManagerError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(JobManagerError::NotRunning)
        }
    }

    async fn drain_executions(&self) {
        let deadline = tokio::time::Instant::now() + self.config.leave_abort_timeout;
        while self.local.active_executions() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    instance = %self.instance_id,
                    remaining = self.local.active_executions(),
                    "leaving with executions still winding down"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl fmt::Display for ClusteringCacheJobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusteringCacheJobManager({}, {})",
            self.instance_id,
            if self.is_running() { "joined" } else { "not joined" }
        )
    }
}

/// Applies cluster events to the local registry until stopped.
async fn receive_loop(
    mut receiver: broadcast::Receiver<EventEnvelope>,
    stop: CancellationToken,
    instance_id: InstanceId,
    joined: Arc<AtomicBool>,
    local: Arc<LocalCacheJobManager>,
) {
    loop {
        let envelope = tokio::select! {
            _ = stop.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // at-least-once holds for the stream, not this window;
                    // lagged members re-converge through later events
                    warn!(instance = %instance_id, missed, "event stream lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if !joined.load(Ordering::SeqCst) || envelope.is_from(&instance_id) {
            continue;
        }

        debug!(instance = %instance_id, origin = %envelope.origin, event = %envelope.event, "applying");
        match envelope.event {
            CacheJobEvent::JobCreated { info } => {
                local.resume(CacheJobStatus::new(info));
            }
            CacheJobEvent::JobStatusChanged { job_id, state } => {
                local.apply_remote_state(&job_id, state);
            }
            CacheJobEvent::JobPruned { job_id } => {
                local.forget(&job_id);
            }
        }
    }
}
