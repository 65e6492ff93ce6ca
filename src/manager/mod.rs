//! Cache job managers.
//!
//! Two layers, mirroring the split between doing and coordinating:
//!
//! - [`LocalCacheJobManager`] runs jobs on one instance: it owns the
//!   registry, dispatches executions to the [`TileSeeder`](crate::seeder::
//!   TileSeeder), and applies the executor's callbacks. It knows nothing
//!   about other instances.
//! - [`ClusteringCacheJobManager`] wraps a local manager with cluster
//!   membership: it gates mutating operations on being joined, broadcasts
//!   locally-originated lifecycle events, and applies remote events
//!   idempotently to the local registry.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                ClusteringCacheJobManager                   │
//! │   join/leave · membership gate · event loop · broadcast    │
//! ├────────────────────────────────────────────────────────────┤
//! │                   LocalCacheJobManager                     │
//! │   registry · seeder dispatch · executor callbacks          │
//! ├──────────────────────┬─────────────────────────────────────┤
//! │   CacheJobRegistry   │   TileSeeder (collaborator)         │
//! └──────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! Local state changes are surfaced through the [`JobStatusSink`] trait
//! ("emit, don't present"): the clustering layer installs a sink that
//! broadcasts, a standalone deployment installs [`NullStatusSink`].

mod cluster;
mod local;

pub use cluster::ClusteringCacheJobManager;
pub use local::{JobStatusSink, LocalCacheJobManager, NullStatusSink};
