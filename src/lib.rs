//! tilejobs - Cluster-aware coordination of tile-cache maintenance jobs
//!
//! This library coordinates long-running tile-cache jobs (seed, reseed,
//! truncate) across a cluster of service instances, keeping every member's
//! view of job state eventually consistent without shared storage.
//!
//! # High-Level API
//!
//! The [`manager`] module provides the main entry point:
//!
//! ```ignore
//! use tilejobs::manager::ClusteringCacheJobManager;
//! use tilejobs::events::LocalEventBus;
//! use tilejobs::config::ManagerConfig;
//! use tilejobs::model::CacheAction;
//!
//! let manager = ClusteringCacheJobManager::new(seeder, catalog, bus, ManagerConfig::default());
//! manager.join_cluster();
//!
//! let requests = manager
//!     .new_request_builder()
//!     .action(CacheAction::Seed)
//!     .layer("osm:roads")
//!     .max_zoom(12)
//!     .build()?;
//! for request in requests {
//!     let info = manager.launch_job(request)?;
//!     println!("launched {}", info.id);
//! }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod model;
pub mod registry;
pub mod seeder;

/// Version of the tilejobs library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
