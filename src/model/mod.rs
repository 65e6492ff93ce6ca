//! Value types for cache jobs.
//!
//! Everything in this module is plain data: requests describing what a job
//! should do, the identity assigned to a launched job, the replicated status
//! record, and the tile-layer metadata the request builder expands against.
//!
//! All types are serde-serializable so an event bus implementation can put
//! them on the wire unchanged.

mod job;
mod layer;
mod request;
mod status;

pub use job::{CacheJobInfo, InstanceId, JobId};
pub use layer::{GridSubset, TileLayerInfo};
pub use request::{Bounds, CacheAction, CacheIdentifier, CacheJobRequest, ZoomRange};
pub use status::{CacheJobStatus, JobState};
