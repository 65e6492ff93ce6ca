//! Cache job request types.
//!
//! A [`CacheJobRequest`] describes one concrete cache operation: an action
//! (seed, reseed, truncate) against a single cache, where a cache is the
//! combination of layer, gridset, tile format and parameter set named by a
//! [`CacheIdentifier`].
//!
//! Requests use structural equality and carry no identity of their own: the
//! same request can be launched several times, producing distinct jobs. Job
//! identity lives in [`CacheJobInfo`](super::CacheJobInfo).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of maintenance a cache job performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheAction {
    /// Generate tiles that are missing from the cache.
    Seed,
    /// Regenerate tiles whether or not they are already cached.
    Reseed,
    /// Delete cached tiles.
    Truncate,
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seed => write!(f, "seed"),
            Self::Reseed => write!(f, "reseed"),
            Self::Truncate => write!(f, "truncate"),
        }
    }
}

/// Names one concrete cache: a layer published under a gridset, in a tile
/// format, optionally narrowed to a parameter set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheIdentifier {
    /// Name of the tile layer.
    pub layer_name: String,
    /// Gridset the layer is cached under (e.g. `EPSG:3857`).
    pub gridset_id: String,
    /// Tile format (e.g. `image/png`).
    pub format: String,
    /// Identifier of the parameter set, `None` for the default parameters.
    pub parameters_id: Option<String>,
}

impl fmt::Display for CacheIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.layer_name, self.gridset_id, self.format)?;
        if let Some(params) = &self.parameters_id {
            write!(f, "?{}", params)?;
        }
        Ok(())
    }
}

/// Inclusive zoom level bounds for a job.
///
/// `None` on either end means "use the layer's configured limit"; the
/// request builder resolves both ends against the layer's grid subset
/// before a request is launched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoomRange {
    /// Lowest zoom level to process.
    pub min: Option<u8>,
    /// Highest zoom level to process.
    pub max: Option<u8>,
}

impl ZoomRange {
    /// Creates a range covering `min..=max`.
    pub fn new(min: u8, max: u8) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Resolves this range against a layer's configured zoom limits.
    ///
    /// Unset ends take the layer limit; set ends are clamped into it.
    pub fn resolve(&self, layer_min: u8, layer_max: u8) -> Self {
        let min = self.min.map_or(layer_min, |z| z.clamp(layer_min, layer_max));
        let max = self.max.map_or(layer_max, |z| z.clamp(layer_min, layer_max));
        Self {
            min: Some(min),
            max: Some(max.max(min)),
        }
    }
}

/// Geographic bounding box restricting a job to a sub-area of the layer,
/// expressed in the gridset's coordinate reference system.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// An immutable description of one cache maintenance operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheJobRequest {
    /// What to do to the cache.
    pub action: CacheAction,
    /// Which cache to do it to.
    pub cache: CacheIdentifier,
    /// Zoom levels to cover.
    pub zoom: ZoomRange,
    /// Optional sub-area restriction; `None` covers the full layer extent.
    pub bounds: Option<Bounds>,
}

impl CacheJobRequest {
    /// Placeholder request carried by provisional status entries synthesized
    /// for jobs only known through a status event (see
    /// [`CacheJobStatus::provisional`](super::CacheJobStatus::provisional)).
    pub(crate) fn placeholder() -> Self {
        Self {
            action: CacheAction::Seed,
            cache: CacheIdentifier {
                layer_name: String::new(),
                gridset_id: String::new(),
                format: String::new(),
                parameters_id: None,
            },
            zoom: ZoomRange::default(),
            bounds: None,
        }
    }
}

impl fmt::Display for CacheJobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.cache)
    }
}
