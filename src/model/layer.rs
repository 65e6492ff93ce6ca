//! Tile layer metadata consumed by the request builder.
//!
//! The coordination core never looks layers up itself; a
//! [`TileLayerCatalog`](crate::builder::TileLayerCatalog) implementation
//! resolves a layer name into this metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One gridset a layer is cached under, with its zoom limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSubset {
    /// Gridset identifier (e.g. `EPSG:3857`).
    pub gridset_id: String,
    /// Lowest cached zoom level.
    pub min_zoom: u8,
    /// Highest cached zoom level.
    pub max_zoom: u8,
}

impl GridSubset {
    /// Creates a grid subset covering `min_zoom..=max_zoom`.
    pub fn new(gridset_id: impl Into<String>, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            gridset_id: gridset_id.into(),
            min_zoom,
            max_zoom,
        }
    }
}

/// Cache-relevant metadata of a tile layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayerInfo {
    /// Layer name (e.g. `test:layer1`).
    pub name: String,
    /// Gridsets the layer is cached under.
    pub grid_subsets: Vec<GridSubset>,
    /// Tile formats the layer can be cached in, sorted.
    pub formats: BTreeSet<String>,
}

impl TileLayerInfo {
    /// Creates layer metadata from its gridsets and formats.
    pub fn new<F>(name: impl Into<String>, grid_subsets: Vec<GridSubset>, formats: F) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            name: name.into(),
            grid_subsets,
            formats: formats.into_iter().map(Into::into).collect(),
        }
    }

    /// The gridset ids this layer is cached under, sorted.
    pub fn gridset_ids(&self) -> BTreeSet<String> {
        self.grid_subsets
            .iter()
            .map(|s| s.gridset_id.clone())
            .collect()
    }

    /// Looks up the grid subset for `gridset_id`.
    pub fn subset(&self, gridset_id: &str) -> Option<&GridSubset> {
        self.grid_subsets
            .iter()
            .find(|s| s.gridset_id == gridset_id)
    }

    /// Whether the layer supports the given tile format.
    pub fn has_format(&self, format: &str) -> bool {
        self.formats.contains(format)
    }
}
