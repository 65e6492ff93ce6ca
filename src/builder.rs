//! Request builder and layer catalog.
//!
//! [`CacheJobRequestBuilder`] turns one high-level selection ("seed layer X")
//! into the concrete per-cache requests a job operates on, expanding the
//! cartesian product of the layer's gridsets, formats and parameter sets.
//! It is a pure function of its accumulated state plus the catalog metadata;
//! there is no cluster interaction in here.
//!
//! Each call to a manager's `new_request_builder()` returns an independent
//! builder; builders are never shared or reused.

use crate::error::RequestBuildError;
use crate::model::{Bounds, CacheAction, CacheIdentifier, CacheJobRequest, TileLayerInfo, ZoomRange};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Resolves layer names into cache-relevant metadata.
///
/// The coordination core only ever reads through this trait; storage and
/// refresh of the metadata belong to the embedding application.
pub trait TileLayerCatalog: Send + Sync {
    /// Metadata for the named layer, or `None` when it does not exist.
    fn layer(&self, name: &str) -> Option<TileLayerInfo>;

    /// Identifiers of the parameter sets that exist in the cache for the
    /// named layer, not counting the default parameters.
    fn parameter_ids(&self, layer_name: &str) -> Vec<String>;
}

/// In-memory [`TileLayerCatalog`] for tests and embedding.
#[derive(Default)]
pub struct MemoryTileLayerCatalog {
    layers: RwLock<HashMap<String, TileLayerInfo>>,
    parameter_ids: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryTileLayerCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a layer.
    pub fn add_layer(&self, layer: TileLayerInfo) {
        self.layers.write().insert(layer.name.clone(), layer);
    }

    /// Registers the existing parameter-set ids for a layer.
    pub fn set_parameter_ids<I>(&self, layer_name: impl Into<String>, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.parameter_ids
            .write()
            .insert(layer_name.into(), ids.into_iter().map(Into::into).collect());
    }
}

impl TileLayerCatalog for MemoryTileLayerCatalog {
    fn layer(&self, name: &str) -> Option<TileLayerInfo> {
        self.layers.read().get(name).cloned()
    }

    fn parameter_ids(&self, layer_name: &str) -> Vec<String> {
        self.parameter_ids
            .read()
            .get(layer_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Fluent accumulator expanding one selection into concrete job requests.
pub struct CacheJobRequestBuilder {
    catalog: Arc<dyn TileLayerCatalog>,
    action: CacheAction,
    layer_name: Option<String>,
    gridset_id: Option<String>,
    formats: BTreeSet<String>,
    parameters_id: Option<String>,
    zoom: ZoomRange,
    bounds: Option<Bounds>,
}

impl CacheJobRequestBuilder {
    pub(crate) fn new(catalog: Arc<dyn TileLayerCatalog>) -> Self {
        Self {
            catalog,
            action: CacheAction::Seed,
            layer_name: None,
            gridset_id: None,
            formats: BTreeSet::new(),
            parameters_id: None,
            zoom: ZoomRange::default(),
            bounds: None,
        }
    }

    /// Sets the maintenance action; defaults to [`CacheAction::Seed`].
    pub fn action(mut self, action: CacheAction) -> Self {
        self.action = action;
        self
    }

    /// Names the layer to operate on. Required.
    pub fn layer(mut self, name: impl Into<String>) -> Self {
        self.layer_name = Some(name.into());
        self
    }

    /// Restricts the job to one gridset; defaults to every gridset the
    /// layer is configured for.
    pub fn gridset_id(mut self, gridset_id: impl Into<String>) -> Self {
        self.gridset_id = Some(gridset_id.into());
        self
    }

    /// Adds a tile format; may be called repeatedly. Defaults to every
    /// format the layer supports.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.formats.insert(format.into());
        self
    }

    /// Restricts the job to one parameter set; defaults to the default
    /// parameters plus every parameter set existing in the cache.
    pub fn parameters_id(mut self, parameters_id: impl Into<String>) -> Self {
        self.parameters_id = Some(parameters_id.into());
        self
    }

    /// Sets the lowest zoom level to process.
    pub fn min_zoom(mut self, zoom: u8) -> Self {
        self.zoom.min = Some(zoom);
        self
    }

    /// Sets the highest zoom level to process.
    pub fn max_zoom(mut self, zoom: u8) -> Self {
        self.zoom.max = Some(zoom);
        self
    }

    /// Restricts the job to a sub-area of the layer.
    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Expands the accumulated selection into concrete requests: one per
    /// gridset × format × parameter-set combination applicable to the
    /// layer.
    pub fn build(mut self) -> Result<Vec<CacheJobRequest>, RequestBuildError> {
        let layer_name = self
            .layer_name
            .take()
            .ok_or(RequestBuildError::MissingLayer)?;
        let layer = self
            .catalog
            .layer(&layer_name)
            .ok_or_else(|| RequestBuildError::UnknownLayer(layer_name.clone()))?;

        let gridsets = Self::resolve_gridsets(&layer, self.gridset_id.as_deref())?;
        let formats = Self::resolve_formats(&layer, &self.formats)?;
        let parameter_ids = self.resolve_parameter_ids(&layer);

        let mut requests = Vec::new();
        for gridset_id in &gridsets {
            // validated above, every gridset id resolves
            let subset = match layer.subset(gridset_id) {
                Some(subset) => subset,
                None => continue,
            };
            let zoom = self.zoom.resolve(subset.min_zoom, subset.max_zoom);
            for format in &formats {
                for parameters_id in &parameter_ids {
                    requests.push(CacheJobRequest {
                        action: self.action,
                        cache: CacheIdentifier {
                            layer_name: layer.name.clone(),
                            gridset_id: gridset_id.clone(),
                            format: format.clone(),
                            parameters_id: parameters_id.clone(),
                        },
                        zoom,
                        bounds: self.bounds,
                    });
                }
            }
        }
        Ok(requests)
    }

    fn resolve_gridsets(
        layer: &TileLayerInfo,
        requested: Option<&str>,
    ) -> Result<Vec<String>, RequestBuildError> {
        match requested {
            Some(gridset) => {
                if layer.subset(gridset).is_none() {
                    return Err(RequestBuildError::UnknownGridset {
                        layer: layer.name.clone(),
                        gridset: gridset.to_string(),
                    });
                }
                Ok(vec![gridset.to_string()])
            }
            None => Ok(layer.gridset_ids().into_iter().collect()),
        }
    }

    fn resolve_formats(
        layer: &TileLayerInfo,
        requested: &BTreeSet<String>,
    ) -> Result<Vec<String>, RequestBuildError> {
        if requested.is_empty() {
            return Ok(layer.formats.iter().cloned().collect());
        }
        let unsupported: Vec<String> = requested
            .iter()
            .filter(|f| !layer.has_format(f))
            .cloned()
            .collect();
        if !unsupported.is_empty() {
            return Err(RequestBuildError::UnsupportedFormats {
                layer: layer.name.clone(),
                formats: unsupported,
            });
        }
        Ok(requested.iter().cloned().collect())
    }

    /// Parameter sets to cover: an explicit id wins; otherwise the default
    /// parameters (`None`) plus every parameter set existing in the cache.
    fn resolve_parameter_ids(&self, layer: &TileLayerInfo) -> Vec<Option<String>> {
        match &self.parameters_id {
            Some(id) => vec![Some(id.clone())],
            None => {
                let mut ids = vec![None];
                for id in self.catalog.parameter_ids(&layer.name) {
                    ids.push(Some(id));
                }
                ids
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GridSubset;

    fn catalog() -> Arc<MemoryTileLayerCatalog> {
        let catalog = MemoryTileLayerCatalog::new();
        catalog.add_layer(TileLayerInfo::new(
            "test:layer1",
            vec![
                GridSubset::new("EPSG:3857", 0, 18),
                GridSubset::new("EPSG:4326", 0, 16),
            ],
            ["image/png", "image/jpeg"],
        ));
        Arc::new(catalog)
    }

    fn builder(catalog: &Arc<MemoryTileLayerCatalog>) -> CacheJobRequestBuilder {
        CacheJobRequestBuilder::new(catalog.clone() as Arc<dyn TileLayerCatalog>)
    }

    #[test]
    fn test_expands_gridset_format_product() {
        let catalog = catalog();
        let requests = builder(&catalog)
            .action(CacheAction::Seed)
            .layer("test:layer1")
            .build()
            .unwrap();

        // 2 gridsets x 2 formats x 1 (default) parameter set
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.action == CacheAction::Seed));
        assert!(requests
            .iter()
            .all(|r| r.cache.layer_name == "test:layer1"));
        assert!(requests.iter().all(|r| r.cache.parameters_id.is_none()));
    }

    #[test]
    fn test_single_gridset_and_format_selection() {
        let catalog = catalog();
        let requests = builder(&catalog)
            .action(CacheAction::Truncate)
            .layer("test:layer1")
            .gridset_id("EPSG:4326")
            .format("image/png")
            .build()
            .unwrap();

        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.cache.gridset_id, "EPSG:4326");
        assert_eq!(request.cache.format, "image/png");
        // zoom resolved against the 4326 subset limits
        assert_eq!(request.zoom, ZoomRange::new(0, 16));
    }

    #[test]
    fn test_existing_parameter_sets_are_covered() {
        let catalog = catalog();
        catalog.set_parameter_ids("test:layer1", ["style=a", "style=b"]);

        let requests = builder(&catalog)
            .layer("test:layer1")
            .gridset_id("EPSG:3857")
            .format("image/png")
            .build()
            .unwrap();

        let ids: Vec<Option<String>> =
            requests.iter().map(|r| r.cache.parameters_id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                None,
                Some("style=a".to_string()),
                Some("style=b".to_string())
            ]
        );
    }

    #[test]
    fn test_explicit_parameters_id_wins() {
        let catalog = catalog();
        catalog.set_parameter_ids("test:layer1", ["style=a"]);

        let requests = builder(&catalog)
            .layer("test:layer1")
            .gridset_id("EPSG:3857")
            .format("image/png")
            .parameters_id("style=z")
            .build()
            .unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].cache.parameters_id,
            Some("style=z".to_string())
        );
    }

    #[test]
    fn test_zoom_range_clamped_per_gridset() {
        let catalog = catalog();
        let requests = builder(&catalog)
            .layer("test:layer1")
            .format("image/png")
            .min_zoom(4)
            .max_zoom(30)
            .build()
            .unwrap();

        for request in &requests {
            let expected_max = match request.cache.gridset_id.as_str() {
                "EPSG:3857" => 18,
                _ => 16,
            };
            assert_eq!(request.zoom, ZoomRange::new(4, expected_max));
        }
    }

    #[test]
    fn test_unknown_layer() {
        let catalog = catalog();
        let err = builder(&catalog).layer("test:nope").build().unwrap_err();
        assert!(matches!(err, RequestBuildError::UnknownLayer(_)));
    }

    #[test]
    fn test_missing_layer() {
        let catalog = catalog();
        let err = builder(&catalog).build().unwrap_err();
        assert!(matches!(err, RequestBuildError::MissingLayer));
    }

    #[test]
    fn test_unsupported_format() {
        let catalog = catalog();
        let err = builder(&catalog)
            .layer("test:layer1")
            .format("image/webp")
            .build()
            .unwrap_err();
        match err {
            RequestBuildError::UnsupportedFormats { layer, formats } => {
                assert_eq!(layer, "test:layer1");
                assert_eq!(formats, vec!["image/webp".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_gridset() {
        let catalog = catalog();
        let err = builder(&catalog)
            .layer("test:layer1")
            .gridset_id("EPSG:2154")
            .build()
            .unwrap_err();
        assert!(matches!(err, RequestBuildError::UnknownGridset { .. }));
    }
}
