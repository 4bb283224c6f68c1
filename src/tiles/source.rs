use super::decoder::TileDecoder;
use crate::core::config::SourceConfig;
use crate::core::geo::TileCoord;
use crate::core::tilegrid::TileGrid;
use crate::prelude::{Arc, HashMap};

/// A named, immutable tile source: grid, zoom bounds, URL template and decoder
pub struct TileSource {
    name: String,
    projection: String,
    grid: Arc<TileGrid>,
    min_zoom: u8,
    max_zoom: u8,
    url_template: String,
    decoder: Arc<dyn TileDecoder>,
}

impl TileSource {
    pub fn new(
        name: impl Into<String>,
        projection: impl Into<String>,
        grid: Arc<TileGrid>,
        min_zoom: u8,
        max_zoom: u8,
        url_template: impl Into<String>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Self {
        let max_zoom = max_zoom.min(grid.max_zoom());
        Self {
            name: name.into(),
            projection: projection.into(),
            grid,
            min_zoom: min_zoom.min(max_zoom),
            max_zoom,
            url_template: url_template.into(),
            decoder,
        }
    }

    pub fn from_config(config: &SourceConfig, decoder: Arc<dyn TileDecoder>) -> crate::Result<Self> {
        let grid = TileGrid::new(config.extent, config.resolutions.clone(), config.tile_size)?;
        Ok(Self::new(
            &config.name,
            &config.projection,
            Arc::new(grid),
            config.min_zoom,
            config.max_zoom,
            &config.url_template,
            decoder,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    pub fn decoder(&self) -> &Arc<dyn TileDecoder> {
        &self.decoder
    }

    /// Tile zoom used for a view resolution, clamped to the source's range
    pub fn z_for_resolution(&self, resolution: f64) -> u8 {
        self.grid
            .z_for_resolution(resolution)
            .clamp(self.min_zoom, self.max_zoom)
    }

    /// Expand `{z}`, `{x}` and `{y}` in the URL template
    pub fn url(&self, coord: TileCoord) -> String {
        self.url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

impl std::fmt::Debug for TileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileSource")
            .field("name", &self.name)
            .field("projection", &self.projection)
            .field("zoom", &(self.min_zoom..=self.max_zoom))
            .field("url_template", &self.url_template)
            .finish()
    }
}

/// Fixed set of sources known at startup
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<TileSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[SourceConfig], decoder: Arc<dyn TileDecoder>) -> crate::Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(TileSource::from_config(config, decoder.clone())?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, source: TileSource) {
        self.sources
            .insert(source.name().to_string(), Arc::new(source));
    }

    pub fn get(&self, name: &str) -> Option<Arc<TileSource>> {
        self.sources.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Extent;
    use crate::tiles::decoder::GeoJsonTileDecoder;

    fn source() -> TileSource {
        let grid = TileGrid::new(Extent::new(0.0, 0.0, 1024.0, 1024.0), vec![4.0, 2.0, 1.0], 256)
            .unwrap();
        TileSource::new(
            "base",
            "EPSG:3857",
            Arc::new(grid),
            1,
            14,
            "https://tiles.example/{z}/{y}/{x}.json",
            Arc::new(GeoJsonTileDecoder),
        )
    }

    #[test]
    fn test_url_template() {
        assert_eq!(
            source().url(TileCoord::new(3, 5, 2)),
            "https://tiles.example/2/5/3.json"
        );
    }

    #[test]
    fn test_zoom_clamped_to_source_and_grid() {
        let source = source();
        assert_eq!(source.max_zoom(), 2);
        assert_eq!(source.z_for_resolution(100.0), 1);
        assert_eq!(source.z_for_resolution(0.5), 2);
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry =
            SourceRegistry::from_configs(&[SourceConfig::default()], Arc::new(GeoJsonTileDecoder))
                .unwrap();
        let source = registry.get("taustakartta").unwrap();
        assert_eq!(source.projection(), "EPSG:3067");
        assert_eq!(source.max_zoom(), 14);
        assert!(registry.get("missing").is_none());
    }
}
