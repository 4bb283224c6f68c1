//! Vector tile layer: draws one style bucket from one tile source

use crate::background::frame::RenderFrame;
use crate::core::geo::{Extent, Point, TileCoord, TileKey};
use crate::core::view::ViewState;
use crate::prelude::{Arc, HashMap};
use crate::rendering::declutter::DeclutterItem;
use crate::rendering::transform::Affine;
use crate::style::apply::{resolve_icon, zoom_for_resolution, PaintRule, StyleRule};
use crate::style::sprite::SpriteAtlas;
use crate::tiles::cache::TileCache;
use crate::tiles::decoder::{DecodedTile, Feature, Geometry};
use crate::tiles::queue::QueuedTile;
use crate::tiles::source::TileSource;
use crate::Result;

/// Extra space kept clear around each symbol, in device pixels
const SYMBOL_PADDING: f64 = 2.0;

pub struct VectorTileLayer {
    id: String,
    source: Arc<TileSource>,
    rules: Vec<StyleRule>,
    resolutions: Vec<f64>,
    sprite: Option<Arc<SpriteAtlas>>,
    sprite_image_url: Option<String>,
    cache: TileCache,
    visible: bool,
    /// View zoom must be above this
    min_zoom: f64,
    /// View zoom must be at or below this
    max_zoom: f64,
}

impl VectorTileLayer {
    pub fn new(id: impl Into<String>, source: Arc<TileSource>, cache_size: usize) -> Self {
        let resolutions = source.grid().resolutions().to_vec();
        Self {
            id: id.into(),
            min_zoom: source.min_zoom() as f64,
            max_zoom: source.max_zoom() as f64,
            source,
            rules: Vec::new(),
            resolutions,
            sprite: None,
            sprite_image_url: None,
            cache: TileCache::new(cache_size),
            visible: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &Arc<TileSource> {
        &self.source
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn set_rules(&mut self, rules: Vec<StyleRule>) {
        self.rules = rules;
    }

    pub fn set_resolutions(&mut self, resolutions: Vec<f64>) {
        if !resolutions.is_empty() {
            self.resolutions = resolutions;
        }
    }

    pub fn set_sprite(&mut self, sprite: Option<Arc<SpriteAtlas>>, image_url: Option<String>) {
        self.sprite = sprite;
        self.sprite_image_url = image_url;
    }

    pub fn sprite_image_url(&self) -> Option<&str> {
        self.sprite_image_url.as_deref()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_zoom_bounds(&mut self, min_zoom: f64, max_zoom: f64) {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Whether the layer draws anything for this view
    pub fn in_view(&self, view: &ViewState) -> bool {
        if !self.visible {
            return false;
        }
        let zoom = zoom_for_resolution(&self.resolutions, view.resolution);
        zoom > self.min_zoom && zoom <= self.max_zoom
    }

    pub fn tile_loaded(&mut self, coord: TileCoord, tile: DecodedTile) {
        self.cache.insert(coord, tile);
    }

    pub fn tile_failed(&mut self, coord: TileCoord) {
        self.cache.mark_failed(coord);
    }

    /// Draw the layer's tiles for `frame`, queueing the ones still missing
    pub fn render_frame(&mut self, frame: &mut RenderFrame<'_>) -> Result<()> {
        if frame.projection.code() != self.source.projection() {
            log::debug!(
                "layer {} skipped: view is in {}, source {} is in {}",
                self.id,
                frame.projection.code(),
                self.source.name(),
                self.source.projection()
            );
            return Ok(());
        }
        let view = &frame.state.view_state;
        let z = self.source.z_for_resolution(view.resolution);
        let zoom = zoom_for_resolution(&self.resolutions, view.resolution);
        let Some(range) = self.source.grid().tile_range_for_extent(&frame.state.extent, z) else {
            return Ok(());
        };
        let source_name = self.source.name().to_string();

        let mut ready = Vec::new();
        // Cached ancestors standing in for missing tiles, with the extents they cover
        let mut fallbacks: Vec<(TileCoord, Arc<DecodedTile>, Vec<Extent>)> = Vec::new();
        let mut fallback_index: HashMap<TileCoord, usize> = HashMap::default();
        let mut missing = 0u32;
        for coord in range.iter() {
            frame.state.want_tile(&source_name, coord);
            if let Some(tile) = self.cache.get(&coord) {
                ready.push(tile);
                continue;
            }
            missing += 1;
            if !self.cache.has_failed(&coord) {
                self.queue_tile(frame, coord);
            }
            let ancestor = coord
                .ancestors(self.source.min_zoom())
                .find(|c| self.cache.contains(c));
            let (Some(ancestor), Some(covered)) = (ancestor, self.source.grid().tile_extent(&coord)) else {
                continue;
            };
            match fallback_index.get(&ancestor) {
                Some(&i) => fallbacks[i].2.push(covered),
                None => {
                    if let Some(tile) = self.cache.get(&ancestor) {
                        fallback_index.insert(ancestor, fallbacks.len());
                        fallbacks.push((ancestor, tile, vec![covered]));
                    }
                }
            }
        }

        let to_pixel = *frame.to_pixel();
        let pixel_ratio = frame.state.pixel_ratio;
        fallbacks.sort_by_key(|(coord, _, _)| coord.z);
        for (_, tile, covered) in &fallbacks {
            let clip: Vec<Vec<Point>> = covered
                .iter()
                .map(|extent| extent_ring(extent).iter().map(|p| to_pixel.apply(p)).collect())
                .collect();
            frame.surface.clip_to(&clip);
            self.draw_tile(frame, tile, &to_pixel, zoom, pixel_ratio, Some(covered.as_slice()));
        }
        frame.surface.reset_clip();
        for tile in &ready {
            self.draw_tile(frame, tile, &to_pixel, zoom, pixel_ratio, None);
        }

        frame.state.stats.layers_drawn += 1;
        frame.state.stats.tiles_drawn += ready.len() as u32;
        frame.state.stats.tiles_missing += missing;
        log::debug!(
            "layer {} at z{}: {} drawn, {} missing, {} fallback",
            self.id,
            z,
            ready.len(),
            missing,
            fallbacks.len()
        );
        Ok(())
    }

    fn queue_tile(&self, frame: &mut RenderFrame<'_>, coord: TileCoord) {
        let grid = self.source.grid();
        let (Some(center), Some(resolution)) = (grid.tile_center(&coord), grid.resolution(coord.z)) else {
            return;
        };
        let tile = QueuedTile {
            key: TileKey::new(self.source.name(), coord),
            url: self.source.url(coord),
            center,
            resolution,
        };
        frame.queue.enqueue(&frame.state, tile);
    }

    /// Draw `tile`; symbols are kept only inside `covers` when it is set
    fn draw_tile(
        &self,
        frame: &mut RenderFrame<'_>,
        tile: &DecodedTile,
        to_pixel: &Affine,
        zoom: f64,
        pixel_ratio: f64,
        covers: Option<&[Extent]>,
    ) {
        for rule in self.rules.iter().filter(|r| r.applies_at(zoom)) {
            for feature in tile.features(&rule.source_layer).iter().filter(|f| rule.matches(f)) {
                self.draw_feature(frame, rule, feature, to_pixel, zoom, pixel_ratio, covers);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_feature(
        &self,
        frame: &mut RenderFrame<'_>,
        rule: &StyleRule,
        feature: &Feature,
        to_pixel: &Affine,
        zoom: f64,
        pixel_ratio: f64,
        covers: Option<&[Extent]>,
    ) {
        let project = |points: &[Point]| points.iter().map(|p| to_pixel.apply(p)).collect::<Vec<_>>();
        match (&rule.paint, &feature.geometry) {
            (PaintRule::Fill { color, outline }, Geometry::Polygons(polygons)) => {
                for polygon in polygons {
                    let rings: Vec<Vec<Point>> = polygon.iter().map(|r| project(r)).collect();
                    frame.surface.fill_polygon(&rings, *color);
                    if let Some(outline) = outline {
                        for ring in &rings {
                            frame.surface.stroke_line(ring, *outline, pixel_ratio as f32);
                        }
                    }
                }
            }
            (PaintRule::Line { color, width }, Geometry::Lines(lines)) => {
                let width = (width.at(zoom) * pixel_ratio) as f32;
                for line in lines {
                    frame.surface.stroke_line(&project(line), *color, width);
                }
            }
            (PaintRule::Line { color, width }, Geometry::Polygons(polygons)) => {
                let width = (width.at(zoom) * pixel_ratio) as f32;
                for ring in polygons.iter().flatten() {
                    frame.surface.stroke_line(&project(ring), *color, width);
                }
            }
            (PaintRule::Circle { color, radius }, Geometry::Points(points)) => {
                let radius = (radius.at(zoom) * pixel_ratio) as f32;
                for point in points {
                    frame.surface.fill_circle(to_pixel.apply(point), radius, *color);
                }
            }
            (PaintRule::Symbol { icon, label, color, size, .. }, geometry) => {
                let region = icon.as_ref().and_then(|template| {
                    let name = resolve_icon(template, feature);
                    self.sprite.as_ref()?.get(&name).map(|entry| entry.region())
                });
                let radius = (size.at(zoom) * pixel_ratio / 4.0) as f32;
                for anchor in symbol_anchors(geometry) {
                    if covers.is_some_and(|covers| !covers.iter().any(|e| e.contains(&anchor))) {
                        continue;
                    }
                    let center = to_pixel.apply(&anchor);
                    let item = match (region, label) {
                        (Some(region), _) => DeclutterItem::icon(center, region, SYMBOL_PADDING),
                        (None, Some(_)) => DeclutterItem::marker(center, radius, *color, SYMBOL_PADDING),
                        (None, None) => continue,
                    };
                    frame.declutter.push(item);
                }
            }
            _ => {}
        }
    }
}

fn extent_ring(extent: &Extent) -> Vec<Point> {
    vec![
        Point::new(extent.min_x, extent.min_y),
        Point::new(extent.max_x, extent.min_y),
        Point::new(extent.max_x, extent.max_y),
        Point::new(extent.min_x, extent.max_y),
    ]
}

/// Where symbols of a geometry are placed
fn symbol_anchors(geometry: &Geometry) -> Vec<Point> {
    match geometry {
        Geometry::Points(points) => points.clone(),
        Geometry::Lines(lines) => lines
            .iter()
            .filter_map(|line| line.get(line.len() / 2).copied())
            .collect(),
        Geometry::Polygons(polygons) => polygons
            .iter()
            .filter_map(|rings| Extent::bounding(rings.first()?))
            .map(|extent| extent.center())
            .collect(),
    }
}

impl std::fmt::Debug for VectorTileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorTileLayer")
            .field("id", &self.id)
            .field("source", &self.source.name())
            .field("rules", &self.rules.len())
            .field("cached_tiles", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::ProjectionRegistry;
    use crate::core::tilegrid::TileGrid;
    use crate::core::view::FrameState;
    use crate::rendering::declutter::DeclutterTree;
    use crate::rendering::surface::{OffscreenSurface, Rgba};
    use crate::style::apply::{Filter, NumberValue};
    use crate::tiles::decoder::GeoJsonTileDecoder;
    use crate::tiles::queue::TileQueue;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    fn source() -> Arc<TileSource> {
        let grid = TileGrid::new(Extent::new(0.0, 0.0, 1024.0, 1024.0), vec![8.0, 4.0, 2.0, 1.0], 256).unwrap();
        Arc::new(TileSource::new(
            "test",
            "EPSG:3067",
            Arc::new(grid),
            0,
            3,
            "mem://{z}/{x}/{y}",
            Arc::new(GeoJsonTileDecoder),
        ))
    }

    fn fill_rule() -> StyleRule {
        StyleRule {
            layer_id: "land".to_string(),
            source_layer: "land".to_string(),
            min_zoom: 0.0,
            max_zoom: f64::INFINITY,
            filter: Filter::Always,
            paint: PaintRule::Fill { color: RED, outline: None },
        }
    }

    fn square_tile() -> DecodedTile {
        tile_covering(&Extent::new(0.0, 0.0, 1024.0, 1024.0))
    }

    fn tile_covering(extent: &Extent) -> DecodedTile {
        let ring = extent_ring(extent);
        let mut tile = DecodedTile::default();
        tile.layers.insert(
            "land".to_string(),
            vec![Feature {
                geometry: Geometry::Polygons(vec![vec![ring]]),
                properties: Default::default(),
            }],
        );
        tile
    }

    fn frame_state() -> FrameState {
        let view = ViewState::new(Point::new(512.0, 512.0), 4.0, 0.0, "EPSG:3067");
        FrameState::new(1, view, [256, 256], 1.0)
    }

    fn render(layer: &mut VectorTileLayer, queue: &mut TileQueue, surface: &mut OffscreenSurface) -> FrameState {
        render_state(layer, queue, surface, frame_state())
    }

    fn render_state(
        layer: &mut VectorTileLayer,
        queue: &mut TileQueue,
        surface: &mut OffscreenSurface,
        state: FrameState,
    ) -> FrameState {
        let projection = ProjectionRegistry::default()
            .get(&state.view_state.projection)
            .unwrap();
        let mut declutter = DeclutterTree::new();
        let mut frame = RenderFrame::new(state, projection, queue, surface, &mut declutter);
        layer.render_frame(&mut frame).unwrap();
        frame.into_state()
    }

    #[test]
    fn test_missing_tiles_are_wanted_and_queued() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.set_rules(vec![fill_rule()]);
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();

        let state = render(&mut layer, &mut queue, &mut surface);
        let coord = TileCoord::new(0, 0, 1);
        assert!(state.is_tile_wanted("test", &coord));
        assert_eq!(state.stats.tiles_missing, 1);
        assert_eq!(state.stats.tiles_drawn, 0);
        assert_eq!(queue.len(), 1);
        let admitted = queue.load_more_tiles(8, 2);
        assert_eq!(admitted[0].url, "mem://1/0/0");
        assert_eq!(surface.pixel(128, 128), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_cached_tile_is_drawn() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.set_rules(vec![fill_rule()]);
        layer.tile_loaded(TileCoord::new(0, 0, 1), square_tile());
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();

        let state = render(&mut layer, &mut queue, &mut surface);
        assert_eq!(state.stats.tiles_drawn, 1);
        assert_eq!(state.stats.layers_drawn, 1);
        assert!(queue.is_empty());
        assert_eq!(surface.pixel(128, 128), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_parent_tile_fills_in_for_missing_child() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.set_rules(vec![fill_rule()]);
        layer.tile_loaded(TileCoord::new(0, 0, 0), square_tile());
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();

        let state = render(&mut layer, &mut queue, &mut surface);
        assert_eq!(state.stats.tiles_missing, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(surface.pixel(128, 128), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_parent_is_clipped_to_missing_children() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.set_rules(vec![StyleRule {
            paint: PaintRule::Fill {
                color: Rgba::new(255, 0, 0, 128),
                outline: None,
            },
            ..fill_rule()
        }]);
        layer.tile_loaded(TileCoord::new(0, 0, 1), square_tile());
        layer.tile_loaded(TileCoord::new(0, 0, 2), tile_covering(&Extent::new(0.0, 512.0, 512.0, 1024.0)));
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();

        let view = ViewState::new(Point::new(512.0, 512.0), 2.0, 0.0, "EPSG:3067");
        let state = render_state(&mut layer, &mut queue, &mut surface, FrameState::new(1, view, [256, 256], 1.0));
        assert_eq!(state.stats.tiles_drawn, 1);
        assert_eq!(state.stats.tiles_missing, 3);

        // (64, 64) lies in the loaded child, (192, 192) in a missing one
        let loaded = surface.pixel(64, 64).unwrap();
        let stand_in = surface.pixel(192, 192).unwrap();
        assert_eq!(loaded[3], 128);
        assert_eq!(loaded, stand_in);
    }

    #[test]
    fn test_view_in_another_projection_skips_layer() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.set_rules(vec![fill_rule()]);
        layer.tile_loaded(TileCoord::new(0, 0, 1), square_tile());
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();

        let mut state = frame_state();
        state.view_state.projection = "EPSG:4326".to_string();
        let state = render_state(&mut layer, &mut queue, &mut surface, state);
        assert_eq!(state.stats.layers_drawn, 0);
        assert!(!state.is_tile_wanted("test", &TileCoord::new(0, 0, 1)));
        assert!(queue.is_empty());
        assert_eq!(surface.pixel(128, 128), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_failed_tiles_are_not_queued_again() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.tile_failed(TileCoord::new(0, 0, 1));
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();
        render(&mut layer, &mut queue, &mut surface);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_in_view_respects_zoom_bounds() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        let view = frame_state().view_state;
        assert!(layer.in_view(&view));
        // Lower zoom bound is exclusive
        assert!(!layer.in_view(&view.with_resolution(8.0)));
        layer.set_zoom_bounds(2.0, 3.0);
        assert!(!layer.in_view(&view));
        layer.set_zoom_bounds(0.0, 3.0);
        layer.set_visible(false);
        assert!(!layer.in_view(&view));
    }

    #[test]
    fn test_symbols_go_to_declutter() {
        let mut layer = VectorTileLayer::new("test", source(), 16);
        layer.set_rules(vec![StyleRule {
            paint: PaintRule::Symbol {
                icon: None,
                label: Some("{name}".to_string()),
                color: RED,
                size: NumberValue::Constant(16.0),
                font: "sans-serif".to_string(),
            },
            ..fill_rule()
        }]);
        layer.tile_loaded(TileCoord::new(0, 0, 1), square_tile());

        let projection = ProjectionRegistry::default().get("EPSG:3067").unwrap();
        let mut queue = TileQueue::with_default_priority();
        let mut surface = OffscreenSurface::new(256, 256).unwrap();
        let mut declutter = DeclutterTree::new();
        let mut frame = RenderFrame::new(frame_state(), projection, &mut queue, &mut surface, &mut declutter);
        layer.render_frame(&mut frame).unwrap();
        drop(frame);
        assert_eq!(declutter.len(), 1);
    }
}
