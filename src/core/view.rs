//! View and frame snapshots exchanged between the coordinator and the engine
//!
//! Both types are plain data. Anything with behaviour (projection objects,
//! the tile queue) is rebuilt on the receiving side.

use crate::core::geo::{Extent, Point, TileCoord};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What part of the world is visible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    /// Center in projection units
    pub center: Point,
    /// Map units per css pixel
    pub resolution: f64,
    /// Radians, counter-clockwise
    pub rotation: f64,
    /// Projection code, e.g. `EPSG:3067`
    pub projection: String,
}

impl ViewState {
    pub fn new(center: Point, resolution: f64, rotation: f64, projection: impl Into<String>) -> Self {
        Self {
            center,
            resolution,
            rotation,
            projection: projection.into(),
        }
    }

    pub fn with_center(&self, center: Point) -> Self {
        Self {
            center,
            ..self.clone()
        }
    }

    pub fn with_resolution(&self, resolution: f64) -> Self {
        Self {
            resolution,
            ..self.clone()
        }
    }

    pub fn with_rotation(&self, rotation: f64) -> Self {
        Self {
            rotation,
            ..self.clone()
        }
    }

    /// Extent covered by a viewport of `size` css pixels, accounting for rotation
    pub fn extent_for_size(&self, size: [u32; 2]) -> Extent {
        let dx = self.resolution * size[0] as f64 / 2.0;
        let dy = self.resolution * size[1] as f64 / 2.0;
        let c = self.center;
        let corners = [
            Point::new(c.x - dx, c.y - dy),
            Point::new(c.x - dx, c.y + dy),
            Point::new(c.x + dx, c.y + dy),
            Point::new(c.x + dx, c.y - dy),
        ];
        if self.rotation == 0.0 {
            return Extent::new(c.x - dx, c.y - dy, c.x + dx, c.y + dy);
        }
        let rotated: Vec<Point> = corners
            .iter()
            .map(|p| p.rotate_around(&c, self.rotation))
            .collect();
        // corners is non-empty, so bounding never fails
        Extent::bounding(&rotated).unwrap_or_else(|| Extent::new(c.x, c.y, c.x, c.y))
    }
}

/// Counters the engine fills in during a pass and echoes back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub layers_drawn: u32,
    pub tiles_drawn: u32,
    pub tiles_missing: u32,
    pub decluttered: u32,
    pub tiles_loading: u32,
}

/// One render attempt: a view snapshot plus its rendering context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameState {
    pub index: u64,
    pub view_state: ViewState,
    pub pixel_ratio: f64,
    /// Viewport size in css pixels
    pub size: [u32; 2],
    pub extent: Extent,
    /// Set when the host should schedule another frame
    #[serde(default)]
    pub animate: bool,
    /// Opaque per-layer hints, echoed untouched
    #[serde(default)]
    pub layer_hints: BTreeMap<String, serde_json::Value>,
    /// Tiles each source needed during the last pass
    #[serde(default)]
    pub wanted_tiles: BTreeMap<String, BTreeSet<TileCoord>>,
    #[serde(default)]
    pub stats: RenderStats,
}

impl FrameState {
    pub fn new(index: u64, view_state: ViewState, size: [u32; 2], pixel_ratio: f64) -> Self {
        let extent = view_state.extent_for_size(size);
        Self {
            index,
            view_state,
            pixel_ratio,
            size,
            extent,
            animate: false,
            layer_hints: BTreeMap::new(),
            wanted_tiles: BTreeMap::new(),
            stats: RenderStats::default(),
        }
    }

    /// Surface size in device pixels
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.size[0] as f64 * self.pixel_ratio).round().max(1.0) as u32,
            (self.size[1] as f64 * self.pixel_ratio).round().max(1.0) as u32,
        )
    }

    pub fn is_tile_wanted(&self, source: &str, coord: &TileCoord) -> bool {
        self.wanted_tiles
            .get(source)
            .map(|set| set.contains(coord))
            .unwrap_or(false)
    }

    pub fn want_tile(&mut self, source: &str, coord: TileCoord) {
        self.wanted_tiles
            .entry(source.to_string())
            .or_default()
            .insert(coord);
    }

    /// Plain-data form sent across the channel
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| MapError::Serialization(e).into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MapError::Serialization(e).into())
    }
}
