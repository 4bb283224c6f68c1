//! Vector tile decoding
//!
//! The bundled decoder reads tiles encoded as a JSON object that maps each
//! source layer name to a GeoJSON `FeatureCollection` whose coordinates are
//! already in the tile grid's projection.

use crate::core::geo::Point;
use crate::prelude::HashMap;
use crate::{MapError, Result};
use serde::Deserialize;

/// Geometry in projection units, normalised to multi-part form
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Points(Vec<Point>),
    Lines(Vec<Vec<Point>>),
    /// Polygons, each a list of rings (outer first)
    Polygons(Vec<Vec<Vec<Point>>>),
}

impl Geometry {
    /// Type name as used by `$type` style filters
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Points(_) => "Point",
            Geometry::Lines(_) => "LineString",
            Geometry::Polygons(_) => "Polygon",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Features of one tile, grouped by source layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTile {
    pub layers: HashMap<String, Vec<Feature>>,
}

impl DecodedTile {
    pub fn features(&self, source_layer: &str) -> &[Feature] {
        self.layers
            .get(source_layer)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn feature_count(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }
}

pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedTile>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Point { coordinates: [f64; 2] },
    MultiPoint { coordinates: Vec<[f64; 2]> },
    LineString { coordinates: Vec<[f64; 2]> },
    MultiLineString { coordinates: Vec<Vec<[f64; 2]>> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeature {
    geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonCollection {
    features: Vec<GeoJsonFeature>,
}

fn ring(coords: Vec<[f64; 2]>) -> Vec<Point> {
    coords.into_iter().map(|[x, y]| Point::new(x, y)).collect()
}

impl From<GeoJsonGeometry> for Geometry {
    fn from(geometry: GeoJsonGeometry) -> Self {
        match geometry {
            GeoJsonGeometry::Point { coordinates: [x, y] } => Geometry::Points(vec![Point::new(x, y)]),
            GeoJsonGeometry::MultiPoint { coordinates } => Geometry::Points(ring(coordinates)),
            GeoJsonGeometry::LineString { coordinates } => Geometry::Lines(vec![ring(coordinates)]),
            GeoJsonGeometry::MultiLineString { coordinates } => {
                Geometry::Lines(coordinates.into_iter().map(ring).collect())
            }
            GeoJsonGeometry::Polygon { coordinates } => {
                Geometry::Polygons(vec![coordinates.into_iter().map(ring).collect()])
            }
            GeoJsonGeometry::MultiPolygon { coordinates } => Geometry::Polygons(
                coordinates
                    .into_iter()
                    .map(|polygon| polygon.into_iter().map(ring).collect())
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonTileDecoder;

impl TileDecoder for GeoJsonTileDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedTile> {
        let raw: HashMap<String, GeoJsonCollection> = serde_json::from_slice(bytes)
            .map_err(|e| MapError::Decode(format!("invalid tile: {e}")))?;
        let layers = raw
            .into_iter()
            .map(|(name, collection)| {
                let features = collection
                    .features
                    .into_iter()
                    .filter_map(|f| {
                        Some(Feature {
                            geometry: f.geometry?.into(),
                            properties: f.properties.unwrap_or_default(),
                        })
                    })
                    .collect();
                (name, features)
            })
            .collect();
        Ok(DecodedTile { layers })
    }
}
