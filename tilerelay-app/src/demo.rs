//! Offline content so the driver runs without network access

use async_trait::async_trait;
use image::{ImageOutputFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::io::Cursor;
use tilerelay::core::config::SourceConfig;
use tilerelay::core::tilegrid::TileGrid;
use tilerelay::prelude::*;
use tilerelay::MapError;

pub const STYLE_URL: &str = "demo://style.json";
pub const TILE_TEMPLATE: &str = "demo://taustakartta/{z}/{x}/{y}.json";

/// Serves a style, a sprite and synthetic tiles generated on request
pub struct DemoFetcher {
    grid: TileGrid,
}

impl DemoFetcher {
    pub fn new(source: &SourceConfig) -> tilerelay::Result<Self> {
        Ok(Self {
            grid: TileGrid::new(source.extent, source.resolutions.clone(), source.tile_size)?,
        })
    }

    fn style() -> Value {
        json!({
            "version": 8,
            "name": "demo",
            "sprite": "demo://sprite",
            "layers": [
                {"id": "background", "type": "background", "paint": {"background-color": "#f2efe9"}},
                {"id": "land", "type": "fill", "source": "taustakartta", "source-layer": "maa",
                 "paint": {"fill-color": "#e8e4d8"}},
                {"id": "water", "type": "fill", "source": "taustakartta", "source-layer": "vesi",
                 "paint": {"fill-color": "rgb(170, 211, 223)", "fill-outline-color": "#7fb2c4"}},
                {"id": "roads", "type": "line", "source": "taustakartta", "source-layer": "tie",
                 "filter": ["==", "$type", "LineString"],
                 "paint": {"line-color": "#d9822b", "line-width": {"stops": [[6, 1], [14, 4]]}}},
                {"id": "hillshade", "type": "fill", "source": "korkeus", "source-layer": "varjo"},
                {"id": "places", "type": "symbol", "source": "taustakartta", "source-layer": "paikka",
                 "layout": {"icon-image": "{kind}", "text-field": "{name}", "text-font": ["Noto Sans Regular"]}}
            ]
        })
    }

    fn sprite_png() -> tilerelay::Result<Vec<u8>> {
        let image = RgbaImage::from_fn(8, 8, |x, y| {
            let (dx, dy) = (x as i32 - 4, y as i32 - 4);
            if dx * dx + dy * dy <= 12 {
                Rgba([200, 40, 40, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageOutputFormat::Png)
            .map_err(|e| MapError::Image(e.to_string()))?;
        Ok(out.into_inner())
    }

    fn tile(&self, coord: TileCoord) -> Option<Value> {
        let e = self.grid.tile_extent(&coord)?;
        let c = e.center();
        let collection = |features: Vec<Value>| json!({"type": "FeatureCollection", "features": features});
        let polygon = |ring: Vec<[f64; 2]>| json!({"type": "Polygon", "coordinates": [ring]});
        let land = polygon(vec![
            [e.min_x, e.min_y],
            [e.max_x, e.min_y],
            [e.max_x, e.max_y],
            [e.min_x, e.max_y],
            [e.min_x, e.min_y],
        ]);
        let lake = polygon(vec![
            [e.min_x, e.min_y],
            [c.x, e.min_y],
            [c.x, c.y],
            [e.min_x, e.min_y],
        ]);
        let road = json!({"type": "LineString", "coordinates": [[e.min_x, e.max_y], [c.x, c.y], [e.max_x, e.min_y]]});
        let place = json!({"type": "Point", "coordinates": [c.x, c.y]});
        Some(json!({
            "maa": collection(vec![json!({"type": "Feature", "geometry": land})]),
            "vesi": collection(vec![json!({"type": "Feature", "geometry": lake, "properties": {"class": "lake"}})]),
            "tie": collection(vec![json!({"type": "Feature", "geometry": road})]),
            "paikka": collection(vec![json!({
                "type": "Feature",
                "geometry": place,
                "properties": {"kind": "dot", "name": format!("{coord}")}
            })]),
        }))
    }

    fn tile_coord(url: &str) -> Option<TileCoord> {
        let path = url.strip_prefix("demo://taustakartta/")?.strip_suffix(".json")?;
        let mut parts = path.split('/').map(str::parse::<u32>);
        let z = parts.next()?.ok()?;
        let x = parts.next()?.ok()?;
        let y = parts.next()?.ok()?;
        Some(TileCoord::new(x, y, u8::try_from(z).ok()?))
    }
}

#[async_trait]
impl Fetcher for DemoFetcher {
    async fn fetch(&self, url: &str) -> tilerelay::Result<Vec<u8>> {
        // A little latency so panning outruns the engine
        tokio::time::sleep(Duration::from_millis(15)).await;
        let body = match url {
            STYLE_URL => Self::style(),
            "demo://sprite.json" | "demo://sprite@2x.json" => {
                json!({"dot": {"x": 0, "y": 0, "width": 8, "height": 8, "pixelRatio": 1}})
            }
            "demo://sprite.png" | "demo://sprite@2x.png" => return Self::sprite_png(),
            _ => Self::tile_coord(url)
                .and_then(|coord| self.tile(coord))
                .ok_or_else(|| MapError::Fetch(format!("not found: {url}")))?,
        };
        Ok(body.to_string().into_bytes())
    }
}
