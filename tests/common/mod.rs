#![allow(dead_code)]

use serde_json::{json, Value};
use tilerelay::prelude::*;

pub const STYLE_URL: &str = "mem://style.json";
pub const RED: [u8; 4] = [255, 0, 0, 255];

/// A 1024 × 1024 grid with four zoom levels, one tile at z1
pub fn source_config() -> SourceConfig {
    SourceConfig {
        name: "test".to_string(),
        projection: "EPSG:3067".to_string(),
        extent: Extent::new(0.0, 0.0, 1024.0, 1024.0),
        resolutions: vec![8.0, 4.0, 2.0, 1.0],
        tile_size: 256,
        min_zoom: 0,
        max_zoom: 3,
        url_template: "mem://test/{z}/{x}/{y}.json".to_string(),
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        sources: vec![source_config()],
        ..EngineConfig::for_testing()
    }
    .with_style_url(STYLE_URL)
}

pub fn style(sprite: Option<&str>, sources: &[&str]) -> Value {
    let layers: Vec<Value> = sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            json!({
                "id": format!("land-{i}"),
                "type": "fill",
                "source": source,
                "source-layer": "land",
                "paint": {"fill-color": "#ff0000"}
            })
        })
        .collect();
    let mut style = json!({"version": 8, "layers": layers});
    if let Some(sprite) = sprite {
        style["sprite"] = json!(sprite);
    }
    style
}

/// One polygon covering the whole grid
pub fn land_tile() -> Value {
    json!({
        "land": {"type": "FeatureCollection", "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1024, 0], [1024, 1024], [0, 1024], [0, 0]]]}
        }]}
    })
}

pub fn view(resolution: f64) -> ViewState {
    ViewState::new(Point::new(512.0, 512.0), resolution, 0.0, "EPSG:3067")
}

/// Frame for the whole grid at z1
pub fn frame(index: u64) -> FrameState {
    FrameState::new(index, view(4.0), [256, 256], 1.0)
}

/// Route `log` output through the test harness; `RUST_LOG` picks the level
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn spawner() -> Arc<dyn AsyncSpawner> {
    init_logging();
    Arc::new(TokioSpawner::current().expect("tests run inside a tokio runtime"))
}

/// Next message from the engine, skipping nothing
pub fn next_message(port: &CoordinatorPort) -> Option<ToCoordinator> {
    port.recv_timeout(Duration::from_secs(2))
}

pub fn drain(port: &CoordinatorPort) -> Vec<ToCoordinator> {
    std::iter::from_fn(|| port.try_recv().ok().flatten()).collect()
}
