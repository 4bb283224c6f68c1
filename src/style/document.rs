//! Style documents and layer bucketing

use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleDocument {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    /// Sprite base URL, without pixel ratio suffix or extension
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub sources: Map<String, Value>,
    #[serde(default)]
    pub layers: Vec<StyleLayer>,
}

impl StyleDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| MapError::Style(format!("invalid style document: {e}")).into())
    }

    pub fn layer(&self, id: &str) -> Option<&StyleLayer> {
        self.layers.iter().find(|l| l.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleLayer {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "source-layer", default)]
    pub source_layer: Option<String>,
    #[serde(default)]
    pub minzoom: Option<f64>,
    #[serde(default)]
    pub maxzoom: Option<f64>,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub paint: Map<String, Value>,
    #[serde(default)]
    pub layout: Map<String, Value>,
}

impl StyleLayer {
    /// `layout.visibility` is anything but `none`
    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility").and_then(Value::as_str) != Some("none")
    }
}

/// A contiguous run of style layers drawing from one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub source: String,
    pub layer_ids: Vec<String>,
}

/// Group layers into contiguous runs sharing a source.
///
/// Layers without a source (backgrounds) are skipped. A source that appears
/// again after another one starts a new bucket, so draw order is kept.
pub fn bucketize(layers: &[StyleLayer]) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    for layer in layers {
        let Some(source) = layer.source.as_deref() else {
            continue;
        };
        match buckets.last_mut() {
            Some(bucket) if bucket.source == source => bucket.layer_ids.push(layer.id.clone()),
            _ => buckets.push(Bucket {
                source: source.to_string(),
                layer_ids: vec![layer.id.clone()],
            }),
        }
    }
    buckets
}
