//! Configuration for the render relay
//!
//! Plain structs with sensible defaults and a few named presets, so the
//! common cases need no tuning at all. Everything can also be read from a
//! JSON document with [`RelayConfig::from_json_str`].

use crate::core::constants;
use crate::core::geo::Extent;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Caps on concurrent tile loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Never more than this many tiles loading at once
    pub max_total_loading: usize,
    /// At most this many loads started per render pass
    pub max_new_loads: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_total_loading: constants::MAX_TOTAL_LOADING,
            max_new_loads: constants::MAX_NEW_LOADS,
        }
    }
}

impl AdmissionConfig {
    pub fn low_resource() -> Self {
        Self {
            max_total_loading: 4,
            max_new_loads: 1,
        }
    }

    pub fn high_throughput() -> Self {
        Self {
            max_total_loading: 32,
            max_new_loads: 8,
        }
    }
}

/// Retry behaviour for style, sprite and tile fetches. No retries by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 250,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// A tile source registered at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Name referenced by style layers
    pub name: String,
    pub projection: String,
    pub extent: Extent,
    /// Grid resolutions, strictly decreasing
    pub resolutions: Vec<f64>,
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Template with `{z}`, `{x}` and `{y}` placeholders
    pub url_template: String,
}

impl Default for SourceConfig {
    /// The ETRS-TM35FIN background map grid
    fn default() -> Self {
        Self {
            name: "taustakartta".to_string(),
            projection: "EPSG:3067".to_string(),
            extent: Extent::new(-548_576.0, 6_291_456.0, 1_548_576.0, 8_388_608.0),
            resolutions: vec![
                8192.0, 4096.0, 2048.0, 1024.0, 512.0, 256.0, 128.0, 64.0, 32.0, 16.0, 8.0, 4.0,
                2.0, 1.0, 0.5,
            ],
            tile_size: constants::TILE_SIZE,
            min_zoom: 1,
            max_zoom: 14,
            url_template: "https://tiles.example.invalid/taustakartta/{z}/{y}/{x}.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub admission: AdmissionConfig,
    pub retry: RetryPolicy,
    pub sources: Vec<SourceConfig>,
    /// Style document to load on the first frame
    pub style_url: Option<String>,
    /// Decoded tiles kept per layer
    pub tile_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            retry: RetryPolicy::default(),
            sources: vec![SourceConfig::default()],
            style_url: None,
            tile_cache_size: constants::DEFAULT_TILE_CACHE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn with_style_url(mut self, url: impl Into<String>) -> Self {
        self.style_url = Some(url.into());
        self
    }

    pub fn for_testing() -> Self {
        Self {
            tile_cache_size: 64,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Container size in css pixels
    pub size: [u32; 2],
    pub pixel_ratio: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            size: [800, 600],
            pixel_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub engine: EngineConfig,
    pub coordinator: CoordinatorConfig,
}

impl RelayConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let admission = &self.engine.admission;
        if admission.max_total_loading == 0 || admission.max_new_loads == 0 {
            return Err(MapError::Config("admission caps must be positive".into()).into());
        }
        if self.coordinator.size.contains(&0) {
            return Err(MapError::Config("viewport size must be positive".into()).into());
        }
        if !(self.coordinator.pixel_ratio > 0.0) {
            return Err(MapError::Config("pixel ratio must be positive".into()).into());
        }
        Ok(())
    }
}
