//! Sprite atlas metadata

use crate::prelude::HashMap;
use crate::rendering::surface::ImageRegion;
use crate::{MapError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpriteEntry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "pixelRatio", default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

impl SpriteEntry {
    pub fn region(&self) -> ImageRegion {
        ImageRegion {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Icon name to atlas region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpriteAtlas {
    entries: HashMap<String, SpriteEntry>,
}

impl SpriteAtlas {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let entries: std::collections::HashMap<String, SpriteEntry> = serde_json::from_slice(bytes)
            .map_err(|e| MapError::Style(format!("invalid sprite index: {e}")))?;
        Ok(Self {
            entries: entries.into_iter().collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&SpriteEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index and image URLs for a sprite base, using the `@2x` variant on dense displays
pub fn sprite_urls(base: &str, pixel_ratio: f64) -> (String, String) {
    let suffix = if pixel_ratio > 1.0 { "@2x" } else { "" };
    (format!("{base}{suffix}.json"), format!("{base}{suffix}.png"))
}
