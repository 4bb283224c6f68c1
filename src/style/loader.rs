use super::document::{bucketize, Bucket, StyleDocument};
use super::sprite::{sprite_urls, SpriteAtlas};
use crate::core::config::RetryPolicy;
use crate::tiles::loader::{fetch_with_retry, Fetcher};
use crate::Result;

/// Everything fetched once per session to build the layer stack
#[derive(Debug, Clone)]
pub struct StyleBundle {
    pub document: StyleDocument,
    pub buckets: Vec<Bucket>,
    pub sprite: Option<SpriteAtlas>,
    pub sprite_image_url: Option<String>,
}

/// Fetch the style document and its sprite index.
///
/// A style without a `sprite` entry loads without one. A sprite that is
/// declared but cannot be fetched fails the whole load.
pub async fn load_style(fetcher: &dyn Fetcher, url: &str, pixel_ratio: f64, retry: RetryPolicy) -> Result<StyleBundle> {
    log::info!("loading style {}", url);
    let body = fetch_with_retry(fetcher, url, retry).await?;
    let document = StyleDocument::from_slice(&body)?;
    let buckets = bucketize(&document.layers);

    let (sprite, sprite_image_url) = match document.sprite.as_deref() {
        Some(base) => {
            let (index_url, image_url) = sprite_urls(base, pixel_ratio);
            let index = fetch_with_retry(fetcher, &index_url, retry).await?;
            (Some(SpriteAtlas::from_slice(&index)?), Some(image_url))
        }
        None => (None, None),
    };

    log::debug!(
        "style has {} layer(s) in {} bucket(s)",
        document.layers.len(),
        buckets.len()
    );
    Ok(StyleBundle {
        document,
        buckets,
        sprite,
        sprite_image_url,
    })
}
