//! # tilerelay
//!
//! Vector tile map rendering split across two threads. A [`Coordinator`]
//! on the host's thread sends serialized frame states to a
//! [`RenderEngine`] on its own thread, which draws styled vector tiles
//! into an off-screen surface and hands the bitmap back. The coordinator
//! composites each result with a transform that hides the view movement
//! that happened while the engine was drawing.

pub mod background;
pub mod channel;
pub mod coordinator;
pub mod core;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod style;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use background::RenderEngine;
pub use channel::{channel, CoordinatorPort, EnginePort, ToCoordinator, ToEngine};
pub use coordinator::{Coordinator, CoordinatorStats};
pub use core::{
    config::{EngineConfig, RelayConfig},
    geo::{Extent, Point, TileCoord},
    view::{FrameState, ViewState},
};
pub use rendering::{compensate, Bitmap, Compensation};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Style error: {0}")]
    Style(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;
