pub mod cache;
pub mod decoder;
pub mod loader;
pub mod queue;
pub mod source;

pub use cache::TileCache;
pub use decoder::{DecodedTile, Feature, GeoJsonTileDecoder, Geometry, TileDecoder};
pub use loader::{fetch_with_retry, Fetcher, HttpFetcher, StaticFetcher};
pub use queue::{tile_priority, QueuedTile, TileQueue, TileState, DROP};
pub use source::{SourceRegistry, TileSource};
