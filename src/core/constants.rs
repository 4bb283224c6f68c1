//! Engine-wide defaults kept in one place.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Upper bound on tiles loading at the same time.
pub const MAX_TOTAL_LOADING: usize = 8;

/// Upper bound on tile loads started by a single render pass.
pub const MAX_NEW_LOADS: usize = 2;

/// Decoded tiles kept per layer.
pub const DEFAULT_TILE_CACHE_SIZE: usize = 512;

/// The worker cannot load web fonts, every family maps to this one.
pub const FALLBACK_FONT_FAMILY: &str = "sans-serif";

/// Priority weight of the tile resolution relative to the center distance.
pub const RESOLUTION_PRIORITY_WEIGHT: f64 = 65_536.0;
