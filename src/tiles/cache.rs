use super::decoder::DecodedTile;
use crate::core::geo::TileCoord;
use crate::prelude::{Arc, HashSet};
use lru::LruCache;
use std::num::NonZeroUsize;

/// Decoded tiles of one layer, with LRU eviction. Failed tiles are
/// remembered separately so they are not queued again.
#[derive(Debug)]
pub struct TileCache {
    cache: LruCache<TileCoord, Arc<DecodedTile>>,
    failed: HashSet<TileCoord>,
}

impl TileCache {
    /// Create a new tile cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            failed: HashSet::default(),
        }
    }

    /// Get a tile and mark it as recently used
    pub fn get(&mut self, coord: &TileCoord) -> Option<Arc<DecodedTile>> {
        self.cache.get(coord).cloned()
    }

    /// Get a tile without touching the LRU order
    pub fn peek(&self, coord: &TileCoord) -> Option<&Arc<DecodedTile>> {
        self.cache.peek(coord)
    }

    pub fn insert(&mut self, coord: TileCoord, tile: DecodedTile) {
        self.failed.remove(&coord);
        self.cache.put(coord, Arc::new(tile));
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.cache.contains(coord)
    }

    pub fn mark_failed(&mut self, coord: TileCoord) {
        self.failed.insert(coord);
    }

    pub fn has_failed(&self, coord: &TileCoord) -> bool {
        self.failed.contains(coord)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.failed.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(crate::core::constants::DEFAULT_TILE_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_cache_lru_eviction() {
        let mut cache = TileCache::new(2);
        let coord1 = TileCoord::new(1, 1, 1);
        let coord2 = TileCoord::new(2, 2, 2);
        let coord3 = TileCoord::new(3, 3, 3);

        cache.insert(coord1, DecodedTile::default());
        cache.insert(coord2, DecodedTile::default());
        assert_eq!(cache.len(), 2);

        cache.insert(coord3, DecodedTile::default());
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&coord1));
        assert!(cache.contains(&coord2));
        assert!(cache.contains(&coord3));
    }

    #[test]
    fn test_failed_tiles_are_remembered() {
        let mut cache = TileCache::new(4);
        let coord = TileCoord::new(0, 0, 1);
        cache.mark_failed(coord);
        assert!(cache.has_failed(&coord));
        assert!(!cache.contains(&coord));

        cache.insert(coord, DecodedTile::default());
        assert!(!cache.has_failed(&coord));
        assert!(cache.get(&coord).is_some());
    }

    #[test]
    fn test_zero_capacity_falls_back_to_one() {
        assert_eq!(TileCache::new(0).capacity(), 1);
    }
}
