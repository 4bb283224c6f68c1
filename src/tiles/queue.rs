//! Tile load admission control
//!
//! A priority queue of tile fetches with two caps: how many tiles may be
//! loading at once, and how many new loads one render pass may start.
//! Lower priority values are loaded sooner.

use crate::core::constants::RESOLUTION_PRIORITY_WEIGHT;
use crate::core::geo::{Point, TileKey};
use crate::core::view::FrameState;
use crate::prelude::HashSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Priority marking a tile that is no longer needed
pub const DROP: f64 = f64::INFINITY;

/// A tile waiting to be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTile {
    pub key: TileKey,
    pub url: String,
    /// Tile center in projection units
    pub center: Point,
    /// Resolution of the tile's zoom level
    pub resolution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Queued,
    Loading,
    Loaded,
    Failed,
}

pub type PriorityFn = Box<dyn Fn(&FrameState, &QueuedTile) -> f64 + Send>;
pub type CompletionCallback = Box<dyn FnMut(&TileKey, TileState) + Send>;

/// Default priority: finer tiles first, then tiles close to the view center
pub fn tile_priority(frame_state: &FrameState, tile: &QueuedTile) -> f64 {
    if !frame_state.is_tile_wanted(&tile.key.source, &tile.key.coord) {
        return DROP;
    }
    let center = frame_state.view_state.center;
    RESOLUTION_PRIORITY_WEIGHT * tile.resolution.ln()
        + tile.center.distance_to(&center) / tile.resolution
}

struct Entry {
    priority: f64,
    seq: u64,
    tile: QueuedTile,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lowest priority value first, then earliest enqueued
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct TileQueue {
    heap: BinaryHeap<Entry>,
    queued: HashSet<TileKey>,
    loading: HashSet<TileKey>,
    priority: PriorityFn,
    on_complete: Option<CompletionCallback>,
    seq: u64,
}

impl TileQueue {
    pub fn new(priority: PriorityFn) -> Self {
        Self {
            heap: BinaryHeap::new(),
            queued: HashSet::default(),
            loading: HashSet::default(),
            priority,
            on_complete: None,
            seq: 0,
        }
    }

    pub fn with_default_priority() -> Self {
        Self::new(Box::new(tile_priority))
    }

    /// Called whenever a loading tile settles
    pub fn set_completion_callback(&mut self, callback: CompletionCallback) {
        self.on_complete = Some(callback);
    }

    /// Queue a tile. Returns false if it is already known or not wanted.
    pub fn enqueue(&mut self, frame_state: &FrameState, tile: QueuedTile) -> bool {
        if self.is_known(&tile.key) {
            return false;
        }
        let priority = (self.priority)(frame_state, &tile);
        if priority == DROP {
            return false;
        }
        self.queued.insert(tile.key.clone());
        self.push(priority, tile);
        true
    }

    fn push(&mut self, priority: f64, tile: QueuedTile) {
        self.seq += 1;
        self.heap.push(Entry {
            priority,
            seq: self.seq,
            tile,
        });
    }

    pub fn is_known(&self, key: &TileKey) -> bool {
        self.queued.contains(key) || self.loading.contains(key)
    }

    /// State of a tile the queue still tracks
    pub fn state(&self, key: &TileKey) -> Option<TileState> {
        if self.loading.contains(key) {
            Some(TileState::Loading)
        } else if self.queued.contains(key) {
            Some(TileState::Queued)
        } else {
            None
        }
    }

    /// Number of tiles waiting to be admitted
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn tiles_loading(&self) -> usize {
        self.loading.len()
    }

    /// Re-evaluate every queued tile against the latest frame
    pub fn reprioritize(&mut self, frame_state: &FrameState) {
        let entries = std::mem::take(&mut self.heap).into_vec();
        let mut dropped = 0usize;
        for entry in entries {
            let priority = (self.priority)(frame_state, &entry.tile);
            if priority == DROP {
                self.queued.remove(&entry.tile.key);
                dropped += 1;
            } else {
                self.heap.push(Entry { priority, ..entry });
            }
        }
        if dropped > 0 {
            log::debug!("dropped {} unwanted tile(s) from queue", dropped);
        }
    }

    /// Admit up to `max_new_loads` tiles without exceeding `max_total_loading`
    pub fn load_more_tiles(&mut self, max_total_loading: usize, max_new_loads: usize) -> Vec<QueuedTile> {
        let mut admitted = Vec::new();
        while self.loading.len() < max_total_loading && admitted.len() < max_new_loads {
            let Some(entry) = self.heap.pop() else {
                break;
            };
            self.queued.remove(&entry.tile.key);
            self.loading.insert(entry.tile.key.clone());
            admitted.push(entry.tile);
        }
        admitted
    }

    /// Settle a loading tile. Returns false if the tile was not loading.
    pub fn finish(&mut self, key: &TileKey, success: bool) -> bool {
        if !self.loading.remove(key) {
            return false;
        }
        let state = if success {
            TileState::Loaded
        } else {
            TileState::Failed
        };
        if let Some(callback) = self.on_complete.as_mut() {
            callback(key, state);
        }
        true
    }
}

impl std::fmt::Debug for TileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileQueue")
            .field("queued", &self.queued.len())
            .field("loading", &self.loading.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileCoord;
    use crate::core::view::ViewState;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn frame() -> FrameState {
        let view = ViewState::new(Point::new(0.0, 0.0), 1.0, 0.0, "EPSG:3067");
        FrameState::new(1, view, [256, 256], 1.0)
    }

    fn tile(x: u32, y: u32, z: u8, center: Point, resolution: f64) -> QueuedTile {
        let coord = TileCoord::new(x, y, z);
        QueuedTile {
            key: TileKey::new("src", coord),
            url: format!("mem://{coord}"),
            center,
            resolution,
        }
    }

    fn wanted(frame: &mut FrameState, t: &QueuedTile) {
        frame.want_tile(&t.key.source, t.key.coord);
    }

    #[test]
    fn test_unwanted_tiles_are_dropped() {
        let mut queue = TileQueue::with_default_priority();
        let frame = frame();
        let t = tile(0, 0, 1, Point::new(0.0, 0.0), 1.0);
        assert_eq!(tile_priority(&frame, &t), DROP);
        assert!(!queue.enqueue(&frame, t));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_priority_prefers_fine_then_near() {
        let mut frame = frame();
        let coarse_far = tile(0, 0, 1, Point::new(1000.0, 0.0), 4.0);
        let fine_near = tile(1, 1, 2, Point::new(0.0, 0.0), 2.0);
        let fine_far = tile(2, 2, 2, Point::new(100.0, 0.0), 2.0);
        for t in [&coarse_far, &fine_near, &fine_far] {
            wanted(&mut frame, t);
        }
        // 65536 * ln(2) dominates the distance term
        assert!(tile_priority(&frame, &fine_near) < tile_priority(&frame, &fine_far));
        assert!(tile_priority(&frame, &fine_far) < tile_priority(&frame, &coarse_far));
        let expected = RESOLUTION_PRIORITY_WEIGHT * 2.0f64.ln() + 50.0;
        assert!((tile_priority(&frame, &fine_far) - expected).abs() < 1e-9);

        let mut queue = TileQueue::with_default_priority();
        for t in [coarse_far, fine_far, fine_near] {
            assert!(queue.enqueue(&frame, t));
        }
        let order: Vec<u32> = queue
            .load_more_tiles(8, 8)
            .iter()
            .map(|t| t.key.coord.x)
            .collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_admission_caps() {
        let mut frame = frame();
        let mut queue = TileQueue::with_default_priority();
        for x in 0..20 {
            let t = tile(x, 0, 3, Point::new(x as f64, 0.0), 1.0);
            wanted(&mut frame, &t);
            assert!(queue.enqueue(&frame, t));
        }

        let mut passes = 0;
        while queue.tiles_loading() < 8 {
            let admitted = queue.load_more_tiles(8, 2);
            assert!(admitted.len() <= 2);
            passes += 1;
        }
        assert_eq!(passes, 4);
        assert_eq!(queue.tiles_loading(), 8);
        assert!(queue.load_more_tiles(8, 2).is_empty());

        let key = TileKey::new("src", TileCoord::new(0, 0, 3));
        assert_eq!(queue.state(&key), Some(TileState::Loading));
        assert!(queue.finish(&key, true));
        assert_eq!(queue.state(&key), None);
        assert_eq!(queue.load_more_tiles(8, 2).len(), 1);
        assert_eq!(queue.tiles_loading(), 8);
    }

    #[test]
    fn test_duplicate_enqueue_is_ignored() {
        let mut frame = frame();
        let mut queue = TileQueue::with_default_priority();
        let t = tile(0, 0, 1, Point::new(0.0, 0.0), 1.0);
        wanted(&mut frame, &t);
        assert!(queue.enqueue(&frame, t.clone()));
        assert!(!queue.enqueue(&frame, t.clone()));
        queue.load_more_tiles(8, 2);
        assert!(!queue.enqueue(&frame, t));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_reprioritize_drops_tiles_no_longer_wanted() {
        let mut first = frame();
        let mut queue = TileQueue::with_default_priority();
        let a = tile(0, 0, 1, Point::new(0.0, 0.0), 1.0);
        let b = tile(1, 0, 1, Point::new(1.0, 0.0), 1.0);
        wanted(&mut first, &a);
        wanted(&mut first, &b);
        queue.enqueue(&first, a.clone());
        queue.enqueue(&first, b.clone());

        let mut second = frame();
        wanted(&mut second, &b);
        queue.reprioritize(&second);
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_known(&a.key));
        assert_eq!(queue.load_more_tiles(8, 2), vec![b]);
    }

    #[test]
    fn test_completion_callback_fires_once_per_load() {
        let mut frame = frame();
        let mut queue = TileQueue::with_default_priority();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        queue.set_completion_callback(Box::new(move |_, state| {
            assert_eq!(state, TileState::Failed);
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        let t = tile(0, 0, 1, Point::new(0.0, 0.0), 1.0);
        wanted(&mut frame, &t);
        queue.enqueue(&frame, t.clone());
        queue.load_more_tiles(8, 2);
        assert!(queue.finish(&t.key, false));
        assert!(!queue.finish(&t.key, false));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }
}
