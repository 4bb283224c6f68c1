//! Engine-side view of one render pass

use crate::core::projection::Projection;
use crate::core::view::FrameState;
use crate::prelude::Arc;
use crate::rendering::declutter::DeclutterTree;
use crate::rendering::surface::OffscreenSurface;
use crate::rendering::transform::{coordinate_to_pixel, Affine};
use crate::tiles::queue::TileQueue;

/// A received frame state with the engine's live objects attached.
///
/// Only `state` travels back to the coordinator; the rest stays here.
pub struct RenderFrame<'a> {
    pub state: FrameState,
    pub projection: Arc<Projection>,
    pub queue: &'a mut TileQueue,
    pub surface: &'a mut OffscreenSurface,
    pub declutter: &'a mut DeclutterTree,
    to_pixel: Affine,
}

impl<'a> RenderFrame<'a> {
    pub fn new(
        state: FrameState,
        projection: Arc<Projection>,
        queue: &'a mut TileQueue,
        surface: &'a mut OffscreenSurface,
        declutter: &'a mut DeclutterTree,
    ) -> Self {
        let to_pixel = coordinate_to_pixel(&state);
        Self {
            state,
            projection,
            queue,
            surface,
            declutter,
            to_pixel,
        }
    }

    /// Map coordinates to surface pixels
    pub fn to_pixel(&self) -> &Affine {
        &self.to_pixel
    }

    pub fn into_state(self) -> FrameState {
        self.state
    }
}
