//! Off-screen drawing surface and the bitmaps extracted from it
//!
//! Geometry arrives in device pixels; callers transform map coordinates in
//! `f64` first, since projected coordinates overflow `f32` precision.

use crate::core::geo::Point;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tiny_skia::{
    Color, FillRule, IntRect, IntSize, LineCap, LineJoin, Mask, Paint, PathBuilder, Pixmap,
    PixmapPaint, Stroke, Transform,
};

/// Straight (non-premultiplied) RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Multiply alpha by `opacity` (clamped to 0..=1)
    pub fn with_opacity(&self, opacity: f64) -> Self {
        let a = (self.a as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..*self }
    }

    fn paint(&self) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(self.r, self.g, self.b, self.a);
        paint.anti_alias = true;
        paint
    }
}

/// Pixel buffer handed from the engine to the coordinator.
///
/// Moving a `Bitmap` through the channel transfers ownership of the buffer;
/// it is never copied on the way.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    width: u32,
    height: u32,
    /// Premultiplied RGBA8, row major
    pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(MapError::Render(format!(
                "bitmap of {}x{} needs {} bytes, got {}",
                width,
                height,
                width as usize * height as usize * 4,
                pixels.len()
            ))
            .into());
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 0)
    }

    pub fn into_pixmap(self) -> Option<Pixmap> {
        let size = IntSize::from_wh(self.width, self.height)?;
        Pixmap::from_vec(self.pixels, size)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Region of an image atlas, in atlas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The shared drawing target every engine layer renders into
pub struct OffscreenSurface {
    pixmap: Pixmap,
    /// Vector drawing is limited to this mask while set
    clip: Option<Mask>,
}

impl OffscreenSurface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            pixmap: Self::allocate(width, height)?,
            clip: None,
        })
    }

    fn allocate(width: u32, height: u32) -> Result<Pixmap> {
        Pixmap::new(width.max(1), height.max(1)).ok_or_else(|| {
            MapError::Render(format!("cannot allocate a {}x{} surface", width, height)).into()
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Reallocate when the size changed; contents are lost either way
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width.max(1) != self.width() || height.max(1) != self.height() {
            self.pixmap = Self::allocate(width, height)?;
            self.clip = None;
        } else {
            self.clear();
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
        self.clip = None;
    }

    /// Limit fills and strokes to the union of `polygons` until [`Self::reset_clip`].
    /// An empty list clips everything away.
    pub fn clip_to(&mut self, polygons: &[Vec<Point>]) {
        let Some(mut mask) = Mask::new(self.width(), self.height()) else {
            return;
        };
        let mut pb = PathBuilder::new();
        for polygon in polygons {
            push_polyline(&mut pb, polygon);
            pb.close();
        }
        if let Some(path) = pb.finish() {
            mask.fill_path(&path, FillRule::Winding, false, Transform::identity());
        }
        self.clip = Some(mask);
    }

    pub fn reset_clip(&mut self) {
        self.clip = None;
    }

    pub fn is_clipped(&self) -> bool {
        self.clip.is_some()
    }

    pub fn fill(&mut self, color: Rgba) {
        self.pixmap
            .fill(Color::from_rgba8(color.r, color.g, color.b, color.a));
    }

    /// Fill polygon rings (outer ring first, holes after) with even-odd rule
    pub fn fill_polygon(&mut self, rings: &[Vec<Point>], color: Rgba) {
        let mut pb = PathBuilder::new();
        for ring in rings {
            push_polyline(&mut pb, ring);
            pb.close();
        }
        if let Some(path) = pb.finish() {
            self.pixmap.fill_path(
                &path,
                &color.paint(),
                FillRule::EvenOdd,
                Transform::identity(),
                self.clip.as_ref(),
            );
        }
    }

    pub fn stroke_line(&mut self, points: &[Point], color: Rgba, width: f32) {
        if points.len() < 2 {
            return;
        }
        let mut pb = PathBuilder::new();
        push_polyline(&mut pb, points);
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width,
                line_cap: LineCap::Round,
                line_join: LineJoin::Round,
                ..Stroke::default()
            };
            self.pixmap
                .stroke_path(&path, &color.paint(), &stroke, Transform::identity(), self.clip.as_ref());
        }
    }

    pub fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba) {
        if let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius) {
            self.pixmap.fill_path(
                &path,
                &color.paint(),
                FillRule::Winding,
                Transform::identity(),
                self.clip.as_ref(),
            );
        }
    }

    /// Blit `region` of `atlas` with its top-left corner at `top_left`
    pub fn draw_image(&mut self, atlas: &Pixmap, region: ImageRegion, top_left: Point) {
        let Some(rect) =
            IntRect::from_xywh(region.x as i32, region.y as i32, region.width, region.height)
        else {
            return;
        };
        if let Some(icon) = atlas.clone_rect(rect) {
            self.pixmap.draw_pixmap(
                top_left.x.round() as i32,
                top_left.y.round() as i32,
                icon.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixmap
            .pixel(x, y)
            .map(|p| [p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// Hand the current contents over as a bitmap, leaving a blank surface
    /// of the same size behind.
    pub fn transfer_to_bitmap(&mut self) -> Result<Bitmap> {
        let blank = Self::allocate(self.width(), self.height())?;
        let pixmap = std::mem::replace(&mut self.pixmap, blank);
        let (width, height) = (pixmap.width(), pixmap.height());
        Bitmap::new(width, height, pixmap.take())
    }
}

fn push_polyline(pb: &mut PathBuilder, points: &[Point]) {
    let mut iter = points.iter();
    if let Some(first) = iter.next() {
        pb.move_to(first.x as f32, first.y as f32);
        for p in iter {
            pb.line_to(p.x as f32, p.y as f32);
        }
    }
}
