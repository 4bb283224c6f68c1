//! Presentation surfaces owned by the coordinator
//!
//! `Container` (fixed size) → `TransformLayer` (repositioned by transform,
//! never redrawn) → `Canvas` (holds the last delivered bitmap).

use crate::rendering::surface::Bitmap;
use crate::rendering::transform::Affine;

#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    bitmap: Option<Bitmap>,
    /// Transform hint delivered with the bitmap, e.g. device → css pixels
    pub transform: String,
}

impl Canvas {
    fn new() -> Self {
        Self {
            bitmap: None,
            transform: Affine::IDENTITY.to_css(),
        }
    }

    pub fn width(&self) -> u32 {
        self.bitmap.as_ref().map(|b| b.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.bitmap.as_ref().map(|b| b.height()).unwrap_or(0)
    }

    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    /// Replace the contents with a freshly delivered bitmap
    pub fn draw_image(&mut self, bitmap: Bitmap) {
        self.bitmap = Some(bitmap);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformLayer {
    matrix: Affine,
    pub canvas: Canvas,
}

impl TransformLayer {
    pub fn matrix(&self) -> &Affine {
        &self.matrix
    }

    /// CSS transform string currently applied
    pub fn transform(&self) -> String {
        self.matrix.to_css()
    }

    pub fn set_transform(&mut self, matrix: Affine) {
        self.matrix = matrix;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    size: [u32; 2],
    pub transform_layer: TransformLayer,
}

impl Container {
    pub fn new(size: [u32; 2]) -> Self {
        Self {
            size,
            transform_layer: TransformLayer {
                matrix: Affine::IDENTITY,
                canvas: Canvas::new(),
            },
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn canvas(&self) -> &Canvas {
        &self.transform_layer.canvas
    }
}
