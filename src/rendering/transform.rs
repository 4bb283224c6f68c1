//! 2D affine transforms and latency compensation
//!
//! Matrices use the canvas/CSS layout `[a, b, c, d, e, f]`, mapping
//! `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`.

use crate::core::geo::Point;
use crate::core::view::{FrameState, ViewState};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [f64; 6]);

impl Affine {
    pub const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Affine([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    /// Translate by `(dx2, dy2)`, rotate by `angle`, scale by `(sx, sy)`,
    /// then translate by `(dx1, dy1)`.
    pub fn compose(dx1: f64, dy1: f64, sx: f64, sy: f64, angle: f64, dx2: f64, dy2: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Affine([
            sx * cos,
            sy * sin,
            -sx * sin,
            sy * cos,
            dx2 * sx * cos - dy2 * sx * sin + dx1,
            dx2 * sy * sin + dy2 * sy * cos + dy1,
        ])
    }

    /// `self` applied after `other`
    pub fn multiply(&self, other: &Affine) -> Affine {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Affine([
            a1 * a2 + c1 * b2,
            b1 * a2 + d1 * b2,
            a1 * c2 + c1 * d2,
            b1 * c2 + d1 * d2,
            a1 * e2 + c1 * f2 + e1,
            b1 * e2 + d1 * f2 + f1,
        ])
    }

    pub fn apply(&self, point: &Point) -> Point {
        let [a, b, c, d, e, f] = self.0;
        Point::new(a * point.x + c * point.y + e, b * point.x + d * point.y + f)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// CSS `matrix(...)` string
    pub fn to_css(&self) -> String {
        self.to_string()
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "matrix({a}, {b}, {c}, {d}, {e}, {g})")
    }
}

/// Map coordinates to device pixels of the frame's surface
pub fn coordinate_to_pixel(frame: &FrameState) -> Affine {
    let view = &frame.view_state;
    let ratio = frame.pixel_ratio;
    Affine::compose(
        frame.size[0] as f64 * ratio / 2.0,
        frame.size[1] as f64 * ratio / 2.0,
        ratio / view.resolution,
        -ratio / view.resolution,
        -view.rotation,
        -view.center.x,
        -view.center.y,
    )
}

/// Correction mapping a bitmap rendered for one view onto a newer view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensation {
    /// Pixel offset between the two centers
    pub translation: Point,
    pub scale: Point,
    pub rotation: f64,
    pub matrix: Affine,
}

impl Compensation {
    pub fn identity() -> Self {
        Self {
            translation: Point::new(0.0, 0.0),
            scale: Point::new(1.0, 1.0),
            rotation: 0.0,
            matrix: Affine::IDENTITY,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.matrix.is_identity()
    }
}

/// Transform that makes a bitmap rendered for `rendered` line up with `now`.
///
/// Rotated views get the identity: the correction is not valid under
/// rotation, so a slightly lagging image is shown instead of a wrong one.
pub fn compensate(now: &ViewState, rendered: &ViewState) -> Compensation {
    if now.rotation != 0.0 {
        return Compensation::identity();
    }
    let resolution = now.resolution;
    let translation = Point::new(
        (rendered.center.x - now.center.x) / resolution,
        (now.center.y - rendered.center.y) / resolution,
    );
    let scale = rendered.resolution / resolution;
    let rotation = now.rotation - rendered.rotation;
    Compensation {
        translation,
        scale: Point::new(scale, scale),
        rotation,
        matrix: Affine::compose(translation.x, translation.y, scale, scale, rotation, 0.0, 0.0),
    }
}
