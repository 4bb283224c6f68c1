use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in projected map units or in pixels, depending on context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Rotates the point around `origin` by `angle` radians (counter-clockwise)
    pub fn rotate_around(&self, origin: &Point, angle: f64) -> Point {
        let (sin, cos) = angle.sin_cos();
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        Point::new(
            origin.x + dx * cos - dy * sin,
            origin.y + dx * sin + dy * cos,
        )
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Axis-aligned rectangle in projected map units: `[min_x, min_y, max_x, max_y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest extent containing every point
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut extent = Self::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            extent.extend(p);
        }
        Some(extent)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.min_x, self.max_y)
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    /// Touching edges count as intersecting
    pub fn intersects(&self, other: &Extent) -> bool {
        !(other.max_x < self.min_x
            || other.min_x > self.max_x
            || other.max_y < self.min_y
            || other.min_y > self.max_y)
    }

    pub fn extend(&mut self, point: &Point) {
        self.min_x = self.min_x.min(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_x = self.max_x.max(point.x);
        self.max_y = self.max_y.max(point.y);
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }
}

/// Grid position of a tile; `y` grows downwards from the top of the grid extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Ancestors from the direct parent up to (and including) `min_zoom`
    pub fn ancestors(&self, min_zoom: u8) -> impl Iterator<Item = TileCoord> {
        std::iter::successors(self.parent(), |c| c.parent()).take_while(move |c| c.z >= min_zoom)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// A tile of a particular source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub source: String,
    pub coord: TileCoord,
}

impl TileKey {
    pub fn new(source: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            source: source.into(),
            coord,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.coord)
    }
}
