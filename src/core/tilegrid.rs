use crate::core::geo::{Extent, Point, TileCoord};
use crate::{MapError, Result};

/// Inclusive range of tile columns and rows at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub z: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.min_x..=self.max_x)
            .flat_map(move |x| (self.min_y..=self.max_y).map(move |y| TileCoord::new(x, y, self.z)))
    }

    pub fn len(&self) -> usize {
        ((self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tile grid anchored at the top-left corner of its extent
/// Allowed drift from an exact factor of two between levels
const HALVING_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    extent: Extent,
    resolutions: Vec<f64>,
    tile_size: u32,
}

impl TileGrid {
    /// `resolutions` must halve from each level to the next, so a tile's
    /// parent is always `(x / 2, y / 2, z - 1)`
    pub fn new(extent: Extent, resolutions: Vec<f64>, tile_size: u32) -> Result<Self> {
        if resolutions.is_empty() {
            return Err(MapError::Config("tile grid needs at least one resolution".into()).into());
        }
        if resolutions.windows(2).any(|w| w[0] <= w[1]) {
            return Err(MapError::Config("tile grid resolutions must decrease".into()).into());
        }
        if let Some(pair) = resolutions
            .windows(2)
            .find(|w| (w[0] / w[1] - 2.0).abs() > HALVING_TOLERANCE)
        {
            return Err(MapError::Config(format!(
                "tile grid resolutions must halve per level, got {} then {}",
                pair[0], pair[1]
            ))
            .into());
        }
        if tile_size == 0 {
            return Err(MapError::Config("tile size must be positive".into()).into());
        }
        Ok(Self {
            extent,
            resolutions,
            tile_size,
        })
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn resolutions(&self) -> &[f64] {
        &self.resolutions
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn max_zoom(&self) -> u8 {
        (self.resolutions.len() - 1) as u8
    }

    pub fn resolution(&self, z: u8) -> Option<f64> {
        self.resolutions.get(z as usize).copied()
    }

    /// Zoom level whose resolution is nearest to `resolution`
    pub fn z_for_resolution(&self, resolution: f64) -> u8 {
        let n = self.resolutions.len();
        if resolution >= self.resolutions[0] {
            return 0;
        }
        if resolution <= self.resolutions[n - 1] {
            return (n - 1) as u8;
        }
        for i in 1..n {
            let upper = self.resolutions[i - 1];
            let lower = self.resolutions[i];
            if resolution == lower {
                return i as u8;
            }
            if upper > resolution && resolution > lower {
                return if upper - resolution < resolution - lower {
                    (i - 1) as u8
                } else {
                    i as u8
                };
            }
        }
        (n - 1) as u8
    }

    fn span(&self, z: u8) -> Option<f64> {
        self.resolution(z).map(|r| r * self.tile_size as f64)
    }

    fn tiles_across(&self, z: u8) -> Option<(u32, u32)> {
        let span = self.span(z)?;
        Some((
            (self.extent.width() / span).ceil() as u32,
            (self.extent.height() / span).ceil() as u32,
        ))
    }

    /// Tiles at `z` covering `extent`, clipped to the grid
    pub fn tile_range_for_extent(&self, extent: &Extent, z: u8) -> Option<TileRange> {
        let span = self.span(z)?;
        let visible = self.extent.intersection(extent)?;
        let (cols, rows) = self.tiles_across(z)?;
        if cols == 0 || rows == 0 {
            return None;
        }
        let origin = self.extent.top_left();
        let clamp_col = |v: f64| (v.max(0.0) as u32).min(cols - 1);
        let clamp_row = |v: f64| (v.max(0.0) as u32).min(rows - 1);

        let min_x = clamp_col(((visible.min_x - origin.x) / span).floor());
        let max_x = clamp_col(((visible.max_x - origin.x) / span).ceil() - 1.0);
        let min_y = clamp_row(((origin.y - visible.max_y) / span).floor());
        let max_y = clamp_row(((origin.y - visible.min_y) / span).ceil() - 1.0);

        Some(TileRange {
            z,
            min_x,
            max_x: max_x.max(min_x),
            min_y,
            max_y: max_y.max(min_y),
        })
    }

    pub fn tile_extent(&self, coord: &TileCoord) -> Option<Extent> {
        let span = self.span(coord.z)?;
        let origin = self.extent.top_left();
        let min_x = origin.x + coord.x as f64 * span;
        let max_y = origin.y - coord.y as f64 * span;
        Some(Extent::new(min_x, max_y - span, min_x + span, max_y))
    }

    pub fn tile_center(&self, coord: &TileCoord) -> Option<Point> {
        self.tile_extent(coord).map(|e| e.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TileGrid {
        TileGrid::new(
            Extent::new(0.0, 0.0, 1024.0, 1024.0),
            vec![4.0, 2.0, 1.0],
            256,
        )
        .unwrap()
    }

    #[test]
    fn test_z_for_resolution_picks_nearest() {
        let grid = grid();
        assert_eq!(grid.z_for_resolution(10.0), 0);
        assert_eq!(grid.z_for_resolution(2.0), 1);
        assert_eq!(grid.z_for_resolution(3.5), 0);
        assert_eq!(grid.z_for_resolution(2.9), 1);
        assert_eq!(grid.z_for_resolution(1.4), 2);
        assert_eq!(grid.z_for_resolution(0.1), 2);
    }

    #[test]
    fn test_tile_range_and_extent() {
        let grid = grid();
        let range = grid
            .tile_range_for_extent(&Extent::new(0.0, 0.0, 1024.0, 1024.0), 2)
            .unwrap();
        assert_eq!((range.min_x, range.max_x, range.min_y, range.max_y), (0, 3, 0, 3));
        assert_eq!(range.len(), 16);

        // top-left tile is row 0
        let top_left = grid.tile_extent(&TileCoord::new(0, 0, 2)).unwrap();
        assert_eq!(top_left, Extent::new(0.0, 768.0, 256.0, 1024.0));
        assert_eq!(
            grid.tile_center(&TileCoord::new(0, 0, 2)),
            Some(Point::new(128.0, 896.0))
        );
    }

    #[test]
    fn test_tile_range_outside_grid() {
        let grid = grid();
        assert!(grid
            .tile_range_for_extent(&Extent::new(2000.0, 2000.0, 3000.0, 3000.0), 1)
            .is_none());
    }

    #[test]
    fn test_rejects_increasing_resolutions() {
        assert!(TileGrid::new(Extent::new(0.0, 0.0, 1.0, 1.0), vec![1.0, 2.0], 256).is_err());
    }

    #[test]
    fn test_rejects_resolutions_that_do_not_halve() {
        let extent = Extent::new(0.0, 0.0, 1.0, 1.0);
        assert!(TileGrid::new(extent, vec![9.0, 3.0, 1.0], 256).is_err());
        assert!(TileGrid::new(extent, vec![8.0, 4.0, 2.0, 1.0, 0.5], 256).is_ok());
    }
}
