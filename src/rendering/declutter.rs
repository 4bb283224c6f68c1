//! Collision-based label/marker suppression across all layers of a pass

use crate::core::geo::Point;
use crate::rendering::surface::{ImageRegion, OffscreenSurface, Rgba};
use rstar::primitives::Rectangle;
use rstar::{RTree, AABB};
use tiny_skia::Pixmap;

/// What to draw once a symbol wins its place
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolDraw {
    Marker {
        center: Point,
        radius: f32,
        color: Rgba,
    },
    Icon {
        region: ImageRegion,
        top_left: Point,
    },
}

/// A symbol competing for screen space, in device pixels
#[derive(Debug, Clone, PartialEq)]
pub struct DeclutterItem {
    pub min: Point,
    pub max: Point,
    pub draw: SymbolDraw,
}

impl DeclutterItem {
    pub fn marker(center: Point, radius: f32, color: Rgba, padding: f64) -> Self {
        let r = radius as f64 + padding;
        Self {
            min: Point::new(center.x - r, center.y - r),
            max: Point::new(center.x + r, center.y + r),
            draw: SymbolDraw::Marker {
                center,
                radius,
                color,
            },
        }
    }

    pub fn icon(center: Point, region: ImageRegion, padding: f64) -> Self {
        let half_w = region.width as f64 / 2.0;
        let half_h = region.height as f64 / 2.0;
        let top_left = Point::new(center.x - half_w, center.y - half_h);
        Self {
            min: Point::new(top_left.x - padding, top_left.y - padding),
            max: Point::new(center.x + half_w + padding, center.y + half_h + padding),
            draw: SymbolDraw::Icon { region, top_left },
        }
    }

    fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min.x, self.min.y], [self.max.x, self.max.y])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclutterOutcome {
    pub drawn: u32,
    pub hidden: u32,
}

/// Symbols are placed first come, first served in the order they were pushed
#[derive(Default)]
pub struct DeclutterTree {
    items: Vec<DeclutterItem>,
}

impl DeclutterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DeclutterItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that survive collision testing, in placement order
    pub fn place(&mut self) -> (Vec<DeclutterItem>, u32) {
        let mut placed: RTree<Rectangle<[f64; 2]>> = RTree::new();
        let mut kept = Vec::with_capacity(self.items.len());
        let mut hidden = 0;
        for item in self.items.drain(..) {
            let envelope = item.envelope();
            if placed
                .locate_in_envelope_intersecting(&envelope)
                .next()
                .is_some()
            {
                hidden += 1;
                continue;
            }
            placed.insert(Rectangle::from_corners(envelope.lower(), envelope.upper()));
            kept.push(item);
        }
        (kept, hidden)
    }

    /// Place and draw every surviving symbol, emptying the tree
    pub fn render(&mut self, surface: &mut OffscreenSurface, atlas: Option<&Pixmap>) -> DeclutterOutcome {
        let (kept, hidden) = self.place();
        let mut drawn = 0;
        for item in kept {
            match item.draw {
                SymbolDraw::Marker {
                    center,
                    radius,
                    color,
                } => surface.fill_circle(center, radius, color),
                SymbolDraw::Icon { region, top_left } => match atlas {
                    Some(atlas) => surface.draw_image(atlas, region, top_left),
                    None => continue,
                },
            }
            drawn += 1;
        }
        if hidden > 0 {
            log::debug!("declutter hid {} of {} symbols", hidden, hidden + drawn);
        }
        DeclutterOutcome { drawn, hidden }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_symbols_are_suppressed() {
        let mut tree = DeclutterTree::new();
        tree.push(DeclutterItem::marker(Point::new(10.0, 10.0), 3.0, Rgba::BLACK, 1.0));
        tree.push(DeclutterItem::marker(Point::new(12.0, 11.0), 3.0, Rgba::BLACK, 1.0));
        tree.push(DeclutterItem::marker(Point::new(40.0, 40.0), 3.0, Rgba::BLACK, 1.0));

        let (kept, hidden) = tree.place();
        assert_eq!(hidden, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].min, Point::new(6.0, 6.0));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_render_draws_survivors() {
        let mut surface = OffscreenSurface::new(50, 50).unwrap();
        let mut tree = DeclutterTree::new();
        tree.push(DeclutterItem::marker(Point::new(25.0, 25.0), 5.0, Rgba::new(0, 0, 255, 255), 0.0));
        tree.push(DeclutterItem::marker(Point::new(26.0, 25.0), 5.0, Rgba::new(255, 0, 0, 255), 0.0));

        let outcome = tree.render(&mut surface, None);
        assert_eq!(outcome, DeclutterOutcome { drawn: 1, hidden: 1 });
        assert_eq!(surface.pixel(25, 25), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_icons_without_atlas_are_skipped() {
        let mut surface = OffscreenSurface::new(20, 20).unwrap();
        let mut tree = DeclutterTree::new();
        let region = ImageRegion {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        };
        tree.push(DeclutterItem::icon(Point::new(10.0, 10.0), region, 0.0));
        assert_eq!(tree.render(&mut surface, None).drawn, 0);
    }
}
