pub mod declutter;
pub mod presentation;
pub mod surface;
pub mod transform;

pub use declutter::{DeclutterItem, DeclutterTree};
pub use presentation::{Canvas, Container, TransformLayer};
pub use surface::{Bitmap, OffscreenSurface, Rgba};
pub use transform::{compensate, Affine, Compensation};
