//! Style documents, sprites and the rules built from them

pub mod apply;
pub mod document;
pub mod loader;
pub mod sprite;

pub use apply::{substitute_font, BasicStyleApplier, PaintRule, StyleApplier, StyleRule};
pub use document::{bucketize, Bucket, StyleDocument, StyleLayer};
pub use loader::{load_style, StyleBundle};
pub use sprite::{sprite_urls, SpriteAtlas};
