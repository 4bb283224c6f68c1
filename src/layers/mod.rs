pub mod vector_tile;

pub use vector_tile::VectorTileLayer;
