pub mod engine;
pub mod frame;

pub use engine::{EngineEvent, RenderEngine};
pub use frame::RenderFrame;
