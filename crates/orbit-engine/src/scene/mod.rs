//! Scene registry.
//!
//! Responsibilities:
//! - own every drawable behind a stable typed key
//! - keep insertion order, which is also draw order
//! - locate drawables by variant (the particle set) without type inspection

mod drawable;
mod registry;

pub use drawable::Drawable;
pub use registry::{DrawableKey, Scene};
