//! Rendering on top of [`RenderBackend`](crate::device::RenderBackend).
//!
//! Convention:
//! - scene space is `[-aspect, aspect] × [-1, 1]`, +Y up, origin at the center
//! - every GPU-owning type has an idempotent `dispose(&mut backend)`; dropping
//!   without it leaks the backend handles

pub mod buffer;
mod ctx;
mod particles;
mod program;
pub mod screen;
pub mod shapes;

pub use buffer::{BufferLayout, Subrange, SubrangeDesc, VertexBuffer};
pub use ctx::RenderContext;
pub use particles::{ParticleSet, PointSize};
pub use program::{Program, Programs};
pub use screen::{DirectScreen, MultisampleScreen, Screen, ScreenConfig, ScreenState};
pub use shapes::{Shape, ShapeKind};
