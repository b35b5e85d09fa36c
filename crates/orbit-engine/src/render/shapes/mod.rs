//! Quad and circle drawables.

mod geometry;
mod shape;

pub use geometry::ShapeKind;
pub use shape::Shape;
