//! Orbit engine crate.
//!
//! A small 2D renderer around a particle simulation: a particle pool stepped
//! under a central force, a ring of shapes, and a multisampled offscreen
//! screen composited to the window with an optional blur.
//!
//! Everything that touches the GPU goes through [`device::RenderBackend`];
//! [`device::WgpuBackend`] drives a real window, [`device::HeadlessBackend`]
//! runs the same code in memory.

pub mod core;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod render;
pub mod scene;
pub mod sim;
pub mod time;
pub mod window;

pub use driver::{LoopConfig, RenderLoop};
pub use error::{Error, Result};
