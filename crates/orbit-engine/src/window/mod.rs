//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and windows, and gives each window its own
//! [`crate::device::WgpuBackend`].

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
