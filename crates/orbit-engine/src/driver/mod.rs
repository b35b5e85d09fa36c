//! Per-frame orchestration of simulation, uploads and rendering.

mod config;
mod render_loop;

pub use config::LoopConfig;
pub use render_loop::RenderLoop;
