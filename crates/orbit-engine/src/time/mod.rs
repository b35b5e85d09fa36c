//! Frame timing.
//!
//! One `FrameClock` per window; `tick()` once per presented frame gives the
//! `dt` fed to the render loop.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
