use crate::render::{ParticleSet, PointSize, ScreenConfig};
use crate::sim::CentralForce;

/// Render loop configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Particles are seeded on a `grid_size`×`grid_size` grid.
    pub grid_size: usize,
    /// Initial capacity of the pool and of the particle vertex buffer.
    pub initial_capacity: usize,
    pub point_size: PointSize,

    /// Requested samples per pixel; 1 (or an adapter without MSAA) selects the
    /// direct screen.
    pub msaa_samples: u32,
    pub clear_color: [f32; 4],
    pub blur: bool,
    /// Global scale factor for scale-relative sizes.
    pub scale: f32,

    pub integrator: CentralForce,

    /// Shapes placed on the ring around the origin.
    pub ring_shapes: usize,
    pub circle_resolution: u32,
    /// Per-tick random-walk amplitude of the circles.
    pub jitter: f32,
    /// Seed of the random walk.
    pub seed: u64,
}

impl LoopConfig {
    pub fn screen(&self) -> ScreenConfig {
        ScreenConfig {
            clear_color: self.clear_color,
            samples: self.msaa_samples,
            blur: self.blur,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            grid_size: 32,
            initial_capacity: ParticleSet::INITIAL_CAPACITY,
            point_size: PointSize::Pixels(10.0),
            msaa_samples: 4,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            blur: false,
            scale: 1.0,
            integrator: CentralForce::default(),
            ring_shapes: 30,
            circle_resolution: 64,
            jitter: 0.001,
            seed: 0x0b17,
        }
    }
}
