use std::f32::consts::TAU;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{FrameStatus, RenderBackend};
use crate::error::Result;
use crate::render::screen;
use crate::render::{ParticleSet, PointSize, Programs, RenderContext, Screen, ScreenState, Shape};
use crate::scene::{DrawableKey, Scene};
use crate::sim::ParticlePool;

use super::LoopConfig;

/// Drives one frame per [`RenderLoop::tick`]:
/// 1) step the particles by `dt`
/// 2) grow the particle buffer if the live count outgrew it
/// 3) upload positions and velocities
/// 4) on a pending resize, rebuild the projection and the screen targets
/// 5) capture the scene offscreen and composite it to the screen
pub struct RenderLoop {
    config: LoopConfig,
    programs: Programs,
    screen: Box<dyn Screen>,
    scene: Scene,
    particles: Option<DrawableKey>,
    context: RenderContext,
    resize_pending: bool,
    rng: StdRng,
    disposed: bool,
}

impl RenderLoop {
    pub fn new(backend: &mut dyn RenderBackend, config: LoopConfig) -> Result<Self> {
        let mut programs = Programs::compile(backend)?;
        let screen = match screen::select(backend, config.screen()) {
            Ok(s) => s,
            Err(e) => {
                programs.dispose(backend);
                return Err(e);
            }
        };

        let mut this = Self {
            context: RenderContext::new(backend.surface_size(), config.scale),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            programs,
            screen,
            scene: Scene::new(),
            particles: None,
            resize_pending: true,
            disposed: false,
        };

        if let Err(e) = this.populate(backend) {
            log::error!("scene setup failed: {e}");
            this.dispose(backend);
            return Err(e);
        }

        log::info!(
            "render loop ready: {} drawables, {} particles",
            this.scene.len(),
            this.particles().map_or(0, |p| p.pool().len())
        );
        Ok(this)
    }

    /// Ring of alternating circles and 2×1 quads, then the particle grid on top.
    fn populate(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        let n = self.config.ring_shapes;
        for i in 0..n {
            let theta = TAU * i as f32 / n as f32;
            let pos = Vec2::new(theta.cos(), theta.sin()) * 0.5;

            let mut shape = match i % 4 {
                0 => Shape::circle(backend, self.config.circle_resolution, true)?,
                1 => Shape::circle(backend, self.config.circle_resolution, false)?,
                2 => Shape::quad(backend, 2.0, 1.0, true)?,
                _ => Shape::quad(backend, 2.0, 1.0, false)?,
            };
            shape.set_position(pos);
            shape.set_scale(0.025);
            shape.set_color([2.0 * pos.x, 2.0 * pos.y, 0.8, 0.8]);
            self.scene.insert(shape);
        }

        let set = self.build_particles(backend, self.config.point_size)?;
        self.particles = Some(self.scene.insert(set));
        Ok(())
    }

    fn build_particles(
        &self,
        backend: &mut dyn RenderBackend,
        point_size: PointSize,
    ) -> Result<ParticleSet> {
        let mut pool = ParticlePool::with_integrator(
            self.config.initial_capacity,
            Box::new(self.config.integrator),
        )?;
        pool.seed(self.config.grid_size)?;
        ParticleSet::new(backend, pool, point_size, self.config.initial_capacity)
    }

    pub fn tick(&mut self, backend: &mut dyn RenderBackend, dt: f32) -> Result<()> {
        if self.disposed {
            return Ok(());
        }

        if let Some(set) = self.particles_mut() {
            set.step(dt);
            set.sync(backend)?;
        }
        self.random_walk();

        if self.resize_pending {
            let size = backend.surface_size();
            if size.is_empty() {
                log::trace!("resize deferred: surface is empty");
                return Ok(());
            }
            self.resize_pending = false;
            self.context.resize(size);
            self.screen.resize(backend, size)?;
        }

        if self.screen.state() == ScreenState::Failed {
            return Ok(());
        }
        if backend.begin_frame()? == FrameStatus::Skip {
            return Ok(());
        }

        self.screen.begin_capture(backend);
        self.scene
            .draw_all(backend, &mut self.programs, &self.context);
        self.screen.end_capture_and_composite(backend);

        backend.end_frame()
    }

    fn random_walk(&mut self) {
        let amplitude = self.config.jitter;
        if amplitude == 0.0 {
            return;
        }
        for shape in self.scene.shapes_mut().filter(|s| s.is_circle()) {
            let step = Vec2::new(
                self.rng.gen_range(-0.5..0.5),
                self.rng.gen_range(-0.5..0.5),
            );
            shape.translate(step * amplitude);
        }
    }

    /// Rebuilds projection and screen targets at the next tick.
    pub fn request_resize(&mut self) {
        self.resize_pending = true;
    }

    /// Replaces the particle set with a freshly seeded one, keeping its point size
    /// and draw position.
    pub fn reset_particles(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let point_size = self
            .particles()
            .map_or(self.config.point_size, |p| p.point_size());
        let set = self.build_particles(backend, point_size)?;

        match self.particles.filter(|k| self.scene.get(*k).is_some()) {
            Some(key) => {
                if let Some(mut old) = self.scene.replace(key, set) {
                    old.dispose(backend);
                }
            }
            None => self.particles = Some(self.scene.insert(set)),
        }
        log::debug!("particles reset");
        Ok(())
    }

    /// Flips the composite blur; returns the new setting.
    pub fn toggle_blur(&mut self) -> bool {
        let blur = !self.screen.blur();
        self.screen.set_blur(blur);
        blur
    }

    pub fn particles(&self) -> Option<&ParticleSet> {
        self.scene.get(self.particles?)?.as_particles()
    }

    pub fn particles_mut(&mut self) -> Option<&mut ParticleSet> {
        self.scene.get_mut(self.particles?)?.as_particles_mut()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn screen(&self) -> &dyn Screen {
        self.screen.as_ref()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Releases every GPU resource. Later calls, and ticks, do nothing.
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        if self.disposed {
            return;
        }
        self.scene.dispose(backend);
        self.screen.dispose(backend);
        self.programs.dispose(backend);
        self.particles = None;
        self.disposed = true;
    }
}

impl std::fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("drawables", &self.scene.len())
            .field("screen", &self.screen.state())
            .field("blur", &self.screen.blur())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Extent, HeadlessBackend};
    use crate::scene::Drawable;

    fn small() -> LoopConfig {
        LoopConfig {
            grid_size: 4,
            ring_shapes: 8,
            circle_resolution: 8,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn ring_cycles_through_four_shape_variants() {
        let mut backend = HeadlessBackend::new(Extent::new(32, 32));
        let lp = RenderLoop::new(&mut backend, small()).unwrap();

        let shapes: Vec<&Shape> = lp.scene().iter().filter_map(|(_, d)| d.as_shape()).collect();
        assert_eq!(shapes.len(), 8);
        assert!(shapes[0].is_circle() && shapes[0].is_filled());
        assert!(shapes[1].is_circle() && !shapes[1].is_filled());
        assert!(!shapes[2].is_circle() && shapes[2].is_filled());
        assert!(!shapes[3].is_circle() && !shapes[3].is_filled());
        assert!((shapes[0].position() - Vec2::new(0.5, 0.0)).length() < 1e-6);

        let last = lp.scene().iter().last().map(|(_, d)| d);
        assert!(matches!(last, Some(Drawable::Particles(_))));
    }

    #[test]
    fn circles_random_walk_quads_stay() {
        let mut backend = HeadlessBackend::new(Extent::new(32, 32));
        let mut lp = RenderLoop::new(&mut backend, small()).unwrap();
        let before: Vec<Vec2> = lp
            .scene()
            .iter()
            .filter_map(|(_, d)| d.as_shape().map(Shape::position))
            .collect();

        lp.tick(&mut backend, 1.0 / 60.0).unwrap();

        let after: Vec<(bool, Vec2)> = lp
            .scene()
            .iter()
            .filter_map(|(_, d)| d.as_shape().map(|s| (s.is_circle(), s.position())))
            .collect();
        for (b, (circle, a)) in before.iter().zip(&after) {
            let moved = (*a - *b).length();
            if *circle {
                assert!(moved <= 0.001);
            } else {
                assert_eq!(moved, 0.0);
            }
        }
    }

    #[test]
    fn tick_on_empty_surface_defers_resize() {
        let mut backend = HeadlessBackend::new(Extent::new(0, 0));
        let mut lp = RenderLoop::new(&mut backend, small()).unwrap();
        lp.tick(&mut backend, 1.0 / 60.0).unwrap();
        assert_eq!(lp.screen().state(), ScreenState::Uninitialized);

        backend.resize_surface(Extent::new(16, 16));
        lp.tick(&mut backend, 1.0 / 60.0).unwrap();
        assert_eq!(lp.screen().state(), ScreenState::Resolved);
        assert_eq!(lp.context().viewport, Extent::new(16, 16));
    }

    #[test]
    fn dispose_releases_all_and_stops_ticking() {
        let mut backend = HeadlessBackend::new(Extent::new(16, 16));
        let mut lp = RenderLoop::new(&mut backend, small()).unwrap();
        lp.tick(&mut backend, 1.0 / 60.0).unwrap();

        lp.dispose(&mut backend);
        lp.dispose(&mut backend);
        assert_eq!(backend.live_resources(), 0);

        let frames = backend.frames_completed();
        lp.tick(&mut backend, 1.0 / 60.0).unwrap();
        assert_eq!(backend.frames_completed(), frames);
    }
}
