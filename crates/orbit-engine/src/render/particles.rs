use crate::device::{BufferUsage, ElementType, RenderBackend, Topology};
use crate::error::Result;
use crate::render::buffer::{SubrangeDesc, VertexBuffer};
use crate::render::{Program, RenderContext};
use crate::sim::ParticlePool;

/// Sprite size of a particle.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PointSize {
    /// Fixed size in pixels.
    Pixels(f32),
    /// Fraction of half the viewport height, times the context scale.
    Scale(f32),
}

impl PointSize {
    pub fn pixels(self, ctx: &RenderContext) -> f32 {
        match self {
            PointSize::Pixels(px) => px,
            PointSize::Scale(s) => s * ctx.viewport.height as f32 * 0.5 * ctx.scale,
        }
    }
}

impl Default for PointSize {
    fn default() -> Self {
        PointSize::Pixels(10.0)
    }
}

const POSITIONS: usize = 0;
const VELOCITIES: usize = 1;

fn subranges(capacity: usize) -> [SubrangeDesc; 2] {
    [
        SubrangeDesc::instance(0, ElementType::Float(2), capacity),
        SubrangeDesc::instance(1, ElementType::Float(2), capacity),
    ]
}

/// A particle pool plus the stream buffer its state is uploaded to.
///
/// The buffer is recreated, never resized, when the live count outgrows it.
#[derive(Debug)]
pub struct ParticleSet {
    pool: ParticlePool,
    buffer: VertexBuffer,
    point_size: PointSize,
}

impl ParticleSet {
    pub const INITIAL_CAPACITY: usize = 1000;

    pub fn new(
        backend: &mut dyn RenderBackend,
        pool: ParticlePool,
        point_size: PointSize,
        initial_capacity: usize,
    ) -> Result<Self> {
        let buffer = VertexBuffer::create(
            backend,
            &subranges(initial_capacity.max(1)),
            BufferUsage::Stream,
        )?;
        Ok(Self {
            pool,
            buffer,
            point_size,
        })
    }

    pub fn step(&mut self, dt: f32) {
        self.pool.step(dt);
    }

    /// Grows the buffer if needed, then uploads positions and velocities.
    pub fn sync(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        let live = self.pool.len();
        if live > self.buffer.capacity() {
            log::debug!(
                "particle buffer: {} -> {live} particles",
                self.buffer.capacity()
            );
            let grown = VertexBuffer::create(backend, &subranges(live), BufferUsage::Stream)?;
            let mut old = std::mem::replace(&mut self.buffer, grown);
            old.dispose(backend);
        }

        let snap = self.pool.snapshot();
        self.buffer.update_subrange(backend, POSITIONS, snap.positions)?;
        self.buffer.update_subrange(backend, VELOCITIES, snap.velocities)?;
        Ok(())
    }

    pub fn draw(&self, backend: &mut dyn RenderBackend, program: &mut Program, ctx: &RenderContext) {
        let count = self.pool.len() as u32;
        if count == 0 {
            return;
        }

        program.bind(backend);
        program.matrix_4fv(backend, "projection", &ctx.projection);
        program.uniform_1f(backend, "point_size", self.point_size.pixels(ctx));
        program.uniform_2f(
            backend,
            "viewport",
            ctx.viewport.width as f32,
            ctx.viewport.height as f32,
        );

        self.buffer.bind(backend);
        backend.draw(Topology::TriangleStrip, 0..4, 0..count);
    }

    #[inline]
    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    #[inline]
    pub fn pool_mut(&mut self) -> &mut ParticlePool {
        &mut self.pool
    }

    #[inline]
    pub fn point_size(&self) -> PointSize {
        self.point_size
    }

    pub fn set_point_size(&mut self, point_size: PointSize) {
        self.point_size = point_size;
    }

    /// Particles the current buffer can hold.
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        self.buffer.dispose(backend);
    }
}
