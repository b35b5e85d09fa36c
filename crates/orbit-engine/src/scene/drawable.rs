use crate::device::RenderBackend;
use crate::render::{ParticleSet, Programs, RenderContext, Shape};

/// Anything the scene can draw.
#[derive(Debug)]
pub enum Drawable {
    Shape(Shape),
    Particles(ParticleSet),
}

impl Drawable {
    pub fn draw(&self, backend: &mut dyn RenderBackend, programs: &mut Programs, ctx: &RenderContext) {
        match self {
            Drawable::Shape(s) => s.draw(backend, &mut programs.flat, ctx),
            Drawable::Particles(p) => p.draw(backend, &mut programs.particles, ctx),
        }
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        match self {
            Drawable::Shape(s) => s.dispose(backend),
            Drawable::Particles(p) => p.dispose(backend),
        }
    }

    pub fn as_shape(&self) -> Option<&Shape> {
        match self {
            Drawable::Shape(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_shape_mut(&mut self) -> Option<&mut Shape> {
        match self {
            Drawable::Shape(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_particles(&self) -> Option<&ParticleSet> {
        match self {
            Drawable::Particles(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_particles_mut(&mut self) -> Option<&mut ParticleSet> {
        match self {
            Drawable::Particles(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Shape> for Drawable {
    fn from(s: Shape) -> Self {
        Drawable::Shape(s)
    }
}

impl From<ParticleSet> for Drawable {
    fn from(p: ParticleSet) -> Self {
        Drawable::Particles(p)
    }
}
