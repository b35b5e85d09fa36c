use glam::{Mat4, Vec2, Vec3};

use crate::device::{BufferUsage, ElementType, RenderBackend, Topology};
use crate::error::Result;
use crate::render::buffer::{SubrangeDesc, VertexBuffer};
use crate::render::{Program, RenderContext};

use super::geometry::{self, ShapeKind};

/// A flat-colored quad or circle with its own static vertex buffer.
#[derive(Debug)]
pub struct Shape {
    kind: ShapeKind,
    fill: bool,
    position: Vec2,
    scale: f32,
    color: [f32; 4],
    model: Mat4,

    topology: Topology,
    vertex_count: u32,
    buffer: VertexBuffer,
}

impl Shape {
    pub fn new(backend: &mut dyn RenderBackend, kind: ShapeKind, fill: bool) -> Result<Self> {
        let (topology, vertices) = geometry::build(kind, fill);
        let mut buffer = VertexBuffer::create(
            backend,
            &[SubrangeDesc::vertex(0, ElementType::Float(2), vertices.len())],
            BufferUsage::Static,
        )?;
        if let Err(e) = buffer.update_subrange(backend, 0, &vertices) {
            buffer.dispose(backend);
            return Err(e);
        }

        Ok(Self {
            kind,
            fill,
            position: Vec2::ZERO,
            scale: 1.0,
            color: [1.0; 4],
            model: Mat4::IDENTITY,
            topology,
            vertex_count: vertices.len() as u32,
            buffer,
        })
    }

    pub fn quad(
        backend: &mut dyn RenderBackend,
        width: f32,
        height: f32,
        fill: bool,
    ) -> Result<Self> {
        Self::new(backend, ShapeKind::Quad { width, height }, fill)
    }

    pub fn circle(backend: &mut dyn RenderBackend, resolution: u32, fill: bool) -> Result<Self> {
        Self::new(backend, ShapeKind::Circle { resolution }, fill)
    }

    #[inline]
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.fill
    }

    #[inline]
    pub fn is_circle(&self) -> bool {
        matches!(self.kind, ShapeKind::Circle { .. })
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.rebuild_model();
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.set_position(self.position + delta);
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
        self.rebuild_model();
    }

    #[inline]
    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    /// Straight (non-premultiplied) RGBA.
    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }

    #[inline]
    pub fn model(&self) -> Mat4 {
        self.model
    }

    fn rebuild_model(&mut self) {
        self.model = Mat4::from_translation(self.position.extend(0.0))
            * Mat4::from_scale(Vec3::new(self.scale, self.scale, 1.0));
    }

    pub fn draw(&self, backend: &mut dyn RenderBackend, program: &mut Program, ctx: &RenderContext) {
        program.bind(backend);
        program.matrix_4fv(backend, "projection", &ctx.projection);
        program.matrix_4fv(backend, "model", &self.model);
        program.uniform_4f(backend, "color", self.color);

        self.buffer.bind(backend);
        backend.draw(self.topology, 0..self.vertex_count, 0..1);
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        self.buffer.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Extent, HeadlessBackend};
    use crate::render::program::flat_desc;

    #[test]
    fn failed_upload_releases_the_buffer() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        backend.set_fail_uploads(true);
        assert!(Shape::quad(&mut backend, 2.0, 1.0, true).is_err());
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn model_tracks_position_and_scale() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let mut shape = Shape::circle(&mut backend, 16, true).unwrap();

        shape.set_position(Vec2::new(0.5, 0.0));
        shape.set_scale(0.025);
        shape.translate(Vec2::new(0.0, 0.25));

        let p = shape.model().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p.x - 0.525).abs() < 1e-6);
        assert!((p.y - 0.25).abs() < 1e-6);
    }

    #[test]
    fn draw_binds_its_own_buffer_and_uniforms() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let mut program = Program::compile(&mut backend, &flat_desc()).unwrap();
        let ctx = RenderContext::new(Extent::new(100, 100), 1.0);

        let mut shape = Shape::quad(&mut backend, 2.0, 1.0, false).unwrap();
        shape.set_color([1.0, 0.0, 0.0, 0.5]);
        shape.draw(&mut backend, &mut program, &ctx);

        let draw = &backend.draws()[0];
        assert_eq!(draw.program, "flat");
        assert_eq!(draw.topology, Topology::LineStrip);
        assert_eq!(draw.vertices, 0..5);
        assert!(draw.in_bounds);
        let expected: &[u8] = bytemuck::cast_slice(&[1.0f32, 0.0, 0.0, 0.5]);
        assert_eq!(&draw.uniforms[128..144], expected);
    }
}
