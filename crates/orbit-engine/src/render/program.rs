use std::collections::HashSet;

use glam::Mat4;

use crate::device::{
    BlendMode, ProgramDesc, ProgramId, RenderBackend, Resource, UniformDecl, UniformInfo,
    UniformLayout, UniformType,
};
use crate::error::Result;

/// A linked program with named uniform access.
///
/// Uniform names resolve to offsets in the program's block; an unknown name or a
/// value of the wrong type logs a warning (once per name) and is ignored.
#[derive(Debug)]
pub struct Program {
    id: Option<ProgramId>,
    label: String,
    layout: UniformLayout,
    warned: HashSet<String>,
}

impl Program {
    pub fn compile(backend: &mut dyn RenderBackend, desc: &ProgramDesc<'_>) -> Result<Self> {
        let id = backend.compile_program(desc).inspect_err(|e| log::error!("{e}"))?;
        Ok(Self {
            id: Some(id),
            label: desc.label.to_string(),
            layout: UniformLayout::new(desc.uniforms),
            warned: HashSet::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> Option<ProgramId> {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Uniform reflection lookup.
    pub fn uniform(&self, name: &str) -> Option<UniformInfo> {
        self.layout.find(name)
    }

    /// Makes this the current program.
    pub fn bind(&self, backend: &mut dyn RenderBackend) {
        if let Some(id) = self.id {
            backend.use_program(id);
        }
    }

    pub fn uniform_1i(&mut self, backend: &mut dyn RenderBackend, name: &str, v: i32) {
        self.set(backend, name, UniformType::Int, bytemuck::bytes_of(&v));
    }

    pub fn uniform_1f(&mut self, backend: &mut dyn RenderBackend, name: &str, v: f32) {
        self.set(backend, name, UniformType::Float, bytemuck::bytes_of(&v));
    }

    pub fn uniform_2f(&mut self, backend: &mut dyn RenderBackend, name: &str, x: f32, y: f32) {
        self.set(backend, name, UniformType::Vec2, bytemuck::cast_slice(&[x, y]));
    }

    pub fn uniform_4f(&mut self, backend: &mut dyn RenderBackend, name: &str, v: [f32; 4]) {
        self.set(backend, name, UniformType::Vec4, bytemuck::cast_slice(&v));
    }

    pub fn matrix_4fv(&mut self, backend: &mut dyn RenderBackend, name: &str, m: &Mat4) {
        let cols = m.to_cols_array();
        self.set(backend, name, UniformType::Mat4, bytemuck::cast_slice(&cols));
    }

    fn set(&mut self, backend: &mut dyn RenderBackend, name: &str, ty: UniformType, bytes: &[u8]) {
        let Some(id) = self.id else { return };
        match self.layout.find(name) {
            Some(info) if info.ty == ty => backend.set_uniform(id, info.offset, bytes),
            found => {
                if self.warned.insert(name.to_string()) {
                    match found {
                        Some(info) => log::warn!(
                            "`{}`: uniform `{name}` is {:?}, not {ty:?}; ignored",
                            self.label,
                            info.ty
                        ),
                        None => log::warn!("`{}`: no uniform named `{name}`; ignored", self.label),
                    }
                }
            }
        }
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(id) = self.id.take() {
            backend.release(Resource::Program(id));
        }
    }
}

// ── built-in programs ─────────────────────────────────────────────────────

pub(crate) const FLAT_UNIFORMS: &[UniformDecl] = &[
    UniformDecl::new("projection", UniformType::Mat4),
    UniformDecl::new("model", UniformType::Mat4),
    UniformDecl::new("color", UniformType::Vec4),
];

pub(crate) const PARTICLE_UNIFORMS: &[UniformDecl] = &[
    UniformDecl::new("projection", UniformType::Mat4),
    UniformDecl::new("point_size", UniformType::Float),
    UniformDecl::new("viewport", UniformType::Vec2),
];

pub(crate) const SCREEN_UNIFORMS: &[UniformDecl] = &[UniformDecl::new("blur", UniformType::Int)];

pub(crate) fn flat_desc() -> ProgramDesc<'static> {
    ProgramDesc {
        label: "flat",
        source: include_str!("shaders/flat.wgsl"),
        uniforms: FLAT_UNIFORMS,
        samples_texture: false,
        blend: BlendMode::Alpha,
    }
}

pub(crate) fn particles_desc() -> ProgramDesc<'static> {
    ProgramDesc {
        label: "particles",
        source: include_str!("shaders/particles.wgsl"),
        uniforms: PARTICLE_UNIFORMS,
        samples_texture: false,
        blend: BlendMode::Alpha,
    }
}

pub(crate) fn screen_desc() -> ProgramDesc<'static> {
    ProgramDesc {
        label: "screen",
        source: include_str!("shaders/screen.wgsl"),
        uniforms: SCREEN_UNIFORMS,
        samples_texture: true,
        blend: BlendMode::Replace,
    }
}

/// Programs shared by the scene drawables.
#[derive(Debug)]
pub struct Programs {
    pub flat: Program,
    pub particles: Program,
}

impl Programs {
    pub fn compile(backend: &mut dyn RenderBackend) -> Result<Self> {
        let mut flat = Program::compile(backend, &flat_desc())?;
        let particles = match Program::compile(backend, &particles_desc()) {
            Ok(p) => p,
            Err(e) => {
                flat.dispose(backend);
                return Err(e);
            }
        };
        Ok(Self { flat, particles })
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        self.flat.dispose(backend);
        self.particles.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Extent, HeadlessBackend, Topology};

    #[test]
    fn named_uniforms_land_in_the_draw_snapshot() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let mut program = Program::compile(&mut backend, &particles_desc()).unwrap();

        program.bind(&mut backend);
        program.uniform_1f(&mut backend, "point_size", 10.0);
        program.uniform_2f(&mut backend, "viewport", 800.0, 600.0);
        backend.draw(Topology::TriangleStrip, 0..4, 0..1);

        let uniforms = &backend.draws()[0].uniforms;
        let expected: &[u8] = bytemuck::cast_slice(&[10.0f32, 0.0, 800.0, 600.0]);
        assert_eq!(&uniforms[64..80], expected);
    }

    #[test]
    fn unknown_or_mistyped_uniform_is_ignored() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let mut program = Program::compile(&mut backend, &screen_desc()).unwrap();

        program.bind(&mut backend);
        program.uniform_1f(&mut backend, "missing", 1.0);
        program.uniform_1f(&mut backend, "blur", 1.0);
        backend.draw(Topology::TriangleStrip, 0..4, 0..1);

        assert!(backend.draws()[0].uniforms.iter().all(|&b| b == 0));
        assert_eq!(program.uniform("blur").map(|u| u.offset), Some(0));
    }

    #[test]
    fn built_in_shaders_expose_entry_points() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let mut programs = Programs::compile(&mut backend).unwrap();
        let mut screen = Program::compile(&mut backend, &screen_desc()).unwrap();
        assert_eq!(backend.live_resources(), 3);

        programs.dispose(&mut backend);
        screen.dispose(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}
