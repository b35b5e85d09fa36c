//! Offscreen capture and on-screen composite.
//!
//! A screen owns the offscreen targets the scene is drawn into. Each frame:
//! 1) `begin_capture` binds the capture target and clears it
//! 2) drawables render
//! 3) `end_capture_and_composite` makes the capture sampleable (resolving
//!    samples when multisampled) and draws it over the default framebuffer
//!
//! Targets are rebuilt on every `resize`. An incomplete framebuffer is fatal for
//! the screen: it moves to [`ScreenState::Failed`] and ignores later calls.

mod direct;
mod multisample;

pub use direct::DirectScreen;
pub use multisample::MultisampleScreen;

use crate::device::{
    BufferUsage, ElementType, Extent, FramebufferId, FramebufferStatus, FramebufferTarget,
    RenderBackend, TextureId, Topology,
};
use crate::error::{Error, Result};
use crate::render::Program;
use crate::render::buffer::{SubrangeDesc, VertexBuffer};
use crate::render::program::screen_desc;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScreenState {
    /// No targets yet; waiting for the first `resize`.
    Uninitialized,
    Configured,
    Capturing,
    Resolved,
    /// Target creation failed. Terminal.
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenConfig {
    /// Color the capture target is cleared to at `begin_capture`.
    pub clear_color: [f32; 4],
    /// Requested sample count; 1 selects the direct screen.
    pub samples: u32,
    pub blur: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.1, 1.0],
            samples: 4,
            blur: false,
        }
    }
}

/// Capture target lifecycle shared by both screen flavors.
pub trait Screen {
    /// Rebuilds the targets at `size`.
    fn resize(&mut self, backend: &mut dyn RenderBackend, size: Extent) -> Result<()>;

    fn begin_capture(&mut self, backend: &mut dyn RenderBackend);

    fn end_capture_and_composite(&mut self, backend: &mut dyn RenderBackend);

    fn set_blur(&mut self, blur: bool);

    fn blur(&self) -> bool;

    fn state(&self) -> ScreenState;

    /// Size of the sampleable target, once configured.
    fn resolve_size(&self) -> Option<Extent>;

    /// Samples per pixel of the capture target.
    fn samples(&self) -> u32;

    /// Releases every GPU resource. Idempotent.
    fn dispose(&mut self, backend: &mut dyn RenderBackend);
}

/// Picks the multisampled screen when both the config and the backend allow it.
pub fn select(backend: &mut dyn RenderBackend, config: ScreenConfig) -> Result<Box<dyn Screen>> {
    let caps = backend.capabilities();
    let max = caps.max_samples();
    let samples = caps.best_samples(config.samples);

    if samples > 1 {
        log::info!("screen: {samples}x multisample resolve");
        let screen = MultisampleScreen::new(backend, config, samples)?;
        Ok(Box::new(screen))
    } else {
        log::info!(
            "screen: direct (requested {}x, backend supports {max}x)",
            config.samples
        );
        Ok(Box::new(DirectScreen::new(backend, config)?))
    }
}

pub(crate) fn check_complete(
    backend: &dyn RenderBackend,
    framebuffer: FramebufferId,
    what: &str,
) -> Result<()> {
    let status = backend.framebuffer_status(framebuffer);
    if status == FramebufferStatus::Complete {
        return Ok(());
    }
    log::error!(
        "{what} framebuffer incomplete: {status:?} (0x{:04X})",
        status.code()
    );
    Err(Error::incomplete(status))
}

/// Full-viewport textured quad drawn with the screen program.
#[derive(Debug)]
pub(crate) struct Compositor {
    program: Program,
    quad: VertexBuffer,
    blur: bool,
}

impl Compositor {
    /// Clip-space positions and texture coordinates (v grows downward).
    const POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
    const TEXCOORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

    pub(crate) fn new(backend: &mut dyn RenderBackend, blur: bool) -> Result<Self> {
        let mut program = Program::compile(backend, &screen_desc())?;
        let mut quad = match VertexBuffer::create(
            backend,
            &[
                SubrangeDesc::vertex(0, ElementType::Float(2), 4),
                SubrangeDesc::vertex(1, ElementType::Float(2), 4),
            ],
            BufferUsage::Static,
        ) {
            Ok(quad) => quad,
            Err(e) => {
                program.dispose(backend);
                return Err(e);
            }
        };

        let uploaded = Self::upload_quad(backend, &quad);
        if let Err(e) = uploaded {
            quad.dispose(backend);
            program.dispose(backend);
            return Err(e);
        }

        Ok(Self {
            program,
            quad,
            blur,
        })
    }

    fn upload_quad(backend: &mut dyn RenderBackend, quad: &VertexBuffer) -> Result<()> {
        quad.update_subrange(backend, 0, &Self::POSITIONS)?;
        quad.update_subrange(backend, 1, &Self::TEXCOORDS)
    }

    pub(crate) fn blur(&self) -> bool {
        self.blur
    }

    pub(crate) fn set_blur(&mut self, blur: bool) {
        self.blur = blur;
    }

    /// Clears the default framebuffer to black and draws `texture` over it.
    pub(crate) fn composite(&mut self, backend: &mut dyn RenderBackend, texture: TextureId) {
        backend.set_depth_test(false);
        backend.bind_framebuffer(FramebufferTarget::Default);
        backend.clear([0.0, 0.0, 0.0, 1.0], false);

        backend.bind_texture(0, Some(texture));
        self.program.bind(backend);
        self.program.uniform_1i(backend, "blur", self.blur as i32);
        self.quad.bind(backend);
        backend.draw(Topology::TriangleStrip, 0..4, 0..1);
        backend.bind_texture(0, None);
    }

    pub(crate) fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        self.program.dispose(backend);
        self.quad.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, HeadlessBackend};

    fn selected(caps: Capabilities, requested: u32) -> (u32, ScreenState) {
        let mut backend = HeadlessBackend::new(Extent::new(16, 16)).with_capabilities(caps);
        let config = ScreenConfig {
            samples: requested,
            ..ScreenConfig::default()
        };
        let mut screen = select(&mut backend, config).unwrap();
        let resized = screen.resize(&mut backend, Extent::new(16, 16));
        assert!(resized.is_ok(), "{requested}x on {caps:?}: {resized:?}");
        (screen.samples(), screen.state())
    }

    #[test]
    fn odd_or_oversized_requests_still_configure() {
        let up_to_4 = Capabilities::up_to(4);
        assert_eq!(selected(up_to_4, 3), (2, ScreenState::Configured));
        assert_eq!(selected(up_to_4, 8), (4, ScreenState::Configured));
        assert_eq!(selected(Capabilities::up_to(1), 8), (1, ScreenState::Configured));
    }

    #[test]
    fn portable_sample_set_falls_back_to_direct() {
        let portable = Capabilities { sample_counts: 1 | 4 };
        assert_eq!(selected(portable, 3), (1, ScreenState::Configured));
        assert_eq!(selected(portable, 2), (1, ScreenState::Configured));
        assert_eq!(selected(portable, 8), (4, ScreenState::Configured));
    }
}
