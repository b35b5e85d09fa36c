use crate::device::{
    ColorAttachment, Extent, FramebufferId, FramebufferTarget, RenderBackend, RenderbufferFormat,
    RenderbufferId, Resource, TextureId,
};
use crate::error::{Error, Result};

use super::{Compositor, Screen, ScreenConfig, ScreenState, check_complete};

/// Single-sampled capture: the scene is drawn straight into a texture with a
/// depth renderbuffer, then composited. Used when multisampling is unavailable.
#[derive(Debug)]
pub struct DirectScreen {
    config: ScreenConfig,
    state: ScreenState,
    targets: Option<Targets>,
    compositor: Compositor,
}

#[derive(Debug, Default)]
struct Targets {
    size: Extent,
    texture: Option<TextureId>,
    depth: Option<RenderbufferId>,
    framebuffer: Option<FramebufferId>,
}

impl Targets {
    fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(fb) = self.framebuffer.take() {
            backend.release(Resource::Framebuffer(fb));
        }
        if let Some(rb) = self.depth.take() {
            backend.release(Resource::Renderbuffer(rb));
        }
        if let Some(t) = self.texture.take() {
            backend.release(Resource::Texture(t));
        }
    }

    fn allocate(&mut self, backend: &mut dyn RenderBackend, size: Extent) -> Result<()> {
        self.size = size;
        let texture = backend.create_texture(size)?;
        self.texture = Some(texture);
        let depth = backend.create_renderbuffer(size, RenderbufferFormat::Depth, 1)?;
        self.depth = Some(depth);
        let fb = backend.create_framebuffer(ColorAttachment::Texture(texture), Some(depth))?;
        self.framebuffer = Some(fb);
        check_complete(backend, fb, "capture")
    }
}

impl DirectScreen {
    pub fn new(backend: &mut dyn RenderBackend, config: ScreenConfig) -> Result<Self> {
        Ok(Self {
            config,
            state: ScreenState::Uninitialized,
            targets: None,
            compositor: Compositor::new(backend, config.blur)?,
        })
    }
}

impl Screen for DirectScreen {
    fn resize(&mut self, backend: &mut dyn RenderBackend, size: Extent) -> Result<()> {
        if self.state == ScreenState::Failed {
            log::debug!("resize on a failed screen ignored");
            return Ok(());
        }
        if size.is_empty() {
            return Err(Error::Allocation(format!(
                "screen targets of {}x{}",
                size.width, size.height
            )));
        }

        if let Some(mut old) = self.targets.take() {
            old.release(backend);
        }

        let mut targets = Targets::default();
        match targets.allocate(backend, size) {
            Ok(()) => {
                log::debug!("direct targets {}x{}", size.width, size.height);
                self.targets = Some(targets);
                self.state = ScreenState::Configured;
                Ok(())
            }
            Err(e) => {
                log::error!("screen resize to {}x{} failed: {e}", size.width, size.height);
                targets.release(backend);
                self.state = ScreenState::Failed;
                Err(e)
            }
        }
    }

    fn begin_capture(&mut self, backend: &mut dyn RenderBackend) {
        if !matches!(self.state, ScreenState::Configured | ScreenState::Resolved) {
            log::warn!("begin_capture in state {:?} ignored", self.state);
            return;
        }
        let Some(fb) = self.targets.as_ref().and_then(|t| t.framebuffer) else { return };

        backend.bind_framebuffer(FramebufferTarget::Offscreen(fb));
        backend.set_depth_test(true);
        backend.clear(self.config.clear_color, true);
        self.state = ScreenState::Capturing;
    }

    fn end_capture_and_composite(&mut self, backend: &mut dyn RenderBackend) {
        if self.state != ScreenState::Capturing {
            log::warn!("end_capture_and_composite in state {:?} ignored", self.state);
            return;
        }
        let Some(texture) = self.targets.as_ref().and_then(|t| t.texture) else { return };

        self.compositor.composite(backend, texture);
        self.state = ScreenState::Resolved;
    }

    fn set_blur(&mut self, blur: bool) {
        self.compositor.set_blur(blur);
    }

    fn blur(&self) -> bool {
        self.compositor.blur()
    }

    fn state(&self) -> ScreenState {
        self.state
    }

    fn resolve_size(&self) -> Option<Extent> {
        self.targets.as_ref().map(|t| t.size)
    }

    fn samples(&self) -> u32 {
        1
    }

    fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(mut t) = self.targets.take() {
            t.release(backend);
        }
        self.compositor.dispose(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessBackend;

    #[test]
    fn composite_shows_captured_scene() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4));
        let config = ScreenConfig {
            clear_color: [0.2, 0.4, 0.6, 1.0],
            samples: 1,
            blur: false,
        };
        let mut s = DirectScreen::new(&mut backend, config).unwrap();
        s.resize(&mut backend, Extent::new(4, 4)).unwrap();

        s.begin_capture(&mut backend);
        s.end_capture_and_composite(&mut backend);

        assert_eq!(s.state(), ScreenState::Resolved);
        assert!(backend.surface_pixels().iter().all(|p| *p == [0.2, 0.4, 0.6, 1.0]));
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4));
        let mut s = DirectScreen::new(&mut backend, ScreenConfig::default()).unwrap();
        let base = backend.live_resources();

        backend.set_fail_allocations(true);
        assert!(matches!(
            s.resize(&mut backend, Extent::new(4, 4)),
            Err(Error::GpuResource(_))
        ));
        assert_eq!(s.state(), ScreenState::Failed);
        assert_eq!(backend.live_resources(), base);
    }
}
