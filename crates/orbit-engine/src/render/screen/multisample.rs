use crate::device::{
    ColorAttachment, Extent, FramebufferId, FramebufferTarget, RenderBackend, RenderbufferFormat,
    RenderbufferId, Resource, TextureId,
};
use crate::error::{Error, Result};

use super::{Compositor, Screen, ScreenConfig, ScreenState, check_complete};

/// Multisampled capture resolved into a texture.
///
/// The sample target (multisampled color + depth renderbuffers) is only ever
/// drawn into; the resolve target (plain texture) is what the composite samples.
#[derive(Debug)]
pub struct MultisampleScreen {
    config: ScreenConfig,
    samples: u32,
    state: ScreenState,
    targets: Option<Targets>,
    compositor: Compositor,
}

#[derive(Debug, Default)]
struct Targets {
    size: Extent,
    color: Option<RenderbufferId>,
    depth: Option<RenderbufferId>,
    sample: Option<FramebufferId>,
    resolve_texture: Option<TextureId>,
    resolve: Option<FramebufferId>,
}

impl Targets {
    fn release(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(fb) = self.sample.take() {
            backend.release(Resource::Framebuffer(fb));
        }
        if let Some(fb) = self.resolve.take() {
            backend.release(Resource::Framebuffer(fb));
        }
        if let Some(rb) = self.color.take() {
            backend.release(Resource::Renderbuffer(rb));
        }
        if let Some(rb) = self.depth.take() {
            backend.release(Resource::Renderbuffer(rb));
        }
        if let Some(t) = self.resolve_texture.take() {
            backend.release(Resource::Texture(t));
        }
    }
}

impl MultisampleScreen {
    pub fn new(backend: &mut dyn RenderBackend, config: ScreenConfig, samples: u32) -> Result<Self> {
        Ok(Self {
            config,
            samples: samples.max(2),
            state: ScreenState::Uninitialized,
            targets: None,
            compositor: Compositor::new(backend, config.blur)?,
        })
    }

    /// Allocates into `t` so a partial failure can still be released.
    fn allocate(
        &self,
        backend: &mut dyn RenderBackend,
        size: Extent,
        t: &mut Targets,
    ) -> Result<()> {
        t.size = size;

        let color = backend.create_renderbuffer(size, RenderbufferFormat::Color, self.samples)?;
        t.color = Some(color);
        let depth = backend.create_renderbuffer(size, RenderbufferFormat::Depth, self.samples)?;
        t.depth = Some(depth);
        let sample = backend.create_framebuffer(ColorAttachment::Renderbuffer(color), Some(depth))?;
        t.sample = Some(sample);
        check_complete(backend, sample, "sample")?;

        let texture = backend.create_texture(size)?;
        t.resolve_texture = Some(texture);
        let resolve = backend.create_framebuffer(ColorAttachment::Texture(texture), None)?;
        t.resolve = Some(resolve);
        check_complete(backend, resolve, "resolve")
    }

    fn fail(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(mut t) = self.targets.take() {
            t.release(backend);
        }
        self.state = ScreenState::Failed;
    }
}

impl Screen for MultisampleScreen {
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
        let allocated = self.allocate(backend, size, &mut targets);
        self.targets = Some(targets);

        match allocated {
            Ok(()) => {
                log::debug!(
                    "multisample targets {}x{} @ {}x",
                    size.width,
                    size.height,
                    self.samples
                );
                self.state = ScreenState::Configured;
                Ok(())
            }
            Err(e) => {
                log::error!("screen resize to {}x{} failed: {e}", size.width, size.height);
                self.fail(backend);
                Err(e)
            }
        }
    }

    fn begin_capture(&mut self, backend: &mut dyn RenderBackend) {
        let Some(sample) = self.targets.as_ref().and_then(|t| t.sample) else {
            log::warn!("begin_capture before the screen is configured ignored");
            return;
        };
        if !matches!(self.state, ScreenState::Configured | ScreenState::Resolved) {
            log::warn!("begin_capture in state {:?} ignored", self.state);
            return;
        }

        backend.bind_framebuffer(FramebufferTarget::Offscreen(sample));
        backend.set_depth_test(true);
        backend.clear(self.config.clear_color, true);
        self.state = ScreenState::Capturing;
    }

    fn end_capture_and_composite(&mut self, backend: &mut dyn RenderBackend) {
        if self.state != ScreenState::Capturing {
            log::warn!("end_capture_and_composite in state {:?} ignored", self.state);
            return;
        }
        let Some(t) = self.targets.as_ref() else { return };
        let (Some(sample), Some(resolve), Some(texture)) = (t.sample, t.resolve, t.resolve_texture)
        else {
            return;
        };

        backend.blit(sample, resolve, t.size);
        backend.invalidate(sample);
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
        self.targets
            .as_ref()
            .filter(|t| t.resolve_texture.is_some())
            .map(|t| t.size)
    }

    fn samples(&self) -> u32 {
        self.samples
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
    use crate::device::{FramebufferStatus, HeadlessBackend};

    fn screen(backend: &mut HeadlessBackend) -> MultisampleScreen {
        MultisampleScreen::new(backend, ScreenConfig::default(), 4).unwrap()
    }

    #[test]
    fn capture_cycle_moves_through_states() {
        let mut backend = HeadlessBackend::new(Extent::new(8, 8));
        let mut s = screen(&mut backend);
        assert_eq!(s.state(), ScreenState::Uninitialized);

        s.begin_capture(&mut backend);
        assert_eq!(s.state(), ScreenState::Uninitialized);

        s.resize(&mut backend, Extent::new(8, 8)).unwrap();
        assert_eq!(s.state(), ScreenState::Configured);

        s.end_capture_and_composite(&mut backend);
        assert_eq!(s.state(), ScreenState::Configured);

        s.begin_capture(&mut backend);
        assert_eq!(s.state(), ScreenState::Capturing);
        s.end_capture_and_composite(&mut backend);
        assert_eq!(s.state(), ScreenState::Resolved);

        s.begin_capture(&mut backend);
        assert_eq!(s.state(), ScreenState::Capturing);
    }

    #[test]
    fn sample_attachments_are_invalidated_after_resolve() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4));
        let mut s = screen(&mut backend);
        s.resize(&mut backend, Extent::new(4, 4)).unwrap();

        s.begin_capture(&mut backend);
        s.end_capture_and_composite(&mut backend);

        let t = s.targets.as_ref().unwrap();
        assert_eq!(backend.color_defined(t.sample.unwrap()), Some(false));
        assert_eq!(backend.color_defined(t.resolve.unwrap()), Some(true));
    }

    #[test]
    fn resize_replaces_targets() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4));
        let mut s = screen(&mut backend);
        s.resize(&mut backend, Extent::new(4, 4)).unwrap();
        let live = backend.live_resources();

        s.resize(&mut backend, Extent::new(16, 9)).unwrap();
        assert_eq!(backend.live_resources(), live);
        assert_eq!(s.resolve_size(), Some(Extent::new(16, 9)));
    }

    #[test]
    fn unsupported_sample_count_fails_the_screen() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4)).with_max_samples(2);
        let mut s = screen(&mut backend);
        let base = backend.live_resources();

        let err = s.resize(&mut backend, Extent::new(4, 4)).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteFramebuffer {
                status: FramebufferStatus::Unsupported,
                code: 0x8CDD
            }
        ));
        assert_eq!(s.state(), ScreenState::Failed);
        assert_eq!(backend.live_resources(), base);

        // Terminal: later calls are no-ops.
        assert!(s.resize(&mut backend, Extent::new(4, 4)).is_ok());
        s.begin_capture(&mut backend);
        assert_eq!(s.state(), ScreenState::Failed);
        assert_eq!(s.resolve_size(), None);
    }

    #[test]
    fn zero_size_is_an_allocation_error() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4));
        let mut s = screen(&mut backend);
        assert!(matches!(
            s.resize(&mut backend, Extent::new(0, 600)),
            Err(Error::Allocation(_))
        ));
        assert_eq!(s.state(), ScreenState::Uninitialized);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut backend = HeadlessBackend::new(Extent::new(4, 4));
        let mut s = screen(&mut backend);
        s.resize(&mut backend, Extent::new(4, 4)).unwrap();

        s.dispose(&mut backend);
        s.dispose(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}
