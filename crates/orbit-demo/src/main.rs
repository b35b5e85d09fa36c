use anyhow::Result;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use orbit_engine::core::{App, AppControl, FrameCtx};
use orbit_engine::device::{GpuInit, RenderBackend};
use orbit_engine::logging::{LoggingConfig, init_logging};
use orbit_engine::window::{Runtime, RuntimeConfig};
use orbit_engine::{LoopConfig, RenderLoop};

/// Ring of shapes around a 32×32 particle grid falling toward the center.
/// Space re-seeds the particles and flips the composite blur.
struct Demo {
    config: LoopConfig,
    render_loop: Option<RenderLoop>,
    resize: bool,
    tapped: bool,
}

impl Demo {
    fn new(config: LoopConfig) -> Self {
        Self {
            config,
            render_loop: None,
            resize: false,
            tapped: false,
        }
    }

    fn frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> orbit_engine::Result<()> {
        if self.render_loop.is_none() {
            let size = ctx.window.physical_size();
            log::info!(
                "building scene for {}x{} (scale factor {:.2})",
                size.width,
                size.height,
                ctx.window.scale_factor()
            );
            self.render_loop = Some(RenderLoop::new(ctx.backend, self.config.clone())?);
        }
        let Some(render_loop) = self.render_loop.as_mut() else {
            return Ok(());
        };

        if std::mem::take(&mut self.resize) {
            render_loop.request_resize();
        }
        if std::mem::take(&mut self.tapped) {
            render_loop.reset_particles(ctx.backend)?;
            let blur = render_loop.toggle_blur();
            log::info!("particles reset, blur {}", if blur { "on" } else { "off" });
        }

        ctx.pre_present();
        render_loop.tick(ctx.backend, ctx.time.dt)
    }
}

impl App for Demo {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.resize = true;
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Space) => self.tapped = true,
                    PhysicalKey::Code(KeyCode::Escape) => return AppControl::Exit,
                    _ => {}
                }
            }
            _ => {}
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        match self.frame(ctx) {
            Ok(()) => AppControl::Continue,
            Err(e) => {
                log::error!("frame {} failed: {e}", ctx.time.frame_index);
                AppControl::Exit
            }
        }
    }

    fn on_close(&mut self, _window_id: WindowId, backend: &mut dyn RenderBackend) {
        if let Some(mut lp) = self.render_loop.take() {
            lp.dispose(backend);
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "orbit".to_string(),
        ..RuntimeConfig::default()
    };

    Runtime::run(config, GpuInit::default(), Demo::new(LoopConfig::default()))
}
