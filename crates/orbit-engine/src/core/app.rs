use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::device::RenderBackend;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`crate::window::Runtime`].
///
/// Window events arrive without GPU access; apps that need the backend in
/// response (e.g. to rebuild particles on a key press) record the request and
/// act on it in the next [`App::on_frame`].
pub trait App {
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called once per redraw per window.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;

    /// Called while the window's backend is still alive, just before it is
    /// destroyed. Release GPU resources here.
    fn on_close(&mut self, window_id: WindowId, backend: &mut dyn RenderBackend) {
        let _ = (window_id, backend);
    }
}
