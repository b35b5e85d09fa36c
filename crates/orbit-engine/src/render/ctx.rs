use glam::Mat4;

use crate::device::Extent;

/// Per-viewport drawing state shared by every drawable.
///
/// Scene space spans `[-aspect, aspect]` horizontally and `[-1, 1]` vertically.
/// Rebuilt only when the viewport changes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderContext {
    pub projection: Mat4,
    /// Viewport in physical pixels.
    pub viewport: Extent,
    /// Global scale factor applied to scale-relative sizes.
    pub scale: f32,
}

impl RenderContext {
    pub fn new(viewport: Extent, scale: f32) -> Self {
        let mut ctx = Self {
            projection: Mat4::IDENTITY,
            viewport,
            scale,
        };
        ctx.resize(viewport);
        ctx
    }

    /// Width over height; 1 for an empty viewport.
    pub fn aspect(&self) -> f32 {
        if self.viewport.is_empty() {
            return 1.0;
        }
        self.viewport.width as f32 / self.viewport.height as f32
    }

    pub fn resize(&mut self, viewport: Extent) {
        self.viewport = viewport;
        let aspect = self.aspect();
        self.projection = Mat4::orthographic_rh(-aspect, aspect, -1.0, 1.0, -1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn projection_maps_scene_edges_to_ndc() {
        let ctx = RenderContext::new(Extent::new(800, 400), 1.0);
        assert_eq!(ctx.aspect(), 2.0);

        let right = ctx.projection * Vec4::new(2.0, 1.0, 0.0, 1.0);
        assert!((right.x - 1.0).abs() < 1e-6);
        assert!((right.y - 1.0).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&right.z));
    }

    #[test]
    fn empty_viewport_keeps_a_finite_projection() {
        let ctx = RenderContext::new(Extent::new(0, 0), 1.0);
        assert!(ctx.projection.is_finite());
    }
}
