use std::ops::Range;

use crate::error::Result;

use super::uniform::UniformDecl;

slotmap::new_key_type! {
    /// GPU buffer handle.
    pub struct BufferId;
    /// Vertex array handle: a buffer plus its attribute bindings.
    pub struct VertexArrayId;
    /// Single-sampled RGBA texture handle.
    pub struct TextureId;
    /// Renderbuffer handle (color or depth, possibly multisampled).
    pub struct RenderbufferId;
    /// Offscreen framebuffer handle.
    pub struct FramebufferId;
    /// Linked shader program handle.
    pub struct ProgramId;
}

/// How often a buffer's contents are expected to change.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    /// Uploaded once, drawn many times.
    Static,
    /// Rewritten every frame.
    Stream,
}

/// Element type of one vertex attribute stream.
///
/// The payload is the component count (1..=4).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ElementType {
    Float(u8),
    Int(u8),
    /// Unsigned bytes normalized to `[0, 1]`.
    UByte(u8),
}

impl ElementType {
    #[inline]
    pub const fn components(self) -> usize {
        match self {
            ElementType::Float(c) | ElementType::Int(c) | ElementType::UByte(c) => c as usize,
        }
    }

    #[inline]
    pub const fn component_size(self) -> usize {
        match self {
            ElementType::Float(_) => 4,
            ElementType::Int(_) => 4,
            ElementType::UByte(_) => 1,
        }
    }

    /// Byte size of a single element.
    #[inline]
    pub const fn stride(self) -> usize {
        self.components() * self.component_size()
    }

    #[inline]
    pub const fn normalized(self) -> bool {
        matches!(self, ElementType::UByte(_))
    }
}

/// Whether an attribute advances per vertex or per instance.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum StepMode {
    #[default]
    Vertex,
    Instance,
}

/// Binding of one attribute slot to a region of a buffer.
///
/// The stride is always `ty.stride()`: attribute streams are tightly packed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributeBinding {
    pub slot: u32,
    pub ty: ElementType,
    pub offset: u64,
    pub step: StepMode,
}

/// Pixel dimensions.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RenderbufferFormat {
    Color,
    Depth,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ColorAttachment {
    Texture(TextureId),
    Renderbuffer(RenderbufferId),
}

/// Destination for clears and draws.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum FramebufferTarget {
    /// The on-screen framebuffer.
    #[default]
    Default,
    Offscreen(FramebufferId),
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    IncompleteDimensions,
    IncompleteMultisample,
    Unsupported,
}

impl FramebufferStatus {
    /// Numeric status code reported in diagnostics (GL ES enumerant values).
    pub const fn code(self) -> u32 {
        match self {
            FramebufferStatus::Complete => 0x8CD5,
            FramebufferStatus::IncompleteAttachment => 0x8CD6,
            FramebufferStatus::MissingAttachment => 0x8CD7,
            FramebufferStatus::IncompleteDimensions => 0x8CD9,
            FramebufferStatus::IncompleteMultisample => 0x8D56,
            FramebufferStatus::Unsupported => 0x8CDD,
        }
    }

    #[inline]
    pub const fn is_complete(self) -> bool {
        matches!(self, FramebufferStatus::Complete)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// Color blending applied by a program's draws.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    /// `src * a + dst * (1 - a)` (straight alpha).
    #[default]
    Alpha,
    /// Overwrites the destination.
    Replace,
}

/// Everything a backend needs to build a program.
///
/// `source` is WGSL exposing `vs_main` and `fs_main`, with the uniform block at
/// `@group(0) @binding(0)` and, when `samples_texture` is set, the texture and
/// sampler of unit 0 at `@group(1) @binding(0..=1)`.
#[derive(Debug, Clone)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub uniforms: &'a [UniformDecl],
    pub samples_texture: bool,
    pub blend: BlendMode,
}

/// Backend capabilities relevant to the core.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Capabilities {
    /// Sample counts accepted for color + depth renderbuffers, as a set of
    /// power-of-two bits (`1 | 4` means 1x and 4x). Single sampling is always
    /// present.
    pub sample_counts: u32,
}

impl Capabilities {
    /// Every power of two up to `max`.
    pub const fn up_to(max: u32) -> Self {
        let max = if max == 0 { 1 } else { max };
        let top = 1u32 << (31 - max.leading_zeros());
        Self {
            sample_counts: top | (top - 1),
        }
    }

    pub const fn supports_samples(self, samples: u32) -> bool {
        samples.is_power_of_two() && (self.sample_counts | 1) & samples != 0
    }

    pub const fn max_samples(self) -> u32 {
        let counts = self.sample_counts | 1;
        1 << (31 - counts.leading_zeros())
    }

    /// Largest supported count not above `requested`; 1 when nothing fits.
    pub fn best_samples(self, requested: u32) -> u32 {
        let mut n = self.max_samples();
        while n > 1 && (n > requested || !self.supports_samples(n)) {
            n >>= 1;
        }
        n
    }
}

/// Outcome of starting a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameStatus {
    Ready,
    /// Nothing will be presented this frame (surface lost, minimized window).
    Skip,
}

/// Any releasable GPU resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Resource {
    Buffer(BufferId),
    VertexArray(VertexArrayId),
    Texture(TextureId),
    Renderbuffer(RenderbufferId),
    Framebuffer(FramebufferId),
    Program(ProgramId),
}

/// Capability interface over the platform graphics API.
///
/// The interface is stateful in the GL tradition: binding calls set the current
/// framebuffer, vertex source, program and texture unit; `draw` and `clear` act
/// on whatever is bound. Resource creation and uploads take effect immediately;
/// clears, draws and blits are ordered within the frame delimited by
/// `begin_frame` / `end_frame`.
pub trait RenderBackend {
    fn capabilities(&self) -> Capabilities;

    /// Size of the default (on-screen) framebuffer in pixels.
    fn surface_size(&self) -> Extent;

    fn begin_frame(&mut self) -> Result<FrameStatus>;
    fn end_frame(&mut self) -> Result<()>;

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferId>;

    /// Writes `data` at byte `offset`. The range must lie inside the buffer.
    fn upload_subrange(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    /// Records the attribute layout of `buffer` once; draws reuse it on bind.
    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        attributes: &[AttributeBinding],
    ) -> Result<VertexArrayId>;

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);

    // ── render targets ────────────────────────────────────────────────────

    fn create_texture(&mut self, size: Extent) -> Result<TextureId>;

    fn texture_size(&self, texture: TextureId) -> Option<Extent>;

    fn create_renderbuffer(
        &mut self,
        size: Extent,
        format: RenderbufferFormat,
        samples: u32,
    ) -> Result<RenderbufferId>;

    fn create_framebuffer(
        &mut self,
        color: ColorAttachment,
        depth: Option<RenderbufferId>,
    ) -> Result<FramebufferId>;

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    fn bind_framebuffer(&mut self, target: FramebufferTarget);

    fn set_depth_test(&mut self, enabled: bool);

    /// Clears the bound framebuffer's color (and depth when requested).
    fn clear(&mut self, color: [f32; 4], depth: bool);

    /// Copies (resolving samples if needed) the color of `src` into `dst`.
    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, size: Extent);

    /// Declares the color and depth contents of `framebuffer` no longer needed.
    fn invalidate(&mut self, framebuffer: FramebufferId);

    // ── programs ──────────────────────────────────────────────────────────

    fn compile_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId>;

    fn use_program(&mut self, program: ProgramId);

    /// Writes raw uniform bytes at `offset` inside the program's block.
    fn set_uniform(&mut self, program: ProgramId, offset: usize, bytes: &[u8]);

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    // ── drawing ───────────────────────────────────────────────────────────

    fn draw(&mut self, topology: Topology, vertices: Range<u32>, instances: Range<u32>);

    /// Releases a resource. Unknown or already released handles are ignored.
    fn release(&mut self, resource: Resource);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_counts_snap_to_supported_powers_of_two() {
        let up_to_4 = Capabilities::up_to(4);
        assert_eq!(up_to_4.sample_counts, 1 | 2 | 4);
        assert_eq!(up_to_4.best_samples(3), 2);
        assert_eq!(up_to_4.best_samples(8), 4);
        assert_eq!(up_to_4.best_samples(0), 1);
        assert!(!up_to_4.supports_samples(3));

        // wgpu without adapter-specific format features: 1x and 4x only.
        let portable = Capabilities { sample_counts: 1 | 4 };
        assert_eq!(portable.max_samples(), 4);
        assert_eq!(portable.best_samples(3), 1);
        assert_eq!(portable.best_samples(2), 1);
        assert_eq!(portable.best_samples(16), 4);
        assert!(!portable.supports_samples(2));

        assert_eq!(Capabilities::up_to(1).max_samples(), 1);
        assert_eq!(Capabilities::up_to(6).max_samples(), 4);
    }

    #[test]
    fn element_strides() {
        assert_eq!(ElementType::Float(2).stride(), 8);
        assert_eq!(ElementType::Int(3).stride(), 12);
        assert_eq!(ElementType::UByte(4).stride(), 4);
        assert!(ElementType::UByte(4).normalized());
        assert!(!ElementType::Float(4).normalized());
    }

    #[test]
    fn status_codes_are_distinct() {
        let all = [
            FramebufferStatus::Complete,
            FramebufferStatus::IncompleteAttachment,
            FramebufferStatus::MissingAttachment,
            FramebufferStatus::IncompleteDimensions,
            FramebufferStatus::IncompleteMultisample,
            FramebufferStatus::Unsupported,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
        assert!(FramebufferStatus::Complete.is_complete());
        assert!(!FramebufferStatus::Unsupported.is_complete());
    }
}
