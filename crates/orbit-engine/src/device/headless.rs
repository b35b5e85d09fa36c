use std::ops::Range;

use slotmap::SlotMap;

use crate::error::{Error, Result};

use super::backend::{
    AttributeBinding, BufferId, BufferUsage, Capabilities, ColorAttachment, Extent,
    FrameStatus, FramebufferId, FramebufferStatus, FramebufferTarget, ProgramDesc, ProgramId,
    RenderBackend, RenderbufferFormat, RenderbufferId, Resource, StepMode, TextureId, Topology,
    VertexArrayId,
};
use super::uniform::{UniformBlock, UniformLayout};

/// CPU reference backend.
///
/// Keeps every buffer and color attachment in host memory so frame results can be
/// inspected without a GPU:
/// - clears, blits and invalidation are applied to pixel storage
/// - draws with a texture-sampling program are evaluated as a full-viewport
///   composite of the texture bound to unit 0 (3×3 box blur when the program's
///   `blur` uniform is non-zero)
/// - all other draws are recorded in [`HeadlessBackend::draws`] with a bounds check
///   against the bound vertex array
///
/// Multisampled renderbuffers store one resolved color per pixel.
pub struct HeadlessBackend {
    caps: Capabilities,
    surface: Image,
    fail_allocations: bool,
    fail_uploads: bool,

    buffers: SlotMap<BufferId, HostBuffer>,
    vertex_arrays: SlotMap<VertexArrayId, HostVertexArray>,
    textures: SlotMap<TextureId, Image>,
    renderbuffers: SlotMap<RenderbufferId, HostRenderbuffer>,
    framebuffers: SlotMap<FramebufferId, HostFramebuffer>,
    programs: SlotMap<ProgramId, HostProgram>,

    bound: BoundState,
    draws: Vec<DrawRecord>,
    frames_completed: u64,
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: String,
    pub target: FramebufferTarget,
    pub topology: Topology,
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
    pub depth_test: bool,
    /// Whether every attribute read stays inside its buffer.
    pub in_bounds: bool,
    pub uniforms: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Image {
    size: Extent,
    pixels: Vec<[f32; 4]>,
    defined: bool,
}

impl Image {
    fn new(size: Extent) -> Self {
        Self {
            size,
            pixels: vec![[0.0; 4]; size.area()],
            defined: false,
        }
    }

    fn fill(&mut self, color: [f32; 4]) {
        self.pixels.fill(color);
        self.defined = true;
    }

    fn get_clamped(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.size.width as i64 - 1) as usize;
        let y = y.clamp(0, self.size.height as i64 - 1) as usize;
        self.pixels[y * self.size.width as usize + x]
    }
}

struct HostBuffer {
    bytes: Vec<u8>,
}

struct HostVertexArray {
    buffer: BufferId,
    attributes: Vec<AttributeBinding>,
}

struct HostRenderbuffer {
    format: RenderbufferFormat,
    samples: u32,
    /// Depth renderbuffers carry no pixel storage.
    image: Image,
}

struct HostFramebuffer {
    color: ColorAttachment,
    depth: Option<RenderbufferId>,
}

struct HostProgram {
    label: String,
    layout: UniformLayout,
    block: UniformBlock,
    samples_texture: bool,
}

#[derive(Default)]
struct BoundState {
    target: FramebufferTarget,
    vertex_array: Option<VertexArrayId>,
    program: Option<ProgramId>,
    texture0: Option<TextureId>,
    depth_test: bool,
}

impl HeadlessBackend {
    /// Creates a backend with a default framebuffer of `surface` pixels and 4× MSAA.
    pub fn new(surface: Extent) -> Self {
        Self {
            caps: Capabilities::up_to(4),
            surface: Image::new(surface),
            fail_allocations: false,
            fail_uploads: false,
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            bound: BoundState::default(),
            draws: Vec::new(),
            frames_completed: 0,
        }
    }

    /// Supports every power of two up to `max_samples` (1 disables multisampling).
    pub fn with_max_samples(self, max_samples: u32) -> Self {
        self.with_capabilities(Capabilities::up_to(max_samples))
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Makes every subsequent resource creation fail.
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Makes every subsequent buffer upload fail.
    pub fn set_fail_uploads(&mut self, fail: bool) {
        self.fail_uploads = fail;
    }

    /// Resizes the default framebuffer. Contents become undefined.
    pub fn resize_surface(&mut self, size: Extent) {
        self.surface = Image::new(size);
    }

    pub fn surface_pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.surface.size.width || y >= self.surface.size.height {
            return None;
        }
        Some(self.surface.pixels[(y * self.surface.size.width + x) as usize])
    }

    pub fn surface_pixels(&self) -> &[[f32; 4]] {
        &self.surface.pixels
    }

    pub fn texture_pixels(&self, texture: TextureId) -> Option<&[[f32; 4]]> {
        self.textures.get(texture).map(|t| t.pixels.as_slice())
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.bytes.as_slice())
    }

    /// Whether the color attachment of `framebuffer` currently holds defined contents.
    pub fn color_defined(&self, framebuffer: FramebufferId) -> Option<bool> {
        let fb = self.framebuffers.get(framebuffer)?;
        self.color_image(fb.color).map(|img| img.defined)
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    /// Number of live resources of all kinds.
    pub fn live_resources(&self) -> usize {
        self.buffers.len()
            + self.vertex_arrays.len()
            + self.textures.len()
            + self.renderbuffers.len()
            + self.framebuffers.len()
            + self.programs.len()
    }

    fn check_alloc(&self, what: &str) -> Result<()> {
        if self.fail_allocations {
            return Err(Error::GpuResource(format!("{what}: device refused allocation")));
        }
        Ok(())
    }

    fn color_image(&self, color: ColorAttachment) -> Option<&Image> {
        match color {
            ColorAttachment::Texture(t) => self.textures.get(t),
            ColorAttachment::Renderbuffer(r) => self
                .renderbuffers
                .get(r)
                .filter(|rb| rb.format == RenderbufferFormat::Color)
                .map(|rb| &rb.image),
        }
    }

    fn color_image_mut(&mut self, color: ColorAttachment) -> Option<&mut Image> {
        match color {
            ColorAttachment::Texture(t) => self.textures.get_mut(t),
            ColorAttachment::Renderbuffer(r) => self
                .renderbuffers
                .get_mut(r)
                .filter(|rb| rb.format == RenderbufferFormat::Color)
                .map(|rb| &mut rb.image),
        }
    }

    fn target_image_mut(&mut self, target: FramebufferTarget) -> Option<&mut Image> {
        match target {
            FramebufferTarget::Default => Some(&mut self.surface),
            FramebufferTarget::Offscreen(id) => {
                let color = self.framebuffers.get(id)?.color;
                self.color_image_mut(color)
            }
        }
    }

    fn attributes_in_bounds(&self, vertices: &Range<u32>, instances: &Range<u32>) -> bool {
        let Some(va) = self.bound.vertex_array.and_then(|id| self.vertex_arrays.get(id)) else {
            return true;
        };
        let Some(buffer) = self.buffers.get(va.buffer) else {
            return false;
        };
        let len = buffer.bytes.len() as u64;

        va.attributes.iter().all(|a| {
            let range = match a.step {
                StepMode::Vertex => vertices,
                StepMode::Instance => instances,
            };
            if range.is_empty() {
                return true;
            }
            a.offset + range.end as u64 * a.ty.stride() as u64 <= len
        })
    }

    fn composite(&mut self, program: ProgramId) {
        let Some(prog) = self.programs.get(program) else { return };
        let blur = prog
            .layout
            .find("blur")
            .and_then(|u| prog.block.read_i32(u.offset))
            .is_some_and(|v| v != 0);

        let Some(source) = self.bound.texture0.and_then(|t| self.textures.get(t)).cloned() else {
            log::warn!("composite draw with no texture bound to unit 0");
            return;
        };
        if source.size.is_empty() {
            return;
        }

        let target = self.bound.target;
        let Some(dst) = self.target_image_mut(target) else { return };
        let (dw, dh) = (dst.size.width as u64, dst.size.height as u64);
        let (sw, sh) = (source.size.width as u64, source.size.height as u64);

        for y in 0..dh {
            for x in 0..dw {
                let sx = (x * sw / dw) as i64;
                let sy = (y * sh / dh) as i64;
                let px = if blur {
                    box_blur(&source, sx, sy)
                } else {
                    source.get_clamped(sx, sy)
                };
                dst.pixels[(y * dw + x) as usize] = px;
            }
        }
        dst.defined = source.defined;
    }
}

fn box_blur(src: &Image, x: i64, y: i64) -> [f32; 4] {
    let mut acc = [0.0f32; 4];
    for dy in -1..=1 {
        for dx in -1..=1 {
            let p = src.get_clamped(x + dx, y + dy);
            for c in 0..4 {
                acc[c] += p[c];
            }
        }
    }
    acc.map(|v| v / 9.0)
}

impl RenderBackend for HeadlessBackend {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn surface_size(&self) -> Extent {
        self.surface.size
    }

    fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.surface.size.is_empty() {
            return Ok(FrameStatus::Skip);
        }
        Ok(FrameStatus::Ready)
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames_completed += 1;
        Ok(())
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferId> {
        self.check_alloc("buffer")?;
        if size == 0 {
            return Err(Error::GpuResource("zero-sized buffer".into()));
        }
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size as usize)
            .map_err(|e| Error::GpuResource(format!("buffer of {size} bytes: {e}")))?;
        bytes.resize(size as usize, 0);
        log::trace!("headless buffer: {size} bytes, {usage:?}");
        Ok(self.buffers.insert(HostBuffer { bytes }))
    }

    fn upload_subrange(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        if self.fail_uploads {
            return Err(Error::GpuResource("upload: device lost".into()));
        }
        let buf = self
            .buffers
            .get_mut(buffer)
            .ok_or(Error::UnknownHandle { kind: "buffer" })?;
        let start = offset as usize;
        let end = start + data.len();
        let len = buf.bytes.len();
        let dst = buf.bytes.get_mut(start..end).ok_or_else(|| {
            Error::GpuResource(format!("upload {start}..{end} outside buffer of {len}"))
        })?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        attributes: &[AttributeBinding],
    ) -> Result<VertexArrayId> {
        self.check_alloc("vertex array")?;
        if !self.buffers.contains_key(buffer) {
            return Err(Error::UnknownHandle { kind: "buffer" });
        }
        Ok(self.vertex_arrays.insert(HostVertexArray {
            buffer,
            attributes: attributes.to_vec(),
        }))
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound.vertex_array = vertex_array;
    }

    fn create_texture(&mut self, size: Extent) -> Result<TextureId> {
        self.check_alloc("texture")?;
        if size.is_empty() {
            return Err(Error::GpuResource("zero-sized texture".into()));
        }
        Ok(self.textures.insert(Image::new(size)))
    }

    fn texture_size(&self, texture: TextureId) -> Option<Extent> {
        self.textures.get(texture).map(|t| t.size)
    }

    fn create_renderbuffer(
        &mut self,
        size: Extent,
        format: RenderbufferFormat,
        samples: u32,
    ) -> Result<RenderbufferId> {
        self.check_alloc("renderbuffer")?;
        if size.is_empty() {
            return Err(Error::GpuResource("zero-sized renderbuffer".into()));
        }
        let image = match format {
            RenderbufferFormat::Color => Image::new(size),
            RenderbufferFormat::Depth => Image {
                size,
                pixels: Vec::new(),
                defined: false,
            },
        };
        Ok(self.renderbuffers.insert(HostRenderbuffer {
            format,
            samples: samples.max(1),
            image,
        }))
    }

    fn create_framebuffer(
        &mut self,
        color: ColorAttachment,
        depth: Option<RenderbufferId>,
    ) -> Result<FramebufferId> {
        self.check_alloc("framebuffer")?;
        Ok(self.framebuffers.insert(HostFramebuffer { color, depth }))
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(framebuffer) else {
            return FramebufferStatus::MissingAttachment;
        };

        let (color_size, color_samples) = match fb.color {
            ColorAttachment::Texture(t) => match self.textures.get(t) {
                Some(img) => (img.size, 1),
                None => return FramebufferStatus::MissingAttachment,
            },
            ColorAttachment::Renderbuffer(r) => match self.renderbuffers.get(r) {
                Some(rb) if rb.format == RenderbufferFormat::Color => (rb.image.size, rb.samples),
                Some(_) => return FramebufferStatus::IncompleteAttachment,
                None => return FramebufferStatus::MissingAttachment,
            },
        };

        if !self.caps.supports_samples(color_samples) {
            return FramebufferStatus::Unsupported;
        }

        if let Some(d) = fb.depth {
            match self.renderbuffers.get(d) {
                Some(rb) if rb.format == RenderbufferFormat::Depth => {
                    if rb.image.size != color_size {
                        return FramebufferStatus::IncompleteDimensions;
                    }
                    if rb.samples != color_samples {
                        return FramebufferStatus::IncompleteMultisample;
                    }
                }
                Some(_) => return FramebufferStatus::IncompleteAttachment,
                None => return FramebufferStatus::MissingAttachment,
            }
        }

        FramebufferStatus::Complete
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget) {
        self.bound.target = target;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.bound.depth_test = enabled;
    }

    fn clear(&mut self, color: [f32; 4], _depth: bool) {
        let target = self.bound.target;
        match self.target_image_mut(target) {
            Some(img) => img.fill(color),
            None => log::warn!("clear on a released framebuffer ignored"),
        }
    }

    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, size: Extent) {
        let (Some(s), Some(d)) = (self.framebuffers.get(src), self.framebuffers.get(dst)) else {
            log::warn!("blit between unknown framebuffers ignored");
            return;
        };
        let (src_color, dst_color) = (s.color, d.color);

        let Some(source) = self.color_image(src_color).cloned() else { return };
        let Some(dest) = self.color_image_mut(dst_color) else { return };

        let w = size.width.min(source.size.width).min(dest.size.width) as usize;
        let h = size.height.min(source.size.height).min(dest.size.height) as usize;
        for y in 0..h {
            let s_row = y * source.size.width as usize;
            let d_row = y * dest.size.width as usize;
            dest.pixels[d_row..d_row + w].copy_from_slice(&source.pixels[s_row..s_row + w]);
        }
        dest.defined = source.defined;
    }

    fn invalidate(&mut self, framebuffer: FramebufferId) {
        let Some(color) = self.framebuffers.get(framebuffer).map(|fb| fb.color) else {
            return;
        };
        if let Some(img) = self.color_image_mut(color) {
            img.defined = false;
        }
    }

    fn compile_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId> {
        for entry in ["fn vs_main", "fn fs_main"] {
            if !desc.source.contains(entry) {
                return Err(Error::Program {
                    label: desc.label.to_string(),
                    reason: format!("missing entry point `{}`", &entry[3..]),
                });
            }
        }

        let layout = UniformLayout::new(desc.uniforms);
        let block = UniformBlock::zeroed(&layout);
        Ok(self.programs.insert(HostProgram {
            label: desc.label.to_string(),
            layout,
            block,
            samples_texture: desc.samples_texture,
        }))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.bound.program = Some(program);
    }

    fn set_uniform(&mut self, program: ProgramId, offset: usize, bytes: &[u8]) {
        if let Some(p) = self.programs.get_mut(program) {
            if !p.block.write(offset, bytes) {
                log::warn!("uniform write at {offset} outside `{}` block", p.label);
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        if unit != 0 {
            log::warn!("texture unit {unit} is not supported; only unit 0 is sampled");
            return;
        }
        self.bound.texture0 = texture;
    }

    fn draw(&mut self, topology: Topology, vertices: Range<u32>, instances: Range<u32>) {
        let Some(program) = self.bound.program else {
            log::debug!("draw without a program ignored");
            return;
        };
        let Some(prog) = self.programs.get(program) else { return };

        let record = DrawRecord {
            program: prog.label.clone(),
            target: self.bound.target,
            topology,
            vertices: vertices.clone(),
            instances: instances.clone(),
            depth_test: self.bound.depth_test,
            in_bounds: self.attributes_in_bounds(&vertices, &instances),
            uniforms: prog.block.as_bytes().to_vec(),
        };
        let samples_texture = prog.samples_texture;
        self.draws.push(record);

        if samples_texture {
            self.composite(program);
        }
    }

    fn release(&mut self, resource: Resource) {
        match resource {
            Resource::Buffer(id) => {
                self.buffers.remove(id);
            }
            Resource::VertexArray(id) => {
                if self.bound.vertex_array == Some(id) {
                    self.bound.vertex_array = None;
                }
                self.vertex_arrays.remove(id);
            }
            Resource::Texture(id) => {
                if self.bound.texture0 == Some(id) {
                    self.bound.texture0 = None;
                }
                self.textures.remove(id);
            }
            Resource::Renderbuffer(id) => {
                self.renderbuffers.remove(id);
            }
            Resource::Framebuffer(id) => {
                if self.bound.target == FramebufferTarget::Offscreen(id) {
                    self.bound.target = FramebufferTarget::Default;
                }
                self.framebuffers.remove(id);
            }
            Resource::Program(id) => {
                if self.bound.program == Some(id) {
                    self.bound.program = None;
                }
                self.programs.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BlendMode, UniformDecl, UniformType};

    const SRC: &str = "fn vs_main() {} fn fs_main() {}";

    fn backend() -> HeadlessBackend {
        HeadlessBackend::new(Extent::new(4, 4))
    }

    #[test]
    fn upload_outside_buffer_is_rejected() {
        let mut b = backend();
        let buf = b.create_buffer(8, BufferUsage::Static).unwrap();
        assert!(b.upload_subrange(buf, 4, &[1, 2, 3, 4]).is_ok());
        assert!(b.upload_subrange(buf, 6, &[1, 2, 3, 4]).is_err());
        assert_eq!(b.buffer_contents(buf).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn program_without_entry_points_fails() {
        let mut b = backend();
        let err = b
            .compile_program(&ProgramDesc {
                label: "broken",
                source: "fn main() {}",
                uniforms: &[],
                samples_texture: false,
                blend: BlendMode::Alpha,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Program { .. }));
    }

    #[test]
    fn mismatched_depth_size_is_incomplete() {
        let mut b = backend();
        let color = b
            .create_renderbuffer(Extent::new(4, 4), RenderbufferFormat::Color, 1)
            .unwrap();
        let depth = b
            .create_renderbuffer(Extent::new(2, 2), RenderbufferFormat::Depth, 1)
            .unwrap();
        let fb = b
            .create_framebuffer(ColorAttachment::Renderbuffer(color), Some(depth))
            .unwrap();
        assert_eq!(b.framebuffer_status(fb), FramebufferStatus::IncompleteDimensions);
    }

    #[test]
    fn odd_sample_count_is_unsupported() {
        let mut b = backend();
        let color = b
            .create_renderbuffer(Extent::new(4, 4), RenderbufferFormat::Color, 3)
            .unwrap();
        let fb = b
            .create_framebuffer(ColorAttachment::Renderbuffer(color), None)
            .unwrap();
        assert_eq!(b.framebuffer_status(fb), FramebufferStatus::Unsupported);
    }

    #[test]
    fn released_texture_leaves_framebuffer_missing_attachment() {
        let mut b = backend();
        let tex = b.create_texture(Extent::new(4, 4)).unwrap();
        let fb = b.create_framebuffer(ColorAttachment::Texture(tex), None).unwrap();
        assert!(b.framebuffer_status(fb).is_complete());

        b.release(Resource::Texture(tex));
        assert_eq!(b.framebuffer_status(fb), FramebufferStatus::MissingAttachment);
    }

    #[test]
    fn out_of_bounds_draw_is_flagged() {
        let mut b = backend();
        let buf = b.create_buffer(32, BufferUsage::Stream).unwrap();
        let va = b
            .create_vertex_array(
                buf,
                &[AttributeBinding {
                    slot: 0,
                    ty: crate::device::ElementType::Float(2),
                    offset: 0,
                    step: StepMode::Instance,
                }],
            )
            .unwrap();
        let prog = b
            .compile_program(&ProgramDesc {
                label: "points",
                source: SRC,
                uniforms: &[UniformDecl::new("point_size", UniformType::Float)],
                samples_texture: false,
                blend: BlendMode::Alpha,
            })
            .unwrap();

        b.use_program(prog);
        b.bind_vertex_array(Some(va));
        b.draw(Topology::TriangleStrip, 0..4, 0..4);
        b.draw(Topology::TriangleStrip, 0..4, 0..5);

        let draws = b.draws();
        assert!(draws[0].in_bounds);
        assert!(!draws[1].in_bounds);
    }

    #[test]
    fn failing_allocations_surface_as_gpu_resource_errors() {
        let mut b = backend();
        b.set_fail_allocations(true);
        assert!(matches!(
            b.create_buffer(16, BufferUsage::Static),
            Err(Error::GpuResource(_))
        ));
        assert!(matches!(b.create_texture(Extent::new(1, 1)), Err(Error::GpuResource(_))));
    }
}
