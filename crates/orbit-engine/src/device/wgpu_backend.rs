use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;

use slotmap::SlotMap;

use crate::error::{Error, Result};

use super::backend::{
    AttributeBinding, BlendMode, BufferId, BufferUsage, Capabilities, ColorAttachment,
    ElementType, Extent, FrameStatus, FramebufferId, FramebufferStatus, FramebufferTarget,
    ProgramDesc, ProgramId, RenderBackend, RenderbufferFormat, RenderbufferId, Resource,
    StepMode, TextureId, Topology, VertexArrayId,
};
use super::gpu::{DEPTH_FORMAT, Gpu, GpuFrame, OFFSCREEN_FORMAT, SurfaceErrorAction};
use super::uniform::{UniformBlock, UniformLayout, align_up};

/// [`RenderBackend`] over wgpu.
///
/// Binding calls update a GL-style state record; clears, draws and blits are
/// recorded with a snapshot of that state and encoded at `end_frame`:
/// - consecutive clears/draws on one target become a single render pass
/// - a blit becomes an empty pass on the multisampled source with a resolve
///   target; an `invalidate` right after it turns the source store op into
///   `Discard`
/// - uniform snapshots are packed into one per-frame ring buffer and bound with
///   dynamic offsets
///
/// Pipelines are created lazily per (program, vertex layout, topology, target).
pub struct WgpuBackend<'w> {
    gpu: Gpu<'w>,
    caps: Capabilities,

    sampler: wgpu::Sampler,
    uniform_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,

    buffers: SlotMap<BufferId, GpuBuffer>,
    vertex_arrays: SlotMap<VertexArrayId, GpuVertexArray>,
    textures: SlotMap<TextureId, GpuTexture>,
    renderbuffers: SlotMap<RenderbufferId, GpuRenderbuffer>,
    framebuffers: SlotMap<FramebufferId, GpuFramebuffer>,
    programs: SlotMap<ProgramId, GpuProgram>,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_groups: HashMap<TextureId, wgpu::BindGroup>,
    ring: UniformRing,

    bound: Bound,
    commands: Vec<Command>,
    frame: Option<GpuFrame>,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct GpuVertexArray {
    buffer: BufferId,
    attributes: Vec<AttributeBinding>,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Extent,
}

struct GpuRenderbuffer {
    /// `None` when the sample count is unsupported; reported at the completeness check.
    storage: Option<(wgpu::Texture, wgpu::TextureView)>,
    size: Extent,
    format: RenderbufferFormat,
    samples: u32,
}

struct GpuFramebuffer {
    color: ColorAttachment,
    depth: Option<RenderbufferId>,
}

struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    layout: UniformLayout,
    block: UniformBlock,
    samples_texture: bool,
    blend: BlendMode,
    pipeline_layout: wgpu::PipelineLayout,
}

#[derive(Default)]
struct UniformRing {
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
    groups: HashMap<ProgramId, wgpu::BindGroup>,
}

#[derive(Default)]
struct Bound {
    target: FramebufferTarget,
    vertex_array: Option<VertexArrayId>,
    program: Option<ProgramId>,
    texture0: Option<TextureId>,
    depth_test: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct TargetFormat {
    format: wgpu::TextureFormat,
    samples: u32,
    depth: bool,
    depth_test: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    program: ProgramId,
    attributes: Vec<AttributeBinding>,
    topology: Topology,
    target: TargetFormat,
}

enum Command {
    Clear {
        target: FramebufferTarget,
        color: [f32; 4],
        depth: bool,
    },
    Draw(DrawCommand),
    Blit {
        src: FramebufferId,
        dst: FramebufferId,
        size: Extent,
    },
    Invalidate(FramebufferId),
}

struct DrawCommand {
    target: FramebufferTarget,
    depth_test: bool,
    program: ProgramId,
    vertex_array: Option<VertexArrayId>,
    texture: Option<TextureId>,
    topology: Topology,
    vertices: Range<u32>,
    instances: Range<u32>,
    uniforms: Vec<u8>,

    // Filled while preparing the frame.
    key: Option<PipelineKey>,
    uniform_offset: u32,
}

struct RenderPassPlan {
    target: FramebufferTarget,
    clear: Option<[f32; 4]>,
    clear_depth: bool,
    draws: Vec<DrawCommand>,
}

enum Pass {
    Render(RenderPassPlan),
    Resolve {
        src: FramebufferId,
        dst: FramebufferId,
        size: Extent,
        discard: bool,
    },
}

impl<'w> WgpuBackend<'w> {
    pub fn new(gpu: Gpu<'w>) -> Self {
        let device = gpu.device();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("orbit composite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("orbit uniform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("orbit texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let caps = Capabilities {
            sample_counts: gpu.sample_counts(),
        };
        log::debug!("wgpu backend: sample counts {:#b}", caps.sample_counts);

        Self {
            gpu,
            caps,
            sampler,
            uniform_bgl,
            texture_bgl,
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            pipelines: HashMap::new(),
            texture_groups: HashMap::new(),
            ring: UniformRing::default(),
            bound: Bound::default(),
            commands: Vec::new(),
            frame: None,
        }
    }

    /// Reconfigures the window surface after a resize.
    pub fn resize_surface(&mut self, size: Extent) {
        self.gpu.resize(size);
    }

    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    fn record(&mut self, command: Command) {
        if self.frame.is_none() {
            log::trace!("command recorded outside a frame dropped");
            return;
        }
        self.commands.push(command);
    }

    fn sample_count_supported(&self, samples: u32) -> bool {
        self.caps.supports_samples(samples)
    }

    fn check_extent(&self, size: Extent, what: &str) -> Result<()> {
        let max = self.gpu.device().limits().max_texture_dimension_2d;
        if size.is_empty() || size.width > max || size.height > max {
            return Err(Error::GpuResource(format!(
                "{what} of {}x{} outside 1..={max}",
                size.width, size.height
            )));
        }
        Ok(())
    }

    fn attachment_view(&self, color: ColorAttachment) -> Option<&wgpu::TextureView> {
        match color {
            ColorAttachment::Texture(t) => self.textures.get(t).map(|t| &t.view),
            ColorAttachment::Renderbuffer(r) => {
                self.renderbuffers.get(r)?.storage.as_ref().map(|(_, v)| v)
            }
        }
    }

    fn attachment_texture(&self, color: ColorAttachment) -> Option<&wgpu::Texture> {
        match color {
            ColorAttachment::Texture(t) => self.textures.get(t).map(|t| &t.texture),
            ColorAttachment::Renderbuffer(r) => {
                self.renderbuffers.get(r)?.storage.as_ref().map(|(t, _)| t)
            }
        }
    }

    fn attachment_samples(&self, color: ColorAttachment) -> Option<u32> {
        match color {
            ColorAttachment::Texture(t) => self.textures.get(t).map(|_| 1),
            ColorAttachment::Renderbuffer(r) => self.renderbuffers.get(r).map(|rb| rb.samples),
        }
    }

    fn target_format(&self, target: FramebufferTarget, depth_test: bool) -> Option<TargetFormat> {
        match target {
            FramebufferTarget::Default => Some(TargetFormat {
                format: self.gpu.surface_format(),
                samples: 1,
                depth: false,
                depth_test,
            }),
            FramebufferTarget::Offscreen(id) => {
                let fb = self.framebuffers.get(id)?;
                Some(TargetFormat {
                    format: OFFSCREEN_FORMAT,
                    samples: self.attachment_samples(fb.color)?,
                    depth: fb.depth.is_some(),
                    depth_test,
                })
            }
        }
    }

    // ── frame preparation ─────────────────────────────────────────────────

    fn plan_passes(commands: Vec<Command>) -> Vec<Pass> {
        let mut passes: Vec<Pass> = Vec::new();

        for cmd in commands {
            match cmd {
                Command::Clear { target, color, depth } => match passes.last_mut() {
                    Some(Pass::Render(p)) if p.target == target && p.draws.is_empty() => {
                        p.clear = Some(color);
                        p.clear_depth |= depth;
                    }
                    _ => passes.push(Pass::Render(RenderPassPlan {
                        target,
                        clear: Some(color),
                        clear_depth: depth,
                        draws: Vec::new(),
                    })),
                },
                Command::Draw(draw) => match passes.last_mut() {
                    Some(Pass::Render(p)) if p.target == draw.target => p.draws.push(draw),
                    _ => passes.push(Pass::Render(RenderPassPlan {
                        target: draw.target,
                        clear: None,
                        clear_depth: false,
                        draws: vec![draw],
                    })),
                },
                Command::Blit { src, dst, size } => passes.push(Pass::Resolve {
                    src,
                    dst,
                    size,
                    discard: false,
                }),
                Command::Invalidate(fb) => match passes.last_mut() {
                    Some(Pass::Resolve { src, discard, .. }) if *src == fb => *discard = true,
                    _ => log::trace!("invalidate without a preceding resolve of the same target"),
                },
            }
        }

        passes
    }

    fn prepare(&mut self, passes: &mut [Pass]) {
        let align = self.gpu.device().limits().min_uniform_buffer_offset_alignment as usize;
        let mut staging: Vec<u8> = Vec::new();

        for pass in passes.iter_mut() {
            let Pass::Render(plan) = pass else { continue };
            for draw in plan.draws.iter_mut() {
                draw.key = self.pipeline_key(draw);
                if let Some(key) = &draw.key {
                    if !self.ensure_pipeline(key) {
                        draw.key = None;
                    }
                }

                let offset = align_up(staging.len(), align);
                staging.resize(offset, 0);
                staging.extend_from_slice(&draw.uniforms);
                draw.uniform_offset = offset as u32;

                if let Some(texture) = draw.texture {
                    self.ensure_texture_group(texture);
                }
            }
        }

        if staging.is_empty() {
            return;
        }

        self.ensure_ring_capacity(staging.len() as u64);
        for pass in passes.iter() {
            let Pass::Render(plan) = pass else { continue };
            for draw in &plan.draws {
                self.ensure_ring_group(draw.program);
            }
        }

        if let Some(ring) = self.ring.buffer.as_ref() {
            self.gpu.queue().write_buffer(ring, 0, &staging);
        }
    }

    fn pipeline_key(&self, draw: &DrawCommand) -> Option<PipelineKey> {
        let attributes = match draw.vertex_array {
            Some(id) => self.vertex_arrays.get(id)?.attributes.clone(),
            None => Vec::new(),
        };
        Some(PipelineKey {
            program: draw.program,
            attributes,
            topology: draw.topology,
            target: self.target_format(draw.target, draw.depth_test)?,
        })
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> bool {
        if self.pipelines.contains_key(key) {
            return true;
        }
        let Some(program) = self.programs.get(key.program) else { return false };

        let Some(attrs) = key
            .attributes
            .iter()
            .map(|a| {
                vertex_format(a.ty).map(|format| {
                    [wgpu::VertexAttribute {
                        format,
                        offset: 0,
                        shader_location: a.slot,
                    }]
                })
            })
            .collect::<Option<Vec<_>>>()
        else {
            log::error!("program `{}`: unsupported vertex element type", program.label);
            return false;
        };

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .attributes
            .iter()
            .zip(attrs.iter())
            .map(|(a, attr)| wgpu::VertexBufferLayout {
                array_stride: a.ty.stride() as u64,
                step_mode: match a.step {
                    StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    StepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes: attr,
            })
            .collect();

        let target = key.target;
        let depth_stencil = target.depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: target.depth_test,
            depth_compare: if target.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let blend = match program.blend {
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Replace => None,
        };

        let pipeline = self
            .gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.label),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target.format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: primitive_topology(key.topology),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: target.samples,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview_mask: None,
                cache: None,
            });

        log::debug!(
            "pipeline `{}` built: {:?}, {:?}, {}x",
            program.label,
            key.topology,
            target.format,
            target.samples
        );
        self.pipelines.insert(key.clone(), pipeline);
        true
    }

    fn ensure_texture_group(&mut self, texture: TextureId) {
        if self.texture_groups.contains_key(&texture) {
            return;
        }
        let Some(tex) = self.textures.get(texture) else { return };
        let group = self
            .gpu
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("orbit texture bind group"),
                layout: &self.texture_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&tex.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
        self.texture_groups.insert(texture, group);
    }

    fn ensure_ring_capacity(&mut self, required: u64) {
        if self.ring.buffer.is_some() && required <= self.ring.capacity {
            return;
        }
        let capacity = required.next_power_of_two().max(4096);
        self.ring.buffer = Some(self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("orbit uniform ring"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.ring.capacity = capacity;
        self.ring.groups.clear();
    }

    fn ensure_ring_group(&mut self, program: ProgramId) {
        if self.ring.groups.contains_key(&program) {
            return;
        }
        let (Some(ring), Some(prog)) = (self.ring.buffer.as_ref(), self.programs.get(program))
        else {
            return;
        };
        let group = self
            .gpu
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("orbit uniform bind group"),
                layout: &self.uniform_bgl,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: ring,
                        offset: 0,
                        size: NonZeroU64::new(prog.layout.size() as u64),
                    }),
                }],
            });
        self.ring.groups.insert(program, group);
    }

    // ── encoding ──────────────────────────────────────────────────────────

    fn encode_render(&self, frame: &mut GpuFrame, plan: &RenderPassPlan) {
        let (color_view, depth_view) = match plan.target {
            FramebufferTarget::Default => (&frame.view, None),
            FramebufferTarget::Offscreen(id) => {
                let Some(fb) = self.framebuffers.get(id) else { return };
                let Some(color) = self.attachment_view(fb.color) else { return };
                let depth = fb
                    .depth
                    .and_then(|d| self.renderbuffers.get(d))
                    .and_then(|rb| rb.storage.as_ref().map(|(_, v)| v));
                (color, depth)
            }
        };

        let load = match plan.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("orbit pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if plan.clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for draw in &plan.draws {
            let Some(pipeline) = draw.key.as_ref().and_then(|k| self.pipelines.get(k)) else {
                continue;
            };
            let Some(uniforms) = self.ring.groups.get(&draw.program) else { continue };
            let Some(program) = self.programs.get(draw.program) else { continue };

            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, uniforms, &[draw.uniform_offset]);

            if program.samples_texture {
                let Some(group) = draw.texture.and_then(|t| self.texture_groups.get(&t)) else {
                    log::warn!("`{}` drawn without a texture on unit 0", program.label);
                    continue;
                };
                rpass.set_bind_group(1, group, &[]);
            }

            if let Some(va) = draw.vertex_array.and_then(|id| self.vertex_arrays.get(id)) {
                let Some(buffer) = self.buffers.get(va.buffer) else { continue };
                for (slot, a) in va.attributes.iter().enumerate() {
                    if a.offset >= buffer.size {
                        continue;
                    }
                    rpass.set_vertex_buffer(slot as u32, buffer.buffer.slice(a.offset..));
                }
            }

            rpass.draw(draw.vertices.clone(), draw.instances.clone());
        }
    }

    fn encode_resolve(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: FramebufferId,
        dst: FramebufferId,
        size: Extent,
        discard: bool,
    ) {
        let (Some(s), Some(d)) = (self.framebuffers.get(src), self.framebuffers.get(dst)) else {
            return;
        };

        if self.attachment_samples(s.color).unwrap_or(1) > 1 {
            let (Some(src_view), Some(dst_view)) =
                (self.attachment_view(s.color), self.attachment_view(d.color))
            else {
                return;
            };
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("orbit resolve"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: src_view,
                    resolve_target: Some(dst_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: if discard {
                            wgpu::StoreOp::Discard
                        } else {
                            wgpu::StoreOp::Store
                        },
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            return;
        }

        let (Some(src_tex), Some(dst_tex)) =
            (self.attachment_texture(s.color), self.attachment_texture(d.color))
        else {
            return;
        };
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: src_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: size.width.min(src_tex.width()).min(dst_tex.width()),
                height: size.height.min(src_tex.height()).min(dst_tex.height()),
                depth_or_array_layers: 1,
            },
        );
    }
}

fn vertex_format(ty: ElementType) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    Some(match ty {
        ElementType::Float(1) => F::Float32,
        ElementType::Float(2) => F::Float32x2,
        ElementType::Float(3) => F::Float32x3,
        ElementType::Float(4) => F::Float32x4,
        ElementType::Int(1) => F::Sint32,
        ElementType::Int(2) => F::Sint32x2,
        ElementType::Int(3) => F::Sint32x3,
        ElementType::Int(4) => F::Sint32x4,
        ElementType::UByte(2) => F::Unorm8x2,
        ElementType::UByte(4) => F::Unorm8x4,
        _ => return None,
    })
}

fn primitive_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Points => wgpu::PrimitiveTopology::PointList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

impl RenderBackend for WgpuBackend<'_> {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn surface_size(&self) -> Extent {
        self.gpu.size()
    }

    fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.frame.is_some() {
            log::warn!("begin_frame while a frame is open; previous frame dropped");
            self.frame = None;
            self.commands.clear();
        }
        if self.gpu.size().is_empty() {
            return Ok(FrameStatus::Skip);
        }

        match self.gpu.begin_frame() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(FrameStatus::Ready)
            }
            Err(err) => match self.gpu.handle_surface_error(err) {
                SurfaceErrorAction::Fatal => Err(Error::GpuResource(
                    "surface out of memory".to_string(),
                )),
                action => {
                    log::debug!("frame skipped: {action:?}");
                    Ok(FrameStatus::Skip)
                }
            },
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        let commands = std::mem::take(&mut self.commands);
        let Some(mut frame) = self.frame.take() else {
            return Ok(());
        };

        let mut passes = Self::plan_passes(commands);
        self.prepare(&mut passes);

        for pass in &passes {
            match pass {
                Pass::Render(plan) => self.encode_render(&mut frame, plan),
                Pass::Resolve {
                    src,
                    dst,
                    size,
                    discard,
                } => self.encode_resolve(&mut frame.encoder, *src, *dst, *size, *discard),
            }
        }

        self.gpu.submit(frame);
        Ok(())
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> Result<BufferId> {
        let limit = self.gpu.device().limits().max_buffer_size;
        if size == 0 || size > limit {
            return Err(Error::GpuResource(format!(
                "buffer of {size} bytes outside 1..={limit}"
            )));
        }
        let size = align_up(size as usize, wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64;
        let buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(match usage {
                BufferUsage::Static => "orbit static vbo",
                BufferUsage::Stream => "orbit stream vbo",
            }),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(GpuBuffer { buffer, size }))
    }

    fn upload_subrange(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let buf = self
            .buffers
            .get(buffer)
            .ok_or(Error::UnknownHandle { kind: "buffer" })?;
        let end = offset + data.len() as u64;
        if end > buf.size {
            return Err(Error::GpuResource(format!(
                "upload {offset}..{end} outside buffer of {}",
                buf.size
            )));
        }
        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        if offset % align != 0 || data.len() as u64 % align != 0 {
            return Err(Error::GpuResource(format!(
                "upload {offset}..{end} is not {align}-byte aligned"
            )));
        }
        if !data.is_empty() {
            self.gpu.queue().write_buffer(&buf.buffer, offset, data);
        }
        Ok(())
    }

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        attributes: &[AttributeBinding],
    ) -> Result<VertexArrayId> {
        if !self.buffers.contains_key(buffer) {
            return Err(Error::UnknownHandle { kind: "buffer" });
        }
        if let Some(bad) = attributes.iter().find(|a| vertex_format(a.ty).is_none()) {
            return Err(Error::GpuResource(format!(
                "vertex element type {:?} has no wgpu vertex format",
                bad.ty
            )));
        }
        Ok(self.vertex_arrays.insert(GpuVertexArray {
            buffer,
            attributes: attributes.to_vec(),
        }))
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound.vertex_array = vertex_array;
    }

    fn create_texture(&mut self, size: Extent) -> Result<TextureId> {
        self.check_extent(size, "texture")?;
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("orbit texture"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.textures.insert(GpuTexture {
            texture,
            view,
            size,
        }))
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
        self.check_extent(size, "renderbuffer")?;
        let samples = samples.max(1);

        let storage = self.sample_count_supported(samples).then(|| {
            let (wgpu_format, mut usage) = match format {
                RenderbufferFormat::Color => {
                    (OFFSCREEN_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT)
                }
                RenderbufferFormat::Depth => (DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT),
            };
            if samples == 1 && format == RenderbufferFormat::Color {
                usage |= wgpu::TextureUsages::COPY_SRC;
            }
            let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
                label: Some("orbit renderbuffer"),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: samples,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu_format,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        if storage.is_none() {
            log::warn!("renderbuffer with {samples} samples is not supported by this adapter");
        }

        Ok(self.renderbuffers.insert(GpuRenderbuffer {
            storage,
            size,
            format,
            samples,
        }))
    }

    fn create_framebuffer(
        &mut self,
        color: ColorAttachment,
        depth: Option<RenderbufferId>,
    ) -> Result<FramebufferId> {
        Ok(self.framebuffers.insert(GpuFramebuffer { color, depth }))
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(framebuffer) else {
            return FramebufferStatus::MissingAttachment;
        };

        let (size, samples) = match fb.color {
            ColorAttachment::Texture(t) => match self.textures.get(t) {
                Some(tex) => (tex.size, 1),
                None => return FramebufferStatus::MissingAttachment,
            },
            ColorAttachment::Renderbuffer(r) => match self.renderbuffers.get(r) {
                Some(rb) if rb.format != RenderbufferFormat::Color => {
                    return FramebufferStatus::IncompleteAttachment;
                }
                Some(rb) if rb.storage.is_none() => return FramebufferStatus::Unsupported,
                Some(rb) => (rb.size, rb.samples),
                None => return FramebufferStatus::MissingAttachment,
            },
        };

        if let Some(d) = fb.depth {
            let Some(rb) = self.renderbuffers.get(d) else {
                return FramebufferStatus::MissingAttachment;
            };
            if rb.format != RenderbufferFormat::Depth {
                return FramebufferStatus::IncompleteAttachment;
            }
            if rb.storage.is_none() {
                return FramebufferStatus::Unsupported;
            }
            if rb.size != size {
                return FramebufferStatus::IncompleteDimensions;
            }
            if rb.samples != samples {
                return FramebufferStatus::IncompleteMultisample;
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

    fn clear(&mut self, color: [f32; 4], depth: bool) {
        let target = self.bound.target;
        self.record(Command::Clear {
            target,
            color,
            depth,
        });
    }

    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, size: Extent) {
        self.record(Command::Blit { src, dst, size });
    }

    fn invalidate(&mut self, framebuffer: FramebufferId) {
        self.record(Command::Invalidate(framebuffer));
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

        let device = self.gpu.device();
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let pipeline_layout = if desc.samples_texture {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&self.uniform_bgl, &self.texture_bgl],
                immediate_size: 0,
            })
        } else {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&self.uniform_bgl],
                immediate_size: 0,
            })
        };

        let layout = UniformLayout::new(desc.uniforms);
        let block = UniformBlock::zeroed(&layout);
        log::debug!("program `{}` compiled ({} uniform bytes)", desc.label, layout.size());

        Ok(self.programs.insert(GpuProgram {
            label: desc.label.to_string(),
            module,
            layout,
            block,
            samples_texture: desc.samples_texture,
            blend: desc.blend,
            pipeline_layout,
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
        let Some(uniforms) = self.programs.get(program).map(|p| p.block.as_bytes().to_vec())
        else {
            return;
        };

        self.record(Command::Draw(DrawCommand {
            target: self.bound.target,
            depth_test: self.bound.depth_test,
            program,
            vertex_array: self.bound.vertex_array,
            texture: self.bound.texture0,
            topology,
            vertices,
            instances,
            uniforms,
            key: None,
            uniform_offset: 0,
        }));
    }

    fn release(&mut self, resource: Resource) {
        match resource {
            Resource::Buffer(id) => {
                if let Some(b) = self.buffers.remove(id) {
                    b.buffer.destroy();
                }
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
                self.texture_groups.remove(&id);
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
                self.pipelines.retain(|k, _| k.program != id);
                self.ring.groups.remove(&id);
                self.programs.remove(id);
            }
        }
    }
}
