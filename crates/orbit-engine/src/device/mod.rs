//! GPU capability layer.
//!
//! This module is responsible for:
//! - the [`RenderBackend`] trait and the typed resource handles it hands out
//! - uniform block layouts shared by every backend
//! - the wgpu context bound to a window surface and the backend built on it
//! - a host-memory backend for running the core without a GPU

mod backend;
mod gpu;
mod headless;
mod uniform;
mod wgpu_backend;

pub use backend::{
    AttributeBinding, BlendMode, BufferId, BufferUsage, Capabilities, ColorAttachment,
    ElementType, Extent, FrameStatus, FramebufferId, FramebufferStatus, FramebufferTarget,
    ProgramDesc, ProgramId, RenderBackend, RenderbufferFormat, RenderbufferId, Resource, StepMode,
    TextureId, Topology, VertexArrayId,
};
pub use gpu::{Gpu, GpuFrame, GpuInit, SurfaceErrorAction};
pub use headless::{DrawRecord, HeadlessBackend};
pub use uniform::{UniformBlock, UniformDecl, UniformInfo, UniformLayout, UniformType};
pub use wgpu_backend::WgpuBackend;
