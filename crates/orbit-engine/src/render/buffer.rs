use bytemuck::Pod;

use crate::device::{
    AttributeBinding, BufferId, BufferUsage, ElementType, RenderBackend, Resource, StepMode,
    VertexArrayId,
};
use crate::error::{Error, Result};

/// Declaration of one attribute sub-range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SubrangeDesc {
    /// Shader attribute location.
    pub slot: u32,
    pub ty: ElementType,
    /// Element capacity.
    pub count: usize,
    pub step: StepMode,
}

impl SubrangeDesc {
    pub const fn vertex(slot: u32, ty: ElementType, count: usize) -> Self {
        Self {
            slot,
            ty,
            count,
            step: StepMode::Vertex,
        }
    }

    pub const fn instance(slot: u32, ty: ElementType, count: usize) -> Self {
        Self {
            slot,
            ty,
            count,
            step: StepMode::Instance,
        }
    }
}

/// A sub-range with its resolved placement inside the buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Subrange {
    pub slot: u32,
    pub ty: ElementType,
    pub count: usize,
    pub offset: u64,
    pub stride: usize,
    pub step: StepMode,
}

impl Subrange {
    #[inline]
    pub fn byte_len(&self) -> u64 {
        self.stride as u64 * self.count as u64
    }
}

/// Placement of every sub-range plus the total size.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferLayout {
    pub subranges: Vec<Subrange>,
    pub size: u64,
}

/// Packs the declared sub-ranges back to back, in declaration order.
pub fn layout(descs: &[SubrangeDesc]) -> Result<BufferLayout> {
    if descs.is_empty() {
        return Err(Error::Allocation("vertex buffer declares no sub-ranges".into()));
    }

    let mut subranges = Vec::with_capacity(descs.len());
    let mut cursor = 0u64;
    for d in descs {
        let stride = d.ty.stride();
        let len = stride
            .checked_mul(d.count)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                Error::Allocation(format!("sub-range at slot {} is too large", d.slot))
            })?;
        let sub = Subrange {
            slot: d.slot,
            ty: d.ty,
            count: d.count,
            offset: cursor,
            stride,
            step: d.step,
        };
        cursor = cursor
            .checked_add(len)
            .ok_or_else(|| Error::Allocation("vertex buffer size overflows".into()))?;
        subranges.push(sub);
    }

    if cursor == 0 {
        return Err(Error::Allocation("vertex buffer has zero size".into()));
    }

    Ok(BufferLayout {
        subranges,
        size: cursor,
    })
}

/// GPU buffer split into fixed attribute sub-ranges.
///
/// Sub-range offsets are fixed at creation. Updates never resize the buffer: a
/// write larger than a sub-range's capacity is rejected, and the owner recreates
/// the buffer at a bigger size.
#[derive(Debug)]
pub struct VertexBuffer {
    buffer: Option<BufferId>,
    vertex_array: Option<VertexArrayId>,
    layout: BufferLayout,
    usage: BufferUsage,
}

impl VertexBuffer {
    pub fn create(
        backend: &mut dyn RenderBackend,
        subranges: &[SubrangeDesc],
        usage: BufferUsage,
    ) -> Result<Self> {
        let layout = layout(subranges)?;
        let buffer = backend.create_buffer(layout.size, usage)?;

        let bindings: Vec<AttributeBinding> = layout
            .subranges
            .iter()
            .map(|s| AttributeBinding {
                slot: s.slot,
                ty: s.ty,
                offset: s.offset,
                step: s.step,
            })
            .collect();

        let vertex_array = match backend.create_vertex_array(buffer, &bindings) {
            Ok(va) => va,
            Err(e) => {
                backend.release(Resource::Buffer(buffer));
                return Err(e);
            }
        };

        log::trace!(
            "vertex buffer: {} sub-ranges, {} bytes, {usage:?}",
            layout.subranges.len(),
            layout.size
        );

        Ok(Self {
            buffer: Some(buffer),
            vertex_array: Some(vertex_array),
            layout,
            usage,
        })
    }

    /// Uploads `data` to the start of sub-range `index`.
    pub fn update_subrange<T: Pod>(
        &self,
        backend: &mut dyn RenderBackend,
        index: usize,
        data: &[T],
    ) -> Result<()> {
        let sub = self.layout.subranges.get(index).ok_or(Error::SubrangeIndex {
            index,
            len: self.layout.subranges.len(),
        })?;
        let buffer = self.buffer.ok_or(Error::UnknownHandle { kind: "buffer" })?;

        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() % sub.stride != 0 {
            return Err(Error::Misaligned {
                bytes: bytes.len(),
                stride: sub.stride,
            });
        }
        let requested = bytes.len() / sub.stride;
        if requested > sub.count {
            return Err(Error::Capacity {
                index,
                requested,
                capacity: sub.count,
            });
        }

        backend.upload_subrange(buffer, sub.offset, bytes)
    }

    /// Makes this buffer the current vertex source.
    pub fn bind(&self, backend: &mut dyn RenderBackend) {
        backend.bind_vertex_array(self.vertex_array);
    }

    /// Smallest element capacity across sub-ranges.
    pub fn capacity(&self) -> usize {
        self.layout
            .subranges
            .iter()
            .map(|s| s.count)
            .min()
            .unwrap_or(0)
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(va) = self.vertex_array.take() {
            backend.release(Resource::VertexArray(va));
        }
        if let Some(buf) = self.buffer.take() {
            backend.release(Resource::Buffer(buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Extent, HeadlessBackend};

    fn particle_ranges(count: usize) -> [SubrangeDesc; 3] {
        [
            SubrangeDesc::instance(0, ElementType::Float(2), count),
            SubrangeDesc::instance(1, ElementType::Float(2), count),
            SubrangeDesc::vertex(2, ElementType::UByte(4), count),
        ]
    }

    #[test]
    fn offsets_are_contiguous_in_declaration_order() {
        let l = layout(&particle_ranges(100)).unwrap();
        let offsets: Vec<u64> = l.subranges.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 800, 1600]);
        assert_eq!(l.size, 2000);

        for pair in l.subranges.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].byte_len());
        }
    }

    #[test]
    fn empty_or_zero_sized_layout_is_rejected() {
        assert!(matches!(layout(&[]), Err(Error::Allocation(_))));
        assert!(matches!(
            layout(&[SubrangeDesc::vertex(0, ElementType::Float(2), 0)]),
            Err(Error::Allocation(_))
        ));
    }

    #[test]
    fn oversized_counts_are_rejected_not_wrapped() {
        let huge = usize::MAX / 8;
        assert!(matches!(
            layout(&[SubrangeDesc::vertex(0, ElementType::Float(4), huge)]),
            Err(Error::Allocation(_))
        ));
        assert!(matches!(
            layout(&[
                SubrangeDesc::vertex(0, ElementType::Float(2), huge),
                SubrangeDesc::vertex(1, ElementType::Float(2), huge),
            ]),
            Err(Error::Allocation(_))
        ));
    }

    #[test]
    fn update_lands_at_fixed_offset() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let vb = VertexBuffer::create(&mut backend, &particle_ranges(2), BufferUsage::Stream)
            .unwrap();

        vb.update_subrange(&mut backend, 1, &[[1.0f32, 2.0], [3.0, 4.0]])
            .unwrap();

        let buffer = vb.buffer.unwrap();
        let bytes = backend.buffer_contents(buffer).unwrap();
        let expected: &[u8] = bytemuck::cast_slice(&[1.0f32, 2.0, 3.0, 4.0]);
        assert_eq!(&bytes[16..32], expected);
        assert!(bytes[..16].iter().all(|&b| b == 0));
        assert!(bytes[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn update_beyond_capacity_is_rejected_without_writing() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let vb = VertexBuffer::create(&mut backend, &particle_ranges(2), BufferUsage::Stream)
            .unwrap();

        let err = vb
            .update_subrange(&mut backend, 0, &[[9.0f32, 9.0]; 3])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity {
                index: 0,
                requested: 3,
                capacity: 2
            }
        ));
        let bytes = backend.buffer_contents(vb.buffer.unwrap()).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn partial_and_malformed_updates() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let vb = VertexBuffer::create(&mut backend, &particle_ranges(4), BufferUsage::Stream)
            .unwrap();

        assert!(vb.update_subrange(&mut backend, 0, &[[0.5f32, 0.5]]).is_ok());
        assert!(matches!(
            vb.update_subrange(&mut backend, 0, &[1.0f32, 2.0, 3.0]),
            Err(Error::Misaligned { bytes: 12, stride: 8 })
        ));
        assert!(matches!(
            vb.update_subrange(&mut backend, 3, &[0u8; 4]),
            Err(Error::SubrangeIndex { index: 3, len: 3 })
        ));
    }

    #[test]
    fn dispose_releases_everything_once() {
        let mut backend = HeadlessBackend::new(Extent::new(1, 1));
        let mut vb =
            VertexBuffer::create(&mut backend, &particle_ranges(4), BufferUsage::Static).unwrap();
        assert_eq!(backend.live_resources(), 2);
        assert_eq!(vb.capacity(), 4);

        vb.dispose(&mut backend);
        vb.dispose(&mut backend);
        assert_eq!(backend.live_resources(), 0);
        assert!(matches!(
            vb.update_subrange(&mut backend, 0, &[[0.0f32; 2]]),
            Err(Error::UnknownHandle { .. })
        ));
    }
}
