//! CPU-side uniform blocks.
//!
//! A program declares its uniforms as an ordered list of `(name, type)` pairs. The
//! layout assigns byte offsets following WGSL uniform address-space alignment, so
//! the block can be copied verbatim into a uniform buffer bound to a struct with
//! the same field order.

/// Uniform value types supported by programs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformType {
    Int,
    Float,
    Vec2,
    Vec4,
    Mat4,
}

impl UniformType {
    /// Size in bytes.
    pub const fn size(self) -> usize {
        match self {
            UniformType::Int | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
        }
    }

    /// Required alignment in bytes (WGSL uniform address space).
    pub const fn align(self) -> usize {
        match self {
            UniformType::Int | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec4 | UniformType::Mat4 => 16,
        }
    }
}

/// A uniform declaration as written by the program author.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformDecl {
    pub name: &'static str,
    pub ty: UniformType,
}

impl UniformDecl {
    pub const fn new(name: &'static str, ty: UniformType) -> Self {
        Self { name, ty }
    }
}

/// Reflection data for one uniform: where it lives inside the block.
///
/// `offset` plays the role of a uniform location.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformInfo {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub ty: UniformType,
}

/// Block layout computed once from the declaration list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformLayout {
    fields: Vec<UniformInfo>,
    size: usize,
}

/// Blocks are padded to this size so they can back a struct of any member mix.
const BLOCK_ALIGN: usize = 16;

impl UniformLayout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut fields = Vec::with_capacity(decls.len());
        let mut cursor = 0usize;

        for d in decls {
            let offset = align_up(cursor, d.ty.align());
            fields.push(UniformInfo {
                name: d.name,
                offset,
                size: d.ty.size(),
                ty: d.ty,
            });
            cursor = offset + d.ty.size();
        }

        Self {
            fields,
            size: align_up(cursor, BLOCK_ALIGN).max(BLOCK_ALIGN),
        }
    }

    /// Looks up a uniform by name.
    pub fn find(&self, name: &str) -> Option<UniformInfo> {
        self.fields.iter().find(|f| f.name == name).copied()
    }

    /// Total block size in bytes (never zero).
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn fields(&self) -> &[UniformInfo] {
        &self.fields
    }
}

/// Current values of a program's uniforms.
///
/// Values persist between draws, like GL program state; every draw snapshots the
/// block as it is at the time of the call.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn zeroed(layout: &UniformLayout) -> Self {
        Self {
            bytes: vec![0; layout.size()],
        }
    }

    /// Writes `data` at `offset`. Writes running past the block end are dropped.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> bool {
        let Some(end) = offset.checked_add(data.len()) else { return false };
        let Some(dst) = self.bytes.get_mut(offset..end) else {
            return false;
        };
        dst.copy_from_slice(data);
        true
    }

    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        let raw = self.bytes.get(offset..offset + 4)?;
        Some(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn read_f32(&self, offset: usize) -> Option<f32> {
        self.read_i32(offset).map(|v| f32::from_bits(v as u32))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_matches_wgsl_struct() {
        let layout = UniformLayout::new(&[
            UniformDecl::new("projection", UniformType::Mat4),
            UniformDecl::new("model", UniformType::Mat4),
            UniformDecl::new("color", UniformType::Vec4),
        ]);
        assert_eq!(layout.find("projection").unwrap().offset, 0);
        assert_eq!(layout.find("model").unwrap().offset, 64);
        assert_eq!(layout.find("color").unwrap().offset, 128);
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn vec2_after_scalar_is_padded_to_eight() {
        let layout = UniformLayout::new(&[
            UniformDecl::new("projection", UniformType::Mat4),
            UniformDecl::new("point_size", UniformType::Float),
            UniformDecl::new("viewport", UniformType::Vec2),
        ]);
        assert_eq!(layout.find("point_size").unwrap().offset, 64);
        assert_eq!(layout.find("viewport").unwrap().offset, 72);
        assert_eq!(layout.size(), 80);
    }

    #[test]
    fn small_block_is_padded_to_sixteen() {
        let layout = UniformLayout::new(&[UniformDecl::new("blur", UniformType::Int)]);
        assert_eq!(layout.size(), 16);

        let empty = UniformLayout::new(&[]);
        assert_eq!(empty.size(), 16);
        assert!(empty.find("blur").is_none());
    }

    #[test]
    fn block_write_rejects_out_of_range() {
        let layout = UniformLayout::new(&[UniformDecl::new("blur", UniformType::Int)]);
        let mut block = UniformBlock::zeroed(&layout);

        assert!(block.write(0, &1i32.to_ne_bytes()));
        assert_eq!(block.read_i32(0), Some(1));
        assert!(!block.write(14, &[0u8; 4]));
        assert!(!block.write(usize::MAX, &[0u8; 1]));
    }
}
