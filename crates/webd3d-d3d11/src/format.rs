//! DXGI format subset and its WebGL2 equivalents.

use crate::gl;

/// Pixel and vertex formats, with their DXGI enumerant values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Format {
    #[default]
    Unknown = 0,
    R32G32B32A32Float = 2,
    R32G32B32Float = 6,
    R16G16B16A16Float = 10,
    R32G32Float = 16,
    D32FloatS8X24Uint = 20,
    R10G10B10A2Unorm = 24,
    R11G11B10Float = 26,
    R8G8B8A8Unorm = 28,
    R8G8B8A8UnormSrgb = 29,
    R8G8B8A8Uint = 30,
    R8G8B8A8Snorm = 31,
    R16G16Float = 34,
    D32Float = 40,
    R32Float = 41,
    R32Uint = 42,
    R32Sint = 43,
    D24UnormS8Uint = 45,
    R8G8Unorm = 49,
    R16Float = 54,
    D16Unorm = 55,
    R16Uint = 57,
    R8Unorm = 61,
}

/// How a render target of this format is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Float,
    Uint,
    Sint,
}

/// Texture storage/upload triple plus capability bits for a [`Format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub internal_format: u32,
    pub format: u32,
    pub ty: u32,
    pub bytes_per_pixel: u32,
    pub kind: ComponentKind,
    pub depth: bool,
    pub stencil: bool,
    /// Usable as a color attachment.
    pub renderable: bool,
    /// Supports linear filtering without extensions.
    pub filterable: bool,
}

/// Vertex attribute interpretation of a [`Format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexFormatInfo {
    pub components: u32,
    pub ty: u32,
    pub normalized: bool,
    /// Fed through `vertexAttribIPointer` to an integer shader input.
    pub integer: bool,
    pub size_bytes: u32,
}

const fn color(
    internal_format: u32,
    format: u32,
    ty: u32,
    bytes_per_pixel: u32,
    kind: ComponentKind,
    renderable: bool,
    filterable: bool,
) -> FormatInfo {
    FormatInfo {
        internal_format,
        format,
        ty,
        bytes_per_pixel,
        kind,
        depth: false,
        stencil: false,
        renderable,
        filterable,
    }
}

const fn depth(internal_format: u32, format: u32, ty: u32, bytes_per_pixel: u32, stencil: bool) -> FormatInfo {
    FormatInfo {
        internal_format,
        format,
        ty,
        bytes_per_pixel,
        kind: ComponentKind::Float,
        depth: true,
        stencil,
        renderable: false,
        filterable: false,
    }
}

impl Format {
    pub fn info(self) -> Option<FormatInfo> {
        use ComponentKind::{Float, Sint, Uint};
        Some(match self {
            Format::Unknown => return None,
            Format::R32G32B32A32Float => color(gl::RGBA32F, gl::RGBA, gl::FLOAT, 16, Float, true, false),
            Format::R32G32B32Float => color(gl::RGB32F, gl::RGB, gl::FLOAT, 12, Float, false, false),
            Format::R16G16B16A16Float => color(gl::RGBA16F, gl::RGBA, gl::HALF_FLOAT, 8, Float, true, true),
            Format::R32G32Float => color(gl::RG32F, gl::RG, gl::FLOAT, 8, Float, true, false),
            Format::R10G10B10A2Unorm => {
                color(gl::RGB10_A2, gl::RGBA, gl::UNSIGNED_INT_2_10_10_10_REV, 4, Float, true, true)
            }
            Format::R11G11B10Float => {
                color(gl::R11F_G11F_B10F, gl::RGB, gl::UNSIGNED_INT_10F_11F_11F_REV, 4, Float, true, true)
            }
            Format::R8G8B8A8Unorm => color(gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE, 4, Float, true, true),
            Format::R8G8B8A8UnormSrgb => {
                color(gl::SRGB8_ALPHA8, gl::RGBA, gl::UNSIGNED_BYTE, 4, Float, true, true)
            }
            Format::R8G8B8A8Uint => color(gl::RGBA8UI, gl::RGBA_INTEGER, gl::UNSIGNED_BYTE, 4, Uint, true, false),
            Format::R8G8B8A8Snorm => color(gl::RGBA8_SNORM, gl::RGBA, gl::BYTE, 4, Float, false, true),
            Format::R16G16Float => color(gl::RG16F, gl::RG, gl::HALF_FLOAT, 4, Float, true, true),
            Format::R32Float => color(gl::R32F, gl::RED, gl::FLOAT, 4, Float, true, false),
            Format::R32Uint => color(gl::R32UI, gl::RED_INTEGER, gl::UNSIGNED_INT, 4, Uint, true, false),
            Format::R32Sint => color(gl::R32I, gl::RED_INTEGER, gl::INT, 4, Sint, true, false),
            Format::R8G8Unorm => color(gl::RG8, gl::RG, gl::UNSIGNED_BYTE, 2, Float, true, true),
            Format::R16Float => color(gl::R16F, gl::RED, gl::HALF_FLOAT, 2, Float, true, true),
            Format::R16Uint => color(gl::R16UI, gl::RED_INTEGER, gl::UNSIGNED_SHORT, 2, Uint, true, false),
            Format::R8Unorm => color(gl::R8, gl::RED, gl::UNSIGNED_BYTE, 1, Float, true, true),
            Format::D32Float => depth(gl::DEPTH_COMPONENT32F, gl::DEPTH_COMPONENT, gl::FLOAT, 4, false),
            Format::D24UnormS8Uint => depth(gl::DEPTH24_STENCIL8, gl::DEPTH_STENCIL, gl::UNSIGNED_INT_24_8, 4, true),
            Format::D16Unorm => depth(gl::DEPTH_COMPONENT16, gl::DEPTH_COMPONENT, gl::UNSIGNED_SHORT, 2, false),
            Format::D32FloatS8X24Uint => depth(
                gl::DEPTH32F_STENCIL8,
                gl::DEPTH_STENCIL,
                gl::FLOAT_32_UNSIGNED_INT_24_8_REV,
                8,
                true,
            ),
        })
    }

    pub fn is_depth(self) -> bool {
        self.info().is_some_and(|info| info.depth)
    }

    pub fn vertex_info(self) -> Option<VertexFormatInfo> {
        let (components, ty, normalized, integer, size_bytes) = match self {
            Format::R32G32B32A32Float => (4, gl::FLOAT, false, false, 16),
            Format::R32G32B32Float => (3, gl::FLOAT, false, false, 12),
            Format::R32G32Float => (2, gl::FLOAT, false, false, 8),
            Format::R32Float => (1, gl::FLOAT, false, false, 4),
            Format::R16G16B16A16Float => (4, gl::HALF_FLOAT, false, false, 8),
            Format::R16G16Float => (2, gl::HALF_FLOAT, false, false, 4),
            Format::R8G8B8A8Unorm => (4, gl::UNSIGNED_BYTE, true, false, 4),
            Format::R8G8B8A8Snorm => (4, gl::BYTE, true, false, 4),
            Format::R8G8Unorm => (2, gl::UNSIGNED_BYTE, true, false, 2),
            Format::R8Unorm => (1, gl::UNSIGNED_BYTE, true, false, 1),
            Format::R8G8B8A8Uint => (4, gl::UNSIGNED_BYTE, false, true, 4),
            Format::R32Uint => (1, gl::UNSIGNED_INT, false, true, 4),
            Format::R32Sint => (1, gl::INT, false, true, 4),
            Format::R16Uint => (1, gl::UNSIGNED_SHORT, false, true, 2),
            _ => return None,
        };
        Some(VertexFormatInfo {
            components,
            ty,
            normalized,
            integer,
            size_bytes,
        })
    }

    /// Backend index type and index size in bytes.
    pub fn index_type(self) -> Option<(u32, u32)> {
        match self {
            Format::R16Uint => Some((gl::UNSIGNED_SHORT, 2)),
            Format::R32Uint => Some((gl::UNSIGNED_INT, 4)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_carry_stencil_bits() {
        let d24 = Format::D24UnormS8Uint.info().unwrap();
        assert!(d24.depth && d24.stencil);
        assert_eq!(d24.format, gl::DEPTH_STENCIL);
        let d32 = Format::D32Float.info().unwrap();
        assert!(d32.depth && !d32.stencil);
        assert!(!Format::R8G8B8A8Unorm.is_depth());
    }

    #[test]
    fn rgba8_maps_to_unsigned_byte_upload() {
        let info = Format::R8G8B8A8Unorm.info().unwrap();
        assert_eq!(
            (info.internal_format, info.format, info.ty),
            (gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE)
        );
        assert_eq!(Format::Unknown.info(), None);
    }

    #[test]
    fn only_sixteen_and_thirty_two_bit_indices() {
        assert_eq!(Format::R16Uint.index_type(), Some((gl::UNSIGNED_SHORT, 2)));
        assert_eq!(Format::R32Uint.index_type(), Some((gl::UNSIGNED_INT, 4)));
        assert_eq!(Format::R8Unorm.index_type(), None);
    }
}
