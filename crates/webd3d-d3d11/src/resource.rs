//! Buffers and textures.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::backend::{GlBackend, GlBuffer, GlTexture};
use crate::context::DirtyFlags;
use crate::desc::{
    BindFlags, BufferDesc, CpuAccessFlags, ResourceMiscFlags, SampleDesc, SubresourceData,
    Texture1DDesc, Texture2DDesc, Texture3DDesc, Usage,
};
use crate::device::Device;
use crate::error::{D3dError, Result};
use crate::format::{Format, FormatInfo};
use crate::gl;
use crate::object::{impl_unknown, RefCount, Unknown};

/// Largest constant buffer the native API allows (4096 float4 constants).
pub const MAX_CONSTANT_BUFFER_BYTES: u32 = 4096 * 16;

pub(crate) struct BufferInner {
    pub(crate) refs: RefCount,
    device: Device,
    desc: BufferDesc,
    handle: GlBuffer,
    target: u32,
    /// CPU copy of a dynamic buffer's contents, written by `map`.
    pub(crate) shadow: RefCell<Vec<u8>>,
}

#[derive(Clone)]
pub struct Buffer(pub(crate) Rc<BufferInner>);

impl_unknown!(Buffer, "Buffer");

impl Buffer {
    pub fn desc(&self) -> BufferDesc {
        self.0.desc.clone()
    }

    pub(crate) fn device(&self) -> &Device {
        &self.0.device
    }

    pub(crate) fn byte_width(&self) -> u32 {
        self.0.desc.byte_width
    }

    pub(crate) fn usage(&self) -> Usage {
        self.0.desc.usage
    }

    pub(crate) fn bind_flags(&self) -> BindFlags {
        self.0.desc.bind_flags
    }

    /// Backend handle, failing once the buffer has been released.
    pub(crate) fn gl_handle(&self) -> Result<GlBuffer> {
        self.0.refs.ensure_alive("Buffer")?;
        Ok(self.0.handle)
    }

    /// Writes `data` at `offset` through the buffer's own bind target. Index buffers are only
    /// bound with no vertex array bound, so the caller's vertex array keeps its element buffer.
    pub(crate) fn write(&self, gl: &mut dyn GlBackend, offset: usize, data: &[u8], orphan: bool) {
        if self.0.target == gl::ELEMENT_ARRAY_BUFFER {
            gl.bind_vertex_array(None);
            self.0
                .device
                .perturb(DirtyFlags::INPUT_ASSEMBLER | DirtyFlags::INDEX_BUFFER);
        }
        gl.bind_buffer(self.0.target, Some(self.0.handle));
        if orphan {
            gl.buffer_data(self.0.target, data.len(), Some(data), gl_usage(self.0.desc.usage));
        } else {
            gl.buffer_sub_data(self.0.target, offset, data);
        }
    }

    fn destroy(&self) {
        self.0.device.gl().delete_buffer(self.0.handle);
        self.0.device.release_child_ref();
    }
}

fn gl_usage(usage: Usage) -> u32 {
    match usage {
        Usage::Dynamic => gl::DYNAMIC_DRAW,
        _ => gl::STATIC_DRAW,
    }
}

/// Shared checks for usage and CPU access flags.
fn validate_usage(usage: Usage, cpu: CpuAccessFlags, has_data: bool, what: &str) -> Result<()> {
    match usage {
        Usage::Staging => Err(D3dError::unsupported("staging resources")),
        Usage::Immutable => {
            if !cpu.is_empty() {
                return Err(D3dError::invalid("immutable resources cannot have CPU access flags"));
            }
            if !has_data {
                return Err(D3dError::invalid(format!("immutable {what}s must have initial data")));
            }
            Ok(())
        }
        Usage::Default => {
            if cpu.is_empty() {
                Ok(())
            } else {
                Err(D3dError::invalid("default-usage resources cannot have CPU access flags"))
            }
        }
        Usage::Dynamic => {
            if cpu == CpuAccessFlags::WRITE {
                Ok(())
            } else {
                Err(D3dError::invalid("dynamic resources require exactly CPU write access"))
            }
        }
    }
}

impl Device {
    pub fn create_buffer(&self, desc: &BufferDesc, initial: Option<&SubresourceData<'_>>) -> Result<Buffer> {
        self.ensure_alive()?;
        let desc = desc.clone();
        if desc.byte_width == 0 {
            return Err(D3dError::invalid("buffer byte width must be non-zero"));
        }
        let bind = desc.bind_flags;
        if bind.is_empty() {
            return Err(D3dError::invalid("buffers need at least one bind flag"));
        }
        if bind.intersects(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) {
            return Err(D3dError::invalid("buffers cannot be render targets or depth-stencil targets"));
        }
        if bind.intersects(BindFlags::SHADER_RESOURCE | BindFlags::STREAM_OUTPUT | BindFlags::UNORDERED_ACCESS) {
            return Err(D3dError::unsupported(format!("buffer bind flags {bind:?}")));
        }
        if bind.contains(BindFlags::CONSTANT_BUFFER) {
            if bind != BindFlags::CONSTANT_BUFFER {
                return Err(D3dError::invalid("the constant buffer bind flag cannot be combined with other flags"));
            }
            if desc.byte_width % 16 != 0 {
                return Err(D3dError::invalid(format!(
                    "constant buffer size {} is not a multiple of 16",
                    desc.byte_width
                )));
            }
            if desc.byte_width > MAX_CONSTANT_BUFFER_BYTES {
                return Err(D3dError::invalid(format!(
                    "constant buffer size {} exceeds {MAX_CONSTANT_BUFFER_BYTES}",
                    desc.byte_width
                )));
            }
        }
        if bind.contains(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER) {
            // The backend never lets an element buffer serve another target.
            return Err(D3dError::unsupported("buffers bound as both vertex and index buffers"));
        }
        if !desc.misc_flags.is_empty() {
            return Err(D3dError::unsupported(format!("buffer misc flags {:?}", desc.misc_flags)));
        }
        validate_usage(desc.usage, desc.cpu_access_flags, initial.is_some(), "buffer")?;
        let size = desc.byte_width as usize;
        let data = match initial {
            Some(init) if init.data.len() < size => {
                return Err(D3dError::invalid(format!(
                    "initial data is {} bytes but the buffer is {size}",
                    init.data.len()
                )));
            }
            Some(init) => Some(&init.data[..size]),
            None => None,
        };

        let target = if bind.contains(BindFlags::INDEX_BUFFER) {
            gl::ELEMENT_ARRAY_BUFFER
        } else if bind.contains(BindFlags::CONSTANT_BUFFER) {
            gl::UNIFORM_BUFFER
        } else {
            gl::ARRAY_BUFFER
        };
        let handle = {
            let mut gl = self.gl();
            let handle = gl.create_buffer()?;
            if target == gl::ELEMENT_ARRAY_BUFFER {
                gl.bind_vertex_array(None);
            }
            gl.bind_buffer(target, Some(handle));
            gl.buffer_data(target, size, data, gl_usage(desc.usage));
            handle
        };
        if target == gl::ELEMENT_ARRAY_BUFFER {
            self.perturb(DirtyFlags::INPUT_ASSEMBLER | DirtyFlags::INDEX_BUFFER);
        }
        self.add_child_ref()?;

        let shadow = match (desc.usage, data) {
            (Usage::Dynamic, Some(data)) => data.to_vec(),
            (Usage::Dynamic, None) => vec![0; size],
            _ => Vec::new(),
        };
        debug!(size, ?bind, usage = ?desc.usage, buffer = ?handle, "created buffer");
        Ok(Buffer(Rc::new(BufferInner {
            refs: RefCount::new(),
            device: self.clone(),
            desc,
            handle,
            target,
            shadow: RefCell::new(shadow),
        })))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureKind {
    Texture1D,
    Texture2D,
    Texture3D,
}

/// Normalized creation parameters shared by all texture dimensions.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureShape {
    pub(crate) kind: TextureKind,
    pub(crate) format: Format,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) array_size: u32,
    pub(crate) mip_levels: u32,
    pub(crate) usage: Usage,
    pub(crate) bind_flags: BindFlags,
    pub(crate) cpu_access_flags: CpuAccessFlags,
    pub(crate) misc_flags: ResourceMiscFlags,
}

impl TextureShape {
    pub(crate) fn is_cube(&self) -> bool {
        self.misc_flags.contains(ResourceMiscFlags::TEXTURECUBE)
    }

    /// Backend texture target. One-dimensional textures are 2D textures of height 1.
    pub(crate) fn target(&self) -> u32 {
        match self.kind {
            TextureKind::Texture3D => gl::TEXTURE_3D,
            _ if self.is_cube() => gl::TEXTURE_CUBE_MAP,
            _ if self.array_size > 1 => gl::TEXTURE_2D_ARRAY,
            _ => gl::TEXTURE_2D,
        }
    }

    pub(crate) fn mip_width(&self, mip: u32) -> u32 {
        (self.width >> mip).max(1)
    }

    pub(crate) fn mip_height(&self, mip: u32) -> u32 {
        (self.height >> mip).max(1)
    }

    pub(crate) fn mip_depth(&self, mip: u32) -> u32 {
        (self.depth >> mip).max(1)
    }

    pub(crate) fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_size
    }
}

pub(crate) struct TextureCore {
    pub(crate) refs: RefCount,
    pub(crate) device: Device,
    handle: GlTexture,
    pub(crate) shape: TextureShape,
    pub(crate) target: u32,
    /// `TEXTURE_BASE_LEVEL` / `TEXTURE_MAX_LEVEL` currently set on the backend texture.
    pub(crate) level_range: Cell<(u32, u32)>,
}

impl TextureCore {
    pub(crate) fn gl_handle(&self) -> Result<GlTexture> {
        self.refs.ensure_alive("Texture")?;
        Ok(self.handle)
    }

    pub(crate) fn format_info(&self) -> Result<FormatInfo> {
        self.shape
            .format
            .info()
            .ok_or_else(|| D3dError::unsupported(format!("format {:?}", self.shape.format)))
    }

    /// Narrows sampling to `[base, max]` on the texture bound to the active unit.
    pub(crate) fn apply_level_range(&self, gl: &mut dyn GlBackend, base: u32, max: u32) {
        if self.level_range.get() == (base, max) {
            return;
        }
        gl.tex_parameter_i32(self.target, gl::TEXTURE_BASE_LEVEL, base as i32);
        gl.tex_parameter_i32(self.target, gl::TEXTURE_MAX_LEVEL, max as i32);
        self.level_range.set((base, max));
    }

    /// Uploads one tightly packed region of subresource (`mip`, `slice`). Binds the texture on
    /// the active unit.
    pub(crate) fn upload(&self, gl: &mut dyn GlBackend, mip: u32, slice: u32, region: Region, data: &[u8]) -> Result<()> {
        let info = self.format_info()?;
        gl.bind_texture(self.target, Some(self.gl_handle()?));
        let Region {
            x,
            y,
            z,
            width,
            height,
            depth,
        } = region;
        match self.target {
            gl::TEXTURE_2D => {
                gl.tex_sub_image_2d(gl::TEXTURE_2D, mip, x, y, width, height, info.format, info.ty, data)
            }
            gl::TEXTURE_CUBE_MAP => gl.tex_sub_image_2d(
                gl::TEXTURE_CUBE_MAP_POSITIVE_X + slice,
                mip,
                x,
                y,
                width,
                height,
                info.format,
                info.ty,
                data,
            ),
            gl::TEXTURE_2D_ARRAY => gl.tex_sub_image_3d(
                gl::TEXTURE_2D_ARRAY,
                mip,
                x,
                y,
                slice,
                width,
                height,
                1,
                info.format,
                info.ty,
                data,
            ),
            _ => gl.tex_sub_image_3d(
                gl::TEXTURE_3D,
                mip,
                x,
                y,
                z,
                width,
                height,
                depth,
                info.format,
                info.ty,
                data,
            ),
        }
        self.device.perturb(DirtyFlags::SHADER_RESOURCES);
        Ok(())
    }

    fn destroy(&self) {
        self.device.gl().delete_texture(self.handle);
        self.device.release_child_ref();
    }
}

/// Texel region of one subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) z: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
}

impl Region {
    pub(crate) fn full(shape: &TextureShape, mip: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            width: shape.mip_width(mip),
            height: shape.mip_height(mip),
            depth: shape.mip_depth(mip),
        }
    }
}

/// Validates pitches against `region` and returns the texels with rows packed tightly.
pub(crate) fn pack_rows<'a>(
    data: &'a [u8],
    row_pitch: u32,
    slice_pitch: u32,
    region: Region,
    bytes_per_pixel: u32,
) -> Result<Cow<'a, [u8]>> {
    let row_bytes = region.width as usize * bytes_per_pixel as usize;
    let row_pitch = if row_pitch == 0 { row_bytes } else { row_pitch as usize };
    if row_pitch < row_bytes {
        return Err(D3dError::invalid(format!(
            "row pitch {row_pitch} is smaller than a {row_bytes}-byte row"
        )));
    }
    let height = region.height as usize;
    let depth = region.depth as usize;
    let slice_pitch = if slice_pitch == 0 || depth == 1 {
        row_pitch * height
    } else {
        slice_pitch as usize
    };
    if slice_pitch < row_pitch * (height - 1) + row_bytes {
        return Err(D3dError::invalid(format!(
            "slice pitch {slice_pitch} is smaller than one {height}-row slice"
        )));
    }
    let needed = slice_pitch * (depth - 1) + row_pitch * (height - 1) + row_bytes;
    if data.len() < needed {
        return Err(D3dError::invalid(format!(
            "subresource data is {} bytes but {needed} are needed",
            data.len()
        )));
    }
    if row_pitch == row_bytes && slice_pitch == row_bytes * height {
        return Ok(Cow::Borrowed(&data[..row_bytes * height * depth]));
    }
    let mut packed = Vec::with_capacity(row_bytes * height * depth);
    for z in 0..depth {
        for y in 0..height {
            let start = z * slice_pitch + y * row_pitch;
            packed.extend_from_slice(&data[start..start + row_bytes]);
        }
    }
    Ok(Cow::Owned(packed))
}

fn full_mip_chain(width: u32, height: u32, depth: u32) -> u32 {
    32 - width.max(height).max(depth).leading_zeros()
}

impl Device {
    fn create_texture_core(&self, mut shape: TextureShape, initial: Option<&[SubresourceData<'_>]>) -> Result<Rc<TextureCore>> {
        self.ensure_alive()?;
        let limits = self.limits();
        let info = match shape.format {
            Format::Unknown => return Err(D3dError::invalid("texture format must not be Unknown")),
            format => format
                .info()
                .ok_or_else(|| D3dError::unsupported(format!("texture format {format:?}")))?,
        };

        if shape.width == 0 || shape.height == 0 || shape.depth == 0 || shape.array_size == 0 {
            return Err(D3dError::invalid("texture dimensions and array size must be non-zero"));
        }
        let (max_size, what) = match shape.kind {
            TextureKind::Texture3D => (limits.max_3d_texture_size, "3D texture"),
            _ if shape.is_cube() => (limits.max_cube_map_texture_size, "cube texture"),
            _ => (limits.max_texture_size, "texture"),
        };
        if shape.width.max(shape.height).max(shape.depth) > max_size {
            return Err(D3dError::invalid(format!(
                "{what} of {}x{}x{} exceeds the backend limit of {max_size}",
                shape.width, shape.height, shape.depth
            )));
        }
        if shape.array_size > limits.max_array_texture_layers {
            return Err(D3dError::invalid(format!(
                "array size {} exceeds the backend limit of {}",
                shape.array_size, limits.max_array_texture_layers
            )));
        }

        let bind = shape.bind_flags;
        if bind.intersects(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER | BindFlags::CONSTANT_BUFFER | BindFlags::STREAM_OUTPUT) {
            return Err(D3dError::invalid(format!("bind flags {bind:?} are only valid on buffers")));
        }
        if bind.contains(BindFlags::UNORDERED_ACCESS) {
            return Err(D3dError::unsupported("unordered access views"));
        }
        if bind.contains(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) {
            return Err(D3dError::invalid("a texture cannot be both a render target and a depth-stencil target"));
        }
        if bind.contains(BindFlags::RENDER_TARGET) && !info.renderable {
            return Err(D3dError::invalid(format!("{:?} cannot be a render target", shape.format)));
        }
        if bind.contains(BindFlags::DEPTH_STENCIL) && !info.depth {
            return Err(D3dError::invalid(format!("{:?} is not a depth-stencil format", shape.format)));
        }
        if bind.contains(BindFlags::DEPTH_STENCIL) && shape.kind == TextureKind::Texture3D {
            return Err(D3dError::invalid("3D textures cannot be depth-stencil targets"));
        }
        if info.depth && bind.contains(BindFlags::SHADER_RESOURCE) {
            return Err(D3dError::unsupported("sampling depth formats (requires typeless formats)"));
        }

        validate_usage(shape.usage, shape.cpu_access_flags, initial.is_some(), "texture")?;
        if shape.usage == Usage::Dynamic {
            return Err(D3dError::unsupported("dynamic textures"));
        }
        if shape.usage == Usage::Immutable && bind.intersects(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) {
            return Err(D3dError::invalid("immutable textures cannot be render or depth-stencil targets"));
        }

        let known = ResourceMiscFlags::GENERATE_MIPS | ResourceMiscFlags::TEXTURECUBE;
        if !known.contains(shape.misc_flags) {
            return Err(D3dError::unsupported(format!("texture misc flags {:?}", shape.misc_flags)));
        }
        if shape.is_cube() {
            if shape.kind != TextureKind::Texture2D {
                return Err(D3dError::invalid("only 2D textures can be cube textures"));
            }
            if shape.array_size != 6 {
                return Err(D3dError::invalid(format!(
                    "cube textures need exactly 6 array elements, got {}",
                    shape.array_size
                )));
            }
            if shape.width != shape.height {
                return Err(D3dError::invalid("cube texture faces must be square"));
            }
        }
        if shape.misc_flags.contains(ResourceMiscFlags::GENERATE_MIPS)
            && !bind.contains(BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE)
        {
            return Err(D3dError::invalid(
                "mip generation requires the render target and shader resource bind flags",
            ));
        }

        let full_chain = full_mip_chain(shape.width, shape.height, shape.depth);
        if shape.mip_levels == 0 {
            shape.mip_levels = full_chain;
        } else if shape.mip_levels > full_chain {
            return Err(D3dError::invalid(format!(
                "{} mip levels requested but a {}x{}x{} texture has at most {full_chain}",
                shape.mip_levels, shape.width, shape.height, shape.depth
            )));
        }

        // Validate and pack every subresource before the backend sees anything.
        let mut uploads = Vec::new();
        if let Some(initial) = initial {
            let count = shape.subresource_count() as usize;
            if initial.len() < count {
                return Err(D3dError::invalid(format!(
                    "initial data covers {} of {count} subresources",
                    initial.len()
                )));
            }
            for slice in 0..shape.array_size {
                for mip in 0..shape.mip_levels {
                    let sub = &initial[(slice * shape.mip_levels + mip) as usize];
                    let region = Region::full(&shape, mip);
                    let packed = pack_rows(sub.data, sub.row_pitch, sub.slice_pitch, region, info.bytes_per_pixel)?;
                    uploads.push((mip, slice, region, packed));
                }
            }
        }

        let target = shape.target();
        let handle = {
            let mut gl = self.gl();
            let handle = gl.create_texture()?;
            gl.bind_texture(target, Some(handle));
            match target {
                gl::TEXTURE_2D | gl::TEXTURE_CUBE_MAP => {
                    gl.tex_storage_2d(target, shape.mip_levels, info.internal_format, shape.width, shape.height)
                }
                gl::TEXTURE_2D_ARRAY => gl.tex_storage_3d(
                    target,
                    shape.mip_levels,
                    info.internal_format,
                    shape.width,
                    shape.height,
                    shape.array_size,
                ),
                _ => gl.tex_storage_3d(
                    target,
                    shape.mip_levels,
                    info.internal_format,
                    shape.width,
                    shape.height,
                    shape.depth,
                ),
            }
            handle
        };
        self.perturb(DirtyFlags::SHADER_RESOURCES);
        self.add_child_ref()?;

        let core = Rc::new(TextureCore {
            refs: RefCount::new(),
            device: self.clone(),
            handle,
            shape,
            target,
            level_range: Cell::new((0, shape.mip_levels - 1)),
        });
        {
            let mut gl = self.gl();
            for (mip, slice, region, data) in &uploads {
                core.upload(&mut **gl, *mip, *slice, *region, data)?;
            }
        }
        debug!(
            kind = ?shape.kind,
            format = ?shape.format,
            width = shape.width,
            height = shape.height,
            depth = shape.depth,
            array_size = shape.array_size,
            mip_levels = shape.mip_levels,
            texture = ?handle,
            "created texture"
        );
        Ok(core)
    }

    /// Creates a 1D texture, backed by a 2D texture of height 1. Writes the resolved mip count
    /// back into `desc`.
    pub fn create_texture1d(&self, desc: &mut Texture1DDesc, initial: Option<&[SubresourceData<'_>]>) -> Result<Texture1D> {
        let core = self.create_texture_core(
            TextureShape {
                kind: TextureKind::Texture1D,
                format: desc.format,
                width: desc.width,
                height: 1,
                depth: 1,
                array_size: desc.array_size,
                mip_levels: desc.mip_levels,
                usage: desc.usage,
                bind_flags: desc.bind_flags,
                cpu_access_flags: desc.cpu_access_flags,
                misc_flags: desc.misc_flags,
            },
            initial,
        )?;
        desc.mip_levels = core.shape.mip_levels;
        Ok(Texture1D(core))
    }

    /// Creates a 2D (or cube) texture. Writes the resolved mip count back into `desc`.
    pub fn create_texture2d(&self, desc: &mut Texture2DDesc, initial: Option<&[SubresourceData<'_>]>) -> Result<Texture2D> {
        if desc.sample_desc != SampleDesc::default() {
            return Err(D3dError::unsupported("multisampled textures"));
        }
        let core = self.create_texture_core(
            TextureShape {
                kind: TextureKind::Texture2D,
                format: desc.format,
                width: desc.width,
                height: desc.height,
                depth: 1,
                array_size: desc.array_size,
                mip_levels: desc.mip_levels,
                usage: desc.usage,
                bind_flags: desc.bind_flags,
                cpu_access_flags: desc.cpu_access_flags,
                misc_flags: desc.misc_flags,
            },
            initial,
        )?;
        desc.mip_levels = core.shape.mip_levels;
        Ok(Texture2D(core))
    }

    /// Creates a volume texture. Writes the resolved mip count back into `desc`.
    pub fn create_texture3d(&self, desc: &mut Texture3DDesc, initial: Option<&[SubresourceData<'_>]>) -> Result<Texture3D> {
        let core = self.create_texture_core(
            TextureShape {
                kind: TextureKind::Texture3D,
                format: desc.format,
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
                array_size: 1,
                mip_levels: desc.mip_levels,
                usage: desc.usage,
                bind_flags: desc.bind_flags,
                cpu_access_flags: desc.cpu_access_flags,
                misc_flags: desc.misc_flags,
            },
            initial,
        )?;
        desc.mip_levels = core.shape.mip_levels;
        Ok(Texture3D(core))
    }
}

macro_rules! texture_handle {
    ($name:ident, $what:literal) => {
        #[derive(Clone)]
        pub struct $name(pub(crate) Rc<TextureCore>);

        impl_unknown!($name, $what);

        impl $name {
            fn destroy(&self) {
                self.0.destroy();
            }
        }
    };
}

texture_handle!(Texture1D, "Texture1D");
texture_handle!(Texture2D, "Texture2D");
texture_handle!(Texture3D, "Texture3D");

impl Texture1D {
    pub fn desc(&self) -> Texture1DDesc {
        let s = &self.0.shape;
        Texture1DDesc {
            width: s.width,
            mip_levels: s.mip_levels,
            array_size: s.array_size,
            format: s.format,
            usage: s.usage,
            bind_flags: s.bind_flags,
            cpu_access_flags: s.cpu_access_flags,
            misc_flags: s.misc_flags,
        }
    }
}

impl Texture2D {
    pub fn desc(&self) -> Texture2DDesc {
        let s = &self.0.shape;
        Texture2DDesc {
            width: s.width,
            height: s.height,
            mip_levels: s.mip_levels,
            array_size: s.array_size,
            format: s.format,
            sample_desc: SampleDesc::default(),
            usage: s.usage,
            bind_flags: s.bind_flags,
            cpu_access_flags: s.cpu_access_flags,
            misc_flags: s.misc_flags,
        }
    }
}

impl Texture3D {
    pub fn desc(&self) -> Texture3DDesc {
        let s = &self.0.shape;
        Texture3DDesc {
            width: s.width,
            height: s.height,
            depth: s.depth,
            mip_levels: s.mip_levels,
            format: s.format,
            usage: s.usage,
            bind_flags: s.bind_flags,
            cpu_access_flags: s.cpu_access_flags,
            misc_flags: s.misc_flags,
        }
    }
}

/// Any resource, as accepted by view creation and `update_subresource`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Resource {
    Buffer(Buffer),
    Texture1D(Texture1D),
    Texture2D(Texture2D),
    Texture3D(Texture3D),
}

impl Resource {
    pub(crate) fn texture_core(&self) -> Option<&Rc<TextureCore>> {
        match self {
            Resource::Buffer(_) => None,
            Resource::Texture1D(t) => Some(&t.0),
            Resource::Texture2D(t) => Some(&t.0),
            Resource::Texture3D(t) => Some(&t.0),
        }
    }

    fn as_unknown(&self) -> &dyn Unknown {
        match self {
            Resource::Buffer(r) => r,
            Resource::Texture1D(r) => r,
            Resource::Texture2D(r) => r,
            Resource::Texture3D(r) => r,
        }
    }
}

impl Unknown for Resource {
    fn add_ref(&self) -> Result<u32> {
        self.as_unknown().add_ref()
    }

    fn release(&self) -> Result<u32> {
        self.as_unknown().release()
    }

    fn ref_count(&self) -> u32 {
        self.as_unknown().ref_count()
    }
}

macro_rules! resource_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Resource {
                fn from(value: $variant) -> Self {
                    Resource::$variant(value)
                }
            }

            impl From<&$variant> for Resource {
                fn from(value: &$variant) -> Self {
                    Resource::$variant(value.clone())
                }
            }
        )*
    };
}

resource_from!(Buffer, Texture1D, Texture2D, Texture3D);

impl From<&Resource> for Resource {
    fn from(value: &Resource) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(width: u32, height: u32, depth: u32) -> Region {
        Region {
            x: 0,
            y: 0,
            z: 0,
            width,
            height,
            depth,
        }
    }

    #[test]
    fn tight_rows_are_borrowed() {
        let data = [0u8; 16];
        let packed = pack_rows(&data, 8, 0, region(2, 2, 1), 4).unwrap();
        assert!(matches!(packed, Cow::Borrowed(_)));
        assert_eq!(packed.len(), 16);
    }

    #[test]
    fn padded_rows_are_repacked() {
        // Two rows of 2 RGBA8 texels with 4 bytes of padding each.
        let data: Vec<u8> = (0..24).collect();
        let packed = pack_rows(&data, 12, 0, region(2, 2, 1), 4).unwrap();
        let expected: Vec<u8> = (0..8).chain(12..20).collect();
        assert_eq!(&*packed, &expected[..]);
    }

    #[test]
    fn short_data_is_rejected() {
        let data = [0u8; 15];
        assert!(matches!(
            pack_rows(&data, 8, 0, region(2, 2, 1), 4),
            Err(D3dError::InvalidDesc(_))
        ));
        assert!(pack_rows(&[0u8; 64], 4, 0, region(2, 2, 1), 4).is_err());
    }

    #[test]
    fn mip_chain_length() {
        assert_eq!(full_mip_chain(256, 256, 1), 9);
        assert_eq!(full_mip_chain(1, 1, 1), 1);
        assert_eq!(full_mip_chain(300, 17, 1), 9);
    }
}
