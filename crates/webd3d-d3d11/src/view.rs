//! Render-target, depth-stencil and shader-resource views.
//!
//! A view holds an API reference on its resource for as long as it lives, so the resource
//! survives its other holders releasing it.

use std::rc::Rc;

use tracing::debug;

use crate::backend::{GlBackend, GlTexture};
use crate::desc::{
    BindFlags, DepthStencilViewDesc, DsvDimension, RenderTargetViewDesc, RtvDimension,
    ShaderResourceViewDesc, SrvDimension, ALL_MIPS,
};
use crate::device::Device;
use crate::error::{D3dError, Result};
use crate::format::Format;
use crate::gl;
use crate::object::{impl_unknown, RefCount, Unknown};
use crate::resource::{Resource, TextureCore, TextureKind};

/// How a single-layer view attaches to a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum AttachmentKind {
    /// `framebufferTexture2D` with this texture target (`TEXTURE_2D` or a cube face).
    Face(u32),
    /// `framebufferTextureLayer` with this layer.
    Layer(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Attachment {
    pub(crate) kind: AttachmentKind,
    pub(crate) level: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Identity of an attached image, used to skip redundant attachment calls.
pub(crate) type AttachmentKey = (GlTexture, AttachmentKind, u32);

impl Attachment {
    fn new(texture: &TextureCore, mip: u32, layer: u32) -> Self {
        let kind = match texture.target {
            gl::TEXTURE_2D => AttachmentKind::Face(gl::TEXTURE_2D),
            gl::TEXTURE_CUBE_MAP => AttachmentKind::Face(gl::TEXTURE_CUBE_MAP_POSITIVE_X + layer),
            _ => AttachmentKind::Layer(layer),
        };
        Self {
            kind,
            level: mip,
            width: texture.shape.mip_width(mip),
            height: texture.shape.mip_height(mip),
        }
    }

    pub(crate) fn key(&self, texture: GlTexture) -> AttachmentKey {
        (texture, self.kind, self.level)
    }
}

/// Attaches `key` (or detaches, for `None`) at `point` of the bound framebuffer.
pub(crate) fn attach(gl: &mut dyn GlBackend, point: u32, key: Option<AttachmentKey>) {
    match key {
        Some((texture, AttachmentKind::Face(target), level)) => {
            gl.framebuffer_texture_2d(gl::FRAMEBUFFER, point, target, Some(texture), level)
        }
        Some((texture, AttachmentKind::Layer(layer), level)) => {
            gl.framebuffer_texture_layer(gl::FRAMEBUFFER, point, Some(texture), level, layer)
        }
        None => gl.framebuffer_texture_2d(gl::FRAMEBUFFER, point, gl::TEXTURE_2D, None, 0),
    }
}

fn texture_of(resource: &Resource, what: &str) -> Result<Rc<TextureCore>> {
    let texture = resource
        .texture_core()
        .ok_or_else(|| D3dError::unsupported(format!("{what}s of buffers")))?;
    texture.refs.ensure_alive("Texture")?;
    Ok(texture.clone())
}

fn resolve_format(requested: Format, resource: Format) -> Result<Format> {
    match requested {
        Format::Unknown => Ok(resource),
        f if f == resource => Ok(f),
        f => Err(D3dError::invalid(format!(
            "view format {f:?} does not match resource format {resource:?}"
        ))),
    }
}

fn check_kind(texture: &TextureCore, expected: TextureKind, arrayed: bool) -> Result<()> {
    if texture.shape.kind != expected {
        return Err(D3dError::invalid(format!(
            "a {expected:?} view cannot wrap a {:?} resource",
            texture.shape.kind
        )));
    }
    if !arrayed && texture.shape.array_size > 1 {
        return Err(D3dError::invalid("array resources need an array view dimension"));
    }
    Ok(())
}

fn check_mip(texture: &TextureCore, mip: u32) -> Result<()> {
    if mip >= texture.shape.mip_levels {
        return Err(D3dError::invalid(format!(
            "mip slice {mip} is outside the resource's {} levels",
            texture.shape.mip_levels
        )));
    }
    Ok(())
}

/// Validates a single-layer slice `[first, first + size)` against `available` layers.
fn check_single_layer(first: u32, size: u32, available: u32) -> Result<()> {
    if first >= available || size == 0 || size.saturating_add(first) > available {
        return Err(D3dError::invalid(format!(
            "array range {first}+{size} is outside the resource's {available} slices"
        )));
    }
    if size != 1 {
        return Err(D3dError::unsupported("layered render target and depth-stencil views"));
    }
    Ok(())
}

pub(crate) struct RtvInner {
    pub(crate) refs: RefCount,
    device: Device,
    resource: Resource,
    pub(crate) texture: Rc<TextureCore>,
    desc: RenderTargetViewDesc,
    pub(crate) attachment: Attachment,
}

#[derive(Clone)]
pub struct RenderTargetView(pub(crate) Rc<RtvInner>);

impl_unknown!(RenderTargetView, "RenderTargetView");

impl RenderTargetView {
    pub fn desc(&self) -> RenderTargetViewDesc {
        self.0.desc
    }

    pub fn resource(&self) -> Resource {
        self.0.resource.clone()
    }

    pub(crate) fn attachment_key(&self) -> Result<AttachmentKey> {
        self.0.refs.ensure_alive("RenderTargetView")?;
        Ok(self.0.attachment.key(self.0.texture.gl_handle()?))
    }

    fn destroy(&self) {
        release_held(&self.0.resource, &self.0.device);
    }
}

pub(crate) struct DsvInner {
    pub(crate) refs: RefCount,
    device: Device,
    resource: Resource,
    pub(crate) texture: Rc<TextureCore>,
    desc: DepthStencilViewDesc,
    pub(crate) attachment: Attachment,
    pub(crate) has_stencil: bool,
}

#[derive(Clone)]
pub struct DepthStencilView(pub(crate) Rc<DsvInner>);

impl_unknown!(DepthStencilView, "DepthStencilView");

impl DepthStencilView {
    pub fn desc(&self) -> DepthStencilViewDesc {
        self.0.desc
    }

    pub fn resource(&self) -> Resource {
        self.0.resource.clone()
    }

    pub(crate) fn attachment_key(&self) -> Result<AttachmentKey> {
        self.0.refs.ensure_alive("DepthStencilView")?;
        Ok(self.0.attachment.key(self.0.texture.gl_handle()?))
    }

    /// Framebuffer attachment point for this view's format.
    pub(crate) fn attachment_point(&self) -> u32 {
        if self.0.has_stencil {
            gl::DEPTH_STENCIL_ATTACHMENT
        } else {
            gl::DEPTH_ATTACHMENT
        }
    }

    fn destroy(&self) {
        release_held(&self.0.resource, &self.0.device);
    }
}

pub(crate) struct SrvInner {
    pub(crate) refs: RefCount,
    device: Device,
    resource: Resource,
    pub(crate) texture: Rc<TextureCore>,
    desc: ShaderResourceViewDesc,
    pub(crate) target: u32,
    pub(crate) most_detailed_mip: u32,
    pub(crate) mip_levels: u32,
}

#[derive(Clone)]
pub struct ShaderResourceView(pub(crate) Rc<SrvInner>);

impl_unknown!(ShaderResourceView, "ShaderResourceView");

impl ShaderResourceView {
    /// The view description, with an inherited format and `ALL_MIPS` resolved.
    pub fn desc(&self) -> ShaderResourceViewDesc {
        self.0.desc
    }

    pub fn resource(&self) -> Resource {
        self.0.resource.clone()
    }

    pub(crate) fn gl_texture(&self) -> Result<GlTexture> {
        self.0.refs.ensure_alive("ShaderResourceView")?;
        self.0.texture.gl_handle()
    }

    /// Last mip level visible through the view.
    pub(crate) fn max_level(&self) -> u32 {
        self.0.most_detailed_mip + self.0.mip_levels - 1
    }

    fn destroy(&self) {
        release_held(&self.0.resource, &self.0.device);
    }
}

fn release_held(resource: &Resource, device: &Device) {
    if let Err(err) = resource.release() {
        tracing::warn!(%err, "view released a resource it no longer referenced");
    }
    device.release_child_ref();
}

impl Device {
    /// Takes the references a new view holds on its resource and on the device.
    fn hold_for_view(&self, resource: &Resource) -> Result<()> {
        self.ensure_alive()?;
        resource.add_ref()?;
        self.add_child_ref()
    }

    pub fn create_render_target_view(
        &self,
        resource: impl Into<Resource>,
        desc: Option<&RenderTargetViewDesc>,
    ) -> Result<RenderTargetView> {
        let resource = resource.into();
        let texture = texture_of(&resource, "render target view")?;
        let shape = texture.shape;
        if !shape.bind_flags.contains(BindFlags::RENDER_TARGET) {
            return Err(D3dError::invalid("resource was not created with the render target bind flag"));
        }
        let desc = match desc {
            Some(desc) => RenderTargetViewDesc {
                format: resolve_format(desc.format, shape.format)?,
                dimension: desc.dimension,
            },
            None => RenderTargetViewDesc {
                format: shape.format,
                dimension: match shape.kind {
                    TextureKind::Texture1D if shape.array_size > 1 => RtvDimension::Texture1DArray {
                        mip_slice: 0,
                        first_array_slice: 0,
                        array_size: shape.array_size,
                    },
                    TextureKind::Texture1D => RtvDimension::Texture1D { mip_slice: 0 },
                    TextureKind::Texture2D if shape.array_size > 1 => RtvDimension::Texture2DArray {
                        mip_slice: 0,
                        first_array_slice: 0,
                        array_size: shape.array_size,
                    },
                    TextureKind::Texture2D => RtvDimension::Texture2D { mip_slice: 0 },
                    TextureKind::Texture3D => RtvDimension::Texture3D {
                        mip_slice: 0,
                        first_w_slice: 0,
                        w_size: shape.depth,
                    },
                },
            },
        };
        let (mip, layer) = match desc.dimension {
            RtvDimension::Texture1D { mip_slice } => {
                check_kind(&texture, TextureKind::Texture1D, false)?;
                (mip_slice, 0)
            }
            RtvDimension::Texture2D { mip_slice } => {
                check_kind(&texture, TextureKind::Texture2D, false)?;
                (mip_slice, 0)
            }
            RtvDimension::Texture1DArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                check_kind(&texture, TextureKind::Texture1D, true)?;
                check_single_layer(first_array_slice, array_size, shape.array_size)?;
                (mip_slice, first_array_slice)
            }
            RtvDimension::Texture2DArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                check_kind(&texture, TextureKind::Texture2D, true)?;
                check_single_layer(first_array_slice, array_size, shape.array_size)?;
                (mip_slice, first_array_slice)
            }
            RtvDimension::Texture3D {
                mip_slice,
                first_w_slice,
                w_size,
            } => {
                check_kind(&texture, TextureKind::Texture3D, false)?;
                check_mip(&texture, mip_slice)?;
                let depth = shape.mip_depth(mip_slice);
                let w_size = if w_size == u32::MAX {
                    depth.saturating_sub(first_w_slice)
                } else {
                    w_size
                };
                check_single_layer(first_w_slice, w_size, depth)?;
                (mip_slice, first_w_slice)
            }
        };
        check_mip(&texture, mip)?;
        let attachment = Attachment::new(&texture, mip, layer);

        self.hold_for_view(&resource)?;
        debug!(format = ?desc.format, ?attachment, "created render target view");
        Ok(RenderTargetView(Rc::new(RtvInner {
            refs: RefCount::new(),
            device: self.clone(),
            resource,
            texture,
            desc,
            attachment,
        })))
    }

    pub fn create_depth_stencil_view(
        &self,
        resource: impl Into<Resource>,
        desc: Option<&DepthStencilViewDesc>,
    ) -> Result<DepthStencilView> {
        let resource = resource.into();
        let texture = texture_of(&resource, "depth-stencil view")?;
        let shape = texture.shape;
        if !shape.bind_flags.contains(BindFlags::DEPTH_STENCIL) {
            return Err(D3dError::invalid("resource was not created with the depth-stencil bind flag"));
        }
        let desc = match desc {
            Some(desc) => DepthStencilViewDesc {
                format: resolve_format(desc.format, shape.format)?,
                dimension: desc.dimension,
            },
            None => DepthStencilViewDesc {
                format: shape.format,
                dimension: match shape.kind {
                    TextureKind::Texture1D if shape.array_size > 1 => DsvDimension::Texture1DArray {
                        mip_slice: 0,
                        first_array_slice: 0,
                        array_size: shape.array_size,
                    },
                    TextureKind::Texture1D => DsvDimension::Texture1D { mip_slice: 0 },
                    _ if shape.array_size > 1 => DsvDimension::Texture2DArray {
                        mip_slice: 0,
                        first_array_slice: 0,
                        array_size: shape.array_size,
                    },
                    _ => DsvDimension::Texture2D { mip_slice: 0 },
                },
            },
        };
        let (mip, layer) = match desc.dimension {
            DsvDimension::Texture1D { mip_slice } => {
                check_kind(&texture, TextureKind::Texture1D, false)?;
                (mip_slice, 0)
            }
            DsvDimension::Texture2D { mip_slice } => {
                check_kind(&texture, TextureKind::Texture2D, false)?;
                (mip_slice, 0)
            }
            DsvDimension::Texture1DArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                check_kind(&texture, TextureKind::Texture1D, true)?;
                check_single_layer(first_array_slice, array_size, shape.array_size)?;
                (mip_slice, first_array_slice)
            }
            DsvDimension::Texture2DArray {
                mip_slice,
                first_array_slice,
                array_size,
            } => {
                check_kind(&texture, TextureKind::Texture2D, true)?;
                check_single_layer(first_array_slice, array_size, shape.array_size)?;
                (mip_slice, first_array_slice)
            }
        };
        check_mip(&texture, mip)?;
        let has_stencil = texture.format_info()?.stencil;
        let attachment = Attachment::new(&texture, mip, layer);

        self.hold_for_view(&resource)?;
        debug!(format = ?desc.format, ?attachment, "created depth-stencil view");
        Ok(DepthStencilView(Rc::new(DsvInner {
            refs: RefCount::new(),
            device: self.clone(),
            resource,
            texture,
            desc,
            attachment,
            has_stencil,
        })))
    }

    /// Creates a shader resource view. With `desc == None` the view covers the whole resource
    /// with the resource's format and natural dimension.
    pub fn create_shader_resource_view(
        &self,
        resource: impl Into<Resource>,
        desc: Option<&ShaderResourceViewDesc>,
    ) -> Result<ShaderResourceView> {
        let resource = resource.into();
        let texture = texture_of(&resource, "shader resource view")?;
        let shape = texture.shape;
        if !shape.bind_flags.contains(BindFlags::SHADER_RESOURCE) {
            return Err(D3dError::invalid("resource was not created with the shader resource bind flag"));
        }
        let mips = shape.mip_levels;
        let requested = match desc {
            Some(desc) => ShaderResourceViewDesc {
                format: resolve_format(desc.format, shape.format)?,
                dimension: desc.dimension,
            },
            None => ShaderResourceViewDesc {
                format: shape.format,
                dimension: match shape.kind {
                    TextureKind::Texture1D if shape.array_size > 1 => SrvDimension::Texture1DArray {
                        most_detailed_mip: 0,
                        mip_levels: mips,
                        first_array_slice: 0,
                        array_size: shape.array_size,
                    },
                    TextureKind::Texture1D => SrvDimension::Texture1D {
                        most_detailed_mip: 0,
                        mip_levels: mips,
                    },
                    TextureKind::Texture2D if shape.is_cube() => SrvDimension::TextureCube {
                        most_detailed_mip: 0,
                        mip_levels: mips,
                    },
                    TextureKind::Texture2D if shape.array_size > 1 => SrvDimension::Texture2DArray {
                        most_detailed_mip: 0,
                        mip_levels: mips,
                        first_array_slice: 0,
                        array_size: shape.array_size,
                    },
                    TextureKind::Texture2D => SrvDimension::Texture2D {
                        most_detailed_mip: 0,
                        mip_levels: mips,
                    },
                    TextureKind::Texture3D => SrvDimension::Texture3D {
                        most_detailed_mip: 0,
                        mip_levels: mips,
                    },
                },
            },
        };

        let (kind, target, arrayed) = match requested.dimension {
            SrvDimension::Texture1D { .. } => (TextureKind::Texture1D, gl::TEXTURE_2D, false),
            SrvDimension::Texture1DArray { .. } => (TextureKind::Texture1D, gl::TEXTURE_2D_ARRAY, true),
            SrvDimension::Texture2D { .. } => (TextureKind::Texture2D, gl::TEXTURE_2D, false),
            SrvDimension::Texture2DArray { .. } => (TextureKind::Texture2D, gl::TEXTURE_2D_ARRAY, true),
            SrvDimension::Texture3D { .. } => (TextureKind::Texture3D, gl::TEXTURE_3D, false),
            SrvDimension::TextureCube { .. } => (TextureKind::Texture2D, gl::TEXTURE_CUBE_MAP, true),
        };
        check_kind(&texture, kind, arrayed)?;
        if matches!(requested.dimension, SrvDimension::TextureCube { .. }) && !shape.is_cube() {
            return Err(D3dError::invalid("cube views need a resource created with the texture cube flag"));
        }
        if target != texture.target {
            // The backend fixes a texture's target at creation.
            return Err(D3dError::unsupported(format!(
                "{:?} view of a texture stored as target 0x{:04x}",
                requested.dimension, texture.target
            )));
        }
        if let SrvDimension::Texture1DArray {
            first_array_slice,
            array_size,
            ..
        }
        | SrvDimension::Texture2DArray {
            first_array_slice,
            array_size,
            ..
        } = requested.dimension
        {
            if first_array_slice != 0 || array_size != shape.array_size {
                return Err(D3dError::unsupported("shader resource views over part of a texture array"));
            }
        }

        let (most_detailed_mip, mip_levels) = requested.dimension.mip_range();
        check_mip(&texture, most_detailed_mip)?;
        let mip_levels = if mip_levels == ALL_MIPS {
            mips - most_detailed_mip
        } else {
            mip_levels
        };
        let past_end = most_detailed_mip
            .checked_add(mip_levels)
            .map_or(true, |end| end > mips);
        if mip_levels == 0 || past_end {
            return Err(D3dError::invalid(format!(
                "mip range {most_detailed_mip}+{mip_levels} is outside the resource's {mips} levels"
            )));
        }
        let dimension = match requested.dimension {
            SrvDimension::Texture1D { .. } => SrvDimension::Texture1D {
                most_detailed_mip,
                mip_levels,
            },
            SrvDimension::Texture1DArray {
                first_array_slice,
                array_size,
                ..
            } => SrvDimension::Texture1DArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            },
            SrvDimension::Texture2D { .. } => SrvDimension::Texture2D {
                most_detailed_mip,
                mip_levels,
            },
            SrvDimension::Texture2DArray {
                first_array_slice,
                array_size,
                ..
            } => SrvDimension::Texture2DArray {
                most_detailed_mip,
                mip_levels,
                first_array_slice,
                array_size,
            },
            SrvDimension::Texture3D { .. } => SrvDimension::Texture3D {
                most_detailed_mip,
                mip_levels,
            },
            SrvDimension::TextureCube { .. } => SrvDimension::TextureCube {
                most_detailed_mip,
                mip_levels,
            },
        };
        let desc = ShaderResourceViewDesc {
            format: requested.format,
            dimension,
        };

        self.hold_for_view(&resource)?;
        debug!(format = ?desc.format, ?dimension, "created shader resource view");
        Ok(ShaderResourceView(Rc::new(SrvInner {
            refs: RefCount::new(),
            device: self.clone(),
            resource,
            texture,
            desc,
            target,
            most_detailed_mip,
            mip_levels,
        })))
    }
}
