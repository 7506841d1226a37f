//! Immutable pipeline state objects and input layouts.

use std::rc::Rc;

use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::backend::{GlBackend, GlSampler};
use crate::binding_model::MAX_VERTEX_BUFFER_SLOTS;
use crate::desc::{
    Blend, BlendDesc, BlendOp, ComparisonFunc, DepthStencilDesc, FillMode, InputClassification,
    InputElementDesc, RasterizerDesc, SamplerDesc, StencilOp, TextureAddressMode, APPEND_ALIGNED_ELEMENT,
};
use crate::device::Device;
use crate::error::{D3dError, Result};
use crate::format::VertexFormatInfo;
use crate::gl;
use crate::object::{impl_unknown, RefCount};
use crate::shader::VertexShader;

pub(crate) fn comparison_func(func: ComparisonFunc) -> u32 {
    match func {
        ComparisonFunc::Never => gl::NEVER,
        ComparisonFunc::Less => gl::LESS,
        ComparisonFunc::Equal => gl::EQUAL,
        ComparisonFunc::LessEqual => gl::LEQUAL,
        ComparisonFunc::Greater => gl::GREATER,
        ComparisonFunc::NotEqual => gl::NOTEQUAL,
        ComparisonFunc::GreaterEqual => gl::GEQUAL,
        ComparisonFunc::Always => gl::ALWAYS,
    }
}

pub(crate) fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => gl::KEEP,
        StencilOp::Zero => gl::ZERO,
        StencilOp::Replace => gl::REPLACE,
        StencilOp::IncrSat => gl::INCR,
        StencilOp::DecrSat => gl::DECR,
        StencilOp::Invert => gl::INVERT,
        StencilOp::Incr => gl::INCR_WRAP,
        StencilOp::Decr => gl::DECR_WRAP,
    }
}

pub(crate) fn blend_factor(blend: Blend) -> u32 {
    match blend {
        Blend::Zero => gl::ZERO,
        Blend::One => gl::ONE,
        Blend::SrcColor => gl::SRC_COLOR,
        Blend::InvSrcColor => gl::ONE_MINUS_SRC_COLOR,
        Blend::SrcAlpha => gl::SRC_ALPHA,
        Blend::InvSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        Blend::DestAlpha => gl::DST_ALPHA,
        Blend::InvDestAlpha => gl::ONE_MINUS_DST_ALPHA,
        Blend::DestColor => gl::DST_COLOR,
        Blend::InvDestColor => gl::ONE_MINUS_DST_COLOR,
        Blend::SrcAlphaSat => gl::SRC_ALPHA_SATURATE,
        Blend::BlendFactor => gl::CONSTANT_COLOR,
        Blend::InvBlendFactor => gl::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub(crate) fn blend_op(op: BlendOp) -> u32 {
    match op {
        BlendOp::Add => gl::FUNC_ADD,
        BlendOp::Subtract => gl::FUNC_SUBTRACT,
        BlendOp::RevSubtract => gl::FUNC_REVERSE_SUBTRACT,
        BlendOp::Min => gl::MIN,
        BlendOp::Max => gl::MAX,
    }
}

fn address_mode(mode: TextureAddressMode) -> u32 {
    match mode {
        TextureAddressMode::Wrap => gl::REPEAT,
        TextureAddressMode::Mirror => gl::MIRRORED_REPEAT,
        TextureAddressMode::Clamp => gl::CLAMP_TO_EDGE,
        TextureAddressMode::Border => {
            warn!("border addressing is not available; clamping to edge");
            gl::CLAMP_TO_EDGE
        }
        TextureAddressMode::MirrorOnce => {
            warn!("mirror-once addressing is not available; mirroring");
            gl::MIRRORED_REPEAT
        }
    }
}

/// Two backend samplers for one sampler description. The backend treats a texture sampled with
/// a mipmapping filter as incomplete when it has a single level, so textures without mips are
/// sampled through the second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SamplerPair {
    pub(crate) with_mips: GlSampler,
    pub(crate) without_mips: GlSampler,
}

impl SamplerPair {
    pub(crate) fn create(gl: &mut dyn GlBackend, desc: &SamplerDesc) -> Result<Self> {
        let (min_linear, mag_linear, mip_linear) = desc.filter.linear_bits();
        let min_filter = match (min_linear, mip_linear) {
            (false, false) => gl::NEAREST_MIPMAP_NEAREST,
            (false, true) => gl::NEAREST_MIPMAP_LINEAR,
            (true, false) => gl::LINEAR_MIPMAP_NEAREST,
            (true, true) => gl::LINEAR_MIPMAP_LINEAR,
        };
        let base_filter = if min_linear { gl::LINEAR } else { gl::NEAREST };
        let mag_filter = if mag_linear { gl::LINEAR } else { gl::NEAREST };
        let wrap = [
            (gl::TEXTURE_WRAP_S, address_mode(desc.address_u)),
            (gl::TEXTURE_WRAP_T, address_mode(desc.address_v)),
            (gl::TEXTURE_WRAP_R, address_mode(desc.address_w)),
        ];

        let with_mips = gl.create_sampler()?;
        let without_mips = match gl.create_sampler() {
            Ok(sampler) => sampler,
            Err(err) => {
                gl.delete_sampler(with_mips);
                return Err(err.into());
            }
        };
        for (sampler, min) in [(with_mips, min_filter), (without_mips, base_filter)] {
            gl.sampler_parameter_i32(sampler, gl::TEXTURE_MIN_FILTER, min as i32);
            gl.sampler_parameter_i32(sampler, gl::TEXTURE_MAG_FILTER, mag_filter as i32);
            for (pname, mode) in wrap {
                gl.sampler_parameter_i32(sampler, pname, mode as i32);
            }
        }
        gl.sampler_parameter_f32(with_mips, gl::TEXTURE_MIN_LOD, desc.min_lod);
        gl.sampler_parameter_f32(with_mips, gl::TEXTURE_MAX_LOD, desc.max_lod);
        if desc.filter == crate::desc::Filter::Anisotropic {
            gl.sampler_parameter_f32(with_mips, gl::TEXTURE_MAX_ANISOTROPY_EXT, desc.max_anisotropy as f32);
        }
        Ok(Self {
            with_mips,
            without_mips,
        })
    }

    pub(crate) fn delete(self, gl: &mut dyn GlBackend) {
        gl.delete_sampler(self.with_mips);
        gl.delete_sampler(self.without_mips);
    }

    pub(crate) fn pick(&self, mip_levels: u32) -> GlSampler {
        if mip_levels > 1 {
            self.with_mips
        } else {
            self.without_mips
        }
    }
}

pub(crate) struct SamplerInner {
    pub(crate) refs: RefCount,
    device: Device,
    desc: SamplerDesc,
    pub(crate) pair: SamplerPair,
}

#[derive(Clone)]
pub struct SamplerState(pub(crate) Rc<SamplerInner>);

impl_unknown!(SamplerState, "SamplerState");

impl SamplerState {
    pub fn desc(&self) -> SamplerDesc {
        self.0.desc
    }

    pub(crate) fn pair(&self) -> Result<SamplerPair> {
        self.0.refs.ensure_alive("SamplerState")?;
        Ok(self.0.pair)
    }

    fn destroy(&self) {
        self.0.pair.delete(&mut **self.0.device.gl());
        self.0.device.release_child_ref();
    }
}

/// Payload of the state objects that are pure descriptions.
pub(crate) struct StateInner<D> {
    pub(crate) refs: RefCount,
    device: Device,
    pub(crate) desc: D,
}

macro_rules! described_state {
    ($name:ident, $desc:ty, $what:literal) => {
        #[derive(Clone)]
        pub struct $name(pub(crate) Rc<StateInner<$desc>>);

        impl_unknown!($name, $what);

        impl $name {
            pub fn desc(&self) -> $desc {
                self.0.desc
            }

            pub(crate) fn live_desc(&self) -> Result<$desc> {
                self.0.refs.ensure_alive($what)?;
                Ok(self.0.desc)
            }

            fn destroy(&self) {
                self.0.device.release_child_ref();
            }
        }
    };
}

described_state!(RasterizerState, RasterizerDesc, "RasterizerState");
described_state!(DepthStencilState, DepthStencilDesc, "DepthStencilState");
described_state!(BlendState, BlendDesc, "BlendState");

/// One input element with its offset resolved and its format decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LayoutAttribute {
    pub(crate) semantic_name: String,
    pub(crate) semantic_index: u32,
    pub(crate) slot: u32,
    pub(crate) offset: u32,
    pub(crate) format: VertexFormatInfo,
    pub(crate) per_instance: bool,
    pub(crate) step_rate: u32,
}

pub(crate) struct InputLayoutInner {
    pub(crate) refs: RefCount,
    device: Device,
    elements: Vec<InputElementDesc>,
    pub(crate) attributes: Vec<LayoutAttribute>,
}

#[derive(Clone)]
pub struct InputLayout(pub(crate) Rc<InputLayoutInner>);

impl_unknown!(InputLayout, "InputLayout");

impl InputLayout {
    /// Elements with every `APPEND_ALIGNED_ELEMENT` offset resolved.
    pub fn elements(&self) -> Vec<InputElementDesc> {
        self.0.elements.clone()
    }

    pub(crate) fn attributes(&self) -> Result<&[LayoutAttribute]> {
        self.0.refs.ensure_alive("InputLayout")?;
        Ok(&self.0.attributes)
    }

    fn destroy(&self) {
        self.0.device.release_child_ref();
    }
}

impl Device {
    pub fn create_sampler_state(&self, desc: &SamplerDesc) -> Result<SamplerState> {
        self.ensure_alive()?;
        let desc = *desc;
        if desc.filter == crate::desc::Filter::Anisotropic && !(1..=16).contains(&desc.max_anisotropy) {
            return Err(D3dError::invalid(format!(
                "max anisotropy {} is outside 1..=16",
                desc.max_anisotropy
            )));
        }
        if desc.min_lod.is_nan() || desc.max_lod.is_nan() || desc.mip_lod_bias.is_nan() {
            return Err(D3dError::invalid("sampler LOD values must not be NaN"));
        }
        if desc.mip_lod_bias != 0.0 {
            warn!(bias = desc.mip_lod_bias, "sampler mip LOD bias is not available; ignoring");
        }
        let pair = SamplerPair::create(&mut **self.gl(), &desc)?;
        self.add_child_ref()?;
        debug!(filter = ?desc.filter, ?pair, "created sampler state");
        Ok(SamplerState(Rc::new(SamplerInner {
            refs: RefCount::new(),
            device: self.clone(),
            desc,
            pair,
        })))
    }

    pub fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> Result<RasterizerState> {
        self.ensure_alive()?;
        if desc.fill_mode == FillMode::Wireframe {
            return Err(D3dError::unsupported("wireframe fill mode"));
        }
        if !desc.depth_clip_enable {
            warn!("disabling depth clipping is not available; depth clip stays enabled");
        }
        if desc.depth_bias_clamp != 0.0 {
            warn!(clamp = desc.depth_bias_clamp, "depth bias clamp is not available; ignoring");
        }
        self.add_child_ref()?;
        Ok(RasterizerState(Rc::new(StateInner {
            refs: RefCount::new(),
            device: self.clone(),
            desc: *desc,
        })))
    }

    pub fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> Result<DepthStencilState> {
        self.ensure_alive()?;
        self.add_child_ref()?;
        Ok(DepthStencilState(Rc::new(StateInner {
            refs: RefCount::new(),
            device: self.clone(),
            desc: *desc,
        })))
    }

    pub fn create_blend_state(&self, desc: &BlendDesc) -> Result<BlendState> {
        self.ensure_alive()?;
        for (i, rt) in desc.render_target.iter().enumerate() {
            let color_factor = |b: Blend| {
                matches!(
                    b,
                    Blend::SrcColor | Blend::InvSrcColor | Blend::DestColor | Blend::InvDestColor
                )
            };
            if rt.blend_enable && (color_factor(rt.src_blend_alpha) || color_factor(rt.dest_blend_alpha)) {
                return Err(D3dError::invalid(format!(
                    "render target {i} uses a color blend factor for alpha"
                )));
            }
        }
        if desc.independent_blend_enable
            && desc.render_target[1..]
                .iter()
                .any(|rt| *rt != desc.render_target[0])
        {
            return Err(D3dError::unsupported("per-render-target blend state"));
        }
        self.add_child_ref()?;
        Ok(BlendState(Rc::new(StateInner {
            refs: RefCount::new(),
            device: self.clone(),
            desc: *desc,
        })))
    }

    /// Creates an input layout, checking it against the inputs of `shader`.
    pub fn create_input_layout(&self, elements: &[InputElementDesc], shader: &VertexShader) -> Result<InputLayout> {
        self.ensure_alive()?;
        let reflection = shader.reflection();
        let limits = self.limits();
        if elements.len() as u32 > limits.max_vertex_attribs {
            return Err(D3dError::invalid(format!(
                "{} input elements exceed the backend's {} vertex attributes",
                elements.len(),
                limits.max_vertex_attribs
            )));
        }

        let mut next_offset = [0u32; MAX_VERTEX_BUFFER_SLOTS as usize];
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(elements.len());
        let mut attributes = Vec::with_capacity(elements.len());
        for element in elements {
            if element.input_slot >= MAX_VERTEX_BUFFER_SLOTS {
                return Err(D3dError::invalid(format!(
                    "input slot {} is outside 0..{MAX_VERTEX_BUFFER_SLOTS}",
                    element.input_slot
                )));
            }
            let semantic = element.semantic_name.to_ascii_uppercase();
            if !seen.insert((semantic.clone(), element.semantic_index)) {
                return Err(D3dError::invalid(format!(
                    "semantic {semantic}{} appears more than once",
                    element.semantic_index
                )));
            }
            let format = element.format.vertex_info().ok_or_else(|| {
                D3dError::unsupported(format!("vertex format {:?}", element.format))
            })?;
            let per_instance = element.input_slot_class == InputClassification::PerInstanceData;
            if !per_instance && element.instance_data_step_rate != 0 {
                return Err(D3dError::invalid("per-vertex elements must have a zero instance step rate"));
            }
            let slot_offset = &mut next_offset[element.input_slot as usize];
            let offset = if element.aligned_byte_offset == APPEND_ALIGNED_ELEMENT {
                *slot_offset
            } else {
                element.aligned_byte_offset
            };
            *slot_offset = offset.saturating_add(format.size_bytes);

            if let Some(input) = reflection.input(&semantic, element.semantic_index) {
                if input.integer != format.integer {
                    return Err(D3dError::invalid(format!(
                        "element {semantic}{} is {} but the shader input is {}",
                        element.semantic_index,
                        if format.integer { "integer" } else { "floating point" },
                        if input.integer { "integer" } else { "floating point" },
                    )));
                }
            }
            resolved.push(InputElementDesc {
                aligned_byte_offset: offset,
                ..element.clone()
            });
            attributes.push(LayoutAttribute {
                semantic_name: semantic,
                semantic_index: element.semantic_index,
                slot: element.input_slot,
                offset,
                format,
                per_instance,
                step_rate: element.instance_data_step_rate,
            });
        }
        for input in &reflection.inputs {
            if !seen.contains(&(input.semantic_name.clone(), input.semantic_index)) {
                return Err(D3dError::invalid(format!(
                    "vertex shader input {}{} has no matching input element",
                    input.semantic_name, input.semantic_index
                )));
            }
        }

        self.add_child_ref()?;
        debug!(elements = attributes.len(), "created input layout");
        Ok(InputLayout(Rc::new(InputLayoutInner {
            refs: RefCount::new(),
            device: self.clone(),
            elements: resolved,
            attributes,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_and_wrapping_stencil_ops() {
        assert_eq!(stencil_op(StencilOp::IncrSat), gl::INCR);
        assert_eq!(stencil_op(StencilOp::Incr), gl::INCR_WRAP);
        assert_eq!(stencil_op(StencilOp::DecrSat), gl::DECR);
        assert_eq!(stencil_op(StencilOp::Decr), gl::DECR_WRAP);
    }

    #[test]
    fn blend_factor_maps_to_constant_color() {
        assert_eq!(blend_factor(Blend::BlendFactor), gl::CONSTANT_COLOR);
        assert_eq!(blend_factor(Blend::InvBlendFactor), gl::ONE_MINUS_CONSTANT_COLOR);
        assert_eq!(blend_op(BlendOp::RevSubtract), gl::FUNC_REVERSE_SUBTRACT);
    }

    #[test]
    fn border_addressing_degrades_to_clamp() {
        assert_eq!(address_mode(TextureAddressMode::Border), gl::CLAMP_TO_EDGE);
        assert_eq!(address_mode(TextureAddressMode::MirrorOnce), gl::MIRRORED_REPEAT);
    }
}
