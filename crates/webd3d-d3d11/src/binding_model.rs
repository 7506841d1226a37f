//! Mapping from D3D register slots to backend binding points.
//!
//! Uniform-block bindings are shared by every stage of a program, so each stage gets a disjoint
//! range:
//! - vertex stage `b#` registers: `[VS_UNIFORM_BINDING_BASE, PS_UNIFORM_BINDING_BASE)`
//! - pixel stage `b#` registers: `[PS_UNIFORM_BINDING_BASE, PS_UNIFORM_BINDING_BASE + 14)`
//!
//! Texture units are not tied to registers. Each linked program hands out one unit per
//! texture/sampler combination, vertex stage first, in reflection order.

use webd3d_hlsl::limits;
use webd3d_hlsl::ShaderStage;

/// D3D11 exposes 14 constant buffer slots per shader stage (`b0..b13`).
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = limits::MAX_CONSTANT_BUFFER_SLOTS;

/// D3D11 exposes 128 shader resource slots per shader stage (`t0..t127`).
pub const MAX_SHADER_RESOURCE_SLOTS: u32 = limits::MAX_SHADER_RESOURCE_SLOTS;

/// D3D11 exposes 16 sampler slots per shader stage (`s0..s15`).
pub const MAX_SAMPLER_SLOTS: u32 = limits::MAX_SAMPLER_SLOTS;

/// `D3D11_IA_VERTEX_INPUT_RESOURCE_SLOT_COUNT`.
pub const MAX_VERTEX_BUFFER_SLOTS: u32 = 32;

/// `D3D11_SIMULTANEOUS_RENDER_TARGET_COUNT`.
pub const MAX_RENDER_TARGETS: u32 = limits::MAX_RENDER_TARGETS;

/// `D3D11_VIEWPORT_AND_SCISSORRECT_OBJECT_COUNT_PER_PIPELINE`.
pub const MAX_VIEWPORTS: u32 = 16;

pub const VS_UNIFORM_BINDING_BASE: u32 = 0;
pub const PS_UNIFORM_BINDING_BASE: u32 = VS_UNIFORM_BINDING_BASE + MAX_CONSTANT_BUFFER_SLOTS;

/// Backend uniform-block binding for constant buffer register `register` of `stage`.
pub const fn uniform_binding(stage: ShaderStage, register: u32) -> u32 {
    match stage {
        ShaderStage::Vertex => VS_UNIFORM_BINDING_BASE + register,
        ShaderStage::Pixel => PS_UNIFORM_BINDING_BASE + register,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ranges_are_disjoint() {
        let last_vs = uniform_binding(ShaderStage::Vertex, MAX_CONSTANT_BUFFER_SLOTS - 1);
        let first_ps = uniform_binding(ShaderStage::Pixel, 0);
        assert!(last_vs < first_ps);
        assert_eq!(first_ps, 14);
    }
}
