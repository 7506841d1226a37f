//! Binding surface of a translated shader, consumed by the device context at draw time.

use crate::ast::{ShaderStage, TextureType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderReflection {
    pub stage: ShaderStage,
    /// Constant buffers in declaration order. Empty buffers are omitted.
    pub constant_buffers: Vec<ConstantBufferReflection>,
    /// Unique (texture, sampler) pairs in order of first use.
    pub combinations: Vec<Combination>,
    /// Vertex attributes; empty for pixel shaders.
    pub inputs: Vec<InputAttribute>,
    /// `SV_TARGETn` indices written by a pixel shader, ascending.
    pub render_targets: Vec<u32>,
    pub writes_depth: bool,
}

impl ShaderReflection {
    pub(crate) fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            constant_buffers: Vec::new(),
            combinations: Vec::new(),
            inputs: Vec::new(),
            render_targets: Vec::new(),
            writes_depth: false,
        }
    }

    pub fn constant_buffer(&self, register: u32) -> Option<&ConstantBufferReflection> {
        self.constant_buffers.iter().find(|cb| cb.register == register)
    }

    /// Finds the attribute fed by `semantic_name` / `semantic_index` (names compare
    /// case-insensitively, like the native runtime does).
    pub fn input(&self, semantic_name: &str, semantic_index: u32) -> Option<&InputAttribute> {
        self.inputs.iter().find(|i| {
            i.semantic_index == semantic_index && i.semantic_name.eq_ignore_ascii_case(semantic_name)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferReflection {
    /// HLSL name (`$Global` for loose globals).
    pub name: String,
    /// Name of the emitted `uniform` block.
    pub block_name: String,
    pub register: u32,
    /// Size of the block under std140 rules.
    pub size_bytes: u32,
}

/// A texture sampled through one specific sampler. The backend pairs exactly one sampler with
/// each texture unit, so every distinct pair becomes its own sampler uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    /// Name of the emitted sampler uniform.
    pub name: String,
    pub texture: String,
    pub texture_register: u32,
    pub texture_type: TextureType,
    pub sampler: String,
    pub sampler_register: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAttribute {
    /// Upper-cased semantic name without its index.
    pub semantic_name: String,
    pub semantic_index: u32,
    pub location: u32,
    pub glsl_name: String,
    /// Component count of the attribute (1-4).
    pub components: u8,
    pub integer: bool,
}
