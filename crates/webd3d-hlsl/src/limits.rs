//! Centralized limits for HLSL compilation.
//!
//! Shader source is treated as untrusted input. These limits bound memory usage and keep resolved
//! registers inside the slot ranges the device context can actually bind.

/// Maximum accepted HLSL source length in bytes.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// D3D11 exposes 14 constant buffer slots per shader stage (`b0..b13`).
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 14;

/// D3D11 exposes 128 shader resource slots per shader stage (`t0..t127`).
pub const MAX_SHADER_RESOURCE_SLOTS: u32 = 128;

/// D3D11 exposes 16 sampler slots per shader stage (`s0..s15`).
pub const MAX_SAMPLER_SLOTS: u32 = 16;

/// Vertex attribute locations available to the vertex stage (WebGL2 guarantees at least 16).
pub const MAX_VERTEX_INPUTS: u32 = 16;

/// Simultaneous render targets (`SV_Target0..SV_Target7`).
pub const MAX_RENDER_TARGETS: u32 = 8;
