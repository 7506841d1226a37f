//! The backend rendering context the translation layer drives.
//!
//! [`GlBackend`] mirrors the slice of the WebGL2 API the device and context need. Object creation
//! is fallible (a lost context returns null handles); everything else is fire-and-forget like the
//! underlying API, except shader compilation and program linking, which report the backend's
//! info log on failure.

pub mod trace;

use std::fmt;
use std::num::NonZeroU32;

use thiserror::Error;

pub use trace::{GlCall, TraceBackend, TraceLog};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("failed to create {0} object")]
    CreateFailed(&'static str),
    #[error("backend context lost")]
    ContextLost,
}

macro_rules! gl_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub NonZeroU32);

            impl $name {
                pub fn id(self) -> u32 {
                    self.0.get()
                }
            }

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        )*
    };
}

gl_handle! {
    GlBuffer;
    GlTexture;
    GlSampler;
    GlFramebuffer;
    GlVertexArray;
    GlShader;
    GlProgram;
    /// A uniform location within one linked program.
    GlUniformLocation;
}

/// Limits reported by the backend, queried once at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    pub max_texture_size: u32,
    pub max_3d_texture_size: u32,
    pub max_cube_map_texture_size: u32,
    pub max_array_texture_layers: u32,
    pub max_uniform_buffer_bindings: u32,
    pub max_combined_texture_image_units: u32,
    pub max_vertex_attribs: u32,
    pub max_draw_buffers: u32,
}

impl BackendLimits {
    /// The minimums every WebGL2 implementation guarantees.
    pub const WEBGL2_MINIMUM: BackendLimits = BackendLimits {
        max_texture_size: 2048,
        max_3d_texture_size: 256,
        max_cube_map_texture_size: 2048,
        max_array_texture_layers: 256,
        max_uniform_buffer_bindings: 24,
        max_combined_texture_image_units: 32,
        max_vertex_attribs: 16,
        max_draw_buffers: 4,
    };

    /// Field-wise minimum of two limit sets.
    pub fn min(self, other: BackendLimits) -> BackendLimits {
        BackendLimits {
            max_texture_size: self.max_texture_size.min(other.max_texture_size),
            max_3d_texture_size: self.max_3d_texture_size.min(other.max_3d_texture_size),
            max_cube_map_texture_size: self
                .max_cube_map_texture_size
                .min(other.max_cube_map_texture_size),
            max_array_texture_layers: self
                .max_array_texture_layers
                .min(other.max_array_texture_layers),
            max_uniform_buffer_bindings: self
                .max_uniform_buffer_bindings
                .min(other.max_uniform_buffer_bindings),
            max_combined_texture_image_units: self
                .max_combined_texture_image_units
                .min(other.max_combined_texture_image_units),
            max_vertex_attribs: self.max_vertex_attribs.min(other.max_vertex_attribs),
            max_draw_buffers: self.max_draw_buffers.min(other.max_draw_buffers),
        }
    }
}

pub trait GlBackend {
    fn limits(&self) -> BackendLimits;

    // Buffers.
    fn create_buffer(&mut self) -> Result<GlBuffer, BackendError>;
    fn delete_buffer(&mut self, buffer: GlBuffer);
    fn bind_buffer(&mut self, target: u32, buffer: Option<GlBuffer>);
    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: Option<GlBuffer>);
    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, usage: u32);
    fn buffer_sub_data(&mut self, target: u32, offset: usize, data: &[u8]);

    // Textures.
    fn create_texture(&mut self) -> Result<GlTexture, BackendError>;
    fn delete_texture(&mut self, texture: GlTexture);
    /// Selects texture unit `unit`, an index rather than `TEXTURE0 + n`.
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: u32, texture: Option<GlTexture>);
    fn tex_storage_2d(
        &mut self,
        target: u32,
        levels: u32,
        internal_format: u32,
        width: u32,
        height: u32,
    );
    fn tex_storage_3d(
        &mut self,
        target: u32,
        levels: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_2d(
        &mut self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_3d(
        &mut self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        z: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
        ty: u32,
        data: &[u8],
    );
    fn tex_parameter_i32(&mut self, target: u32, pname: u32, value: i32);
    fn generate_mipmap(&mut self, target: u32);
    fn pixel_store_i32(&mut self, pname: u32, value: i32);

    // Samplers.
    fn create_sampler(&mut self) -> Result<GlSampler, BackendError>;
    fn delete_sampler(&mut self, sampler: GlSampler);
    fn bind_sampler(&mut self, unit: u32, sampler: Option<GlSampler>);
    fn sampler_parameter_i32(&mut self, sampler: GlSampler, pname: u32, value: i32);
    fn sampler_parameter_f32(&mut self, sampler: GlSampler, pname: u32, value: f32);

    // Framebuffers.
    fn create_framebuffer(&mut self) -> Result<GlFramebuffer, BackendError>;
    fn delete_framebuffer(&mut self, framebuffer: GlFramebuffer);
    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<GlFramebuffer>);
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: Option<GlTexture>,
        level: u32,
    );
    fn framebuffer_texture_layer(
        &mut self,
        target: u32,
        attachment: u32,
        texture: Option<GlTexture>,
        level: u32,
        layer: u32,
    );
    fn draw_buffers(&mut self, buffers: &[u32]);
    fn check_framebuffer_status(&mut self, target: u32) -> u32;

    // Vertex arrays.
    fn create_vertex_array(&mut self) -> Result<GlVertexArray, BackendError>;
    fn delete_vertex_array(&mut self, vao: GlVertexArray);
    fn bind_vertex_array(&mut self, vao: Option<GlVertexArray>);
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn disable_vertex_attrib_array(&mut self, index: u32);
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: u32,
        ty: u32,
        normalized: bool,
        stride: u32,
        offset: usize,
    );
    fn vertex_attrib_i_pointer(&mut self, index: u32, size: u32, ty: u32, stride: u32, offset: usize);
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);

    // Shaders and programs.
    fn create_shader(&mut self, kind: u32) -> Result<GlShader, BackendError>;
    /// Sets the source and compiles; `Err` carries the info log.
    fn compile_shader(&mut self, shader: GlShader, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: GlShader);
    fn create_program(&mut self) -> Result<GlProgram, BackendError>;
    fn attach_shader(&mut self, program: GlProgram, shader: GlShader);
    /// `Err` carries the info log.
    fn link_program(&mut self, program: GlProgram) -> Result<(), String>;
    fn delete_program(&mut self, program: GlProgram);
    fn use_program(&mut self, program: Option<GlProgram>);
    fn uniform_block_index(&mut self, program: GlProgram, name: &str) -> Option<u32>;
    fn uniform_block_binding(&mut self, program: GlProgram, index: u32, binding: u32);
    fn uniform_location(&mut self, program: GlProgram, name: &str) -> Option<GlUniformLocation>;
    fn uniform_1_i32(&mut self, location: GlUniformLocation, value: i32);

    // Fixed-function state.
    fn enable(&mut self, cap: u32);
    fn disable(&mut self, cap: u32);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn depth_range(&mut self, near: f32, far: f32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn cull_face(&mut self, mode: u32);
    fn front_face(&mut self, mode: u32);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn depth_func(&mut self, func: u32);
    fn depth_mask(&mut self, write: bool);
    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32);
    fn stencil_op_separate(&mut self, face: u32, fail: u32, depth_fail: u32, pass: u32);
    fn stencil_mask(&mut self, mask: u32);
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation_separate(&mut self, rgb: u32, alpha: u32);
    fn blend_color(&mut self, color: [f32; 4]);
    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool);

    // Clears and draws.
    fn clear_buffer_fv(&mut self, buffer: u32, draw_buffer: u32, values: &[f32]);
    fn clear_buffer_iv(&mut self, buffer: u32, draw_buffer: u32, values: &[i32]);
    fn clear_buffer_uiv(&mut self, buffer: u32, draw_buffer: u32, values: &[u32]);
    fn clear_buffer_fi(&mut self, buffer: u32, draw_buffer: u32, depth: f32, stencil: i32);
    fn draw_arrays(&mut self, mode: u32, first: u32, count: u32);
    fn draw_arrays_instanced(&mut self, mode: u32, first: u32, count: u32, instances: u32);
    fn draw_elements(&mut self, mode: u32, count: u32, ty: u32, offset: usize);
    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: u32,
        ty: u32,
        offset: usize,
        instances: u32,
    );
}
