//! Recording backend.
//!
//! [`TraceBackend`] implements [`GlBackend`] without a GPU: it hands out object names, records
//! every call as a [`GlCall`], and answers the few queries the translation layer makes
//! (uniform-block indices, sampler uniform locations) by scanning the GLSL it was given. The
//! recorded log is shared through a [`TraceLog`] handle so tests can inspect it after the
//! backend has been moved into a device.

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use super::{
    BackendError, BackendLimits, GlBackend, GlBuffer, GlFramebuffer, GlProgram, GlSampler,
    GlShader, GlTexture, GlUniformLocation, GlVertexArray,
};
use crate::gl;

#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    CreateBuffer(GlBuffer),
    DeleteBuffer(GlBuffer),
    BindBuffer { target: u32, buffer: Option<GlBuffer> },
    BindBufferBase { target: u32, index: u32, buffer: Option<GlBuffer> },
    BufferData { target: u32, size: usize, has_data: bool, usage: u32 },
    BufferSubData { target: u32, offset: usize, len: usize },
    CreateTexture(GlTexture),
    DeleteTexture(GlTexture),
    /// Texture unit index (not the `TEXTURE0 + n` enumerant).
    ActiveTexture(u32),
    BindTexture { target: u32, texture: Option<GlTexture> },
    TexStorage2D { target: u32, levels: u32, internal_format: u32, width: u32, height: u32 },
    TexStorage3D { target: u32, levels: u32, internal_format: u32, width: u32, height: u32, depth: u32 },
    TexSubImage2D { target: u32, level: u32, width: u32, height: u32, format: u32, ty: u32, len: usize },
    TexSubImage3D { target: u32, level: u32, z: u32, width: u32, height: u32, depth: u32, len: usize },
    TexParameter { target: u32, pname: u32, value: i32 },
    GenerateMipmap(u32),
    PixelStore { pname: u32, value: i32 },
    CreateSampler(GlSampler),
    DeleteSampler(GlSampler),
    BindSampler { unit: u32, sampler: Option<GlSampler> },
    SamplerParameterI { sampler: GlSampler, pname: u32, value: i32 },
    SamplerParameterF { sampler: GlSampler, pname: u32, value: f32 },
    CreateFramebuffer(GlFramebuffer),
    DeleteFramebuffer(GlFramebuffer),
    BindFramebuffer { target: u32, framebuffer: Option<GlFramebuffer> },
    FramebufferTexture2D { attachment: u32, tex_target: u32, texture: Option<GlTexture>, level: u32 },
    FramebufferTextureLayer { attachment: u32, texture: Option<GlTexture>, level: u32, layer: u32 },
    DrawBuffers(Vec<u32>),
    CheckFramebufferStatus,
    CreateVertexArray(GlVertexArray),
    DeleteVertexArray(GlVertexArray),
    BindVertexArray(Option<GlVertexArray>),
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer { index: u32, size: u32, ty: u32, normalized: bool, stride: u32, offset: usize },
    VertexAttribIPointer { index: u32, size: u32, ty: u32, stride: u32, offset: usize },
    VertexAttribDivisor { index: u32, divisor: u32 },
    CreateShader { shader: GlShader, kind: u32 },
    CompileShader { shader: GlShader, ok: bool },
    DeleteShader(GlShader),
    CreateProgram(GlProgram),
    AttachShader { program: GlProgram, shader: GlShader },
    LinkProgram { program: GlProgram, ok: bool },
    DeleteProgram(GlProgram),
    UseProgram(Option<GlProgram>),
    UniformBlockBinding { program: GlProgram, index: u32, binding: u32 },
    Uniform1i { location: GlUniformLocation, value: i32 },
    Enable(u32),
    Disable(u32),
    Viewport { x: i32, y: i32, width: i32, height: i32 },
    DepthRange { near: f32, far: f32 },
    Scissor { x: i32, y: i32, width: i32, height: i32 },
    CullFace(u32),
    FrontFace(u32),
    PolygonOffset { factor: f32, units: f32 },
    DepthFunc(u32),
    DepthMask(bool),
    StencilFuncSeparate { face: u32, func: u32, reference: i32, mask: u32 },
    StencilOpSeparate { face: u32, fail: u32, depth_fail: u32, pass: u32 },
    StencilMask(u32),
    BlendFuncSeparate { src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32 },
    BlendEquationSeparate { rgb: u32, alpha: u32 },
    BlendColor([f32; 4]),
    ColorMask([bool; 4]),
    ClearBufferFv { buffer: u32, draw_buffer: u32, values: Vec<f32> },
    ClearBufferIv { buffer: u32, draw_buffer: u32, values: Vec<i32> },
    ClearBufferUiv { buffer: u32, draw_buffer: u32, values: Vec<u32> },
    ClearBufferFi { buffer: u32, draw_buffer: u32, depth: f32, stencil: i32 },
    DrawArrays { mode: u32, first: u32, count: u32, instances: u32 },
    DrawElements { mode: u32, count: u32, ty: u32, offset: usize, instances: u32 },
}

impl GlCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. })
    }
}

#[derive(Debug)]
struct TraceState {
    calls: Vec<GlCall>,
    next_id: u32,
    shader_sources: HashMap<GlShader, String>,
    attached: HashMap<GlProgram, Vec<GlShader>>,
    /// Uniform block names of each linked program, in block-index order.
    blocks: HashMap<GlProgram, Vec<String>>,
    /// Sampler uniforms of each linked program.
    sampler_uniforms: HashMap<GlProgram, Vec<String>>,
    locations: HashMap<(GlProgram, String), GlUniformLocation>,
    live: HashSet<(&'static str, u32)>,
    fail_compile: Option<String>,
    fail_link: Option<String>,
    framebuffer_status: u32,
}

impl TraceState {
    fn alloc(&mut self, kind: &'static str) -> NonZeroU32 {
        self.next_id += 1;
        self.live.insert((kind, self.next_id));
        NonZeroU32::new(self.next_id).unwrap_or(NonZeroU32::MIN)
    }

    fn free(&mut self, kind: &'static str, id: u32) {
        self.live.remove(&(kind, id));
    }
}

/// Shared view of a [`TraceBackend`]'s recorded calls and failure knobs.
#[derive(Debug, Clone)]
pub struct TraceLog {
    state: Rc<RefCell<TraceState>>,
}

impl TraceLog {
    pub fn calls(&self) -> Vec<GlCall> {
        self.state.borrow().calls.clone()
    }

    /// Returns and forgets every call recorded so far.
    pub fn take(&self) -> Vec<GlCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn link_count(&self) -> usize {
        self.count(|c| matches!(c, GlCall::LinkProgram { .. }))
    }

    /// Number of backend objects of `kind` (`"buffer"`, `"texture"`, `"sampler"`, ...) that have
    /// been created and not deleted.
    pub fn live(&self, kind: &str) -> usize {
        self.state
            .borrow()
            .live
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// The next `compile_shader` call fails with `log`.
    pub fn fail_next_compile(&self, log: impl Into<String>) {
        self.state.borrow_mut().fail_compile = Some(log.into());
    }

    /// The next `link_program` call fails with `log`.
    pub fn fail_next_link(&self, log: impl Into<String>) {
        self.state.borrow_mut().fail_link = Some(log.into());
    }

    pub fn set_framebuffer_status(&self, status: u32) {
        self.state.borrow_mut().framebuffer_status = status;
    }
}

pub struct TraceBackend {
    state: Rc<RefCell<TraceState>>,
    limits: BackendLimits,
}

impl TraceBackend {
    pub fn new() -> (Self, TraceLog) {
        Self::with_limits(BackendLimits {
            max_texture_size: 16384,
            max_3d_texture_size: 2048,
            max_cube_map_texture_size: 16384,
            max_array_texture_layers: 2048,
            max_uniform_buffer_bindings: 72,
            max_combined_texture_image_units: 64,
            max_vertex_attribs: 16,
            max_draw_buffers: 8,
        })
    }

    pub fn with_limits(limits: BackendLimits) -> (Self, TraceLog) {
        let state = Rc::new(RefCell::new(TraceState {
            calls: Vec::new(),
            next_id: 0,
            shader_sources: HashMap::new(),
            attached: HashMap::new(),
            blocks: HashMap::new(),
            sampler_uniforms: HashMap::new(),
            locations: HashMap::new(),
            live: HashSet::new(),
            fail_compile: None,
            fail_link: None,
            framebuffer_status: gl::FRAMEBUFFER_COMPLETE,
        }));
        let log = TraceLog {
            state: state.clone(),
        };
        (Self { state, limits }, log)
    }

    fn record(&mut self, call: GlCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

/// Block names declared with `layout(std140) uniform NAME {`.
fn scan_blocks(source: &str, out: &mut Vec<String>) {
    for line in source.lines() {
        let Some(rest) = line.trim().strip_prefix("layout(std140) uniform ") else {
            continue;
        };
        let name = rest.trim_end_matches('{').trim();
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
}

/// Names declared with `uniform samplerXX NAME;`.
fn scan_samplers(source: &str, out: &mut Vec<String>) {
    for line in source.lines() {
        let Some(rest) = line.trim().strip_prefix("uniform sampler") else {
            continue;
        };
        if let Some(name) = rest.split_whitespace().nth(1) {
            let name = name.trim_end_matches(';').to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
}

impl GlBackend for TraceBackend {
    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn create_buffer(&mut self) -> Result<GlBuffer, BackendError> {
        let buffer = GlBuffer(self.state.borrow_mut().alloc("buffer"));
        self.record(GlCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: GlBuffer) {
        self.state.borrow_mut().free("buffer", buffer.id());
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, target: u32, buffer: Option<GlBuffer>) {
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn bind_buffer_base(&mut self, target: u32, index: u32, buffer: Option<GlBuffer>) {
        self.record(GlCall::BindBufferBase {
            target,
            index,
            buffer,
        });
    }

    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, usage: u32) {
        self.record(GlCall::BufferData {
            target,
            size,
            has_data: data.is_some(),
            usage,
        });
    }

    fn buffer_sub_data(&mut self, target: u32, offset: usize, data: &[u8]) {
        self.record(GlCall::BufferSubData {
            target,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&mut self) -> Result<GlTexture, BackendError> {
        let texture = GlTexture(self.state.borrow_mut().alloc("texture"));
        self.record(GlCall::CreateTexture(texture));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: GlTexture) {
        self.state.borrow_mut().free("texture", texture.id());
        self.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: u32, texture: Option<GlTexture>) {
        self.record(GlCall::BindTexture { target, texture });
    }

    fn tex_storage_2d(
        &mut self,
        target: u32,
        levels: u32,
        internal_format: u32,
        width: u32,
        height: u32,
    ) {
        self.record(GlCall::TexStorage2D {
            target,
            levels,
            internal_format,
            width,
            height,
        });
    }

    fn tex_storage_3d(
        &mut self,
        target: u32,
        levels: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        self.record(GlCall::TexStorage3D {
            target,
            levels,
            internal_format,
            width,
            height,
            depth,
        });
    }

    fn tex_sub_image_2d(
        &mut self,
        target: u32,
        level: u32,
        _x: u32,
        _y: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        data: &[u8],
    ) {
        self.record(GlCall::TexSubImage2D {
            target,
            level,
            width,
            height,
            format,
            ty,
            len: data.len(),
        });
    }

    fn tex_sub_image_3d(
        &mut self,
        target: u32,
        level: u32,
        _x: u32,
        _y: u32,
        z: u32,
        width: u32,
        height: u32,
        depth: u32,
        _format: u32,
        _ty: u32,
        data: &[u8],
    ) {
        self.record(GlCall::TexSubImage3D {
            target,
            level,
            z,
            width,
            height,
            depth,
            len: data.len(),
        });
    }

    fn tex_parameter_i32(&mut self, target: u32, pname: u32, value: i32) {
        self.record(GlCall::TexParameter {
            target,
            pname,
            value,
        });
    }

    fn generate_mipmap(&mut self, target: u32) {
        self.record(GlCall::GenerateMipmap(target));
    }

    fn pixel_store_i32(&mut self, pname: u32, value: i32) {
        self.record(GlCall::PixelStore { pname, value });
    }

    fn create_sampler(&mut self) -> Result<GlSampler, BackendError> {
        let sampler = GlSampler(self.state.borrow_mut().alloc("sampler"));
        self.record(GlCall::CreateSampler(sampler));
        Ok(sampler)
    }

    fn delete_sampler(&mut self, sampler: GlSampler) {
        self.state.borrow_mut().free("sampler", sampler.id());
        self.record(GlCall::DeleteSampler(sampler));
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<GlSampler>) {
        self.record(GlCall::BindSampler { unit, sampler });
    }

    fn sampler_parameter_i32(&mut self, sampler: GlSampler, pname: u32, value: i32) {
        self.record(GlCall::SamplerParameterI {
            sampler,
            pname,
            value,
        });
    }

    fn sampler_parameter_f32(&mut self, sampler: GlSampler, pname: u32, value: f32) {
        self.record(GlCall::SamplerParameterF {
            sampler,
            pname,
            value,
        });
    }

    fn create_framebuffer(&mut self) -> Result<GlFramebuffer, BackendError> {
        let framebuffer = GlFramebuffer(self.state.borrow_mut().alloc("framebuffer"));
        self.record(GlCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: GlFramebuffer) {
        self.state.borrow_mut().free("framebuffer", framebuffer.id());
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<GlFramebuffer>) {
        self.record(GlCall::BindFramebuffer {
            target,
            framebuffer,
        });
    }

    fn framebuffer_texture_2d(
        &mut self,
        _target: u32,
        attachment: u32,
        tex_target: u32,
        texture: Option<GlTexture>,
        level: u32,
    ) {
        self.record(GlCall::FramebufferTexture2D {
            attachment,
            tex_target,
            texture,
            level,
        });
    }

    fn framebuffer_texture_layer(
        &mut self,
        _target: u32,
        attachment: u32,
        texture: Option<GlTexture>,
        level: u32,
        layer: u32,
    ) {
        self.record(GlCall::FramebufferTextureLayer {
            attachment,
            texture,
            level,
            layer,
        });
    }

    fn draw_buffers(&mut self, buffers: &[u32]) {
        self.record(GlCall::DrawBuffers(buffers.to_vec()));
    }

    fn check_framebuffer_status(&mut self, _target: u32) -> u32 {
        self.record(GlCall::CheckFramebufferStatus);
        self.state.borrow().framebuffer_status
    }

    fn create_vertex_array(&mut self) -> Result<GlVertexArray, BackendError> {
        let vao = GlVertexArray(self.state.borrow_mut().alloc("vertex_array"));
        self.record(GlCall::CreateVertexArray(vao));
        Ok(vao)
    }

    fn delete_vertex_array(&mut self, vao: GlVertexArray) {
        self.state.borrow_mut().free("vertex_array", vao.id());
        self.record(GlCall::DeleteVertexArray(vao));
    }

    fn bind_vertex_array(&mut self, vao: Option<GlVertexArray>) {
        self.record(GlCall::BindVertexArray(vao));
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.record(GlCall::DisableVertexAttribArray(index));
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: u32,
        ty: u32,
        normalized: bool,
        stride: u32,
        offset: usize,
    ) {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            ty,
            normalized,
            stride,
            offset,
        });
    }

    fn vertex_attrib_i_pointer(&mut self, index: u32, size: u32, ty: u32, stride: u32, offset: usize) {
        self.record(GlCall::VertexAttribIPointer {
            index,
            size,
            ty,
            stride,
            offset,
        });
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record(GlCall::VertexAttribDivisor { index, divisor });
    }

    fn create_shader(&mut self, kind: u32) -> Result<GlShader, BackendError> {
        let shader = GlShader(self.state.borrow_mut().alloc("shader"));
        self.record(GlCall::CreateShader { shader, kind });
        Ok(shader)
    }

    fn compile_shader(&mut self, shader: GlShader, source: &str) -> Result<(), String> {
        let failure = {
            let mut state = self.state.borrow_mut();
            state.shader_sources.insert(shader, source.to_string());
            state.fail_compile.take()
        };
        self.record(GlCall::CompileShader {
            shader,
            ok: failure.is_none(),
        });
        failure.map_or(Ok(()), Err)
    }

    fn delete_shader(&mut self, shader: GlShader) {
        {
            let mut state = self.state.borrow_mut();
            state.free("shader", shader.id());
            state.shader_sources.remove(&shader);
        }
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&mut self) -> Result<GlProgram, BackendError> {
        let program = GlProgram(self.state.borrow_mut().alloc("program"));
        self.record(GlCall::CreateProgram(program));
        Ok(program)
    }

    fn attach_shader(&mut self, program: GlProgram, shader: GlShader) {
        self.state
            .borrow_mut()
            .attached
            .entry(program)
            .or_default()
            .push(shader);
        self.record(GlCall::AttachShader { program, shader });
    }

    fn link_program(&mut self, program: GlProgram) -> Result<(), String> {
        let failure = {
            let mut state = self.state.borrow_mut();
            let mut blocks = Vec::new();
            let mut samplers = Vec::new();
            let shaders = state.attached.get(&program).cloned().unwrap_or_default();
            for shader in shaders {
                if let Some(source) = state.shader_sources.get(&shader) {
                    scan_blocks(source, &mut blocks);
                    scan_samplers(source, &mut samplers);
                }
            }
            state.blocks.insert(program, blocks);
            state.sampler_uniforms.insert(program, samplers);
            state.fail_link.take()
        };
        self.record(GlCall::LinkProgram {
            program,
            ok: failure.is_none(),
        });
        failure.map_or(Ok(()), Err)
    }

    fn delete_program(&mut self, program: GlProgram) {
        {
            let mut state = self.state.borrow_mut();
            state.free("program", program.id());
            state.attached.remove(&program);
            state.blocks.remove(&program);
            state.sampler_uniforms.remove(&program);
        }
        self.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<GlProgram>) {
        self.record(GlCall::UseProgram(program));
    }

    fn uniform_block_index(&mut self, program: GlProgram, name: &str) -> Option<u32> {
        let state = self.state.borrow();
        let blocks = state.blocks.get(&program)?;
        blocks.iter().position(|b| b == name).map(|i| i as u32)
    }

    fn uniform_block_binding(&mut self, program: GlProgram, index: u32, binding: u32) {
        self.record(GlCall::UniformBlockBinding {
            program,
            index,
            binding,
        });
    }

    fn uniform_location(&mut self, program: GlProgram, name: &str) -> Option<GlUniformLocation> {
        let mut state = self.state.borrow_mut();
        let known = state
            .sampler_uniforms
            .get(&program)
            .is_some_and(|names| names.iter().any(|n| n == name));
        if !known {
            return None;
        }
        let key = (program, name.to_string());
        if let Some(location) = state.locations.get(&key) {
            return Some(*location);
        }
        let location = GlUniformLocation(state.alloc("uniform_location"));
        state.locations.insert(key, location);
        Some(location)
    }

    fn uniform_1_i32(&mut self, location: GlUniformLocation, value: i32) {
        self.record(GlCall::Uniform1i { location, value });
    }

    fn enable(&mut self, cap: u32) {
        self.record(GlCall::Enable(cap));
    }

    fn disable(&mut self, cap: u32) {
        self.record(GlCall::Disable(cap));
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.record(GlCall::DepthRange { near, far });
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Scissor {
            x,
            y,
            width,
            height,
        });
    }

    fn cull_face(&mut self, mode: u32) {
        self.record(GlCall::CullFace(mode));
    }

    fn front_face(&mut self, mode: u32) {
        self.record(GlCall::FrontFace(mode));
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(GlCall::PolygonOffset { factor, units });
    }

    fn depth_func(&mut self, func: u32) {
        self.record(GlCall::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GlCall::DepthMask(write));
    }

    fn stencil_func_separate(&mut self, face: u32, func: u32, reference: i32, mask: u32) {
        self.record(GlCall::StencilFuncSeparate {
            face,
            func,
            reference,
            mask,
        });
    }

    fn stencil_op_separate(&mut self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        self.record(GlCall::StencilOpSeparate {
            face,
            fail,
            depth_fail,
            pass,
        });
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record(GlCall::StencilMask(mask));
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(GlCall::BlendFuncSeparate {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        });
    }

    fn blend_equation_separate(&mut self, rgb: u32, alpha: u32) {
        self.record(GlCall::BlendEquationSeparate { rgb, alpha });
    }

    fn blend_color(&mut self, color: [f32; 4]) {
        self.record(GlCall::BlendColor(color));
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.record(GlCall::ColorMask([r, g, b, a]));
    }

    fn clear_buffer_fv(&mut self, buffer: u32, draw_buffer: u32, values: &[f32]) {
        self.record(GlCall::ClearBufferFv {
            buffer,
            draw_buffer,
            values: values.to_vec(),
        });
    }

    fn clear_buffer_iv(&mut self, buffer: u32, draw_buffer: u32, values: &[i32]) {
        self.record(GlCall::ClearBufferIv {
            buffer,
            draw_buffer,
            values: values.to_vec(),
        });
    }

    fn clear_buffer_uiv(&mut self, buffer: u32, draw_buffer: u32, values: &[u32]) {
        self.record(GlCall::ClearBufferUiv {
            buffer,
            draw_buffer,
            values: values.to_vec(),
        });
    }

    fn clear_buffer_fi(&mut self, buffer: u32, draw_buffer: u32, depth: f32, stencil: i32) {
        self.record(GlCall::ClearBufferFi {
            buffer,
            draw_buffer,
            depth,
            stencil,
        });
    }

    fn draw_arrays(&mut self, mode: u32, first: u32, count: u32) {
        self.record(GlCall::DrawArrays {
            mode,
            first,
            count,
            instances: 1,
        });
    }

    fn draw_arrays_instanced(&mut self, mode: u32, first: u32, count: u32, instances: u32) {
        self.record(GlCall::DrawArrays {
            mode,
            first,
            count,
            instances,
        });
    }

    fn draw_elements(&mut self, mode: u32, count: u32, ty: u32, offset: usize) {
        self.record(GlCall::DrawElements {
            mode,
            count,
            ty,
            offset,
            instances: 1,
        });
    }

    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: u32,
        ty: u32,
        offset: usize,
        instances: u32,
    ) {
        self.record(GlCall::DrawElements {
            mode,
            count,
            ty,
            offset,
            instances,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_answers_block_and_sampler_queries_from_source() {
        let (mut backend, log) = TraceBackend::new();
        let vs = backend.create_shader(gl::VERTEX_SHADER).unwrap();
        let ps = backend.create_shader(gl::FRAGMENT_SHADER).unwrap();
        backend
            .compile_shader(vs, "layout(std140) uniform xc_vs_cb_A {\n    vec4 a;\n};\n")
            .unwrap();
        backend
            .compile_shader(
                ps,
                "layout(std140) uniform xc_ps_cb_B {\n    vec4 b;\n};\nuniform sampler2D xc_ps_combo0_t_s;\n",
            )
            .unwrap();
        let program = backend.create_program().unwrap();
        backend.attach_shader(program, vs);
        backend.attach_shader(program, ps);
        backend.link_program(program).unwrap();

        assert_eq!(backend.uniform_block_index(program, "xc_vs_cb_A"), Some(0));
        assert_eq!(backend.uniform_block_index(program, "xc_ps_cb_B"), Some(1));
        assert_eq!(backend.uniform_block_index(program, "xc_ps_cb_C"), None);
        let loc = backend.uniform_location(program, "xc_ps_combo0_t_s");
        assert!(loc.is_some());
        assert_eq!(backend.uniform_location(program, "xc_ps_combo0_t_s"), loc);
        assert_eq!(log.link_count(), 1);
    }

    #[test]
    fn failure_knobs_fire_once() {
        let (mut backend, log) = TraceBackend::new();
        let shader = backend.create_shader(gl::VERTEX_SHADER).unwrap();
        log.fail_next_compile("ERROR: 0:1: syntax error");
        assert_eq!(
            backend.compile_shader(shader, "void main() {}"),
            Err("ERROR: 0:1: syntax error".to_string())
        );
        assert_eq!(backend.compile_shader(shader, "void main() {}"), Ok(()));
    }

    #[test]
    fn live_objects_are_tracked_per_kind() {
        let (mut backend, log) = TraceBackend::new();
        let a = backend.create_texture().unwrap();
        let _b = backend.create_texture().unwrap();
        let _buf = backend.create_buffer().unwrap();
        backend.delete_texture(a);
        assert_eq!(log.live("texture"), 1);
        assert_eq!(log.live("buffer"), 1);
    }
}
