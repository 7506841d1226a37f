//! The immediate device context.
//!
//! Set calls only record pending state in [`PipelineState`] and raise [`DirtyFlags`]; nothing
//! reaches the backend until a draw resolves the dirty stages (see `resolve`). Clears, uploads
//! and mapping act immediately.

mod bindings;
mod dirty;
mod program_cache;
mod resolve;

use std::rc::Rc;

use tracing::{debug, warn};
use webd3d_hlsl::ShaderStage;

use crate::backend::{GlBuffer, GlFramebuffer, GlSampler, GlTexture, GlVertexArray};
use crate::binding_model::{
    MAX_CONSTANT_BUFFER_SLOTS, MAX_RENDER_TARGETS, MAX_SAMPLER_SLOTS, MAX_SHADER_RESOURCE_SLOTS,
    MAX_VERTEX_BUFFER_SLOTS, MAX_VIEWPORTS,
};
use crate::desc::{
    BindFlags, ClearFlags, DstBox, MapType, PrimitiveTopology, Rect, ResourceMiscFlags, SamplerDesc,
    Usage, Viewport,
};
use crate::device::Device;
use crate::error::{D3dError, Result};
use crate::format::{ComponentKind, Format};
use crate::gl;
use crate::resource::{pack_rows, Buffer, Region, Resource};
use crate::shader::{PixelShader, VertexShader};
use crate::state::{BlendState, DepthStencilState, InputLayout, RasterizerState, SamplerPair, SamplerState};
use crate::topology::translate_topology;
use crate::view::{attach, AttachmentKey, DepthStencilView, RenderTargetView, ShaderResourceView};

use bindings::{set_slot, IndexBufferBinding, StageBindings, VertexBufferBinding};
use program_cache::{stage_index, LinkedProgram, ProgramCache};

pub use dirty::DirtyFlags;
pub use program_cache::CacheStats;

/// Everything the application has bound, whether or not it has reached the backend yet.
#[derive(Debug, Clone)]
struct PipelineState {
    input_layout: Option<InputLayout>,
    vertex_buffers: Vec<Option<VertexBufferBinding>>,
    index_buffer: Option<IndexBufferBinding>,
    topology: PrimitiveTopology,
    vs: Option<VertexShader>,
    ps: Option<PixelShader>,
    /// Indexed by stage: vertex, then pixel.
    stages: [StageBindings; 2],
    viewports: Vec<Viewport>,
    scissor_rects: Vec<Rect>,
    rasterizer: Option<RasterizerState>,
    depth_stencil: Option<DepthStencilState>,
    stencil_ref: u32,
    blend: Option<BlendState>,
    blend_factor: [f32; 4],
    sample_mask: u32,
    render_targets: Vec<Option<RenderTargetView>>,
    depth_stencil_view: Option<DepthStencilView>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            input_layout: None,
            vertex_buffers: Vec::new(),
            index_buffer: None,
            topology: PrimitiveTopology::Undefined,
            vs: None,
            ps: None,
            stages: Default::default(),
            viewports: Vec::new(),
            scissor_rects: Vec::new(),
            rasterizer: None,
            depth_stencil: None,
            stencil_ref: 0,
            blend: None,
            blend_factor: [1.0; 4],
            sample_mask: u32::MAX,
            render_targets: Vec::new(),
            depth_stencil_view: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct UnitBinding {
    texture: Option<(u32, GlTexture)>,
    sampler: Option<GlSampler>,
}

/// What the backend currently has bound, as far as the context knows. Used to skip redundant
/// calls; cleared wherever the device or a clear changed backend bindings behind its back.
#[derive(Debug, Default)]
struct AppliedState {
    vao_bound: bool,
    enabled_attribs: u32,
    /// Offsets folded into the current attribute pointers.
    attribute_offset: DrawOffsets,
    index_buffer: Option<GlBuffer>,
    /// Indexed by uniform-block binding point.
    uniform_buffers: Vec<Option<GlBuffer>>,
    active_unit: Option<u32>,
    /// Indexed by texture unit; `None` when unknown.
    units: Vec<Option<UnitBinding>>,
    framebuffer_bound: bool,
    color_attachments: Vec<Option<AttachmentKey>>,
    depth_attachment: Option<(u32, AttachmentKey)>,
    draw_buffers: Vec<u32>,
}

impl AppliedState {
    fn forget(&mut self, flags: DirtyFlags) {
        if flags.contains(DirtyFlags::INPUT_ASSEMBLER) {
            self.vao_bound = false;
        }
        if flags.intersects(DirtyFlags::SHADER_RESOURCES) {
            self.active_unit = None;
            self.units.clear();
        }
        if flags.contains(DirtyFlags::RENDER_TARGETS) {
            self.framebuffer_bound = false;
        }
    }
}

/// Parameters of one draw that affect resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DrawOffsets {
    base_vertex: i32,
    start_instance: u32,
}

pub struct DeviceContext {
    device: Device,
    state: PipelineState,
    dirty: DirtyFlags,
    programs: ProgramCache,
    current_program: Option<Rc<LinkedProgram>>,
    applied: AppliedState,
    vao: GlVertexArray,
    draw_fbo: GlFramebuffer,
    clear_fbo: GlFramebuffer,
    /// Used for combinations whose sampler slot is empty.
    default_sampler: SamplerPair,
}

impl DeviceContext {
    pub(crate) fn new(device: Device) -> Result<Self> {
        let (vao, draw_fbo, clear_fbo, default_sampler) = {
            let mut gl = device.gl();
            let vao = gl.create_vertex_array()?;
            let draw_fbo = gl.create_framebuffer()?;
            let clear_fbo = gl.create_framebuffer()?;
            let default_sampler = SamplerPair::create(&mut **gl, &SamplerDesc::default())?;
            (vao, draw_fbo, clear_fbo, default_sampler)
        };
        Ok(Self {
            device,
            state: PipelineState::default(),
            dirty: DirtyFlags::all(),
            programs: ProgramCache::default(),
            current_program: None,
            applied: AppliedState::default(),
            vao,
            draw_fbo,
            clear_fbo,
            default_sampler,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Stages waiting to be resolved by the next draw.
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn program_cache_stats(&self) -> CacheStats {
        self.programs.stats()
    }

    // Input assembler.

    pub fn ia_set_input_layout(&mut self, layout: Option<&InputLayout>) {
        let layout = layout.cloned();
        if self.state.input_layout != layout {
            self.state.input_layout = layout;
            self.dirty |= DirtyFlags::INPUT_ASSEMBLER;
        }
    }

    /// Binds `buffers` to slots `start_slot..`, with one stride and offset per buffer.
    pub fn ia_set_vertex_buffers(
        &mut self,
        start_slot: u32,
        buffers: &[Option<&Buffer>],
        strides: &[u32],
        offsets: &[u32],
    ) {
        if strides.len() < buffers.len() || offsets.len() < buffers.len() {
            warn!(
                buffers = buffers.len(),
                strides = strides.len(),
                offsets = offsets.len(),
                "IASetVertexBuffers ignored: fewer strides or offsets than buffers"
            );
            return;
        }
        let mut changed = false;
        for (i, buffer) in buffers.iter().enumerate() {
            let slot = start_slot + i as u32;
            if slot >= MAX_VERTEX_BUFFER_SLOTS {
                warn!(slot, "vertex buffer slot out of range");
                break;
            }
            let binding = buffer
                .filter(|b| has_bind_flag(b, BindFlags::VERTEX_BUFFER, "vertex buffer"))
                .map(|b| VertexBufferBinding {
                    buffer: b.clone(),
                    stride: strides[i],
                    offset: offsets[i],
                });
            changed |= set_slot(&mut self.state.vertex_buffers, slot, binding);
        }
        if changed {
            self.dirty |= DirtyFlags::INPUT_ASSEMBLER;
        }
    }

    /// `format` must be `R16Uint` or `R32Uint` when a buffer is bound.
    pub fn ia_set_index_buffer(&mut self, buffer: Option<&Buffer>, format: Format, offset: u32) {
        let binding = match buffer {
            Some(_) if format.index_type().is_none() => {
                warn!(?format, "index buffer format must be R16Uint or R32Uint; unbinding");
                None
            }
            Some(b) if has_bind_flag(b, BindFlags::INDEX_BUFFER, "index buffer") => Some(IndexBufferBinding {
                buffer: b.clone(),
                format,
                offset,
            }),
            _ => None,
        };
        if self.state.index_buffer != binding {
            self.state.index_buffer = binding;
            self.dirty |= DirtyFlags::INDEX_BUFFER;
        }
    }

    pub fn ia_set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.state.topology = topology;
    }

    // Shader stages.

    pub fn vs_set_shader(&mut self, shader: Option<&VertexShader>) {
        let shader = shader.cloned();
        if self.state.vs != shader {
            self.state.vs = shader;
            // Attribute locations come from the vertex shader.
            self.dirty |= DirtyFlags::SHADERS | DirtyFlags::INPUT_ASSEMBLER;
        }
    }

    pub fn ps_set_shader(&mut self, shader: Option<&PixelShader>) {
        let shader = shader.cloned();
        if self.state.ps != shader {
            self.state.ps = shader;
            self.dirty |= DirtyFlags::SHADERS;
        }
    }

    pub fn vs_set_constant_buffers(&mut self, start_slot: u32, buffers: &[Option<&Buffer>]) {
        self.set_constant_buffers(ShaderStage::Vertex, start_slot, buffers);
    }

    pub fn ps_set_constant_buffers(&mut self, start_slot: u32, buffers: &[Option<&Buffer>]) {
        self.set_constant_buffers(ShaderStage::Pixel, start_slot, buffers);
    }

    pub fn vs_set_shader_resources(&mut self, start_slot: u32, views: &[Option<&ShaderResourceView>]) {
        self.set_shader_resources(ShaderStage::Vertex, start_slot, views);
    }

    pub fn ps_set_shader_resources(&mut self, start_slot: u32, views: &[Option<&ShaderResourceView>]) {
        self.set_shader_resources(ShaderStage::Pixel, start_slot, views);
    }

    pub fn vs_set_samplers(&mut self, start_slot: u32, samplers: &[Option<&SamplerState>]) {
        self.set_samplers(ShaderStage::Vertex, start_slot, samplers);
    }

    pub fn ps_set_samplers(&mut self, start_slot: u32, samplers: &[Option<&SamplerState>]) {
        self.set_samplers(ShaderStage::Pixel, start_slot, samplers);
    }

    fn set_constant_buffers(&mut self, stage: ShaderStage, start_slot: u32, buffers: &[Option<&Buffer>]) {
        let bindings = &mut self.state.stages[stage_index(stage)];
        let mut changed = false;
        for (i, buffer) in buffers.iter().enumerate() {
            let slot = start_slot + i as u32;
            if slot >= MAX_CONSTANT_BUFFER_SLOTS {
                warn!(?stage, slot, "constant buffer slot out of range");
                break;
            }
            let buffer = buffer
                .filter(|b| has_bind_flag(b, BindFlags::CONSTANT_BUFFER, "constant buffer"))
                .cloned();
            changed |= bindings.set_constant_buffer(slot, buffer);
        }
        if changed {
            self.dirty |= match stage {
                ShaderStage::Vertex => DirtyFlags::VS_CONSTANT_BUFFERS,
                ShaderStage::Pixel => DirtyFlags::PS_CONSTANT_BUFFERS,
            };
        }
    }

    fn set_shader_resources(&mut self, stage: ShaderStage, start_slot: u32, views: &[Option<&ShaderResourceView>]) {
        let bindings = &mut self.state.stages[stage_index(stage)];
        let mut changed = false;
        for (i, view) in views.iter().enumerate() {
            let slot = start_slot + i as u32;
            if slot >= MAX_SHADER_RESOURCE_SLOTS {
                warn!(?stage, slot, "shader resource slot out of range");
                break;
            }
            changed |= bindings.set_shader_resource(slot, view.cloned());
        }
        if changed {
            self.dirty |= shader_resource_flag(stage);
        }
    }

    fn set_samplers(&mut self, stage: ShaderStage, start_slot: u32, samplers: &[Option<&SamplerState>]) {
        let bindings = &mut self.state.stages[stage_index(stage)];
        let mut changed = false;
        for (i, sampler) in samplers.iter().enumerate() {
            let slot = start_slot + i as u32;
            if slot >= MAX_SAMPLER_SLOTS {
                warn!(?stage, slot, "sampler slot out of range");
                break;
            }
            changed |= bindings.set_sampler(slot, sampler.cloned());
        }
        if changed {
            self.dirty |= shader_resource_flag(stage);
        }
    }

    // Rasterizer.

    pub fn rs_set_state(&mut self, state: Option<&RasterizerState>) {
        let state = state.cloned();
        if self.state.rasterizer != state {
            self.state.rasterizer = state;
            // The scissor enable bit decides whether scissor rects apply.
            self.dirty |= DirtyFlags::RASTERIZER | DirtyFlags::VIEWPORT;
        }
    }

    /// Only the first viewport is used; the backend has a single one.
    pub fn rs_set_viewports(&mut self, viewports: &[Viewport]) {
        let count = viewports.len().min(MAX_VIEWPORTS as usize);
        if count > 1 {
            debug!(count, "only viewport 0 is applied");
        }
        if self.state.viewports[..] != viewports[..count] {
            self.state.viewports = viewports[..count].to_vec();
            self.dirty |= DirtyFlags::VIEWPORT;
        }
    }

    pub fn rs_set_scissor_rects(&mut self, rects: &[Rect]) {
        let count = rects.len().min(MAX_VIEWPORTS as usize);
        if self.state.scissor_rects[..] != rects[..count] {
            self.state.scissor_rects = rects[..count].to_vec();
            self.dirty |= DirtyFlags::VIEWPORT;
        }
    }

    // Output merger.

    pub fn om_set_render_targets(&mut self, views: &[Option<&RenderTargetView>], depth_stencil: Option<&DepthStencilView>) {
        let count = views.len().min(MAX_RENDER_TARGETS as usize);
        if views.len() > count {
            warn!(count = views.len(), "render targets beyond slot {MAX_RENDER_TARGETS} ignored");
        }
        let mut targets: Vec<Option<RenderTargetView>> = views[..count].iter().map(|v| v.cloned()).collect();
        while targets.last().is_some_and(Option::is_none) {
            targets.pop();
        }
        let depth_stencil = depth_stencil.cloned();
        if self.state.render_targets != targets || self.state.depth_stencil_view != depth_stencil {
            self.state.render_targets = targets;
            self.state.depth_stencil_view = depth_stencil;
            // The viewport flip depends on the target height.
            self.dirty |= DirtyFlags::RENDER_TARGETS | DirtyFlags::VIEWPORT;
        }
    }

    pub fn om_set_depth_stencil_state(&mut self, state: Option<&DepthStencilState>, stencil_ref: u32) {
        let state = state.cloned();
        if self.state.depth_stencil != state || self.state.stencil_ref != stencil_ref {
            self.state.depth_stencil = state;
            self.state.stencil_ref = stencil_ref;
            self.dirty |= DirtyFlags::DEPTH_STENCIL;
        }
    }

    /// A `None` blend factor means opaque white.
    pub fn om_set_blend_state(&mut self, state: Option<&BlendState>, blend_factor: Option<[f32; 4]>, sample_mask: u32) {
        let state = state.cloned();
        let blend_factor = blend_factor.unwrap_or([1.0; 4]);
        if self.state.blend != state || self.state.blend_factor != blend_factor || self.state.sample_mask != sample_mask {
            self.state.blend = state;
            self.state.blend_factor = blend_factor;
            self.state.sample_mask = sample_mask;
            self.dirty |= DirtyFlags::BLEND;
        }
    }

    // Whole-context state.

    /// Unbinds everything and restores default state, like `ClearState`.
    pub fn clear_state(&mut self) {
        self.state = PipelineState::default();
        self.dirty = DirtyFlags::all();
    }

    /// Forces every stage to be resolved from scratch on the next draw, including state the
    /// context believes is already applied. Call after touching the backend directly.
    pub fn dirty_pipeline(&mut self) {
        self.dirty = DirtyFlags::all();
        self.applied = AppliedState::default();
        self.current_program = None;
    }

    // Draws.

    pub fn draw(&mut self, vertex_count: u32, start_vertex: u32) -> Result<()> {
        self.draw_arrays(vertex_count, None, start_vertex, 0)
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count_per_instance: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) -> Result<()> {
        self.draw_arrays(vertex_count_per_instance, Some(instance_count), start_vertex, start_instance)
    }

    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) -> Result<()> {
        self.draw_elements(index_count, None, start_index, base_vertex, 0)
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count_per_instance: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<()> {
        self.draw_elements(index_count_per_instance, Some(instance_count), start_index, base_vertex, start_instance)
    }

    fn draw_arrays(&mut self, count: u32, instances: Option<u32>, first: u32, start_instance: u32) -> Result<()> {
        let mode = translate_topology(self.state.topology)?;
        self.resolve(DrawOffsets {
            base_vertex: 0,
            start_instance,
        })?;
        if count == 0 || instances == Some(0) {
            return Ok(());
        }
        let mut gl = self.device.gl();
        match instances {
            Some(n) => gl.draw_arrays_instanced(mode, first, count, n),
            None => gl.draw_arrays(mode, first, count),
        }
        Ok(())
    }

    fn draw_elements(
        &mut self,
        count: u32,
        instances: Option<u32>,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) -> Result<()> {
        let mode = translate_topology(self.state.topology)?;
        let binding = self.state.index_buffer.as_ref().ok_or(D3dError::MissingIndexBuffer)?;
        let (ty, index_size) = binding
            .format
            .index_type()
            .ok_or(D3dError::MissingIndexBuffer)?;
        let offset = binding.offset as usize + start_index as usize * index_size as usize;
        self.resolve(DrawOffsets {
            base_vertex,
            start_instance,
        })?;
        if count == 0 || instances == Some(0) {
            return Ok(());
        }
        let mut gl = self.device.gl();
        match instances {
            Some(n) => gl.draw_elements_instanced(mode, count, ty, offset, n),
            None => gl.draw_elements(mode, count, ty, offset),
        }
        Ok(())
    }

    // Immediate operations.

    pub fn clear_render_target_view(&mut self, view: &RenderTargetView, color: [f32; 4]) -> Result<()> {
        let key = view.attachment_key()?;
        let kind = view.0.texture.format_info()?.kind;
        {
            let mut gl = self.device.gl();
            gl.bind_framebuffer(gl::FRAMEBUFFER, Some(self.clear_fbo));
            attach(&mut **gl, gl::COLOR_ATTACHMENT0, Some(key));
            gl.draw_buffers(&[gl::COLOR_ATTACHMENT0]);
            gl.disable(gl::SCISSOR_TEST);
            gl.color_mask(true, true, true, true);
            match kind {
                ComponentKind::Float => gl.clear_buffer_fv(gl::COLOR, 0, &color),
                ComponentKind::Uint => gl.clear_buffer_uiv(gl::COLOR, 0, &color.map(|c| c as u32)),
                ComponentKind::Sint => gl.clear_buffer_iv(gl::COLOR, 0, &color.map(|c| c as i32)),
            }
            attach(&mut **gl, gl::COLOR_ATTACHMENT0, None);
        }
        self.after_clear(DirtyFlags::BLEND);
        Ok(())
    }

    /// Clears the depth and/or stencil planes selected by `flags`. Stencil is skipped for
    /// formats without a stencil plane.
    pub fn clear_depth_stencil_view(&mut self, view: &DepthStencilView, flags: ClearFlags, depth: f32, stencil: u8) -> Result<()> {
        let key = view.attachment_key()?;
        let point = view.attachment_point();
        let clear_depth = flags.contains(ClearFlags::DEPTH);
        let clear_stencil = flags.contains(ClearFlags::STENCIL) && view.0.has_stencil;
        if !clear_depth && !clear_stencil {
            return Ok(());
        }
        let depth = depth.clamp(0.0, 1.0);
        {
            let mut gl = self.device.gl();
            gl.bind_framebuffer(gl::FRAMEBUFFER, Some(self.clear_fbo));
            attach(&mut **gl, point, Some(key));
            gl.draw_buffers(&[gl::NONE]);
            gl.disable(gl::SCISSOR_TEST);
            match (clear_depth, clear_stencil) {
                (true, true) => {
                    gl.depth_mask(true);
                    gl.stencil_mask(0xFF);
                    gl.clear_buffer_fi(gl::DEPTH_STENCIL, 0, depth, stencil as i32);
                }
                (true, false) => {
                    gl.depth_mask(true);
                    gl.clear_buffer_fv(gl::DEPTH, 0, &[depth]);
                }
                _ => {
                    gl.stencil_mask(0xFF);
                    gl.clear_buffer_iv(gl::STENCIL, 0, &[stencil as i32]);
                }
            }
            attach(&mut **gl, point, None);
        }
        self.after_clear(DirtyFlags::DEPTH_STENCIL);
        Ok(())
    }

    /// Clears leave the clear framebuffer bound and reset masks and the scissor test.
    fn after_clear(&mut self, masks: DirtyFlags) {
        self.applied.forget(DirtyFlags::RENDER_TARGETS);
        self.dirty |= DirtyFlags::RENDER_TARGETS | DirtyFlags::RASTERIZER | masks;
    }

    /// Replaces the contents of one subresource, or of `dst_box` within it.
    pub fn update_subresource(
        &mut self,
        resource: impl Into<Resource>,
        subresource: u32,
        dst_box: Option<&DstBox>,
        data: &[u8],
        row_pitch: u32,
        depth_pitch: u32,
    ) -> Result<()> {
        match resource.into() {
            Resource::Buffer(buffer) => self.update_buffer(&buffer, subresource, dst_box, data),
            resource => {
                let Some(texture) = resource.texture_core() else {
                    return Err(D3dError::invalid("unknown resource kind"));
                };
                texture.refs.ensure_alive("Texture")?;
                let shape = &texture.shape;
                if shape.usage != Usage::Default {
                    return Err(D3dError::invalid("UpdateSubresource requires a default-usage resource"));
                }
                if shape.bind_flags.contains(BindFlags::DEPTH_STENCIL) {
                    return Err(D3dError::invalid("UpdateSubresource cannot write depth-stencil resources"));
                }
                if subresource >= shape.subresource_count() {
                    return Err(D3dError::invalid(format!(
                        "subresource {subresource} is outside the resource's {} subresources",
                        shape.subresource_count()
                    )));
                }
                let mip = subresource % shape.mip_levels;
                let slice = subresource / shape.mip_levels;
                let full = Region::full(shape, mip);
                let region = match dst_box {
                    None => full,
                    Some(b) => {
                        if b.right <= b.left || b.bottom <= b.top || b.back <= b.front {
                            debug!(?b, "empty destination box; nothing to update");
                            return Ok(());
                        }
                        if b.right > full.width || b.bottom > full.height || b.back > full.depth {
                            return Err(D3dError::invalid(format!(
                                "destination box {b:?} exceeds the {}x{}x{} subresource",
                                full.width, full.height, full.depth
                            )));
                        }
                        Region {
                            x: b.left,
                            y: b.top,
                            z: b.front,
                            width: b.right - b.left,
                            height: b.bottom - b.top,
                            depth: b.back - b.front,
                        }
                    }
                };
                let info = texture.format_info()?;
                let packed = pack_rows(data, row_pitch, depth_pitch, region, info.bytes_per_pixel)?;
                texture.upload(&mut **self.device.gl(), mip, slice, region, &packed)?;
                self.absorb_perturbations();
                Ok(())
            }
        }
    }

    fn update_buffer(&mut self, buffer: &Buffer, subresource: u32, dst_box: Option<&DstBox>, data: &[u8]) -> Result<()> {
        buffer.gl_handle()?;
        if buffer.usage() != Usage::Default {
            return Err(D3dError::invalid("UpdateSubresource requires a default-usage resource"));
        }
        if subresource != 0 {
            return Err(D3dError::invalid("buffers have a single subresource"));
        }
        let size = buffer.byte_width();
        let (offset, len) = match dst_box {
            None => (0, size),
            Some(_) if buffer.bind_flags().contains(BindFlags::CONSTANT_BUFFER) => {
                return Err(D3dError::invalid("constant buffers can only be updated whole"));
            }
            Some(b) if b.right <= b.left => return Ok(()),
            Some(b) if b.right > size => {
                return Err(D3dError::invalid(format!(
                    "destination range {}..{} exceeds the {size}-byte buffer",
                    b.left, b.right
                )));
            }
            Some(b) => (b.left, b.right - b.left),
        };
        let Some(bytes) = data.get(..len as usize) else {
            return Err(D3dError::invalid(format!(
                "update data is {} bytes but {len} are needed",
                data.len()
            )));
        };
        buffer.write(&mut **self.device.gl(), offset as usize, bytes, false);
        self.absorb_perturbations();
        Ok(())
    }

    /// Regenerates the mip chain below the view's most detailed mip. A no-op for resources
    /// created without `GENERATE_MIPS`.
    pub fn generate_mips(&mut self, view: &ShaderResourceView) -> Result<()> {
        let texture_handle = view.gl_texture()?;
        let texture = &view.0.texture;
        if !texture.shape.misc_flags.contains(ResourceMiscFlags::GENERATE_MIPS) {
            debug!("GenerateMips on a resource without GENERATE_MIPS ignored");
            return Ok(());
        }
        {
            let mut gl = self.device.gl();
            gl.bind_texture(view.0.target, Some(texture_handle));
            texture.apply_level_range(&mut **gl, view.0.most_detailed_mip, view.max_level());
            gl.generate_mipmap(view.0.target);
        }
        self.device.perturb(DirtyFlags::SHADER_RESOURCES);
        self.absorb_perturbations();
        Ok(())
    }

    /// Maps a dynamic buffer for writing. `write` receives the buffer's CPU copy, which is
    /// uploaded once it returns. `WriteDiscard` starts from the previous contents rather than
    /// undefined memory.
    pub fn map<R>(&mut self, buffer: &Buffer, map_type: MapType, write: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        buffer.gl_handle()?;
        if buffer.usage() != Usage::Dynamic {
            return Err(D3dError::invalid("only dynamic buffers can be mapped"));
        }
        let orphan = match map_type {
            MapType::WriteDiscard => true,
            MapType::WriteNoOverwrite if buffer.bind_flags().contains(BindFlags::CONSTANT_BUFFER) => {
                return Err(D3dError::invalid("constant buffers must be mapped with WriteDiscard"));
            }
            MapType::WriteNoOverwrite => false,
            MapType::Write => {
                return Err(D3dError::invalid("dynamic buffers must be mapped with WriteDiscard or WriteNoOverwrite"));
            }
            MapType::Read | MapType::ReadWrite => return Err(D3dError::unsupported("CPU read-back mapping")),
        };
        let mut shadow = buffer.0.shadow.borrow_mut();
        let result = write(&mut shadow);
        buffer.write(&mut **self.device.gl(), 0, &shadow, orphan);
        drop(shadow);
        self.absorb_perturbations();
        Ok(result)
    }

    /// Pulls in backend state the device changed since the last call.
    fn absorb_perturbations(&mut self) {
        let perturbed = self.device.take_perturbed();
        if !perturbed.is_empty() {
            self.applied.forget(perturbed);
            self.dirty |= perturbed;
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        let mut gl = self.device.gl();
        self.programs.clear(&mut **gl);
        gl.delete_vertex_array(self.vao);
        gl.delete_framebuffer(self.draw_fbo);
        gl.delete_framebuffer(self.clear_fbo);
        self.default_sampler.delete(&mut **gl);
    }
}

fn shader_resource_flag(stage: ShaderStage) -> DirtyFlags {
    match stage {
        ShaderStage::Vertex => DirtyFlags::VS_SHADER_RESOURCES,
        ShaderStage::Pixel => DirtyFlags::PS_SHADER_RESOURCES,
    }
}

fn has_bind_flag(buffer: &Buffer, flag: BindFlags, what: &str) -> bool {
    if buffer.bind_flags().contains(flag) {
        true
    } else {
        warn!(bind_flags = ?buffer.bind_flags(), "buffer bound as {what} without the matching bind flag; unbinding");
        false
    }
}
