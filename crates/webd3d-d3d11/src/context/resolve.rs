//! Draw-time resolution of dirty pipeline state.
//!
//! Stages resolve in a fixed order: input assembler, shaders, constant buffers, textures and
//! samplers, rasterizer, viewport, output merger. A stage whose flag is clear is skipped. A
//! stage that fails keeps its flag, so the next draw retries it.

use tracing::{trace, warn};
use webd3d_hlsl::ShaderStage;

use crate::backend::{GlBackend, GlBuffer};
use crate::desc::{BlendDesc, ColorWriteEnable, CullMode, DepthStencilDesc, DepthWriteMask, RasterizerDesc};
use crate::error::{D3dError, Result};
use crate::gl;
use crate::state::{blend_factor, blend_op, comparison_func, stencil_op, LayoutAttribute};
use crate::view::attach;

use super::program_cache::stage_index;
use super::{DeviceContext, DirtyFlags, DrawOffsets, UnitBinding};

/// Divisor for per-instance data with a zero step rate, which never advances.
const NEVER_ADVANCE: u32 = u32::MAX;

impl DeviceContext {
    pub(super) fn resolve(&mut self, offsets: DrawOffsets) -> Result<()> {
        self.device.ensure_alive()?;
        self.absorb_perturbations();
        self.retire_programs();
        if offsets != self.applied.attribute_offset {
            self.dirty |= DirtyFlags::INPUT_ASSEMBLER;
        }

        if self.dirty.contains(DirtyFlags::INPUT_ASSEMBLER) {
            self.resolve_input_assembler(offsets)?;
            self.dirty.remove(DirtyFlags::INPUT_ASSEMBLER);
        }
        if self.dirty.contains(DirtyFlags::INDEX_BUFFER) {
            self.resolve_index_buffer()?;
            self.dirty.remove(DirtyFlags::INDEX_BUFFER);
        }
        if self.dirty.contains(DirtyFlags::SHADERS) {
            self.resolve_shaders()?;
            self.dirty.remove(DirtyFlags::SHADERS);
        }
        for stage in [ShaderStage::Vertex, ShaderStage::Pixel] {
            let (cb_flag, srv_flag) = match stage {
                ShaderStage::Vertex => (DirtyFlags::VS_CONSTANT_BUFFERS, DirtyFlags::VS_SHADER_RESOURCES),
                ShaderStage::Pixel => (DirtyFlags::PS_CONSTANT_BUFFERS, DirtyFlags::PS_SHADER_RESOURCES),
            };
            if self.dirty.contains(cb_flag) {
                self.resolve_constant_buffers(stage)?;
                self.dirty.remove(cb_flag);
            }
            if self.dirty.contains(srv_flag) {
                self.resolve_shader_resources(stage)?;
                self.dirty.remove(srv_flag);
            }
        }
        if self.dirty.contains(DirtyFlags::RASTERIZER) {
            self.resolve_rasterizer()?;
            self.dirty.remove(DirtyFlags::RASTERIZER);
        }
        if self.dirty.contains(DirtyFlags::VIEWPORT) {
            self.resolve_viewport()?;
            self.dirty.remove(DirtyFlags::VIEWPORT);
        }
        if self.dirty.contains(DirtyFlags::DEPTH_STENCIL) {
            self.resolve_depth_stencil()?;
            self.dirty.remove(DirtyFlags::DEPTH_STENCIL);
        }
        if self.dirty.contains(DirtyFlags::BLEND) {
            self.resolve_blend()?;
            self.dirty.remove(DirtyFlags::BLEND);
        }
        if self.dirty.contains(DirtyFlags::RENDER_TARGETS) {
            self.resolve_render_targets()?;
            self.dirty.remove(DirtyFlags::RENDER_TARGETS);
        }
        Ok(())
    }

    /// Deletes programs built from shaders released since the last draw.
    fn retire_programs(&mut self) {
        let retired = self.device.take_retired_shaders();
        if retired.is_empty() {
            return;
        }
        let deleted = self.programs.retire(&mut **self.device.gl(), &retired);
        if self
            .current_program
            .as_ref()
            .is_some_and(|p| deleted.contains(&p.program))
        {
            self.current_program = None;
            self.dirty |= DirtyFlags::SHADERS;
        }
        trace!(retired = retired.len(), programs = deleted.len(), "retired programs");
    }

    fn bind_vao(&mut self, gl: &mut dyn GlBackend) {
        if !self.applied.vao_bound {
            gl.bind_vertex_array(Some(self.vao));
            self.applied.vao_bound = true;
        }
    }

    fn resolve_input_assembler(&mut self, offsets: DrawOffsets) -> Result<()> {
        let vs = self
            .state
            .vs
            .clone()
            .ok_or(D3dError::MissingShader(ShaderStage::Vertex))?;
        let reflection = vs.reflection();
        let layout = self.state.input_layout.clone();
        let attributes: &[LayoutAttribute] = match &layout {
            Some(layout) => layout.attributes()?,
            None if reflection.inputs.is_empty() => &[],
            None => return Err(D3dError::MissingInputLayout),
        };
        // Walk slot by slot so each vertex buffer is bound once.
        let mut ordered: Vec<&LayoutAttribute> = attributes.iter().collect();
        ordered.sort_by_key(|attr| attr.slot);

        let device = self.device.clone();
        let mut gl = device.gl();
        self.bind_vao(&mut **gl);
        let mut enabled = 0u32;
        let mut array_buffer: Option<GlBuffer> = None;
        for attr in ordered {
            let Some(input) = reflection.input(&attr.semantic_name, attr.semantic_index) else {
                continue;
            };
            let binding = self
                .state
                .vertex_buffers
                .get(attr.slot as usize)
                .and_then(Option::as_ref)
                .ok_or(D3dError::MissingVertexBuffer(attr.slot))?;
            let handle = binding.buffer.gl_handle()?;
            if array_buffer != Some(handle) {
                gl.bind_buffer(gl::ARRAY_BUFFER, Some(handle));
                array_buffer = Some(handle);
            }

            let (skip, divisor) = match (attr.per_instance, attr.step_rate) {
                (false, _) => (offsets.base_vertex as i64, 0),
                (true, 0) => (0, NEVER_ADVANCE),
                (true, rate) => ((offsets.start_instance / rate) as i64, rate),
            };
            let offset = binding.offset as i64 + attr.offset as i64 + skip * binding.stride as i64;
            let offset = usize::try_from(offset).map_err(|_| {
                D3dError::invalid(format!(
                    "base vertex {} moves {}{} before the start of its vertex buffer",
                    offsets.base_vertex, attr.semantic_name, attr.semantic_index
                ))
            })?;

            let location = input.location;
            let format = attr.format;
            if format.integer {
                gl.vertex_attrib_i_pointer(location, format.components, format.ty, binding.stride, offset);
            } else {
                gl.vertex_attrib_pointer(
                    location,
                    format.components,
                    format.ty,
                    format.normalized,
                    binding.stride,
                    offset,
                );
            }
            gl.vertex_attrib_divisor(location, divisor);
            if self.applied.enabled_attribs & (1 << location) == 0 {
                gl.enable_vertex_attrib_array(location);
            }
            enabled |= 1 << location;
        }

        let stale = self.applied.enabled_attribs & !enabled;
        for location in (0..u32::BITS).filter(|l| stale & (1 << l) != 0) {
            gl.disable_vertex_attrib_array(location);
        }
        self.applied.enabled_attribs = enabled;
        self.applied.attribute_offset = offsets;
        trace!(attributes = enabled.count_ones(), ?offsets, "resolved input assembler");
        Ok(())
    }

    /// The element buffer is vertex-array state, so it is bound with the context's vertex
    /// array bound.
    fn resolve_index_buffer(&mut self) -> Result<()> {
        let Some(binding) = &self.state.index_buffer else {
            return Ok(());
        };
        let handle = binding.buffer.gl_handle()?;
        let device = self.device.clone();
        let mut gl = device.gl();
        self.bind_vao(&mut **gl);
        if self.applied.index_buffer != Some(handle) {
            gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, Some(handle));
            self.applied.index_buffer = Some(handle);
        }
        trace!(buffer = ?handle, "resolved index buffer");
        Ok(())
    }

    fn resolve_shaders(&mut self) -> Result<()> {
        let vs = self
            .state
            .vs
            .as_ref()
            .ok_or(D3dError::MissingShader(ShaderStage::Vertex))?;
        let ps = self
            .state
            .ps
            .as_ref()
            .ok_or(D3dError::MissingShader(ShaderStage::Pixel))?;
        let limits = self.device.limits();
        let mut gl = self.device.gl();
        let (program, linked_now) = self.programs.get_or_link(&mut **gl, &limits, vs, ps)?;
        let unchanged = matches!(&self.current_program, Some(current) if current.program == program.program);
        if !unchanged {
            if !linked_now {
                gl.use_program(Some(program.program));
            }
            trace!(program = ?program.program, linked_now, "switched program");
            self.current_program = Some(program);
            // Slot-to-binding maps are per program.
            self.dirty |= DirtyFlags::CONSTANT_BUFFERS | DirtyFlags::SHADER_RESOURCES;
        }
        Ok(())
    }

    fn resolve_constant_buffers(&mut self, stage: ShaderStage) -> Result<()> {
        let Some(program) = self.current_program.clone() else {
            return Ok(());
        };
        let bindings = &self.state.stages[stage_index(stage)];
        let mut gl = self.device.gl();
        for block in &program.blocks[stage_index(stage)] {
            // Empty slots stay unbound.
            let Some(buffer) = bindings.constant_buffer(block.register) else {
                continue;
            };
            let handle = buffer.gl_handle()?;
            if buffer.byte_width() < block.size_bytes {
                return Err(D3dError::ConstantBufferTooSmall {
                    slot: block.register,
                    actual: buffer.byte_width(),
                    required: block.size_bytes,
                });
            }
            let index = block.binding as usize;
            if self.applied.uniform_buffers.len() <= index {
                self.applied.uniform_buffers.resize(index + 1, None);
            }
            if self.applied.uniform_buffers[index] != Some(handle) {
                gl.bind_buffer_base(gl::UNIFORM_BUFFER, block.binding, Some(handle));
                self.applied.uniform_buffers[index] = Some(handle);
            }
        }
        trace!(?stage, blocks = program.blocks[stage_index(stage)].len(), "resolved constant buffers");
        Ok(())
    }

    fn resolve_shader_resources(&mut self, stage: ShaderStage) -> Result<()> {
        let Some(program) = self.current_program.clone() else {
            return Ok(());
        };
        let bindings = &self.state.stages[stage_index(stage)];
        let device = self.device.clone();
        let mut gl = device.gl();
        for unit in &program.units[stage_index(stage)] {
            let index = unit.unit as usize;
            if self.applied.units.len() <= index {
                self.applied.units.resize(index + 1, None);
            }
            let known = self.applied.units[index];

            let Some(view) = bindings.shader_resource(unit.texture_register) else {
                if known != Some(UnitBinding::default()) {
                    activate(&mut **gl, &mut self.applied.active_unit, unit.unit);
                    gl.bind_texture(unit.target, None);
                    gl.bind_sampler(unit.unit, None);
                    self.applied.units[index] = Some(UnitBinding::default());
                }
                continue;
            };

            let texture = view.gl_texture()?;
            if view.0.target != unit.target {
                return Err(D3dError::invalid(format!(
                    "{stage:?} shader samples t{} with a different texture dimension than the bound view",
                    unit.texture_register
                )));
            }
            let pair = match bindings.sampler(unit.sampler_register) {
                Some(sampler) => sampler.pair()?,
                None => self.default_sampler,
            };
            let sampler = pair.pick(view.0.mip_levels);
            let level_range = (view.0.most_detailed_mip, view.max_level());
            let mut binding = known.unwrap_or_default();
            let texture_known = known.is_some_and(|k| k.texture == Some((unit.target, texture)));

            if !texture_known {
                activate(&mut **gl, &mut self.applied.active_unit, unit.unit);
                gl.bind_texture(unit.target, Some(texture));
                binding.texture = Some((unit.target, texture));
            }
            if view.0.texture.level_range.get() != level_range {
                activate(&mut **gl, &mut self.applied.active_unit, unit.unit);
                view.0.texture.apply_level_range(&mut **gl, level_range.0, level_range.1);
            }
            if known.map_or(true, |k| k.sampler != Some(sampler)) {
                gl.bind_sampler(unit.unit, Some(sampler));
                binding.sampler = Some(sampler);
            }
            self.applied.units[index] = Some(binding);
        }
        trace!(?stage, units = program.units[stage_index(stage)].len(), "resolved shader resources");
        Ok(())
    }

    fn rasterizer_desc(&self) -> Result<RasterizerDesc> {
        match &self.state.rasterizer {
            Some(state) => state.live_desc(),
            None => Ok(RasterizerDesc::default()),
        }
    }

    fn resolve_rasterizer(&mut self) -> Result<()> {
        let desc = self.rasterizer_desc()?;
        let mut gl = self.device.gl();
        match desc.cull_mode {
            CullMode::None => gl.disable(gl::CULL_FACE),
            CullMode::Front => {
                gl.enable(gl::CULL_FACE);
                gl.cull_face(gl::FRONT);
            }
            CullMode::Back => {
                gl.enable(gl::CULL_FACE);
                gl.cull_face(gl::BACK);
            }
        }
        // Window space runs bottom-up on the backend, which mirrors winding.
        gl.front_face(if desc.front_counter_clockwise { gl::CW } else { gl::CCW });
        if desc.depth_bias != 0 || desc.slope_scaled_depth_bias != 0.0 {
            gl.enable(gl::POLYGON_OFFSET_FILL);
            gl.polygon_offset(desc.slope_scaled_depth_bias, desc.depth_bias as f32);
        } else {
            gl.disable(gl::POLYGON_OFFSET_FILL);
        }
        if desc.scissor_enable {
            gl.enable(gl::SCISSOR_TEST);
        } else {
            gl.disable(gl::SCISSOR_TEST);
        }
        trace!(cull = ?desc.cull_mode, scissor = desc.scissor_enable, "resolved rasterizer");
        Ok(())
    }

    /// Height used to flip from top-down to bottom-up window coordinates: the first bound render
    /// target, else the depth-stencil view.
    fn target_height(&self) -> Result<u32> {
        if let Some(view) = self.state.render_targets.iter().flatten().next() {
            return Ok(view.0.attachment.height);
        }
        match &self.state.depth_stencil_view {
            Some(view) => Ok(view.0.attachment.height),
            None => Err(D3dError::NoRenderTarget),
        }
    }

    fn resolve_viewport(&mut self) -> Result<()> {
        let viewport = *self.state.viewports.first().ok_or(D3dError::NoViewport)?;
        let height = self.target_height()?;
        let scissor = self.rasterizer_desc()?.scissor_enable;
        let mut gl = self.device.gl();

        let y = height as f32 - (viewport.top_left_y + viewport.height);
        gl.viewport(
            viewport.top_left_x.round() as i32,
            y.round() as i32,
            viewport.width.round() as i32,
            viewport.height.round() as i32,
        );
        gl.depth_range(viewport.min_depth, viewport.max_depth);
        if scissor {
            match self.state.scissor_rects.first() {
                Some(rect) => gl.scissor(
                    rect.left,
                    height as i32 - rect.bottom,
                    (rect.right - rect.left).max(0),
                    (rect.bottom - rect.top).max(0),
                ),
                // Scissoring with no rectangle discards everything.
                None => gl.scissor(0, 0, 0, 0),
            }
        }
        trace!(?viewport, target_height = height, "resolved viewport");
        Ok(())
    }

    fn resolve_depth_stencil(&mut self) -> Result<()> {
        let desc = match &self.state.depth_stencil {
            Some(state) => state.live_desc()?,
            None => DepthStencilDesc::default(),
        };
        let mut gl = self.device.gl();
        if desc.depth_enable {
            gl.enable(gl::DEPTH_TEST);
            gl.depth_func(comparison_func(desc.depth_func));
        } else {
            gl.disable(gl::DEPTH_TEST);
        }
        gl.depth_mask(desc.depth_write_mask == DepthWriteMask::All);
        if desc.stencil_enable {
            gl.enable(gl::STENCIL_TEST);
            for (face, ops) in [(gl::FRONT, desc.front_face), (gl::BACK, desc.back_face)] {
                gl.stencil_func_separate(
                    face,
                    comparison_func(ops.stencil_func),
                    self.state.stencil_ref as i32,
                    desc.stencil_read_mask as u32,
                );
                gl.stencil_op_separate(
                    face,
                    stencil_op(ops.stencil_fail_op),
                    stencil_op(ops.stencil_depth_fail_op),
                    stencil_op(ops.stencil_pass_op),
                );
            }
            gl.stencil_mask(desc.stencil_write_mask as u32);
        } else {
            gl.disable(gl::STENCIL_TEST);
        }
        trace!(depth = desc.depth_enable, stencil = desc.stencil_enable, "resolved depth-stencil state");
        Ok(())
    }

    fn resolve_blend(&mut self) -> Result<()> {
        let desc = match &self.state.blend {
            Some(state) => state.live_desc()?,
            None => BlendDesc::default(),
        };
        if self.state.sample_mask != u32::MAX {
            warn!(sample_mask = self.state.sample_mask, "sample mask is not supported; ignored");
        }
        let rt = desc.render_target[0];
        let mut gl = self.device.gl();
        if rt.blend_enable {
            gl.enable(gl::BLEND);
            gl.blend_func_separate(
                blend_factor(rt.src_blend),
                blend_factor(rt.dest_blend),
                blend_factor(rt.src_blend_alpha),
                blend_factor(rt.dest_blend_alpha),
            );
            gl.blend_equation_separate(blend_op(rt.blend_op), blend_op(rt.blend_op_alpha));
        } else {
            gl.disable(gl::BLEND);
        }
        let mask = rt.render_target_write_mask;
        gl.color_mask(
            mask.contains(ColorWriteEnable::RED),
            mask.contains(ColorWriteEnable::GREEN),
            mask.contains(ColorWriteEnable::BLUE),
            mask.contains(ColorWriteEnable::ALPHA),
        );
        gl.blend_color(self.state.blend_factor);
        if desc.alpha_to_coverage_enable {
            gl.enable(gl::SAMPLE_ALPHA_TO_COVERAGE);
        } else {
            gl.disable(gl::SAMPLE_ALPHA_TO_COVERAGE);
        }
        trace!(blend = rt.blend_enable, "resolved blend state");
        Ok(())
    }

    fn resolve_render_targets(&mut self) -> Result<()> {
        let targets = &self.state.render_targets;
        if targets.is_empty() && self.state.depth_stencil_view.is_none() {
            return Err(D3dError::NoRenderTarget);
        }
        let max_draw_buffers = self.device.limits().max_draw_buffers;
        if targets.len() as u32 > max_draw_buffers {
            return Err(D3dError::unsupported(format!(
                "render target slot {} exceeds the backend's {max_draw_buffers} draw buffers",
                targets.len() - 1
            )));
        }
        let colors = targets
            .iter()
            .map(|view| view.as_ref().map(|v| v.attachment_key()).transpose())
            .collect::<Result<Vec<_>>>()?;
        let depth = match &self.state.depth_stencil_view {
            Some(view) => Some((view.attachment_point(), view.attachment_key()?)),
            None => None,
        };

        let mut gl = self.device.gl();
        if !self.applied.framebuffer_bound {
            gl.bind_framebuffer(gl::FRAMEBUFFER, Some(self.draw_fbo));
            self.applied.framebuffer_bound = true;
        }
        let slots = colors.len().max(self.applied.color_attachments.len());
        for slot in 0..slots {
            let wanted = colors.get(slot).copied().flatten();
            let attached = self.applied.color_attachments.get(slot).copied().flatten();
            if wanted != attached {
                attach(&mut **gl, gl::COLOR_ATTACHMENT0 + slot as u32, wanted);
            }
        }
        if self.applied.depth_attachment != depth {
            if let Some((point, _)) = self.applied.depth_attachment {
                attach(&mut **gl, point, None);
            }
            if let Some((point, key)) = depth {
                attach(&mut **gl, point, Some(key));
            }
            self.applied.depth_attachment = depth;
        }

        let mut draw_buffers: Vec<u32> = colors
            .iter()
            .enumerate()
            .map(|(slot, key)| match key {
                Some(_) => gl::COLOR_ATTACHMENT0 + slot as u32,
                None => gl::NONE,
            })
            .collect();
        if draw_buffers.is_empty() {
            draw_buffers.push(gl::NONE);
        }
        if self.applied.draw_buffers != draw_buffers {
            gl.draw_buffers(&draw_buffers);
            self.applied.draw_buffers = draw_buffers;
        }
        self.applied.color_attachments = colors;

        if self.device.config().validate_framebuffers {
            let status = gl.check_framebuffer_status(gl::FRAMEBUFFER);
            if status != gl::FRAMEBUFFER_COMPLETE {
                return Err(D3dError::IncompleteFramebuffer(status));
            }
        }
        trace!(color_targets = targets.len(), depth = depth.is_some(), "resolved render targets");
        Ok(())
    }
}

fn activate(gl: &mut dyn GlBackend, active: &mut Option<u32>, unit: u32) {
    if *active != Some(unit) {
        gl.active_texture(unit);
        *active = Some(unit);
    }
}
