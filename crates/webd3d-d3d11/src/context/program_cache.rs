//! Linked programs, one per (vertex shader, pixel shader) pair.

use std::rc::Rc;

use hashbrown::HashMap;
use tracing::debug;
use webd3d_hlsl::{ShaderReflection, ShaderStage, TextureType};

use crate::backend::{BackendLimits, GlBackend, GlProgram};
use crate::binding_model::uniform_binding;
use crate::error::{D3dError, Result};
use crate::gl;
use crate::shader::{PixelShader, ShaderId, VertexShader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A constant buffer register wired to a uniform-block binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockBinding {
    pub(crate) register: u32,
    pub(crate) binding: u32,
    pub(crate) size_bytes: u32,
}

/// A texture/sampler combination wired to a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextureUnit {
    pub(crate) unit: u32,
    pub(crate) texture_register: u32,
    pub(crate) sampler_register: u32,
    /// Texture target the shader samples through.
    pub(crate) target: u32,
}

#[derive(Debug)]
pub(crate) struct LinkedProgram {
    pub(crate) program: GlProgram,
    /// Indexed by stage: vertex, then pixel.
    pub(crate) blocks: [Vec<BlockBinding>; 2],
    pub(crate) units: [Vec<TextureUnit>; 2],
}

pub(crate) fn stage_index(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Pixel => 1,
    }
}

pub(crate) fn texture_target(ty: TextureType) -> u32 {
    match ty {
        TextureType::Texture1D | TextureType::Texture2D => gl::TEXTURE_2D,
        TextureType::Texture2DArray => gl::TEXTURE_2D_ARRAY,
        TextureType::Texture3D => gl::TEXTURE_3D,
        TextureType::TextureCube => gl::TEXTURE_CUBE_MAP,
    }
}

#[derive(Debug, Default)]
pub(crate) struct ProgramCache {
    programs: HashMap<(ShaderId, ShaderId), Rc<LinkedProgram>>,
    hits: u64,
    misses: u64,
}

impl ProgramCache {
    /// Returns the program for (`vs`, `ps`), linking it on first use. The flag is `true` when
    /// the program was just linked, which leaves it current on the backend.
    pub(crate) fn get_or_link(
        &mut self,
        gl: &mut dyn GlBackend,
        limits: &BackendLimits,
        vs: &VertexShader,
        ps: &PixelShader,
    ) -> Result<(Rc<LinkedProgram>, bool)> {
        let key = (vs.id(), ps.id());
        if let Some(program) = self.programs.get(&key) {
            self.hits += 1;
            return Ok((program.clone(), false));
        }

        self.misses += 1;
        let program = Rc::new(link(gl, limits, vs, ps)?);
        self.programs.insert(key, program.clone());
        Ok((program, true))
    }

    /// Deletes every program that uses one of `retired`. Returns the deleted programs.
    pub(crate) fn retire(&mut self, gl: &mut dyn GlBackend, retired: &[ShaderId]) -> Vec<GlProgram> {
        let mut deleted = Vec::new();
        self.programs.retain(|(vs, ps), linked| {
            if retired.contains(vs) || retired.contains(ps) {
                gl.delete_program(linked.program);
                deleted.push(linked.program);
                false
            } else {
                true
            }
        });
        deleted
    }

    pub(crate) fn clear(&mut self, gl: &mut dyn GlBackend) {
        for (_, linked) in self.programs.drain() {
            gl.delete_program(linked.program);
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.programs.len(),
        }
    }
}

fn link(gl: &mut dyn GlBackend, limits: &BackendLimits, vs: &VertexShader, ps: &PixelShader) -> Result<LinkedProgram> {
    let stages: [&ShaderReflection; 2] = [vs.reflection(), ps.reflection()];

    let unit_count: usize = stages.iter().map(|r| r.combinations.len()).sum();
    if unit_count as u32 > limits.max_combined_texture_image_units {
        return Err(D3dError::unsupported(format!(
            "program needs {unit_count} texture units but the backend has {}",
            limits.max_combined_texture_image_units
        )));
    }

    let (vs_handle, ps_handle) = (vs.gl_handle()?, ps.gl_handle()?);
    let program = gl.create_program()?;
    gl.attach_shader(program, vs_handle);
    gl.attach_shader(program, ps_handle);
    if let Err(log) = gl.link_program(program) {
        gl.delete_program(program);
        return Err(D3dError::ProgramLink { log });
    }
    gl.use_program(Some(program));

    let mut blocks: [Vec<BlockBinding>; 2] = Default::default();
    for reflection in stages {
        for cb in &reflection.constant_buffers {
            let Some(index) = gl.uniform_block_index(program, &cb.block_name) else {
                debug!(block = %cb.block_name, "uniform block optimized out");
                continue;
            };
            let binding = uniform_binding(reflection.stage, cb.register);
            gl.uniform_block_binding(program, index, binding);
            blocks[stage_index(reflection.stage)].push(BlockBinding {
                register: cb.register,
                binding,
                size_bytes: cb.size_bytes,
            });
        }
    }

    // Units are handed out in stage order, vertex combinations first.
    let mut units: [Vec<TextureUnit>; 2] = Default::default();
    let mut next_unit = 0u32;
    for reflection in stages {
        for combo in &reflection.combinations {
            let unit = next_unit;
            next_unit += 1;
            if let Some(location) = gl.uniform_location(program, &combo.name) {
                gl.uniform_1_i32(location, unit as i32);
            }
            units[stage_index(reflection.stage)].push(TextureUnit {
                unit,
                texture_register: combo.texture_register,
                sampler_register: combo.sampler_register,
                target: texture_target(combo.texture_type),
            });
        }
    }

    debug!(
        ?program,
        vs = ?vs.id(),
        ps = ?ps.id(),
        blocks = blocks[0].len() + blocks[1].len(),
        texture_units = next_unit,
        "linked program"
    );
    Ok(LinkedProgram {
        program,
        blocks,
        units,
    })
}
