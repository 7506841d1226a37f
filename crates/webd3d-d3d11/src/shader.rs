//! Vertex and pixel shaders.

use std::rc::Rc;

use tracing::debug;
use webd3d_hlsl::{ShaderReflection, ShaderStage};

use crate::backend::GlShader;
use crate::binding_model::uniform_binding;
use crate::device::Device;
use crate::error::{D3dError, Result};
use crate::gl;
use crate::object::{impl_unknown, RefCount};

/// Identifies a shader for the program cache. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

pub(crate) struct ShaderInner {
    pub(crate) refs: RefCount,
    device: Device,
    pub(crate) id: ShaderId,
    handle: GlShader,
    glsl: String,
    pub(crate) reflection: ShaderReflection,
}

impl ShaderInner {
    fn destroy(&self) {
        self.device.gl().delete_shader(self.handle);
        self.device.retire_shader(self.id);
        self.device.release_child_ref();
    }
}

macro_rules! shader_handle {
    ($name:ident, $what:literal) => {
        #[derive(Clone)]
        pub struct $name(pub(crate) Rc<ShaderInner>);

        impl_unknown!($name, $what);

        impl $name {
            pub fn id(&self) -> ShaderId {
                self.0.id
            }

            /// Binding surface produced by the cross-compiler.
            pub fn reflection(&self) -> &ShaderReflection {
                &self.0.reflection
            }

            /// The generated GLSL source.
            pub fn glsl(&self) -> &str {
                &self.0.glsl
            }

            pub(crate) fn gl_handle(&self) -> Result<GlShader> {
                self.0.refs.ensure_alive($what)?;
                Ok(self.0.handle)
            }

            fn destroy(&self) {
                self.0.destroy();
            }
        }
    };
}

shader_handle!(VertexShader, "VertexShader");
shader_handle!(PixelShader, "PixelShader");

impl Device {
    pub fn create_vertex_shader(&self, source: &str) -> Result<VertexShader> {
        self.create_shader(source, ShaderStage::Vertex).map(VertexShader)
    }

    pub fn create_pixel_shader(&self, source: &str) -> Result<PixelShader> {
        self.create_shader(source, ShaderStage::Pixel).map(PixelShader)
    }

    fn create_shader(&self, source: &str, stage: ShaderStage) -> Result<Rc<ShaderInner>> {
        self.ensure_alive()?;
        let compiled = webd3d_hlsl::compile(source, stage)?;
        self.check_shader_limits(&compiled.reflection)?;
        if self.config().log_shader_source {
            debug!(?stage, glsl = %compiled.glsl, "generated GLSL");
        }

        let kind = match stage {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Pixel => gl::FRAGMENT_SHADER,
        };
        let handle = {
            let mut gl = self.gl();
            let handle = gl.create_shader(kind)?;
            if let Err(log) = gl.compile_shader(handle, &compiled.glsl) {
                gl.delete_shader(handle);
                return Err(D3dError::ShaderCompile { stage, log });
            }
            handle
        };
        self.add_child_ref()?;
        let id = self.next_shader_id();
        debug!(?stage, ?id, shader = ?handle, "created shader");
        Ok(Rc::new(ShaderInner {
            refs: RefCount::new(),
            device: self.clone(),
            id,
            handle,
            glsl: compiled.glsl,
            reflection: compiled.reflection,
        }))
    }

    /// Rejects shaders whose bindings cannot fit the backend.
    fn check_shader_limits(&self, reflection: &ShaderReflection) -> Result<()> {
        let limits = self.limits();
        for cb in &reflection.constant_buffers {
            let binding = uniform_binding(reflection.stage, cb.register);
            if binding >= limits.max_uniform_buffer_bindings {
                return Err(D3dError::unsupported(format!(
                    "constant buffer {} (b{}) needs uniform binding {binding} but the backend has {}",
                    cb.name, cb.register, limits.max_uniform_buffer_bindings
                )));
            }
        }
        if reflection.combinations.len() as u32 > limits.max_combined_texture_image_units {
            return Err(D3dError::unsupported(format!(
                "{} texture/sampler combinations exceed the backend's {} texture units",
                reflection.combinations.len(),
                limits.max_combined_texture_image_units
            )));
        }
        if reflection.inputs.len() as u32 > limits.max_vertex_attribs {
            return Err(D3dError::unsupported(format!(
                "{} vertex inputs exceed the backend's {} attributes",
                reflection.inputs.len(),
                limits.max_vertex_attribs
            )));
        }
        if let Some(&target) = reflection.render_targets.iter().max() {
            if target >= limits.max_draw_buffers {
                return Err(D3dError::unsupported(format!(
                    "SV_Target{target} exceeds the backend's {} draw buffers",
                    limits.max_draw_buffers
                )));
            }
        }
        Ok(())
    }
}
