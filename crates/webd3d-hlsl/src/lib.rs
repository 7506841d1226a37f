//! HLSL-subset to GLSL ES 3.00 cross-compiler.
//!
//! [`compile`] runs the whole pipeline: [`token::tokenize`], [`parser::parse`] (which also
//! resolves registers) and [`glsl::translate`]. The result carries the GLSL text plus a
//! [`ShaderReflection`] describing constant-buffer registers and texture/sampler combinations,
//! which the device context needs to wire backend binding points at draw time.

pub mod ast;
pub mod error;
pub mod glsl;
pub mod limits;
pub mod parser;
pub mod reflection;
pub mod registers;
pub mod token;
pub mod types;

use tracing::debug;

pub use ast::{HlslModule, ShaderStage, TextureType};
pub use error::HlslError;
pub use reflection::{Combination, ConstantBufferReflection, InputAttribute, ShaderReflection};

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub glsl: String,
    pub reflection: ShaderReflection,
}

/// Tokenizes and parses `source` into a semantic model with resolved registers.
pub fn parse(source: &str, stage: ShaderStage) -> Result<HlslModule, HlslError> {
    if source.len() > limits::MAX_SOURCE_BYTES {
        return Err(HlslError::unsupported(
            1,
            format!(
                "source of {} bytes exceeds the {} byte limit",
                source.len(),
                limits::MAX_SOURCE_BYTES
            ),
        ));
    }
    let tokens = token::tokenize(source)?;
    parser::parse(tokens, stage)
}

/// Compiles one HLSL shader for `stage`. There is no partial output: any error aborts the
/// whole compilation.
pub fn compile(source: &str, stage: ShaderStage) -> Result<CompiledShader, HlslError> {
    let module = parse(source, stage)?;
    let (glsl, reflection) = glsl::translate(&module)?;
    debug!(
        ?stage,
        constant_buffers = reflection.constant_buffers.len(),
        combinations = reflection.combinations.len(),
        glsl_bytes = glsl.len(),
        "translated HLSL shader"
    );
    Ok(CompiledShader {
        stage,
        glsl,
        reflection,
    })
}
