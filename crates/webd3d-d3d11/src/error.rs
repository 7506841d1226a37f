use thiserror::Error;
use webd3d_hlsl::{HlslError, ShaderStage};

use crate::backend::BackendError;

/// Errors returned by device and context calls.
///
/// Creation calls validate everything before touching the backend, so an `Err` from a `create_*`
/// call never leaves a partially built object behind.
#[derive(Debug, Error)]
pub enum D3dError {
    #[error("invalid description: {0}")]
    InvalidDesc(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("shader translation failed: {0}")]
    Shader(#[from] HlslError),
    #[error("{stage:?} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("program failed to link:\n{log}")]
    ProgramLink { log: String },
    #[error("Release called on an object whose reference count is already zero")]
    AlreadyReleased,
    #[error("{0} was used after its final Release")]
    UseAfterRelease(&'static str),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("draw requires a bound {0:?} shader")]
    MissingShader(ShaderStage),
    #[error("draw requires a bound input layout")]
    MissingInputLayout,
    #[error("indexed draw requires a bound index buffer")]
    MissingIndexBuffer,
    #[error("input layout reads vertex buffer slot {0}, which is not bound")]
    MissingVertexBuffer(u32),
    #[error("draw requires a bound render target or depth-stencil view")]
    NoRenderTarget,
    #[error("draw requires a viewport")]
    NoViewport,
    #[error("primitive topology {0} is not supported")]
    UnsupportedTopology(String),
    #[error("framebuffer is incomplete (status 0x{0:04x})")]
    IncompleteFramebuffer(u32),
    #[error("constant buffer in slot {slot} is {actual} bytes but the shader reads {required}")]
    ConstantBufferTooSmall { slot: u32, actual: u32, required: u32 },
}

impl D3dError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        D3dError::InvalidDesc(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        D3dError::Unsupported(msg.into())
    }
}

pub type Result<T, E = D3dError> = std::result::Result<T, E>;
