//! Direct3D 11-style device and immediate context on a WebGL2-class backend.
//!
//! The crate has four layers:
//! 1. **Descriptions and formats** (`desc`, `format`): the native API's creation structs,
//!    enums and flags, plus the format table mapping each `Format` onto backend texture formats.
//! 2. **Objects** (`object`, `resource`, `view`, `state`, `shader`): reference-counted handles
//!    created by [`Device`], each wrapping backend objects.
//! 3. **The context** (`context`): pending pipeline state, resolved into backend calls at draw
//!    time.
//! 4. **The backend seam** (`backend`): the [`GlBackend`] trait and a recording implementation
//!    used by tests.

#![deny(unsafe_code)]

pub mod backend;
pub mod binding_model;
pub mod config;
pub mod context;
pub mod desc;
pub mod device;
pub mod error;
pub mod format;
pub mod gl;
pub mod object;
pub mod resource;
pub mod shader;
pub mod state;
pub mod topology;
pub mod view;

pub use backend::{BackendError, BackendLimits, GlBackend, GlCall, TraceBackend, TraceLog};
pub use config::DeviceConfig;
pub use context::{CacheStats, DeviceContext, DirtyFlags};
pub use desc::*;
pub use device::{create_device, Device};
pub use error::{D3dError, Result};
pub use format::{ComponentKind, Format, FormatInfo};
pub use object::Unknown;
pub use resource::{Buffer, Resource, Texture1D, Texture2D, Texture3D, MAX_CONSTANT_BUFFER_BYTES};
pub use shader::{PixelShader, ShaderId, VertexShader};
pub use state::{BlendState, DepthStencilState, InputLayout, RasterizerState, SamplerState};
pub use view::{DepthStencilView, RenderTargetView, ShaderResourceView};
pub use webd3d_hlsl::ShaderStage;
