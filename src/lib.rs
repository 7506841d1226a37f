//! Facade over the workspace crates.
//!
//! [`hlsl`] cross-compiles the HLSL subset to GLSL ES 3.00 and reflects its binding surface.
//! [`d3d11`] is the device and immediate context built on top of it.

pub use webd3d_d3d11 as d3d11;
pub use webd3d_hlsl as hlsl;

pub use webd3d_d3d11::{create_device, D3dError, Device, DeviceConfig, DeviceContext};
