use bitflags::bitflags;

bitflags! {
    /// Pipeline stages whose pending state has not been pushed to the backend yet.
    ///
    /// Set calls raise the matching flag; the resolution step at draw time clears it. The
    /// device also raises flags when a creation or upload call changed backend bindings the
    /// context relies on.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        const INPUT_ASSEMBLER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const SHADERS = 1 << 2;
        const VS_CONSTANT_BUFFERS = 1 << 3;
        const PS_CONSTANT_BUFFERS = 1 << 4;
        const VS_SHADER_RESOURCES = 1 << 5;
        const PS_SHADER_RESOURCES = 1 << 6;
        const RASTERIZER = 1 << 7;
        const VIEWPORT = 1 << 8;
        const DEPTH_STENCIL = 1 << 9;
        const BLEND = 1 << 10;
        const RENDER_TARGETS = 1 << 11;

        const CONSTANT_BUFFERS = Self::VS_CONSTANT_BUFFERS.bits() | Self::PS_CONSTANT_BUFFERS.bits();
        const SHADER_RESOURCES = Self::VS_SHADER_RESOURCES.bits() | Self::PS_SHADER_RESOURCES.bits();
    }
}
