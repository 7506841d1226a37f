//! Description records and API enumerations.
//!
//! Descriptions are plain values. Creation calls store their own copy and `desc()` accessors
//! hand out fresh copies, so mutating a description after a call never reaches the created
//! object. `Default` implementations carry the native runtime's documented defaults.

use bitflags::bitflags;

use crate::format::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    #[default]
    Default,
    Immutable,
    Dynamic,
    Staging,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct BindFlags: u32 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const SHADER_RESOURCE = 0x8;
        const STREAM_OUTPUT = 0x10;
        const RENDER_TARGET = 0x20;
        const DEPTH_STENCIL = 0x40;
        const UNORDERED_ACCESS = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct CpuAccessFlags: u32 {
        const WRITE = 0x10000;
        const READ = 0x20000;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ResourceMiscFlags: u32 {
        const GENERATE_MIPS = 0x1;
        const SHARED = 0x2;
        const TEXTURECUBE = 0x4;
        const DRAWINDIRECT_ARGS = 0x10;
        const BUFFER_ALLOW_RAW_VIEWS = 0x20;
        const BUFFER_STRUCTURED = 0x40;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u32 {
        const DEPTH = 0x1;
        const STENCIL = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ColorWriteEnable: u8 {
        const RED = 0x1;
        const GREEN = 0x2;
        const BLUE = 0x4;
        const ALPHA = 0x8;
        const ALL = 0xF;
    }
}

impl Default for ColorWriteEnable {
    fn default() -> Self {
        ColorWriteEnable::ALL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferDesc {
    pub byte_width: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: ResourceMiscFlags,
    pub structure_byte_stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDesc {
    pub count: u32,
    pub quality: u32,
}

impl Default for SampleDesc {
    fn default() -> Self {
        Self {
            count: 1,
            quality: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture1DDesc {
    pub width: u32,
    /// `0` requests the full mip chain; creation writes the resolved count back.
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: Format,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: ResourceMiscFlags,
}

impl Default for Texture1DDesc {
    fn default() -> Self {
        Self {
            width: 0,
            mip_levels: 1,
            array_size: 1,
            format: Format::Unknown,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: ResourceMiscFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2DDesc {
    pub width: u32,
    pub height: u32,
    /// `0` requests the full mip chain; creation writes the resolved count back.
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: Format,
    pub sample_desc: SampleDesc,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: ResourceMiscFlags,
}

impl Default for Texture2DDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            mip_levels: 1,
            array_size: 1,
            format: Format::Unknown,
            sample_desc: SampleDesc::default(),
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: ResourceMiscFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture3DDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// `0` requests the full mip chain; creation writes the resolved count back.
    pub mip_levels: u32,
    pub format: Format,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access_flags: CpuAccessFlags,
    pub misc_flags: ResourceMiscFlags,
}

impl Default for Texture3DDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            depth: 0,
            mip_levels: 1,
            format: Format::Unknown,
            usage: Usage::Default,
            bind_flags: BindFlags::SHADER_RESOURCE,
            cpu_access_flags: CpuAccessFlags::empty(),
            misc_flags: ResourceMiscFlags::empty(),
        }
    }
}

/// Initial contents of one subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    /// Bytes between rows; ignored for buffers.
    pub row_pitch: u32,
    /// Bytes between depth slices; only read for 3D textures.
    pub slice_pitch: u32,
}

impl<'a> SubresourceData<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            row_pitch: 0,
            slice_pitch: 0,
        }
    }

    pub fn with_pitch(data: &'a [u8], row_pitch: u32, slice_pitch: u32) -> Self {
        Self {
            data,
            row_pitch,
            slice_pitch,
        }
    }
}

/// Destination region of an `update_subresource`. Texel units for textures, bytes for buffers;
/// right/bottom/back are exclusive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DstBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

/// Requests every mip level from the most detailed one down.
pub const ALL_MIPS: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtvDimension {
    Texture1D { mip_slice: u32 },
    Texture1DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
    Texture2D { mip_slice: u32 },
    Texture2DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
    Texture3D { mip_slice: u32, first_w_slice: u32, w_size: u32 },
}

/// `format == Format::Unknown` inherits the resource format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetViewDesc {
    pub format: Format,
    pub dimension: RtvDimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsvDimension {
    Texture1D { mip_slice: u32 },
    Texture1DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
    Texture2D { mip_slice: u32 },
    Texture2DArray { mip_slice: u32, first_array_slice: u32, array_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    pub format: Format,
    pub dimension: DsvDimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrvDimension {
    Texture1D { most_detailed_mip: u32, mip_levels: u32 },
    Texture1DArray { most_detailed_mip: u32, mip_levels: u32, first_array_slice: u32, array_size: u32 },
    Texture2D { most_detailed_mip: u32, mip_levels: u32 },
    Texture2DArray { most_detailed_mip: u32, mip_levels: u32, first_array_slice: u32, array_size: u32 },
    Texture3D { most_detailed_mip: u32, mip_levels: u32 },
    TextureCube { most_detailed_mip: u32, mip_levels: u32 },
}

impl SrvDimension {
    pub fn mip_range(&self) -> (u32, u32) {
        match *self {
            SrvDimension::Texture1D { most_detailed_mip, mip_levels }
            | SrvDimension::Texture1DArray { most_detailed_mip, mip_levels, .. }
            | SrvDimension::Texture2D { most_detailed_mip, mip_levels }
            | SrvDimension::Texture2DArray { most_detailed_mip, mip_levels, .. }
            | SrvDimension::Texture3D { most_detailed_mip, mip_levels }
            | SrvDimension::TextureCube { most_detailed_mip, mip_levels } => (most_detailed_mip, mip_levels),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderResourceViewDesc {
    pub format: Format,
    pub dimension: SrvDimension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    MinMagMipPoint,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinPointMagMipLinear,
    MinLinearMagMipPoint,
    MinLinearMagPointMipLinear,
    MinMagLinearMipPoint,
    #[default]
    MinMagMipLinear,
    Anisotropic,
}

impl Filter {
    /// `(min_linear, mag_linear, mip_linear)`.
    pub fn linear_bits(self) -> (bool, bool, bool) {
        match self {
            Filter::MinMagMipPoint => (false, false, false),
            Filter::MinMagPointMipLinear => (false, false, true),
            Filter::MinPointMagLinearMipPoint => (false, true, false),
            Filter::MinPointMagMipLinear => (false, true, true),
            Filter::MinLinearMagMipPoint => (true, false, false),
            Filter::MinLinearMagPointMipLinear => (true, false, true),
            Filter::MinMagLinearMipPoint => (true, true, false),
            Filter::MinMagMipLinear | Filter::Anisotropic => (true, true, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureAddressMode {
    Wrap,
    Mirror,
    #[default]
    Clamp,
    Border,
    MirrorOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComparisonFunc {
    #[default]
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunc,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::MinMagMipLinear,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            comparison_func: ComparisonFunc::Never,
            border_color: [1.0; 4],
            min_lod: -f32::MAX,
            max_lod: f32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    Wireframe,
    #[default]
    Solid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: false,
            antialiased_line_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthWriteMask {
    Zero,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilOpDesc {
    pub stencil_fail_op: StencilOp,
    pub stencil_depth_fail_op: StencilOp,
    pub stencil_pass_op: StencilOp,
    pub stencil_func: ComparisonFunc,
}

impl Default for DepthStencilOpDesc {
    fn default() -> Self {
        Self {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_func: ComparisonFunc::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: DepthWriteMask,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: DepthStencilOpDesc,
    pub back_face: DepthStencilOpDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: DepthWriteMask::All,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: DepthStencilOpDesc::default(),
            back_face: DepthStencilOpDesc::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
    SrcAlphaSat,
    BlendFactor,
    InvBlendFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: Blend,
    pub dest_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dest_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    pub render_target_write_mask: ColorWriteEnable,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: Blend::One,
            dest_blend: Blend::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dest_blend_alpha: Blend::Zero,
            blend_op_alpha: BlendOp::Add,
            render_target_write_mask: ColorWriteEnable::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_target: [RenderTargetBlendDesc; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputClassification {
    #[default]
    PerVertexData,
    PerInstanceData,
}

/// Packs the element directly after the previous one in the same slot.
pub const APPEND_ALIGNED_ELEMENT: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputElementDesc {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub input_slot_class: InputClassification,
    pub instance_data_step_rate: u32,
}

impl InputElementDesc {
    /// A per-vertex element in `slot`, packed after the previous one.
    pub fn per_vertex(semantic_name: &str, semantic_index: u32, format: Format, slot: u32) -> Self {
        Self {
            semantic_name: semantic_name.to_string(),
            semantic_index,
            format,
            input_slot: slot,
            aligned_byte_offset: APPEND_ALIGNED_ELEMENT,
            input_slot_class: InputClassification::PerVertexData,
            instance_data_step_rate: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Undefined,
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    LineListAdj,
    LineStripAdj,
    TriangleListAdj,
    TriangleStripAdj,
    /// `D3D11_PRIMITIVE_TOPOLOGY_N_CONTROL_POINT_PATCHLIST`.
    ControlPointPatchList(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            max_depth: 1.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapType {
    Read,
    Write,
    ReadWrite,
    WriteDiscard,
    WriteNoOverwrite,
}
