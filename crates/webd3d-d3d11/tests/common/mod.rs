//! Shared setup for the device/context integration tests.
#![allow(dead_code)]

use std::sync::Once;

use webd3d_d3d11::{
    create_device, BindFlags, Buffer, BufferDesc, Device, DeviceConfig, DeviceContext, Format,
    InputElementDesc, InputLayout, PixelShader, PrimitiveTopology, RenderTargetView,
    SamplerDesc, SamplerState, ShaderResourceView, SubresourceData, Texture2D, Texture2DDesc,
    TraceBackend, TraceLog, VertexShader, Viewport,
};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// A device on a fresh recording backend. Creation calls are cleared from the log.
pub fn device() -> (Device, DeviceContext, TraceLog) {
    device_with(DeviceConfig::default())
}

pub fn device_with(config: DeviceConfig) -> (Device, DeviceContext, TraceLog) {
    init_tracing();
    let (backend, log) = TraceBackend::new();
    let (device, context) = create_device(backend, config).expect("create device");
    log.clear();
    (device, context, log)
}

pub const TEXTURED_VS: &str = r#"
struct VSOut {
    float4 pos : SV_Position;
    float2 uv : TEXCOORD0;
};

cbuffer Transform : register(b0) {
    float4x4 wvp;
};

VSOut main(float3 pos : POSITION, float2 uv : TEXCOORD0) {
    VSOut o = (VSOut)0;
    o.pos = mul(float4(pos, 1.0f), wvp);
    o.uv = uv;
    return o;
}
"#;

pub const TEXTURED_PS: &str = r#"
struct VSOut {
    float4 pos : SV_Position;
    float2 uv : TEXCOORD0;
};

Texture2D albedo : register(t0);
SamplerState linearSampler : register(s0);

float4 main(VSOut i) : SV_Target {
    return albedo.Sample(linearSampler, i.uv);
}
"#;

pub const SOLID_PS: &str = "float4 main() : SV_Target { return float4(1, 0, 0, 1); }";

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
}

pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub fn rgba_texture(device: &Device, width: u32, height: u32, bind_flags: BindFlags) -> Texture2D {
    let texels = vec![0xFFu8; (width * height * 4) as usize];
    let mut desc = Texture2DDesc {
        width,
        height,
        format: Format::R8G8B8A8Unorm,
        bind_flags,
        ..Default::default()
    };
    device
        .create_texture2d(&mut desc, Some(&[SubresourceData::with_pitch(&texels, width * 4, 0)]))
        .expect("create texture")
}

pub fn render_target(device: &Device, width: u32, height: u32) -> (Texture2D, RenderTargetView) {
    let mut desc = Texture2DDesc {
        width,
        height,
        format: Format::R8G8B8A8Unorm,
        bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
        ..Default::default()
    };
    let texture = device.create_texture2d(&mut desc, None).expect("create render target");
    let view = device
        .create_render_target_view(&texture, None)
        .expect("create render target view");
    (texture, view)
}

/// A textured triangle drawn into a 64x32 render target, with every stage bound.
pub struct Scene {
    pub device: Device,
    pub context: DeviceContext,
    pub log: TraceLog,
    pub vs: VertexShader,
    pub ps: PixelShader,
    pub layout: InputLayout,
    pub vertices: Buffer,
    pub transform: Buffer,
    pub texture: Texture2D,
    pub srv: ShaderResourceView,
    pub sampler: SamplerState,
    pub target: Texture2D,
    pub rtv: RenderTargetView,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(DeviceConfig::default())
    }

    pub fn with_config(config: DeviceConfig) -> Self {
        let (device, mut context, log) = device_with(config);
        let vs = device.create_vertex_shader(TEXTURED_VS).expect("vertex shader");
        let ps = device.create_pixel_shader(TEXTURED_PS).expect("pixel shader");
        let layout = device
            .create_input_layout(
                &[
                    InputElementDesc::per_vertex("POSITION", 0, Format::R32G32B32Float, 0),
                    InputElementDesc::per_vertex("TEXCOORD", 0, Format::R32G32Float, 0),
                ],
                &vs,
            )
            .expect("input layout");

        let triangle = [
            Vertex { pos: [0.0, 0.5, 0.0], uv: [0.5, 0.0] },
            Vertex { pos: [0.5, -0.5, 0.0], uv: [1.0, 1.0] },
            Vertex { pos: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
            Vertex { pos: [0.0, 0.0, 0.0], uv: [0.5, 0.5] },
            Vertex { pos: [1.0, 0.0, 0.0], uv: [1.0, 0.5] },
        ];
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&triangle);
        let vertices = device
            .create_buffer(
                &BufferDesc {
                    byte_width: vertex_bytes.len() as u32,
                    bind_flags: BindFlags::VERTEX_BUFFER,
                    ..Default::default()
                },
                Some(&SubresourceData::new(vertex_bytes)),
            )
            .expect("vertex buffer");
        let transform = device
            .create_buffer(
                &BufferDesc {
                    byte_width: 64,
                    bind_flags: BindFlags::CONSTANT_BUFFER,
                    ..Default::default()
                },
                Some(&SubresourceData::new(bytemuck::cast_slice(&IDENTITY))),
            )
            .expect("constant buffer");

        let texture = rgba_texture(&device, 4, 4, BindFlags::SHADER_RESOURCE);
        let srv = device
            .create_shader_resource_view(&texture, None)
            .expect("shader resource view");
        let sampler = device
            .create_sampler_state(&SamplerDesc::default())
            .expect("sampler");
        let (target, rtv) = render_target(&device, 64, 32);

        context.ia_set_input_layout(Some(&layout));
        context.ia_set_vertex_buffers(0, &[Some(&vertices)], &[VERTEX_STRIDE], &[0]);
        context.ia_set_primitive_topology(PrimitiveTopology::TriangleList);
        context.vs_set_shader(Some(&vs));
        context.vs_set_constant_buffers(0, &[Some(&transform)]);
        context.ps_set_shader(Some(&ps));
        context.ps_set_shader_resources(0, &[Some(&srv)]);
        context.ps_set_samplers(0, &[Some(&sampler)]);
        context.rs_set_viewports(&[Viewport::new(64.0, 32.0)]);
        context.om_set_render_targets(&[Some(&rtv)], None);
        log.clear();

        Self {
            device,
            context,
            log,
            vs,
            ps,
            layout,
            vertices,
            transform,
            texture,
            srv,
            sampler,
            target,
            rtv,
        }
    }
}
