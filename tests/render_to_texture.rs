//! Two passes through the public facade: render into a texture, then sample it.

use std::sync::Once;

use pretty_assertions::assert_eq;
use webd3d::d3d11::gl;
use webd3d::d3d11::{
    BindFlags, Blend, BlendDesc, BufferDesc, ClearFlags, DepthStencilDesc, Format, GlCall,
    InputElementDesc, PrimitiveTopology, RenderTargetBlendDesc, SamplerDesc, SubresourceData,
    Texture2DDesc, TraceBackend, Viewport,
};
use webd3d::hlsl::{self, ShaderStage};
use webd3d::{create_device, DeviceConfig};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

const QUAD_VS: &str = r#"
struct VSOut {
    float4 pos : SV_Position;
    float2 uv : TEXCOORD0;
};

VSOut main(float2 pos : POSITION) {
    VSOut o = (VSOut)0;
    o.pos = float4(pos, 0.0f, 1.0f);
    o.uv = pos;
    return o;
}
"#;

const FILL_PS: &str = r#"
cbuffer Fill : register(b1) {
    float4 color;
};

float4 main() : SV_Target {
    return color;
}
"#;

const COPY_PS: &str = r#"
struct VSOut {
    float4 pos : SV_Position;
    float2 uv : TEXCOORD0;
};

Texture2D source : register(t2);
SamplerState pointSampler : register(s1);

float4 main(VSOut i) : SV_Target {
    return source.Sample(pointSampler, i.uv);
}
"#;

#[test]
fn shader_reflection_names_the_bindings() -> anyhow::Result<()> {
    let compiled = hlsl::compile(COPY_PS, ShaderStage::Pixel)?;
    assert_eq!(compiled.reflection.combinations.len(), 1);
    let combo = &compiled.reflection.combinations[0];
    assert_eq!((combo.texture_register, combo.sampler_register), (2, 1));
    assert!(compiled.glsl.contains(&format!("uniform sampler2D {};", combo.name)));
    Ok(())
}

#[test]
fn render_then_sample() -> anyhow::Result<()> {
    init_tracing();
    let (backend, log) = TraceBackend::new();
    let (device, mut context) = create_device(backend, DeviceConfig::default())?;

    let vs = device.create_vertex_shader(QUAD_VS)?;
    let fill = device.create_pixel_shader(FILL_PS)?;
    let copy = device.create_pixel_shader(COPY_PS)?;
    let layout = device.create_input_layout(
        &[InputElementDesc::per_vertex("POSITION", 0, Format::R32G32Float, 0)],
        &vs,
    )?;
    let quad: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
    let vertices = device.create_buffer(
        &BufferDesc {
            byte_width: std::mem::size_of_val(&quad) as u32,
            bind_flags: BindFlags::VERTEX_BUFFER,
            ..Default::default()
        },
        Some(&SubresourceData::new(bytemuck::cast_slice(&quad))),
    )?;
    let color: [f32; 4] = [0.0, 0.5, 1.0, 0.5];
    let constants = device.create_buffer(
        &BufferDesc {
            byte_width: 16,
            bind_flags: BindFlags::CONSTANT_BUFFER,
            ..Default::default()
        },
        Some(&SubresourceData::new(bytemuck::cast_slice(&color))),
    )?;

    let mut offscreen_desc = Texture2DDesc {
        width: 128,
        height: 128,
        format: Format::R8G8B8A8Unorm,
        bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
        ..Default::default()
    };
    let offscreen = device.create_texture2d(&mut offscreen_desc, None)?;
    let offscreen_rtv = device.create_render_target_view(&offscreen, None)?;
    let offscreen_srv = device.create_shader_resource_view(&offscreen, None)?;
    let mut depth_desc = Texture2DDesc {
        width: 128,
        height: 128,
        format: Format::D24UnormS8Uint,
        bind_flags: BindFlags::DEPTH_STENCIL,
        ..Default::default()
    };
    let depth = device.create_texture2d(&mut depth_desc, None)?;
    let dsv = device.create_depth_stencil_view(&depth, None)?;

    let mut back_desc = Texture2DDesc {
        width: 256,
        height: 64,
        format: Format::R8G8B8A8Unorm,
        bind_flags: BindFlags::RENDER_TARGET,
        ..Default::default()
    };
    let back = device.create_texture2d(&mut back_desc, None)?;
    let back_rtv = device.create_render_target_view(&back, None)?;

    let depth_state = device.create_depth_stencil_state(&DepthStencilDesc::default())?;
    let mut blend_desc = BlendDesc::default();
    blend_desc.render_target[0] = RenderTargetBlendDesc {
        blend_enable: true,
        src_blend: Blend::SrcAlpha,
        dest_blend: Blend::InvSrcAlpha,
        ..Default::default()
    };
    let blend = device.create_blend_state(&blend_desc)?;
    let sampler = device.create_sampler_state(&SamplerDesc::default())?;
    log.clear();

    // Pass 1: fill the offscreen target.
    context.ia_set_input_layout(Some(&layout));
    context.ia_set_vertex_buffers(0, &[Some(&vertices)], &[8], &[0]);
    context.ia_set_primitive_topology(PrimitiveTopology::TriangleStrip);
    context.vs_set_shader(Some(&vs));
    context.ps_set_shader(Some(&fill));
    context.ps_set_constant_buffers(1, &[Some(&constants)]);
    context.om_set_render_targets(&[Some(&offscreen_rtv)], Some(&dsv));
    context.om_set_depth_stencil_state(Some(&depth_state), 0);
    context.om_set_blend_state(Some(&blend), None, u32::MAX);
    context.rs_set_viewports(&[Viewport::new(128.0, 128.0)]);
    context.clear_render_target_view(&offscreen_rtv, [0.0, 0.0, 0.0, 1.0])?;
    context.clear_depth_stencil_view(&dsv, ClearFlags::DEPTH, 1.0, 0)?;
    context.draw(4, 0)?;

    let pass1 = log.take();
    assert!(pass1.contains(&GlCall::Enable(gl::DEPTH_TEST)));
    assert!(pass1.contains(&GlCall::DepthFunc(gl::LESS)));
    assert!(pass1.contains(&GlCall::BlendFuncSeparate {
        src_rgb: gl::SRC_ALPHA,
        dst_rgb: gl::ONE_MINUS_SRC_ALPHA,
        src_alpha: gl::ONE,
        dst_alpha: gl::ZERO,
    }));
    assert!(pass1.iter().any(|c| matches!(
        c,
        GlCall::BindBufferBase { target: gl::UNIFORM_BUFFER, buffer: Some(_), .. }
    )));
    assert_eq!(
        pass1.last(),
        Some(&GlCall::DrawArrays {
            mode: gl::TRIANGLE_STRIP,
            first: 0,
            count: 4,
            instances: 1,
        })
    );

    // Pass 2: sample it into the wide back buffer.
    context.om_set_render_targets(&[Some(&back_rtv)], None);
    context.om_set_depth_stencil_state(None, 0);
    context.om_set_blend_state(None, None, u32::MAX);
    context.rs_set_viewports(&[Viewport::new(256.0, 64.0)]);
    context.ps_set_shader(Some(&copy));
    context.ps_set_shader_resources(2, &[Some(&offscreen_srv)]);
    context.ps_set_samplers(1, &[Some(&sampler)]);
    context.draw(4, 0)?;

    let pass2 = log.take();
    assert!(pass2.contains(&GlCall::Viewport { x: 0, y: 0, width: 256, height: 64 }));
    assert!(pass2.contains(&GlCall::Disable(gl::BLEND)));
    assert!(pass2.iter().any(|c| matches!(
        c,
        GlCall::FramebufferTexture2D { attachment: gl::DEPTH_STENCIL_ATTACHMENT, texture: None, .. }
    )));
    assert!(pass2.iter().any(|c| matches!(
        c,
        GlCall::BindTexture { target: gl::TEXTURE_2D, texture: Some(_) }
    )));
    assert_eq!(pass2.iter().filter(|c| c.is_draw()).count(), 1);

    let stats = context.program_cache_stats();
    assert_eq!((stats.misses, stats.entries), (2, 2));
    Ok(())
}
