mod common;

use common::Scene;
use pretty_assertions::assert_eq;
use webd3d_d3d11::gl;
use webd3d_d3d11::{BindFlags, ClearFlags, DepthStencilView, Device, Format, GlCall, Texture2DDesc};

fn depth_view(device: &Device, format: Format) -> DepthStencilView {
    let mut desc = Texture2DDesc {
        width: 64,
        height: 32,
        format,
        bind_flags: BindFlags::DEPTH_STENCIL,
        ..Default::default()
    };
    let texture = device.create_texture2d(&mut desc, None).expect("depth texture");
    device
        .create_depth_stencil_view(&texture, None)
        .expect("depth-stencil view")
}

#[test]
fn clear_render_target_writes_the_color() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.context.clear_render_target_view(&scene.rtv, [0.25, 0.5, 0.75, 1.0])?;

    let calls = scene.log.calls();
    assert!(calls.contains(&GlCall::Disable(gl::SCISSOR_TEST)));
    assert!(calls.contains(&GlCall::ColorMask([true; 4])));
    assert!(calls.contains(&GlCall::ClearBufferFv {
        buffer: gl::COLOR,
        draw_buffer: 0,
        values: vec![0.25, 0.5, 0.75, 1.0],
    }));
    assert!(
        calls.iter().all(|c| !c.is_draw()),
        "clears never go through draw resolution"
    );
    Ok(())
}

#[test]
fn draw_after_clear_rebinds_the_draw_framebuffer() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.context.draw(3, 0)?;
    scene.context.clear_render_target_view(&scene.rtv, [0.0; 4])?;
    scene.log.clear();

    scene.context.draw(3, 0)?;
    let calls = scene.log.calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, GlCall::BindFramebuffer { target: gl::FRAMEBUFFER, framebuffer: Some(_) }))
            .count(),
        1
    );
    // The clear framebuffer is separate, so the draw framebuffer keeps its attachments.
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, GlCall::FramebufferTexture2D { .. }))
            .count(),
        0
    );
    assert!(calls.contains(&GlCall::Disable(gl::SCISSOR_TEST)));
    Ok(())
}

#[test]
fn integer_targets_clear_with_integer_values() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let mut desc = Texture2DDesc {
        width: 4,
        height: 4,
        format: Format::R8G8B8A8Uint,
        bind_flags: BindFlags::RENDER_TARGET,
        ..Default::default()
    };
    let texture = scene.device.create_texture2d(&mut desc, None)?;
    let view = scene.device.create_render_target_view(&texture, None)?;
    scene.log.clear();

    scene.context.clear_render_target_view(&view, [1.0, 2.0, 3.0, 255.0])?;
    assert!(scene.log.calls().contains(&GlCall::ClearBufferUiv {
        buffer: gl::COLOR,
        draw_buffer: 0,
        values: vec![1, 2, 3, 255],
    }));
    Ok(())
}

#[test]
fn depth_and_stencil_clear_together() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let view = depth_view(&scene.device, Format::D24UnormS8Uint);
    scene.log.clear();

    scene
        .context
        .clear_depth_stencil_view(&view, ClearFlags::DEPTH | ClearFlags::STENCIL, 1.5, 7)?;
    let calls = scene.log.calls();
    assert!(calls.contains(&GlCall::DepthMask(true)));
    assert!(calls.contains(&GlCall::ClearBufferFi {
        buffer: gl::DEPTH_STENCIL,
        draw_buffer: 0,
        depth: 1.0,
        stencil: 7,
    }));
    Ok(())
}

#[test]
fn stencil_clear_on_depth_only_format_is_a_no_op() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let view = depth_view(&scene.device, Format::D32Float);
    scene.log.clear();

    scene.context.clear_depth_stencil_view(&view, ClearFlags::STENCIL, 1.0, 3)?;
    assert_eq!(scene.log.calls(), vec![]);

    scene.context.clear_depth_stencil_view(&view, ClearFlags::DEPTH, 0.5, 0)?;
    assert!(scene.log.calls().contains(&GlCall::ClearBufferFv {
        buffer: gl::DEPTH,
        draw_buffer: 0,
        values: vec![0.5],
    }));
    Ok(())
}

#[test]
fn depth_view_alone_is_a_valid_target() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let view = depth_view(&scene.device, Format::D24UnormS8Uint);
    scene.context.om_set_render_targets(&[], Some(&view));
    scene.log.clear();

    scene.context.draw(3, 0)?;
    let calls = scene.log.calls();
    assert!(calls.contains(&GlCall::DrawBuffers(vec![gl::NONE])));
    assert!(calls.iter().any(|c| matches!(
        c,
        GlCall::FramebufferTexture2D { attachment: gl::DEPTH_STENCIL_ATTACHMENT, texture: Some(_), .. }
    )));
    assert!(calls.contains(&GlCall::Viewport { x: 0, y: 0, width: 64, height: 32 }));
    Ok(())
}
