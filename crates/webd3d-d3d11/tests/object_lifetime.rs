mod common;

use common::{device, Scene};
use pretty_assertions::assert_eq;
use webd3d_d3d11::{BindFlags, BufferDesc, D3dError, GlCall, Unknown};

#[test]
fn add_ref_and_release_track_the_count() -> anyhow::Result<()> {
    let (device, _context, log) = device();
    let buffer = device.create_buffer(
        &BufferDesc {
            byte_width: 16,
            bind_flags: BindFlags::VERTEX_BUFFER,
            ..Default::default()
        },
        None,
    )?;
    assert_eq!(buffer.ref_count(), 1);
    assert_eq!(log.live("buffer"), 1);

    assert_eq!(buffer.add_ref()?, 2);
    assert_eq!(buffer.release()?, 1);
    assert_eq!(log.count(|c| matches!(c, GlCall::DeleteBuffer(_))), 0);

    assert_eq!(buffer.release()?, 0);
    assert_eq!(log.count(|c| matches!(c, GlCall::DeleteBuffer(_))), 1);
    assert_eq!(log.live("buffer"), 0);
    Ok(())
}

#[test]
fn releasing_past_zero_is_an_error() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let buffer = device.create_buffer(
        &BufferDesc {
            byte_width: 16,
            bind_flags: BindFlags::VERTEX_BUFFER,
            ..Default::default()
        },
        None,
    )?;
    buffer.release()?;
    assert!(matches!(buffer.release(), Err(D3dError::AlreadyReleased)));
    assert!(matches!(buffer.add_ref(), Err(D3dError::UseAfterRelease("Buffer"))));
    Ok(())
}

#[test]
fn children_hold_a_device_reference() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    assert_eq!(device.ref_count(), 1);
    let shader = device.create_pixel_shader(common::SOLID_PS)?;
    assert_eq!(device.ref_count(), 2);
    shader.release()?;
    assert_eq!(device.ref_count(), 1);
    Ok(())
}

#[test]
fn views_keep_their_resource_alive() -> anyhow::Result<()> {
    let (device, _context, log) = device();
    let texture = common::rgba_texture(&device, 4, 4, BindFlags::SHADER_RESOURCE);
    let view = device.create_shader_resource_view(&texture, None)?;
    assert_eq!(texture.ref_count(), 2);

    assert_eq!(texture.release()?, 1);
    assert_eq!(log.live("texture"), 1);

    assert_eq!(view.release()?, 0);
    assert_eq!(texture.ref_count(), 0);
    assert_eq!(log.live("texture"), 0);
    Ok(())
}

#[test]
fn drawing_with_a_released_view_fails() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.srv.release()?;

    let err = scene.context.draw(3, 0).unwrap_err();
    assert!(matches!(err, D3dError::UseAfterRelease("ShaderResourceView")), "{err}");
    assert_eq!(scene.log.count(GlCall::is_draw), 0);
    Ok(())
}

#[test]
fn releasing_a_bound_shader_retires_its_programs() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.context.draw(3, 0)?;
    assert_eq!(scene.log.live("program"), 1);

    scene.ps.release()?;
    let err = scene.context.draw(3, 0).unwrap_err();
    assert!(matches!(err, D3dError::UseAfterRelease("PixelShader")), "{err}");
    assert_eq!(scene.log.count(|c| matches!(c, GlCall::DeleteProgram(_))), 1);
    assert_eq!(scene.log.live("program"), 0);
    Ok(())
}

#[test]
fn releasing_an_unbound_shader_retires_only_its_programs() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.context.draw(3, 0)?;
    let solid = scene.device.create_pixel_shader(common::SOLID_PS)?;
    scene.context.ps_set_shader(Some(&solid));
    scene.context.draw(3, 0)?;
    assert_eq!(scene.log.live("program"), 2);

    scene.ps.release()?;
    scene.context.draw(3, 0)?;
    assert_eq!(scene.log.live("program"), 1);
    assert_eq!(scene.context.program_cache_stats().entries, 1);
    Ok(())
}
