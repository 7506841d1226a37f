mod common;

use common::{device, Scene};
use pretty_assertions::assert_eq;
use webd3d_d3d11::gl;
use webd3d_d3d11::{
    BindFlags, BufferDesc, CpuAccessFlags, D3dError, DstBox, Format, GlCall, MapType,
    ResourceMiscFlags, ShaderResourceViewDesc, SrvDimension, SubresourceData, Texture2DDesc,
    Usage,
};

fn dynamic_vertex_buffer(scene: &Scene, size: u32) -> webd3d_d3d11::Buffer {
    scene
        .device
        .create_buffer(
            &BufferDesc {
                byte_width: size,
                usage: Usage::Dynamic,
                bind_flags: BindFlags::VERTEX_BUFFER,
                cpu_access_flags: CpuAccessFlags::WRITE,
                ..Default::default()
            },
            None,
        )
        .expect("dynamic buffer")
}

#[test]
fn descriptions_are_copied_at_creation() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let mut desc = BufferDesc {
        byte_width: 32,
        bind_flags: BindFlags::VERTEX_BUFFER,
        ..Default::default()
    };
    let buffer = device.create_buffer(&desc, None)?;
    desc.byte_width = 64;
    assert_eq!(buffer.desc().byte_width, 32);
    Ok(())
}

#[test]
fn full_mip_chain_is_written_back() -> anyhow::Result<()> {
    let (device, _context, log) = device();
    let mut desc = Texture2DDesc {
        width: 16,
        height: 8,
        mip_levels: 0,
        format: Format::R8G8B8A8Unorm,
        ..Default::default()
    };
    let texture = device.create_texture2d(&mut desc, None)?;
    assert_eq!(desc.mip_levels, 5);
    assert_eq!(texture.desc().mip_levels, 5);
    assert!(log.calls().iter().any(|c| matches!(
        c,
        GlCall::TexStorage2D { target: gl::TEXTURE_2D, levels: 5, width: 16, height: 8, .. }
    )));
    Ok(())
}

#[test]
fn immutable_texture_requires_initial_data() -> anyhow::Result<()> {
    let (device, _context, log) = device();
    let mut desc = Texture2DDesc {
        width: 256,
        height: 256,
        format: Format::R8G8B8A8Unorm,
        usage: Usage::Immutable,
        ..Default::default()
    };
    match device.create_texture2d(&mut desc, None) {
        Err(D3dError::InvalidDesc(message)) => {
            assert_eq!(message, "immutable textures must have initial data")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("immutable texture created without data"),
    }
    assert_eq!(log.live("texture"), 0);

    let texels = vec![0x80u8; 256 * 256 * 4];
    let texture = device.create_texture2d(&mut desc, Some(&[SubresourceData::with_pitch(&texels, 256 * 4, 0)]))?;
    assert_eq!(texture.desc().usage, Usage::Immutable);
    assert!(log.calls().contains(&GlCall::TexSubImage2D {
        target: gl::TEXTURE_2D,
        level: 0,
        width: 256,
        height: 256,
        format: gl::RGBA,
        ty: gl::UNSIGNED_BYTE,
        len: texels.len(),
    }));
    Ok(())
}

#[test]
fn default_shader_resource_view_covers_every_mip() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let mut desc = Texture2DDesc {
        width: 8,
        height: 8,
        mip_levels: 0,
        format: Format::R8G8B8A8Unorm,
        ..Default::default()
    };
    let texture = device.create_texture2d(&mut desc, None)?;
    let view = device.create_shader_resource_view(&texture, None)?;
    assert_eq!(
        view.desc(),
        ShaderResourceViewDesc {
            format: Format::R8G8B8A8Unorm,
            dimension: SrvDimension::Texture2D {
                most_detailed_mip: 0,
                mip_levels: 4,
            },
        }
    );
    Ok(())
}

#[test]
fn views_need_the_matching_bind_flag() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let texture = common::rgba_texture(&device, 4, 4, BindFlags::SHADER_RESOURCE);
    let err = device.create_render_target_view(&texture, None).unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn update_subresource_replaces_a_constant_buffer() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let bytes: Vec<u8> = bytemuck::cast_slice::<f32, u8>(&common::IDENTITY).to_vec();
    scene.context.update_subresource(&scene.transform, 0, None, &bytes, 0, 0)?;
    assert!(scene.log.calls().contains(&GlCall::BufferSubData {
        target: gl::UNIFORM_BUFFER,
        offset: 0,
        len: 64,
    }));

    let partial = DstBox {
        left: 0,
        right: 16,
        bottom: 1,
        back: 1,
        ..Default::default()
    };
    let err = scene
        .context
        .update_subresource(&scene.transform, 0, Some(&partial), &bytes, 0, 0)
        .unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn update_subresource_rejects_immutable_buffers() -> anyhow::Result<()> {
    let (device, mut context, _log) = device();
    let data = [0u8; 16];
    let buffer = device.create_buffer(
        &BufferDesc {
            byte_width: 16,
            usage: Usage::Immutable,
            bind_flags: BindFlags::VERTEX_BUFFER,
            ..Default::default()
        },
        Some(&SubresourceData::new(&data)),
    )?;
    let err = context.update_subresource(&buffer, 0, None, &data, 0, 0).unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn update_subresource_box_uploads_the_region_and_rebinds_units() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    scene.context.draw(3, 0)?;
    scene.log.clear();

    // Two 2-texel rows out of a 4-texel-wide source.
    let rows = [0xABu8; 16 + 8];
    let region = DstBox {
        left: 1,
        top: 1,
        front: 0,
        right: 3,
        bottom: 3,
        back: 1,
    };
    scene.context.update_subresource(&scene.texture, 0, Some(&region), &rows, 16, 0)?;
    assert!(scene.log.calls().contains(&GlCall::TexSubImage2D {
        target: gl::TEXTURE_2D,
        level: 0,
        width: 2,
        height: 2,
        format: gl::RGBA,
        ty: gl::UNSIGNED_BYTE,
        len: 16,
    }));

    scene.log.clear();
    scene.context.draw(3, 0)?;
    assert_eq!(
        scene.log.count(|c| matches!(c, GlCall::BindTexture { texture: Some(_), .. })),
        1
    );
    Ok(())
}

#[test]
fn empty_box_is_a_no_op() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let empty = DstBox {
        left: 2,
        right: 2,
        bottom: 1,
        back: 1,
        ..Default::default()
    };
    scene.context.update_subresource(&scene.texture, 0, Some(&empty), &[], 0, 0)?;
    assert_eq!(scene.log.calls(), vec![]);
    Ok(())
}

#[test]
fn generate_mips_regenerates_the_chain() -> anyhow::Result<()> {
    let (device, mut context, log) = device();
    let mut desc = Texture2DDesc {
        width: 8,
        height: 8,
        mip_levels: 0,
        format: Format::R8G8B8A8Unorm,
        bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
        misc_flags: ResourceMiscFlags::GENERATE_MIPS,
        ..Default::default()
    };
    let texture = device.create_texture2d(&mut desc, None)?;
    let view = device.create_shader_resource_view(&texture, None)?;
    log.clear();

    context.generate_mips(&view)?;
    let calls = log.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(
        calls[0],
        GlCall::BindTexture { target: gl::TEXTURE_2D, texture: Some(_) }
    ));
    assert_eq!(calls[1], GlCall::GenerateMipmap(gl::TEXTURE_2D));
    Ok(())
}

#[test]
fn generate_mips_without_the_flag_is_ignored() -> anyhow::Result<()> {
    let (device, mut context, log) = device();
    let texture = common::rgba_texture(&device, 4, 4, BindFlags::SHADER_RESOURCE);
    let view = device.create_shader_resource_view(&texture, None)?;
    log.clear();

    context.generate_mips(&view)?;
    assert_eq!(log.calls(), vec![]);
    Ok(())
}

#[test]
fn map_write_discard_orphans_and_keeps_the_cpu_copy() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let buffer = dynamic_vertex_buffer(&scene, 64);
    scene.log.clear();

    let len = scene.context.map(&buffer, MapType::WriteDiscard, |data| {
        data[..4].copy_from_slice(&[1, 2, 3, 4]);
        data.len()
    })?;
    assert_eq!(len, 64);
    assert!(scene.log.calls().contains(&GlCall::BufferData {
        target: gl::ARRAY_BUFFER,
        size: 64,
        has_data: true,
        usage: gl::DYNAMIC_DRAW,
    }));

    scene.log.clear();
    let head = scene
        .context
        .map(&buffer, MapType::WriteNoOverwrite, |data| data[..4].to_vec())?;
    assert_eq!(head, vec![1, 2, 3, 4]);
    assert_eq!(
        scene.log.calls().last(),
        Some(&GlCall::BufferSubData {
            target: gl::ARRAY_BUFFER,
            offset: 0,
            len: 64,
        })
    );
    Ok(())
}

#[test]
fn map_rejects_unsupported_modes() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let buffer = dynamic_vertex_buffer(&scene, 64);

    let err = scene.context.map(&buffer, MapType::Read, |_| ()).unwrap_err();
    assert!(matches!(err, D3dError::Unsupported(_)), "{err}");
    let err = scene.context.map(&buffer, MapType::Write, |_| ()).unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    let err = scene
        .context
        .map(&scene.vertices, MapType::WriteDiscard, |_| ())
        .unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn dynamic_constant_buffers_only_map_with_discard() -> anyhow::Result<()> {
    let mut scene = Scene::new();
    let constants = scene.device.create_buffer(
        &BufferDesc {
            byte_width: 64,
            usage: Usage::Dynamic,
            bind_flags: BindFlags::CONSTANT_BUFFER,
            cpu_access_flags: CpuAccessFlags::WRITE,
            ..Default::default()
        },
        None,
    )?;
    scene
        .context
        .map(&constants, MapType::WriteDiscard, |data| data.fill(0))?;
    let err = scene
        .context
        .map(&constants, MapType::WriteNoOverwrite, |_| ())
        .unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn srv_mip_range_out_of_bounds_is_invalid() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let mut desc = Texture2DDesc {
        width: 4,
        height: 4,
        mip_levels: 0,
        format: Format::R8G8B8A8Unorm,
        ..Default::default()
    };
    let texture = device.create_texture2d(&mut desc, None)?;
    assert_eq!(desc.mip_levels, 3);

    let view_of = |most_detailed_mip, mip_levels| ShaderResourceViewDesc {
        format: Format::R8G8B8A8Unorm,
        dimension: SrvDimension::Texture2D {
            most_detailed_mip,
            mip_levels,
        },
    };
    for (first, count) in [(1, 3), (0, 0), (3, 1), (2, u32::MAX - 1)] {
        let err = device
            .create_shader_resource_view(&texture, Some(&view_of(first, count)))
            .unwrap_err();
        assert!(matches!(err, D3dError::InvalidDesc(_)), "{first}+{count}: {err}");
    }

    let tail = device.create_shader_resource_view(&texture, Some(&view_of(1, 2)))?;
    assert_eq!(tail.desc(), view_of(1, 2));
    Ok(())
}
