mod common;

use common::{device, TEXTURED_PS, TEXTURED_VS};
use pretty_assertions::assert_eq;
use webd3d_d3d11::{
    D3dError, Format, GlCall, InputClassification, InputElementDesc, ShaderStage, Unknown,
};

#[test]
fn backend_compile_failure_reports_the_log() {
    let (device, _context, log) = device();
    log.fail_next_compile("ERROR: 0:12: 'xc_missing' : undeclared identifier");

    let err = device.create_pixel_shader(TEXTURED_PS).unwrap_err();
    match err {
        D3dError::ShaderCompile { stage, log: message } => {
            assert_eq!(stage, ShaderStage::Pixel);
            assert_eq!(message, "ERROR: 0:12: 'xc_missing' : undeclared identifier");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.live("shader"), 0);
    assert_eq!(device.ref_count(), 1);
}

#[test]
fn translation_failure_never_reaches_the_backend() {
    let (device, _context, log) = device();
    let err = device
        .create_vertex_shader("float4 main( : SV_Position { return 0; }")
        .unwrap_err();
    assert!(matches!(err, D3dError::Shader(_)), "{err}");
    assert_eq!(log.count(|c| matches!(c, GlCall::CreateShader { .. })), 0);
}

#[test]
fn generated_glsl_is_exposed() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let vs = device.create_vertex_shader(TEXTURED_VS)?;
    assert!(vs.glsl().starts_with("#version 300 es"));
    assert_eq!(vs.reflection().inputs.len(), 2);
    assert_eq!(vs.reflection().constant_buffers[0].size_bytes, 64);
    Ok(())
}

#[test]
fn layout_must_cover_every_shader_input() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let vs = device.create_vertex_shader(TEXTURED_VS)?;
    let err = device
        .create_input_layout(
            &[InputElementDesc::per_vertex("POSITION", 0, Format::R32G32B32Float, 0)],
            &vs,
        )
        .unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn layout_semantics_match_case_insensitively_and_extras_are_allowed() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let vs = device.create_vertex_shader(TEXTURED_VS)?;
    let layout = device.create_input_layout(
        &[
            InputElementDesc::per_vertex("position", 0, Format::R32G32B32Float, 0),
            InputElementDesc::per_vertex("TexCoord", 0, Format::R32G32Float, 0),
            InputElementDesc::per_vertex("COLOR", 0, Format::R8G8B8A8Unorm, 1),
        ],
        &vs,
    )?;
    let elements = layout.elements();
    // Appended elements are packed after the previous element in their slot.
    assert_eq!(elements[1].aligned_byte_offset, 12);
    assert_eq!(elements[2].aligned_byte_offset, 0);
    Ok(())
}

#[test]
fn integer_elements_cannot_feed_float_inputs() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let vs = device.create_vertex_shader(TEXTURED_VS)?;
    let err = device
        .create_input_layout(
            &[
                InputElementDesc::per_vertex("POSITION", 0, Format::R32G32B32Float, 0),
                InputElementDesc::per_vertex("TEXCOORD", 0, Format::R8G8B8A8Uint, 0),
            ],
            &vs,
        )
        .unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");
    Ok(())
}

#[test]
fn per_vertex_elements_reject_step_rates() -> anyhow::Result<()> {
    let (device, _context, _log) = device();
    let vs = device.create_vertex_shader(TEXTURED_VS)?;
    let mut stepped = InputElementDesc::per_vertex("TEXCOORD", 0, Format::R32G32Float, 1);
    stepped.instance_data_step_rate = 1;
    let err = device
        .create_input_layout(
            &[
                InputElementDesc::per_vertex("POSITION", 0, Format::R32G32B32Float, 0),
                stepped.clone(),
            ],
            &vs,
        )
        .unwrap_err();
    assert!(matches!(err, D3dError::InvalidDesc(_)), "{err}");

    stepped.input_slot_class = InputClassification::PerInstanceData;
    device.create_input_layout(
        &[
            InputElementDesc::per_vertex("POSITION", 0, Format::R32G32B32Float, 0),
            stepped,
        ],
        &vs,
    )?;
    Ok(())
}
