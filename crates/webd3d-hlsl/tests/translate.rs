use pretty_assertions::assert_eq;
use webd3d_hlsl::{compile, parse, HlslError, ShaderStage, TextureType};

fn vs(src: &str) -> webd3d_hlsl::CompiledShader {
    compile(src, ShaderStage::Vertex).unwrap()
}

fn ps(src: &str) -> webd3d_hlsl::CompiledShader {
    compile(src, ShaderStage::Pixel).unwrap()
}

#[test]
fn transform_cbuffer_vertex_shader() {
    let out = vs(r#"
        cbuffer Transform : register(b0) { float4x4 wvp; }
        float4 main(float3 pos : POSITION) : SV_POSITION { return mul(float4(pos,1), wvp); }
    "#);

    assert_eq!(out.glsl.matches("layout(std140) uniform").count(), 1);
    assert!(out.glsl.contains("layout(std140) uniform xc_vs_cb_Transform {\n    mat4 wvp;\n};"));
    assert!(out.glsl.contains("layout(location = 0) in vec3 xc_in_POSITION0;"));
    assert!(out.glsl.contains("vec4 xc_main(vec3 pos) {\n    return mul(vec4(pos, 1), wvp);\n}"));
    assert!(out.glsl.contains("    gl_Position = xc_ret;\n"));
    assert!(out.glsl.contains("#define mul(a, b) ((a) * (b))"));

    let position = out.glsl.find("gl_Position = xc_ret;").unwrap();
    let remap = out
        .glsl
        .find("gl_Position.z = gl_Position.z * 2.0 - gl_Position.w;")
        .unwrap();
    assert!(remap > position);

    let cb = &out.reflection.constant_buffers[0];
    assert_eq!(cb.name, "Transform");
    assert_eq!(cb.block_name, "xc_vs_cb_Transform");
    assert_eq!(cb.register, 0);
    assert_eq!(cb.size_bytes, 64);

    let input = out.reflection.input("position", 0).unwrap();
    assert_eq!(input.location, 0);
    assert_eq!(input.components, 3);
    assert_eq!(input.glsl_name, "xc_in_POSITION0");
}

#[test]
fn minimal_pixel_shader_full_output() {
    let out = ps("float4 main() : SV_Target { return float4(1, 0, 0, 1); }");
    let expected = "\
#version 300 es
precision highp float;
precision highp int;
precision highp sampler2D;
precision highp sampler2DArray;
precision highp sampler3D;
precision highp samplerCube;

#define mul(a, b) ((a) * (b))
#define saturate(x) clamp((x), 0.0, 1.0)
#define lerp(a, b, t) mix((a), (b), (t))
#define mad(a, b, c) ((a) * (b) + (c))
#define rcp(x) (1.0 / (x))
#define fmod(a, b) ((a) - (b) * trunc((a) / (b)))

layout(location = 0) out vec4 xc_target0;

vec4 xc_main() {
    return vec4(1, 0, 0, 1);
}

void main() {
    vec4 xc_ret = xc_main();
    xc_target0 = xc_ret;
}
";
    assert_eq!(out.glsl, expected);
    assert_eq!(out.reflection.render_targets, [0]);
    assert!(!out.reflection.writes_depth);
}

#[test]
fn exactly_one_main_is_required() {
    let two = "float4 main() : SV_Target { return 0; }\nfloat4 main() : SV_Target { return 1; }";
    assert_eq!(
        compile(two, ShaderStage::Pixel).unwrap_err(),
        HlslError::MultipleMain { line: 2 }
    );

    let none = "float4 helper() { return 0; }";
    assert!(matches!(
        compile(none, ShaderStage::Pixel).unwrap_err(),
        HlslError::MissingMain { .. }
    ));

    assert!(compile("float4 main() : SV_Target { return 0; }", ShaderStage::Pixel).is_ok());
}

#[test]
fn implicit_registers_take_lowest_free_index() {
    let src = r#"
        cbuffer A : register(b1) { float4 a; };
        cbuffer B { float4 b; };
        cbuffer C { float4 c; };
        float4 main() : SV_Target { return a + b + c; }
    "#;
    let module = parse(src, ShaderStage::Pixel).unwrap();
    let regs: Vec<i32> = module.constant_buffers.iter().map(|cb| cb.register).collect();
    assert_eq!(regs, [1, 0, 2]);

    let out = ps(src);
    let regs: Vec<(&str, u32)> = out
        .reflection
        .constant_buffers
        .iter()
        .map(|cb| (cb.name.as_str(), cb.register))
        .collect();
    assert_eq!(regs, [("A", 1), ("B", 0), ("C", 2)]);
}

#[test]
fn sample_sites_share_combinations_per_texture_sampler_pair() {
    let out = ps(r#"
        Texture2D albedo;
        SamplerState pointS;
        SamplerState linearS;
        float4 main(float2 uv : TEXCOORD0) : SV_Target {
            float4 a = albedo.Sample(linearS, uv);
            float4 b = albedo.Sample(linearS, uv * 2.0);
            float4 c = albedo.Sample(pointS, uv);
            return a + b + c;
        }
    "#);

    let combos = &out.reflection.combinations;
    assert_eq!(combos.len(), 2);
    assert_eq!(combos[0].name, "xc_ps_combo0_albedo_linearS");
    assert_eq!(combos[0].texture_register, 0);
    assert_eq!(combos[0].sampler_register, 1);
    assert_eq!(combos[0].texture_type, TextureType::Texture2D);
    assert_eq!(combos[1].name, "xc_ps_combo1_albedo_pointS");
    assert_eq!(combos[1].sampler_register, 0);

    assert_eq!(out.glsl.matches("uniform sampler2D ").count(), 2);
    assert!(out.glsl.contains("vec4 a = texture(xc_ps_combo0_albedo_linearS, uv);"));
    assert!(out.glsl.contains("vec4 b = texture(xc_ps_combo0_albedo_linearS, uv * 2.0);"));
    assert!(out.glsl.contains("vec4 c = texture(xc_ps_combo1_albedo_pointS, uv);"));
    assert!(out.glsl.contains("in vec2 xc_var_TEXCOORD0;"));
}

#[test]
fn nested_sample_calls_inside_coordinates() {
    let out = ps(r#"
        Texture2D distort : register(t1);
        Texture2D color : register(t0);
        SamplerState s;
        float4 main(float2 uv : TEXCOORD0) : SV_Target {
            return color.Sample(s, uv + distort.Sample(s, uv).xy);
        }
    "#);
    assert!(out.glsl.contains(
        "return texture(xc_ps_combo0_color_s, uv + texture(xc_ps_combo1_distort_s, uv).xy);"
    ));
    let combos = &out.reflection.combinations;
    assert_eq!(combos[0].texture_register, 0);
    assert_eq!(combos[1].texture_register, 1);
}

#[test]
fn sample_variants_and_texture_kinds() {
    let out = ps(r#"
        Texture1D ramp;
        Texture2D<float> mask;
        TextureCube sky;
        Texture2DArray layers;
        SamplerState s;
        float4 main(float2 uv : TEXCOORD0, float3 dir : NORMAL) : SV_Target {
            float4 r = ramp.Sample(s, uv.x);
            float m = mask.SampleLevel(s, uv, 0.0f);
            float4 e = sky.SampleBias(s, dir, 1.5f);
            float4 l = layers.SampleGrad(s, float3(uv, 2), ddx(uv), ddy(uv));
            return r * m + e + l;
        }
    "#);
    assert!(out.glsl.contains("vec4 r = texture(xc_ps_combo0_ramp_s, vec2(uv.x, 0.5));"));
    assert!(out.glsl.contains("float m = (textureLod(xc_ps_combo1_mask_s, uv, 0.0)).x;"));
    assert!(out.glsl.contains("vec4 e = texture(xc_ps_combo2_sky_s, dir, 1.5);"));
    assert!(out
        .glsl
        .contains("vec4 l = textureGrad(xc_ps_combo3_layers_s, vec3(uv, 2), dFdx(uv), dFdy(uv));"));
    assert!(out.glsl.contains("uniform samplerCube xc_ps_combo2_sky_s;"));
    assert!(out.glsl.contains("uniform sampler2DArray xc_ps_combo3_layers_s;"));
    assert!(out.glsl.contains("uniform sampler2D xc_ps_combo0_ramp_s;"));
}

#[test]
fn struct_stage_io_round_trips_between_stages() {
    let shared = "struct VSOut { float4 pos : SV_Position; float2 uv : TEXCOORD0; nointerpolation uint id : ID; };";
    let vertex = vs(&format!(
        "{shared}
        VSOut main(float3 p : POSITION, float2 uv : TEXCOORD0, uint vid : SV_VertexID) {{
            VSOut o = (VSOut)0;
            o.pos = float4(p, 1.0f);
            o.uv = uv;
            o.id = vid;
            return o;
        }}"
    ));
    assert!(vertex.glsl.contains("VSOut o = xc_zero_VSOut();"));
    assert!(vertex.glsl.contains("o.pos = vec4(p, 1.0);"));
    assert!(vertex.glsl.contains(
        "VSOut xc_zero_VSOut() {\n    VSOut z;\n    z.pos = vec4(0.0);\n    z.uv = vec2(0.0);\n    z.id = 0u;\n    return z;\n}"
    ));
    assert!(vertex.glsl.contains("struct VSOut {\n    vec4 pos;\n    vec2 uv;\n    uint id;\n};"));
    assert!(vertex.glsl.contains("out vec2 xc_var_TEXCOORD0;"));
    assert!(vertex.glsl.contains("flat out uint xc_var_ID0;"));
    assert!(vertex.glsl.contains("xc_p_vid = uint(gl_VertexID);"));
    assert!(vertex.glsl.contains("gl_Position = xc_ret.pos;"));
    assert!(vertex.glsl.contains("xc_var_TEXCOORD0 = xc_ret.uv;"));
    assert_eq!(vertex.reflection.inputs.len(), 2);
    assert_eq!(vertex.reflection.inputs[1].semantic_name, "TEXCOORD");
    assert_eq!(vertex.reflection.inputs[1].location, 1);

    let pixel = ps(&format!(
        "{shared}
        Texture2D albedo : register(t0);
        SamplerState linearSampler : register(s0);
        float4 main(VSOut i) : SV_Target {{ return albedo.Sample(linearSampler, i.uv); }}"
    ));
    assert!(pixel.glsl.contains("in vec2 xc_var_TEXCOORD0;"));
    assert!(pixel.glsl.contains("flat in uint xc_var_ID0;"));
    assert!(pixel.glsl.contains("xc_p_i.pos = gl_FragCoord;"));
    assert!(pixel.glsl.contains("xc_p_i.uv = xc_var_TEXCOORD0;"));
    assert!(pixel
        .glsl
        .contains("return texture(xc_ps_combo0_albedo_linearSampler, i.uv);"));
}

#[test]
fn out_parameters_and_multiple_targets() {
    let out = ps(r#"
        void main(float4 c : COLOR0, out float4 a : SV_Target0, out float4 b : SV_Target1, out float d : SV_Depth) {
            a = c;
            b = c * 0.5;
            d = 0.25;
        }
    "#);
    assert_eq!(out.reflection.render_targets, [0, 1]);
    assert!(out.reflection.writes_depth);
    assert!(out.glsl.contains("layout(location = 1) out vec4 xc_target1;"));
    assert!(out.glsl.contains("    xc_main(xc_p_c, xc_p_a, xc_p_b, xc_p_d);\n"));
    assert!(out.glsl.contains("gl_FragDepth = xc_p_d;"));
    assert!(out.glsl.contains("void xc_main(vec4 c, out vec4 a, out vec4 b, out float d) {"));
}

#[test]
fn casts_matrix_constructors_and_renames() {
    let out = ps(r#"
        static const float weights[3] = { 0.25, 0.5f, 0.25 };
        float4 main(float2 uv : TEXCOORD0) : SV_Target {
            float2x2 r = float2x2(uv.x, -uv.y, uv.y, uv.x);
            float2x3 m = float2x3(1, 2, 3, 4, 5, 6);
            int i = (int)uv.x;
            float texture = frac(uv.x * 2.0f) + rsqrt(atan2(uv.y, uv.x));
            [unroll] for (int k = 0; k < 3; k++) { texture += weights[k]; }
            return float4(mul(uv, r), saturate(texture), lerp(0.0, 1.0, (float)i));
        }
    "#);
    let glsl = &out.glsl;
    assert!(glsl.contains("const float weights[3] = float[3](0.25, 0.5, 0.25);"));
    assert!(glsl.contains("mat2 r = transpose(mat2(uv.x, -uv.y, uv.y, uv.x));"));
    assert!(glsl.contains("mat3x2 m = transpose(mat2x3(1, 2, 3, 4, 5, 6));"));
    assert!(glsl.contains("int i = int(uv.x);"));
    assert!(glsl.contains(
        "float xc_u_texture = fract(uv.x * 2.0) + inversesqrt(atan(uv.y, uv.x));"
    ));
    assert!(glsl.contains("for (int k = 0; k < 3; k++) {\n        xc_u_texture += weights[k];\n    }"));
    assert!(!glsl.contains("unroll"));
    assert!(glsl.contains("lerp(0.0, 1.0, float(i))"));
}

#[test]
fn constant_buffer_layouts_and_globals() {
    let out = ps(r#"
        float4 tint;
        cbuffer Material : register(b2) {
            float a;
            float3 b;
            row_major float4x3 rm;
            float2 arr[3];
        };
        float bias;
        float4 main() : SV_Target { return tint * (a + bias) + float4(b, arr[1].x); }
    "#);
    let cbs = &out.reflection.constant_buffers;
    assert_eq!(cbs.len(), 2);
    assert_eq!(cbs[0].name, "$Global");
    assert_eq!(cbs[0].block_name, "xc_ps_cb_Globals");
    assert_eq!(cbs[0].register, 0);
    assert_eq!(cbs[0].size_bytes, 32);
    assert_eq!(cbs[1].register, 2);
    // a @0, b @16, rm @32 (4 rows of 16), arr @96 (3 x 16).
    assert_eq!(cbs[1].size_bytes, 144);
    assert!(out
        .glsl
        .contains("layout(std140) uniform xc_ps_cb_Globals {\n    vec4 tint;\n    float bias;\n};"));
    assert!(out.glsl.contains("    layout(row_major) mat3x4 rm;\n"));
    assert!(out.glsl.contains("    vec2 arr[3];\n"));
}

#[test]
fn clip_becomes_a_discard_helper() {
    let out = ps("float4 main(float a : ALPHA) : SV_Target { clip(a - 0.5); return float4(a, a, a, 1); }");
    assert!(out.glsl.contains("xc_clip(a - 0.5);"));
    assert!(out
        .glsl
        .contains("void xc_clip(float x) { if (x < 0.0) discard; }"));
}

#[test]
fn errors_carry_source_lines() {
    let err = compile("cbuffer C {\n float4 a;\n floatx b;\n};", ShaderStage::Pixel).unwrap_err();
    assert_eq!(
        err,
        HlslError::UnknownType {
            line: 3,
            name: "floatx".into()
        }
    );

    let err = compile(
        "float4 main() : SV_Target {\n #error\n return 0; }",
        ShaderStage::Pixel,
    )
    .unwrap_err();
    assert_eq!(err, HlslError::Tokenize { line: 2, found: '#' });

    let err = compile(
        "float4 main(float3 p : POSITION,\n out float dist : SV_ClipDistance0) : SV_Position { dist = 1; return float4(p, 1); }",
        ShaderStage::Vertex,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        HlslError::UnsupportedSemantic { line: 2, ref semantic, .. } if semantic == "SV_CLIPDISTANCE0"
    ));

    let err = compile(
        "Texture2D t;\nfloat4 main() : SV_Target {\n return t; }",
        ShaderStage::Pixel,
    )
    .unwrap_err();
    assert!(matches!(err, HlslError::Unsupported { line: 3, ref what } if what.contains("outside a sample call")));

    let err = compile(
        "Texture2D t; SamplerState s;\nfloat4 main(float2 uv : TEXCOORD) : SV_Target { return t.Sample(q, uv); }",
        ShaderStage::Pixel,
    )
    .unwrap_err();
    assert_eq!(
        err,
        HlslError::UnknownIdentifier {
            line: 2,
            name: "q".into()
        }
    );
    assert_eq!(err.line(), 2);
}

#[test]
fn vertex_shaders_must_write_a_position() {
    let err = compile(
        "float4 main(float4 c : COLOR) : COLOR { return c; }",
        ShaderStage::Vertex,
    )
    .unwrap_err();
    assert!(matches!(err, HlslError::UnsupportedSemantic { .. }));
}

#[test]
fn generated_uniform_names_carry_the_stage() {
    let vertex = vs(r#"
        cbuffer ExternalData : register(b0) { float4x4 wvp; }
        float4 main(float3 p : POSITION) : SV_Position { return mul(float4(p, 1), wvp); }
    "#);
    let pixel = ps(r#"
        cbuffer ExternalData : register(b0) { float4 tint; }
        float4 ambient;
        Texture2D albedo;
        SamplerState s;
        float4 main(float2 uv : TEXCOORD0) : SV_Target { return albedo.Sample(s, uv) * tint + ambient; }
    "#);
    assert_eq!(vertex.reflection.constant_buffers[0].block_name, "xc_vs_cb_ExternalData");
    let blocks: Vec<&str> = pixel
        .reflection
        .constant_buffers
        .iter()
        .map(|cb| cb.block_name.as_str())
        .collect();
    assert_eq!(blocks, ["xc_ps_cb_ExternalData", "xc_ps_cb_Globals"]);
    assert_eq!(pixel.reflection.combinations[0].name, "xc_ps_combo0_albedo_s");
}

#[test]
fn overflowing_semantic_index_is_rejected() {
    let err = compile(
        "float4 main(float3 p : POSITION,\n float2 uv : TEXCOORD99999999999) : SV_Position { return float4(p, uv.x); }",
        ShaderStage::Vertex,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        HlslError::UnsupportedSemantic { line: 2, ref semantic, .. } if semantic == "TEXCOORD99999999999"
    ));
}
