//! End-to-end runs of the filter chain on a real adapter.
//!
//! Every test returns early when no GPU adapter is available.

use glslfilter::frame::PixelBuffer;
use glslfilter::shader::{
    EngineConfig, EngineState, FilterMode, FilterStage, GpuContext, PipelineEngine, StageSpec, TextureSpec,
    UniformSpec,
};
use glslfilter::uniform::{RawValue, UniformType};
use glslfilter::Error;

const SOURCE_SHADER: &str = r#"
#version 450
layout(location = 0) in vec2 fragTexCoord;
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform texture2D source;
layout(set = 0, binding = 1) uniform sampler sourceSampler;

void main() {
    fragColor = texture(sampler2D(source, sourceSampler), fragTexCoord);
}
"#;

const PASSTHROUGH_SHADER: &str = r#"
#version 450
layout(location = 0) in vec2 fragTexCoord;
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform texture2D previousResult;
layout(set = 0, binding = 1) uniform sampler previousResultSampler;

void main() {
    fragColor = texture(sampler2D(previousResult, previousResultSampler), fragTexCoord);
}
"#;

const INVERT_SHADER: &str = r#"
#version 450
layout(location = 0) in vec2 fragTexCoord;
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform texture2D previousResult;
layout(set = 0, binding = 1) uniform sampler previousResultSampler;

void main() {
    vec4 c = texture(sampler2D(previousResult, previousResultSampler), fragTexCoord);
    fragColor = vec4(1.0 - c.rgb, c.a);
}
"#;

const SOLID_SHADER: &str = r#"
#version 450
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform Params {
    ivec2 outputResolution;
    vec4 color;
};

void main() {
    fragColor = color;
    if (outputResolution.x <= 0) {
        fragColor = vec4(0.0);
    }
}
"#;

const IGNORES_PREVIOUS_SHADER: &str = r#"
#version 450
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(1.0); }
"#;

fn gpu() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

fn checkerboard(width: u32, height: u32) -> PixelBuffer {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = if (x + y) % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[v, (x * 40) as u8, (y * 40) as u8, 255]);
        }
    }
    PixelBuffer::from_rgba(width, height, data).unwrap()
}

fn source_stage(pixels: PixelBuffer) -> StageSpec {
    StageSpec {
        fragment_source: SOURCE_SHADER.to_string(),
        textures: vec![TextureSpec {
            name: "source".to_string(),
            pixels,
            filter: FilterMode::Nearest,
        }],
        uniforms: Vec::new(),
    }
}

fn shader_stage(source: &str) -> StageSpec {
    StageSpec {
        fragment_source: source.to_string(),
        ..Default::default()
    }
}

fn headless(gpu: &GpuContext, width: u32, height: u32) -> PipelineEngine {
    PipelineEngine::new(
        gpu,
        EngineConfig {
            width,
            height,
            present_format: None,
        },
    )
    .unwrap()
}

#[test]
fn single_stage_reproduces_texture() {
    let Some(gpu) = gpu() else { return };
    let input = checkerboard(5, 3);

    let mut engine = headless(&gpu, 5, 3);
    engine.initialize_from_specs(&[source_stage(input.clone())]).unwrap();
    engine.render(None).unwrap();

    let output = engine.last_render_image().unwrap();
    assert_eq!((output.width, output.height), (5, 3));
    assert_eq!(output.data.len(), 5 * 3 * 4);
    assert_eq!(output.data, input.data);
}

#[test]
fn passthrough_stage_keeps_previous_result() {
    let Some(gpu) = gpu() else { return };
    let input = checkerboard(4, 4);

    let mut engine = headless(&gpu, 4, 4);
    engine
        .initialize_from_specs(&[source_stage(input.clone()), shader_stage(PASSTHROUGH_SHADER)])
        .unwrap();
    engine.render(None).unwrap();

    assert_eq!(engine.last_render_image().unwrap().data, input.data);
}

#[test]
fn three_stages_share_two_targets() {
    let Some(gpu) = gpu() else { return };
    let input = checkerboard(4, 2);

    let mut engine = headless(&gpu, 4, 2);
    engine
        .initialize_from_specs(&[
            source_stage(input.clone()),
            shader_stage(INVERT_SHADER),
            shader_stage(INVERT_SHADER),
        ])
        .unwrap();
    assert_eq!(engine.stage_count(), 3);
    assert_eq!(engine.target_count(), 2);

    engine.render(None).unwrap();
    assert_eq!(engine.target_count(), 2);
    // Inverting twice is the identity.
    assert_eq!(engine.last_render_image().unwrap().data, input.data);
}

#[test]
fn uniforms_and_resolution_reach_the_shader() {
    let Some(gpu) = gpu() else { return };
    let spec = StageSpec {
        fragment_source: SOLID_SHADER.to_string(),
        textures: Vec::new(),
        uniforms: vec![UniformSpec {
            name: "color".to_string(),
            ty: UniformType::parse("floatvec4").unwrap(),
            value: RawValue::from(vec![1.0f64, 0.0, 1.0, 1.0]),
        }],
    };

    let mut engine = headless(&gpu, 2, 2);
    engine.initialize_from_specs(&[spec]).unwrap();
    engine.render(None).unwrap();

    let output = engine.last_render_image().unwrap();
    assert_eq!(output.pixel(0, 0), [255, 0, 255, 255]);
    assert_eq!(output.pixel(1, 1), [255, 0, 255, 255]);
}

#[test]
fn later_stage_without_previous_result_fails_to_render() {
    let Some(gpu) = gpu() else { return };

    let mut engine = headless(&gpu, 2, 2);
    engine
        .initialize_from_specs(&[shader_stage(IGNORES_PREVIOUS_SHADER), shader_stage(IGNORES_PREVIOUS_SHADER)])
        .unwrap();

    let err = engine.render(None).unwrap_err();
    assert!(matches!(err, Error::BindingNotFound { name } if name == "previousResult"));
    assert_eq!(engine.state(), EngineState::Initialized);
}

#[test]
fn texture_missing_from_shader_is_binding_not_found() {
    let Some(gpu) = gpu() else { return };
    let mut spec = shader_stage(IGNORES_PREVIOUS_SHADER);
    spec.textures.push(TextureSpec {
        name: "unused".to_string(),
        pixels: checkerboard(1, 1),
        filter: FilterMode::Linear,
    });

    let mut engine = headless(&gpu, 1, 1);
    engine.initialize_from_specs(&[spec]).unwrap();
    assert!(matches!(
        engine.render(None),
        Err(Error::BindingNotFound { name }) if name == "unused"
    ));
}

#[test]
fn lifecycle_errors() {
    let Some(gpu) = gpu() else { return };
    let mut engine = headless(&gpu, 2, 2);

    assert!(matches!(engine.render(None), Err(Error::NotInitialized)));
    assert!(matches!(engine.last_render_image(), Err(Error::NothingRendered)));
    assert!(matches!(engine.initialize(Vec::new()), Err(Error::NoStages)));

    engine
        .initialize_from_specs(&[shader_stage(IGNORES_PREVIOUS_SHADER)])
        .unwrap();
    assert_eq!(engine.state(), EngineState::Initialized);
    assert!(matches!(engine.last_render_image(), Err(Error::NothingRendered)));
    assert!(matches!(
        engine.initialize_from_specs(&[shader_stage(IGNORES_PREVIOUS_SHADER)]),
        Err(Error::AlreadyInitialized)
    ));

    engine.render(None).unwrap();
    assert_eq!(engine.state(), EngineState::Rendered);
    assert!(engine.last_render_image().is_ok());
}

#[test]
fn stage_construction_failures() {
    let Some(gpu) = gpu() else { return };

    let padded = PixelBuffer::with_stride(2, 1, 12, vec![0; 12]).unwrap();
    let mut spec = shader_stage(SOURCE_SHADER);
    spec.textures.push(TextureSpec {
        name: "source".to_string(),
        pixels: padded,
        filter: FilterMode::Linear,
    });
    assert!(matches!(
        FilterStage::new(&gpu, &spec, 0),
        Err(Error::UnsupportedStride { stride: 12, expected: 8, .. })
    ));

    let mut spec = shader_stage(SOLID_SHADER);
    spec.uniforms.push(UniformSpec {
        name: "color".to_string(),
        ty: UniformType::parse("floatvec4").unwrap(),
        value: RawValue::from(vec![1.0f64, 0.0]),
    });
    assert!(matches!(
        FilterStage::new(&gpu, &spec, 0),
        Err(Error::ShapeMismatch { expected: 4, actual: 2 })
    ));

    // A full budget fits on the first stage but not on a later one, which
    // also needs a unit for the previous result.
    let budget = gpu.max_sampled_textures();
    if budget > 64 {
        return;
    }
    let mut spec = shader_stage(IGNORES_PREVIOUS_SHADER);
    for i in 0..budget {
        spec.textures.push(TextureSpec {
            name: format!("t{i}"),
            pixels: checkerboard(1, 1),
            filter: FilterMode::Linear,
        });
    }
    assert!(FilterStage::new(&gpu, &spec, 0).is_ok());
    let err = FilterStage::new(&gpu, &spec, 1).err();
    assert!(matches!(
        err,
        Some(Error::TooManyTextures { required, available }) if required == budget + 1 && available == budget
    ));
}

#[test]
fn buffer_uniform_feeds_a_block() {
    let Some(gpu) = gpu() else { return };
    let source = r#"
#version 450
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform Palette {
    vec4 color;
} palette;

void main() { fragColor = palette.color; }
"#;
    let spec = StageSpec {
        fragment_source: source.to_string(),
        textures: Vec::new(),
        uniforms: vec![UniformSpec {
            name: "palette".to_string(),
            ty: UniformType::Buffer,
            value: RawValue::from(vec![0.0f64, 1.0, 0.0, 1.0]),
        }],
    };

    let mut engine = headless(&gpu, 1, 1);
    engine.initialize_from_specs(&[spec]).unwrap();
    engine.render(None).unwrap();
    assert_eq!(engine.last_render_image().unwrap().pixel(0, 0), [0, 255, 0, 255]);
}

fn surface_view(gpu: &GpuContext) -> wgpu::TextureView {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: None,
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[test]
fn present_without_format_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let mut engine = headless(&gpu, 1, 1);
    engine
        .initialize_from_specs(&[shader_stage(IGNORES_PREVIOUS_SHADER)])
        .unwrap();

    let view = surface_view(&gpu);
    assert!(matches!(engine.render(Some(&view)), Err(Error::PresentUnavailable)));

    engine.render(None).unwrap();
    assert!(matches!(engine.present(&view), Err(Error::PresentUnavailable)));
}

#[test]
fn present_reuses_the_last_render() {
    let Some(gpu) = gpu() else { return };
    let mut engine = PipelineEngine::new(
        &gpu,
        EngineConfig {
            width: 1,
            height: 1,
            present_format: Some(wgpu::TextureFormat::Rgba8Unorm),
        },
    )
    .unwrap();
    engine
        .initialize_from_specs(&[shader_stage(IGNORES_PREVIOUS_SHADER)])
        .unwrap();

    let view = surface_view(&gpu);
    assert!(matches!(engine.present(&view), Err(Error::NothingRendered)));

    engine.render(Some(&view)).unwrap();
    engine.present(&view).unwrap();
    engine.present(&view).unwrap();
    assert_eq!(engine.state(), EngineState::Rendered);
    assert_eq!(engine.last_render_image().unwrap().pixel(0, 0), [255, 255, 255, 255]);
}

const ARRAYS_SHADER: &str = r#"
#version 450
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform Weights {
    float w[3];
    int taps[2];
    vec2 v[2];
    vec3 c[2];
};

void main() {
    fragColor = vec4(w[0] + w[2], float(taps[1] - taps[0]) / 5.0, v[1].y, c[1].z);
}
"#;

fn uniform(name: &str, ty: &str, value: RawValue) -> UniformSpec {
    UniformSpec {
        name: name.to_string(),
        ty: UniformType::parse(ty).unwrap(),
        value,
    }
}

fn assert_pixel_near(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(e) <= 1, "pixel {actual:?}, expected {expected:?}");
    }
}

#[test]
fn array_uniforms_reach_the_shader() {
    let Some(gpu) = gpu() else { return };
    let spec = StageSpec {
        fragment_source: ARRAYS_SHADER.to_string(),
        textures: Vec::new(),
        uniforms: vec![
            uniform("w", "[]float", RawValue::from(vec![0.1f64, 0.9, 0.3])),
            uniform("taps", "[]int", RawValue::from(vec![1i64, 4])),
            uniform(
                "v",
                "[]floatvec2",
                RawValue::Sequence(vec![
                    RawValue::from(vec![0.0f64, 0.0]),
                    RawValue::from(vec![0.0f64, 0.2]),
                ]),
            ),
            uniform(
                "c",
                "[]floatvec3",
                RawValue::Sequence(vec![
                    RawValue::from(vec![0.0f64, 0.0, 0.0]),
                    RawValue::from(vec![0.0f64, 0.0, 1.0]),
                ]),
            ),
        ],
    };

    let mut engine = headless(&gpu, 2, 1);
    engine.initialize_from_specs(&[spec]).unwrap();
    engine.render(None).unwrap();

    let output = engine.last_render_image().unwrap();
    assert_pixel_near(output.pixel(0, 0), [102, 153, 51, 255]);
    assert_pixel_near(output.pixel(1, 0), [102, 153, 51, 255]);
}

fn solid_magenta() -> StageSpec {
    StageSpec {
        fragment_source: SOLID_SHADER.to_string(),
        textures: Vec::new(),
        uniforms: vec![uniform("color", "floatvec4", RawValue::from(vec![1.0f64, 0.0, 1.0, 1.0]))],
    }
}

#[test]
fn render_size_is_checked_against_the_device_limit() {
    let Some(gpu) = gpu() else { return };
    let max = gpu.max_texture_size();

    let oversized = PipelineEngine::new(
        &gpu,
        EngineConfig {
            width: max + 1,
            height: 1,
            present_format: None,
        },
    );
    assert!(matches!(
        oversized,
        Err(Error::TextureTooLarge { width, max: limit, .. }) if width == max + 1 && limit == max
    ));

    let mut engine = headless(&gpu, max, 1);
    engine.initialize_from_specs(&[solid_magenta()]).unwrap();
    engine.render(None).unwrap();
    let output = engine.last_render_image().unwrap();
    assert_eq!((output.width, output.height), (max, 1));
    assert_eq!(output.pixel(max - 1, 0), [255, 0, 255, 255]);
}

#[test]
fn oversized_texture_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let max = gpu.max_texture_size();
    let pixels = PixelBuffer::from_rgba(max + 1, 1, vec![0; (max as usize + 1) * 4]).unwrap();
    let mut spec = shader_stage(SOURCE_SHADER);
    spec.textures.push(TextureSpec {
        name: "source".to_string(),
        pixels,
        filter: FilterMode::Linear,
    });
    assert!(matches!(
        FilterStage::new(&gpu, &spec, 0),
        Err(Error::TextureTooLarge { name, .. }) if name == "source"
    ));
}

#[test]
fn bind_group_past_the_device_limit_is_a_link_error() {
    let Some(gpu) = gpu() else { return };
    let set = gpu.max_bind_groups();
    let source = format!(
        r#"
#version 450
layout(location = 0) out vec4 fragColor;
layout(set = {set}, binding = 0) uniform texture2D extra;
layout(set = {set}, binding = 1) uniform sampler extraSampler;

void main() {{
    fragColor = texture(sampler2D(extra, extraSampler), vec2(0.5));
}}
"#
    );
    match FilterStage::new(&gpu, &shader_stage(&source), 0) {
        Err(Error::ProgramLink { log }) => assert!(log.contains("bind groups"), "{log}"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("stage built with group {set}"),
    }
}

#[test]
fn pipeline_validation_errors_are_link_errors() {
    let Some(gpu) = gpu() else { return };
    let source = r#"
#version 450
layout(location = 0) out ivec4 fragColor;
void main() { fragColor = ivec4(1); }
"#;
    match FilterStage::new(&gpu, &shader_stage(source), 0) {
        Err(Error::ProgramLink { log }) => assert!(!log.is_empty()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("integer output accepted for an 8-bit normalized target"),
    }
}

const SHARED_BLOCK_SHADER: &str = r#"
#version 450
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform Palette {
    vec4 color;
    float gain;
} palette;

void main() { fragColor = palette.color * palette.gain; }
"#;

#[test]
fn numeric_uniform_in_a_buffer_bound_block_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let buffer = uniform("palette", "buffer", RawValue::from(vec![0.0f64, 1.0, 0.0, 1.0]));
    let gain = uniform("gain", "float", RawValue::Float(1.0));

    for uniforms in [vec![buffer.clone(), gain.clone()], vec![gain, buffer]] {
        let spec = StageSpec {
            fragment_source: SHARED_BLOCK_SHADER.to_string(),
            textures: Vec::new(),
            uniforms,
        };
        let mut engine = headless(&gpu, 1, 1);
        engine.initialize_from_specs(&[spec]).unwrap();
        assert!(matches!(engine.render(None), Err(Error::InvalidUniformType { .. })));
        assert_eq!(engine.state(), EngineState::Initialized);
    }
}
