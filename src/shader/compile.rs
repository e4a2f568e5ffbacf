//! GLSL fragment compilation through naga, plus the fixed vertex stage.

use super::reflect::ShaderReflection;
use crate::error::{Error, Result};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{Binding, Module, ShaderStage, TypeInner};
use std::borrow::Cow;

/// Entry point of translated GLSL fragment shaders.
pub const FRAGMENT_ENTRY_POINT: &str = "main";

/// Entry point of the built-in vertex stage.
pub const VERTEX_ENTRY_POINT: &str = "vs_main";

/// Built-in vertex stage: passes the full-screen triangle through and
/// hands the texture coordinate to the fragment at location 0.
const VERTEX_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}
"#;

/// A validated fragment shader module together with its resource layout.
#[derive(Debug)]
pub struct CompiledShader {
    pub module: Module,
    pub reflection: ShaderReflection,
}

/// Creates the vertex shader module shared by every stage.
pub fn vertex_module(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Full-screen Vertex Shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(VERTEX_SHADER)),
    })
}

/// Creates the GPU module for a compiled fragment shader.
///
/// The module goes to wgpu as naga IR. WGSL output would drop the std140
/// strides the GLSL frontend gives `float` and `vec2` arrays in blocks.
pub fn fragment_module(device: &wgpu::Device, module: Module) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Stage Fragment Shader"),
        source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
    })
}

/// Parses, validates and links a GLSL fragment shader.
///
/// Diagnostics from naga are passed through unmodified.
pub fn compile_fragment(source: &str) -> Result<CompiledShader> {
    let mut frontend = Frontend::default();
    let options = Options::from(ShaderStage::Fragment);
    let module = frontend
        .parse(&options, source)
        .map_err(|e| compile_error(e.emit_to_string(source)))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(source)))?;

    link_interface(&module)?;
    let reflection = ShaderReflection::from_module(&module)?;

    Ok(CompiledShader { module, reflection })
}

fn compile_error(log: String) -> Error {
    Error::ShaderCompile {
        stage: ShaderStage::Fragment,
        log,
    }
}

fn link_error(log: impl Into<String>) -> Error {
    Error::ProgramLink { log: log.into() }
}

/// Checks the fragment interface against what the vertex stage provides.
fn link_interface(module: &Module) -> Result<()> {
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Fragment && ep.name == FRAGMENT_ENTRY_POINT)
        .ok_or_else(|| link_error("fragment shader has no `main` entry point"))?;

    for argument in &entry.function.arguments {
        let name = argument.name.as_deref().unwrap_or("<unnamed>");
        match &argument.binding {
            Some(binding) => check_input(module, name, binding, argument.ty)?,
            None => {
                // Inputs wrapped in a struct carry their bindings on the members.
                if let TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    for member in members {
                        if let Some(binding) = &member.binding {
                            let name = member.name.as_deref().unwrap_or(name);
                            check_input(module, name, binding, member.ty)?;
                        }
                    }
                }
            }
        }
    }

    let result = entry
        .function
        .result
        .as_ref()
        .ok_or_else(|| link_error("fragment shader writes no colour output"))?;
    let writes_location_zero = match &result.binding {
        Some(binding) => is_location(binding, 0),
        None => match &module.types[result.ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .any(|m| m.binding.as_ref().is_some_and(|b| is_location(b, 0))),
            _ => false,
        },
    };
    if !writes_location_zero {
        return Err(link_error("fragment shader does not write a colour output at location 0"));
    }

    Ok(())
}

fn check_input(module: &Module, name: &str, binding: &Binding, ty: naga::Handle<naga::Type>) -> Result<()> {
    let Binding::Location { location, .. } = binding else {
        return Ok(());
    };
    if *location != 0 {
        return Err(link_error(format!(
            "fragment input `{name}` at location {location} is not written by the vertex stage"
        )));
    }
    let is_vec2 = matches!(
        module.types[ty].inner,
        TypeInner::Vector {
            size: naga::VectorSize::Bi,
            scalar: naga::Scalar {
                kind: naga::ScalarKind::Float,
                width: 4
            }
        }
    );
    if !is_vec2 {
        return Err(link_error(format!(
            "fragment input `{name}` at location 0 must be a vec2 texture coordinate"
        )));
    }
    Ok(())
}

fn is_location(binding: &Binding, expected: u32) -> bool {
    matches!(binding, Binding::Location { location, .. } if *location == expected)
}
