//! One pass of the filter chain: a compiled program plus its own textures
//! and uniform values.

use super::binder::{block_buffer_size, create_bind_group_layouts, BindSession, Placeholder};
use super::compile::{compile_fragment, fragment_module, vertex_module, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};
use super::gpu_context::GpuContext;
use super::reflect::ShaderReflection;
use crate::error::{Error, Result};
use crate::frame::{PixelBuffer, ScreenVertex};
use crate::uniform::{linearize_block, normalize, NumericType, RawValue, UniformType, UniformValue};
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Format of the offscreen targets every stage renders into.
pub const CHAIN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

impl FilterMode {
    /// `NEAREST` or `LINEAR`, ignoring case. Anything else is linear.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("nearest") {
            FilterMode::Nearest
        } else {
            FilterMode::Linear
        }
    }

    fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

/// A static texture handed to a stage.
#[derive(Debug, Clone)]
pub struct TextureSpec {
    pub name: String,
    pub pixels: PixelBuffer,
    pub filter: FilterMode,
}

/// A uniform as declared by the definition, before normalization.
#[derive(Debug, Clone)]
pub struct UniformSpec {
    pub name: String,
    pub ty: UniformType,
    pub value: RawValue,
}

/// Everything needed to build a [`FilterStage`].
#[derive(Debug, Clone, Default)]
pub struct StageSpec {
    pub fragment_source: String,
    pub textures: Vec<TextureSpec>,
    pub uniforms: Vec<UniformSpec>,
}

struct StageTexture {
    name: String,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

enum StageUniform {
    Numeric {
        name: String,
        ty: NumericType,
        value: UniformValue,
    },
    Block {
        name: String,
        buffer: wgpu::Buffer,
        len: usize,
    },
}

/// A compiled filter pass with its uploaded resources.
///
/// Everything that can be checked without drawing is checked in
/// [`FilterStage::new`]: compile and link, the texture budget, texture
/// layout, and uniform normalization. Name resolution against the shader
/// happens when binding.
pub struct FilterStage {
    pipeline: wgpu::RenderPipeline,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    reflection: ShaderReflection,
    block_buffers: Vec<wgpu::Buffer>,
    textures: Vec<StageTexture>,
    uniforms: Vec<StageUniform>,
}

impl FilterStage {
    /// Builds stage `stage_index` of a chain. Every stage but the first
    /// reserves a texture unit for the previous result.
    pub fn new(gpu: &GpuContext, spec: &StageSpec, stage_index: usize) -> Result<Self> {
        Self::with_target(gpu, spec, stage_index > 0, CHAIN_FORMAT)
    }

    pub(crate) fn with_target(
        gpu: &GpuContext,
        spec: &StageSpec,
        consumes_previous: bool,
        format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let compiled = compile_fragment(&spec.fragment_source)?;

        let groups = compiled.reflection.group_count();
        let max_groups = gpu.max_bind_groups();
        if groups > max_groups {
            return Err(Error::ProgramLink {
                log: format!("shader uses {groups} bind groups but the device allows {max_groups}"),
            });
        }

        let required = spec.textures.len() as u32 + u32::from(consumes_previous);
        let available = gpu.max_sampled_textures();
        if required > available {
            return Err(Error::TooManyTextures { required, available });
        }

        let textures = spec
            .textures
            .iter()
            .map(|texture| upload_texture(gpu, texture))
            .collect::<Result<Vec<_>>>()?;

        let uniforms = spec
            .uniforms
            .iter()
            .map(|uniform| prepare_uniform(gpu, &compiled.reflection, uniform))
            .collect::<Result<Vec<_>>>()?;

        let block_buffers = compiled
            .reflection
            .blocks()
            .iter()
            .enumerate()
            .map(|(i, block)| {
                gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Uniform Block {}", i)),
                    size: block_buffer_size(block.size),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let reflection = compiled.reflection;
        let (bind_group_layouts, pipeline) = gpu
            .capture_validation(|device| {
                let layouts = create_bind_group_layouts(device, &reflection);
                let pipeline = create_render_pipeline(device, compiled.module, &layouts, format);
                (layouts, pipeline)
            })
            .map_err(|e| Error::ProgramLink { log: e.to_string() })?;

        info!(
            "Built stage with {} textures, {} uniforms, {} bind groups",
            textures.len(),
            uniforms.len(),
            bind_group_layouts.len()
        );

        Ok(Self {
            pipeline,
            bind_group_layouts,
            reflection,
            block_buffers,
            textures,
            uniforms,
        })
    }

    /// Starts binding for a draw of this stage's program.
    pub fn activate(&self) -> BindSession<'_> {
        BindSession::new(&self.reflection)
    }

    /// Binds the stage's own textures and uniforms in declaration order.
    pub fn bind_resources<'a>(&'a self, session: &mut BindSession<'a>) -> Result<()> {
        for texture in &self.textures {
            session.bind_texture(&texture.name, &texture.view, &texture.sampler)?;
        }
        for uniform in &self.uniforms {
            match uniform {
                StageUniform::Numeric { name, ty, value } => session.bind_uniform(name, ty, value)?,
                StageUniform::Block { name, buffer, len } => session.bind_block(name, buffer, *len)?,
            }
        }
        Ok(())
    }

    /// Uploads the session's uniform data and builds the bind groups.
    pub fn finish_binding(
        &self,
        gpu: &GpuContext,
        session: BindSession<'_>,
        placeholder: &Placeholder,
    ) -> Vec<wgpu::BindGroup> {
        session.finish(
            &gpu.device,
            &gpu.queue,
            &self.bind_group_layouts,
            &self.block_buffers,
            placeholder,
        )
    }

    /// Records the full-screen triangle into `pass`.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, bind_groups: &[wgpu::BindGroup], vertex_buffer: &wgpu::Buffer) {
        pass.set_pipeline(&self.pipeline);
        for (group, bind_group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(group as u32, bind_group, &[]);
        }
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..ScreenVertex::TRIANGLE.len() as u32, 0..1);
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Normalized value of a numeric uniform, if the stage declares one.
    pub fn uniform_value(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find_map(|uniform| match uniform {
            StageUniform::Numeric { name: n, value, .. } if n == name => Some(value),
            _ => None,
        })
    }
}

fn upload_texture(gpu: &GpuContext, spec: &TextureSpec) -> Result<StageTexture> {
    let pixels = &spec.pixels;
    if pixels.width == 0 || pixels.height == 0 {
        return Err(Error::EmptyTexture {
            name: spec.name.clone(),
        });
    }
    if !pixels.is_tight() {
        return Err(Error::UnsupportedStride {
            name: spec.name.clone(),
            stride: pixels.stride,
            expected: pixels.tight_stride(),
        });
    }
    gpu.check_texture_size(&spec.name, pixels.width, pixels.height)?;

    let size = wgpu::Extent3d {
        width: pixels.width,
        height: pixels.height,
        depth_or_array_layers: 1,
    };
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&spec.name),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &pixels.data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(pixels.stride as u32),
            rows_per_image: Some(pixels.height),
        },
        size,
    );

    let filter = spec.filter.to_wgpu();
    let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("{} Sampler", spec.name)),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    });

    debug!(
        "Uploaded texture {} ({}x{}, {:?})",
        spec.name, pixels.width, pixels.height, spec.filter
    );

    Ok(StageTexture {
        name: spec.name.clone(),
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        _texture: texture,
        sampler,
    })
}

fn prepare_uniform(gpu: &GpuContext, reflection: &ShaderReflection, spec: &UniformSpec) -> Result<StageUniform> {
    match spec.ty {
        UniformType::Numeric(ty) => Ok(StageUniform::Numeric {
            name: spec.name.clone(),
            ty,
            value: normalize(&spec.value, &ty)?,
        }),
        UniformType::Buffer => {
            let mut bytes = linearize_block(&spec.value)?;
            let len = bytes.len();

            // A block the shader does not declare is reported when binding.
            let capacity = match reflection.block(&spec.name) {
                Ok(index) => block_buffer_size(reflection.blocks()[index].size) as usize,
                Err(_) => len,
            };
            if len > capacity {
                return Err(Error::ShapeMismatch {
                    expected: capacity,
                    actual: len,
                });
            }
            bytes.resize(capacity.max(16), 0);

            let buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&spec.name),
                contents: &bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            });
            Ok(StageUniform::Block {
                name: spec.name.clone(),
                buffer,
                len,
            })
        }
    }
}

fn create_render_pipeline(
    device: &wgpu::Device,
    fragment: naga::Module,
    bind_group_layouts: &[wgpu::BindGroupLayout],
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let vertex_module = vertex_module(device);
    let fragment_module = fragment_module(device, fragment);

    let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Stage Pipeline Layout"),
        bind_group_layouts: &layout_refs,
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Stage Render Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some(VERTEX_ENTRY_POINT),
            buffers: &[ScreenVertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some(FRAGMENT_ENTRY_POINT),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
