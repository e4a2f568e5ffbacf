//! Binding of textures and uniform data to a stage's resource slots.

use super::reflect::{BindingSlot, ResourceKind, ShaderReflection, UniformLocation};
use crate::error::{Error, Result};
use crate::uniform::{NumericType, ScalarKind, UniformType, UniformValue, VectorSize};
use std::collections::BTreeMap;
use tracing::debug;

/// Writes element `element` of a value into `dst`. Returns false when the
/// value is of another kind or too short.
type UniformWrite = fn(dst: &mut [u8], value: &UniformValue, element: usize) -> bool;

/// Fixed-arity writers keyed by scalar kind and vector width.
const UNIFORM_WRITERS: [(ScalarKind, VectorSize, UniformWrite); 12] = [
    (ScalarKind::Float, VectorSize::One, write_float::<1>),
    (ScalarKind::Float, VectorSize::Two, write_float::<2>),
    (ScalarKind::Float, VectorSize::Three, write_float::<3>),
    (ScalarKind::Float, VectorSize::Four, write_float::<4>),
    (ScalarKind::Int, VectorSize::One, write_int::<1>),
    (ScalarKind::Int, VectorSize::Two, write_int::<2>),
    (ScalarKind::Int, VectorSize::Three, write_int::<3>),
    (ScalarKind::Int, VectorSize::Four, write_int::<4>),
    (ScalarKind::Uint, VectorSize::One, write_uint::<1>),
    (ScalarKind::Uint, VectorSize::Two, write_uint::<2>),
    (ScalarKind::Uint, VectorSize::Three, write_uint::<3>),
    (ScalarKind::Uint, VectorSize::Four, write_uint::<4>),
];

fn uniform_writer(scalar: ScalarKind, vector_size: VectorSize) -> Option<UniformWrite> {
    UNIFORM_WRITERS
        .iter()
        .find(|(k, s, _)| *k == scalar && *s == vector_size)
        .map(|(_, _, write)| *write)
}

fn write_float<const N: usize>(dst: &mut [u8], value: &UniformValue, element: usize) -> bool {
    match value {
        UniformValue::Float(values) => write_run::<f32, N>(dst, values, element),
        _ => false,
    }
}

fn write_int<const N: usize>(dst: &mut [u8], value: &UniformValue, element: usize) -> bool {
    match value {
        UniformValue::Int(values) => write_run::<i32, N>(dst, values, element),
        _ => false,
    }
}

fn write_uint<const N: usize>(dst: &mut [u8], value: &UniformValue, element: usize) -> bool {
    match value {
        UniformValue::Uint(values) => write_run::<u32, N>(dst, values, element),
        _ => false,
    }
}

fn write_run<T: bytemuck::Pod, const N: usize>(dst: &mut [u8], values: &[T], element: usize) -> bool {
    let Some(run) = values.get(element * N..(element + 1) * N) else {
        return false;
    };
    let bytes: &[u8] = bytemuck::cast_slice(run);
    let Some(target) = dst.get_mut(..bytes.len()) else {
        return false;
    };
    target.copy_from_slice(bytes);
    true
}

/// Name of element `index` of an array uniform: the bare name for 0,
/// `name[i]` otherwise.
pub fn indexed_name(name: &str, index: usize) -> String {
    if index == 0 {
        name.to_string()
    } else {
        format!("{name}[{index}]")
    }
}

/// Staging size of a block: its span rounded up to 16 bytes.
pub fn block_buffer_size(size: u32) -> u64 {
    (size.max(16) as u64).next_multiple_of(16)
}

enum Bound<'a> {
    Texture(&'a wgpu::TextureView),
    Sampler(&'a wgpu::Sampler),
    Buffer(&'a wgpu::Buffer),
}

/// Stand-ins for slots a shader declares but a stage never binds.
pub struct Placeholder {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl Placeholder {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Placeholder Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0u8; 4],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Placeholder Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            _texture: texture,
            view,
            sampler,
        }
    }
}

/// Bind group layouts for every group the shader uses, gaps included.
pub fn create_bind_group_layouts(
    device: &wgpu::Device,
    reflection: &ShaderReflection,
) -> Vec<wgpu::BindGroupLayout> {
    (0..reflection.group_count())
        .map(|group| {
            let entries: Vec<_> = reflection
                .resources()
                .iter()
                .filter(|r| r.slot.group == group)
                .map(|r| wgpu::BindGroupLayoutEntry {
                    binding: r.slot.binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: match r.kind {
                        ResourceKind::Texture => wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        ResourceKind::Sampler => {
                            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                        }
                        ResourceKind::UniformBlock(_) => wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                    },
                    count: None,
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("Stage Bind Group Layout {}", group)),
                entries: &entries,
            })
        })
        .collect()
}

/// Binding state for one draw of one program.
///
/// Created by [`FilterStage::activate`](super::FilterStage::activate) and
/// consumed by [`finish`](Self::finish). Uniform data is written into a CPU
/// copy of each block and uploaded when the session finishes.
///
/// A block is fed either by numeric uniforms or by one buffer uniform,
/// never both.
pub struct BindSession<'a> {
    reflection: &'a ShaderReflection,
    bound: BTreeMap<BindingSlot, Bound<'a>>,
    staging: Vec<Vec<u8>>,
    whole_blocks: Vec<bool>,
    numeric_blocks: Vec<bool>,
}

impl<'a> BindSession<'a> {
    pub fn new(reflection: &'a ShaderReflection) -> Self {
        let staging = reflection
            .blocks()
            .iter()
            .map(|block| vec![0u8; block_buffer_size(block.size) as usize])
            .collect();
        Self {
            reflection,
            bound: BTreeMap::new(),
            staging,
            whole_blocks: vec![false; reflection.blocks().len()],
            numeric_blocks: vec![false; reflection.blocks().len()],
        }
    }

    /// Attaches a texture, and its sampler when the shader declares one.
    pub fn bind_texture(
        &mut self,
        name: &str,
        view: &'a wgpu::TextureView,
        sampler: &'a wgpu::Sampler,
    ) -> Result<()> {
        let binding = self.reflection.texture(name)?;
        self.bound.insert(binding.texture, Bound::Texture(view));
        if let Some(slot) = binding.sampler {
            self.bound.insert(slot, Bound::Sampler(sampler));
        }
        Ok(())
    }

    /// Writes a normalized uniform. Array elements after the first go to
    /// `name[1]`, `name[2]`, ...
    pub fn bind_uniform(&mut self, name: &str, ty: &NumericType, value: &UniformValue) -> Result<()> {
        self.write_uniform(name, ty, value, true)
    }

    /// Like [`bind_uniform`](Self::bind_uniform), but a shader without the
    /// binding is not an error, and a block already bound to a buffer keeps
    /// the buffer's value. Returns whether anything was written.
    pub fn bind_optional_uniform(&mut self, name: &str, ty: &NumericType, value: &UniformValue) -> Result<bool> {
        if !self.reflection.has_uniform(name) {
            return Ok(false);
        }
        let location = self.reflection.uniform(name)?;
        if self.whole_blocks[location.block] {
            return Ok(false);
        }
        self.write_uniform(name, ty, value, false)?;
        Ok(true)
    }

    fn write_uniform(&mut self, name: &str, ty: &NumericType, value: &UniformValue, claim: bool) -> Result<()> {
        let write = uniform_writer(ty.scalar, ty.vector_size).ok_or_else(|| Error::InvalidUniformType {
            name: name.to_string(),
            reason: format!("no writer for {:?} x{}", ty.scalar, ty.width()),
        })?;

        let width = ty.width();
        let elements = if ty.is_array { value.len() / width } else { 1 };

        for element in 0..elements {
            let element_name = indexed_name(name, element);
            let location = self.reflection.uniform(&element_name)?;
            check_declared(&element_name, &location, ty)?;
            if self.whole_blocks[location.block] {
                return Err(Error::InvalidUniformType {
                    name: element_name,
                    reason: "its block is already bound to a buffer uniform".to_string(),
                });
            }
            if claim {
                self.numeric_blocks[location.block] = true;
            }

            let dst = self.staging[location.block]
                .get_mut(location.offset as usize..)
                .unwrap_or_default();
            if !write(dst, value, element) {
                return Err(Error::InvalidUniformType {
                    name: element_name,
                    reason: format!("value does not fit {}", UniformType::Numeric(*ty)),
                });
            }
        }

        debug!("bound uniform {} ({} elements)", name, elements);
        Ok(())
    }

    /// Binds a whole uniform block to a caller-owned buffer of `len` bytes.
    ///
    /// Values written by [`bind_optional_uniform`](Self::bind_optional_uniform)
    /// are replaced by the buffer. Values from
    /// [`bind_uniform`](Self::bind_uniform) are an error.
    pub fn bind_block(&mut self, name: &str, buffer: &'a wgpu::Buffer, len: usize) -> Result<()> {
        let index = self.reflection.block(name)?;
        if self.numeric_blocks[index] {
            return Err(Error::InvalidUniformType {
                name: name.to_string(),
                reason: "block already holds numeric uniforms".to_string(),
            });
        }
        let block = &self.reflection.blocks()[index];
        let capacity = block_buffer_size(block.size) as usize;
        if len > capacity {
            return Err(Error::ShapeMismatch {
                expected: capacity,
                actual: len,
            });
        }
        self.bound.insert(block.slot, Bound::Buffer(buffer));
        self.whole_blocks[index] = true;
        Ok(())
    }

    /// Current CPU copy of a uniform block.
    pub fn staging(&self, block: usize) -> &[u8] {
        &self.staging[block]
    }

    /// Uploads staged uniform data into `block_buffers` and builds one bind
    /// group per layout. Unbound slots get placeholders.
    pub fn finish(
        self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &[wgpu::BindGroupLayout],
        block_buffers: &[wgpu::Buffer],
        placeholder: &Placeholder,
    ) -> Vec<wgpu::BindGroup> {
        for (index, data) in self.staging.iter().enumerate() {
            if !self.whole_blocks[index] {
                queue.write_buffer(&block_buffers[index], 0, data);
            }
        }

        layouts
            .iter()
            .enumerate()
            .map(|(group, layout)| {
                let entries: Vec<_> = self
                    .reflection
                    .resources()
                    .iter()
                    .filter(|r| r.slot.group == group as u32)
                    .map(|r| {
                        let resource = match (self.bound.get(&r.slot), r.kind) {
                            (Some(Bound::Texture(view)), _) => wgpu::BindingResource::TextureView(view),
                            (Some(Bound::Sampler(sampler)), _) => wgpu::BindingResource::Sampler(sampler),
                            (Some(Bound::Buffer(buffer)), _) => buffer.as_entire_binding(),
                            (None, ResourceKind::Texture) => {
                                debug!("slot {:?} left unbound, using placeholder", r.slot);
                                wgpu::BindingResource::TextureView(&placeholder.view)
                            }
                            (None, ResourceKind::Sampler) => wgpu::BindingResource::Sampler(&placeholder.sampler),
                            (None, ResourceKind::UniformBlock(index)) => block_buffers[index].as_entire_binding(),
                        };
                        wgpu::BindGroupEntry {
                            binding: r.slot.binding,
                            resource,
                        }
                    })
                    .collect();
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Stage Bind Group {}", group)),
                    layout,
                    entries: &entries,
                })
            })
            .collect()
    }
}

fn check_declared(name: &str, location: &UniformLocation, ty: &NumericType) -> Result<()> {
    if location.scalar == ty.scalar && location.vector_size == ty.vector_size {
        return Ok(());
    }
    let declared = NumericType::new(location.scalar, location.vector_size, false);
    Err(Error::InvalidUniformType {
        name: name.to_string(),
        reason: format!(
            "shader declares {}, definition declares {}",
            UniformType::Numeric(declared),
            UniformType::Numeric(NumericType { is_array: false, ..*ty })
        ),
    })
}
