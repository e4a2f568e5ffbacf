//! Resource layout of a fragment shader, read from its naga module.
//!
//! This is what turns a symbolic name from a definition into a backend slot:
//! textures and samplers map to `(group, binding)` pairs, uniforms map to a
//! byte offset inside a std140 uniform block.

use crate::error::{Error, Result};
use crate::uniform::{ScalarKind, VectorSize};
use naga::{AddressSpace, ImageClass, ImageDimension, Module, TypeInner};

/// Suffix of the optional sampler paired with a texture binding.
pub const SAMPLER_SUFFIX: &str = "Sampler";

/// Position of a resource in the pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Texture,
    Sampler,
    /// Index into [`ShaderReflection::blocks`].
    UniformBlock(usize),
}

/// A bindable global declared by the shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResource {
    pub name: Option<String>,
    pub slot: BindingSlot,
    pub kind: ResourceKind,
}

/// Array extent of a block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayShape {
    pub len: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberType {
    Numeric {
        scalar: ScalarKind,
        vector_size: VectorSize,
        array: Option<ArrayShape>,
    },
    /// Matrices, structs, booleans: present in the block but not writable
    /// through named uniforms.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMember {
    pub name: String,
    pub offset: u32,
    pub ty: MemberType,
}

/// A std140 uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub instance_name: Option<String>,
    pub type_name: Option<String>,
    pub slot: BindingSlot,
    /// Size of the block in bytes.
    pub size: u32,
    pub members: Vec<BlockMember>,
}

impl UniformBlock {
    fn is_named(&self, name: &str) -> bool {
        self.instance_name.as_deref() == Some(name) || self.type_name.as_deref() == Some(name)
    }
}

/// Where a single uniform element is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub block: usize,
    pub offset: u32,
    pub scalar: ScalarKind,
    pub vector_size: VectorSize,
}

/// Slots for a texture and its optional sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub texture: BindingSlot,
    pub sampler: Option<BindingSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    resources: Vec<ShaderResource>,
    blocks: Vec<UniformBlock>,
}

impl ShaderReflection {
    /// Collects every bound global of the module.
    ///
    /// Resources the binder cannot satisfy are a link failure.
    pub fn from_module(module: &Module) -> Result<Self> {
        let mut reflection = Self::default();

        for (_, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            let slot = BindingSlot {
                group: binding.group,
                binding: binding.binding,
            };
            let display_name = var.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
            let ty = &module.types[var.ty];

            let kind = match (var.space, &ty.inner) {
                (
                    AddressSpace::Handle,
                    TypeInner::Image {
                        dim: ImageDimension::D2,
                        arrayed: false,
                        class:
                            ImageClass::Sampled {
                                kind: naga::ScalarKind::Float,
                                multi: false,
                            },
                    },
                ) => ResourceKind::Texture,
                (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => ResourceKind::Sampler,
                (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                    let members = members
                        .iter()
                        .filter_map(|member| {
                            Some(BlockMember {
                                name: member.name.clone()?,
                                offset: member.offset,
                                ty: member_type(module, member.ty),
                            })
                        })
                        .collect();
                    reflection.blocks.push(UniformBlock {
                        instance_name: var.name.clone(),
                        type_name: ty.name.clone(),
                        slot,
                        size: *span,
                        members,
                    });
                    ResourceKind::UniformBlock(reflection.blocks.len() - 1)
                }
                _ => {
                    return Err(Error::ProgramLink {
                        log: format!(
                            "resource `{display_name}` at group {} binding {} is not a 2D float texture, \
                             filtering sampler or uniform block",
                            slot.group, slot.binding
                        ),
                    })
                }
            };

            reflection.resources.push(ShaderResource {
                name: var.name.clone(),
                slot,
                kind,
            });
        }

        reflection.resources.sort_by_key(|r| r.slot);
        Ok(reflection)
    }

    pub fn resources(&self) -> &[ShaderResource] {
        &self.resources
    }

    pub fn blocks(&self) -> &[UniformBlock] {
        &self.blocks
    }

    /// One past the highest bind group index in use.
    pub fn group_count(&self) -> u32 {
        self.resources
            .iter()
            .map(|r| r.slot.group + 1)
            .max()
            .unwrap_or(0)
    }

    /// Resolves a texture and its `<name>Sampler` companion.
    pub fn texture(&self, name: &str) -> Result<TextureBinding> {
        let texture = self
            .find(name, ResourceKind::Texture)
            .ok_or_else(|| not_found(name))?;
        let sampler = self.find(&format!("{name}{SAMPLER_SUFFIX}"), ResourceKind::Sampler);
        Ok(TextureBinding { texture, sampler })
    }

    /// Resolves `name` or `name[i]` to a writable location.
    pub fn uniform(&self, name: &str) -> Result<UniformLocation> {
        let (base, index) = split_index(name);

        for (block_index, block) in self.blocks.iter().enumerate() {
            let Some(member) = block.members.iter().find(|m| m.name == base) else {
                continue;
            };
            let MemberType::Numeric {
                scalar,
                vector_size,
                array,
            } = member.ty
            else {
                return Err(Error::InvalidUniformType {
                    name: name.to_string(),
                    reason: "shader declares a type that cannot be written as a uniform".to_string(),
                });
            };

            let offset = match (array, index) {
                (_, 0) => member.offset,
                (Some(shape), i) if i < shape.len => member.offset + i * shape.stride,
                _ => return Err(not_found(name)),
            };

            return Ok(UniformLocation {
                block: block_index,
                offset,
                scalar,
                vector_size,
            });
        }

        Err(not_found(name))
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        let (base, _) = split_index(name);
        self.blocks
            .iter()
            .any(|block| block.members.iter().any(|m| m.name == base))
    }

    /// Resolves a whole uniform block by instance or block name.
    pub fn block(&self, name: &str) -> Result<usize> {
        self.blocks
            .iter()
            .position(|block| block.is_named(name))
            .ok_or_else(|| not_found(name))
    }

    /// Number of texture slots the shader declares.
    pub fn texture_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Texture)
            .count()
    }

    fn find(&self, name: &str, kind: ResourceKind) -> Option<BindingSlot> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name.as_deref() == Some(name))
            .map(|r| r.slot)
    }
}

fn not_found(name: &str) -> Error {
    Error::BindingNotFound {
        name: name.to_string(),
    }
}

/// Splits `name[3]` into (`name`, 3). Plain names are index 0.
fn split_index(name: &str) -> (&str, u32) {
    if let Some(open) = name.rfind('[') {
        if let Some(digits) = name[open + 1..].strip_suffix(']') {
            if let Ok(index) = digits.parse() {
                return (&name[..open], index);
            }
        }
    }
    (name, 0)
}

fn member_type(module: &Module, ty: naga::Handle<naga::Type>) -> MemberType {
    match module.types[ty].inner {
        TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(len),
            stride,
        } => match element_type(&module.types[base].inner) {
            Some((scalar, vector_size)) => MemberType::Numeric {
                scalar,
                vector_size,
                array: Some(ArrayShape {
                    len: len.get(),
                    stride,
                }),
            },
            None => MemberType::Other,
        },
        ref inner => match element_type(inner) {
            Some((scalar, vector_size)) => MemberType::Numeric {
                scalar,
                vector_size,
                array: None,
            },
            None => MemberType::Other,
        },
    }
}

fn element_type(inner: &TypeInner) -> Option<(ScalarKind, VectorSize)> {
    match *inner {
        TypeInner::Scalar(scalar) => Some((scalar_kind(scalar)?, VectorSize::One)),
        TypeInner::Vector { size, scalar } => {
            let vector_size = match size {
                naga::VectorSize::Bi => VectorSize::Two,
                naga::VectorSize::Tri => VectorSize::Three,
                naga::VectorSize::Quad => VectorSize::Four,
            };
            Some((scalar_kind(scalar)?, vector_size))
        }
        _ => None,
    }
}

fn scalar_kind(scalar: naga::Scalar) -> Option<ScalarKind> {
    match (scalar.kind, scalar.width) {
        (naga::ScalarKind::Float, 4) => Some(ScalarKind::Float),
        (naga::ScalarKind::Sint, 4) => Some(ScalarKind::Int),
        (naga::ScalarKind::Uint, 4) => Some(ScalarKind::Uint),
        _ => None,
    }
}
