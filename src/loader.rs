//! Loading of definitions, shader sources and textures from disk.

use crate::definition::{Definition, DefinitionFormat, StageDefinition, TextureDefinition};
use crate::frame::PixelBuffer;
use crate::shader::{FilterStage, GpuContext, StageSpec, TextureSpec, UniformSpec};
use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// A parsed definition and the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedDefinition {
    pub definition: Definition,
    pub base_dir: PathBuf,
}

/// Reads a definition from `path`, or from stdin when there is none.
pub fn read_definition(path: Option<&Path>) -> Result<LoadedDefinition> {
    let (text, format, base_dir) = match path {
        Some(path) => {
            info!("Loading definition from {:?}", path);
            let text = fs::read_to_string(path).with_context(|| format!("failed to read definition {:?}", path))?;
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (text, DefinitionFormat::from_path(path), base_dir)
        }
        None => {
            info!("Loading definition from stdin");
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read definition from stdin")?;
            (text, DefinitionFormat::Yaml, PathBuf::new())
        }
    };

    let definition = Definition::parse(&text, format)?;
    Ok(LoadedDefinition { definition, base_dir })
}

impl LoadedDefinition {
    /// Resolves a path from the definition against its directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Loads every stage's shader and textures.
    pub fn stage_specs(&self) -> Result<Vec<StageSpec>> {
        self.definition
            .stages
            .iter()
            .map(|stage| self.stage_spec(stage))
            .collect()
    }

    fn stage_spec(&self, stage: &StageDefinition) -> Result<StageSpec> {
        let fragment_source = load_fragment_shader(&self.resolve(&stage.fragment_shader_path))?;
        let textures = stage
            .textures
            .iter()
            .map(|texture| self.texture_spec(texture))
            .collect::<Result<Vec<_>>>()?;
        let uniforms = stage
            .uniforms
            .iter()
            .map(|uniform| -> Result<UniformSpec> {
                Ok(UniformSpec {
                    name: uniform.name.clone(),
                    ty: uniform.uniform_type()?,
                    value: uniform.value.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StageSpec {
            fragment_source,
            textures,
            uniforms,
        })
    }

    fn texture_spec(&self, texture: &TextureDefinition) -> Result<TextureSpec> {
        Ok(TextureSpec {
            name: texture.name.clone(),
            pixels: load_texture(&self.resolve(&texture.path))?,
            filter: texture.filter,
        })
    }
}

pub fn load_fragment_shader(path: &Path) -> Result<String> {
    info!("Loading shader from {:?}", path);
    fs::read_to_string(path).with_context(|| format!("failed to read shader {:?}", path))
}

/// Decodes an image file into RGBA8 pixels.
pub fn load_texture(path: &Path) -> Result<PixelBuffer> {
    info!("Loading texture from {:?}", path);
    let image = image::open(path)
        .with_context(|| format!("failed to decode texture {:?}", path))?
        .to_rgba8();
    Ok(PixelBuffer::from(image))
}

/// Builds the stages of a chain in order, stopping at the first failure.
pub fn build_stages(gpu: &GpuContext, specs: &[StageSpec]) -> Result<Vec<FilterStage>> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| FilterStage::new(gpu, spec, i).with_context(|| format!("failed to build stage {}", i)))
        .collect()
}
