//! Filter chain definition as read from YAML or JSON.

use crate::error::{Error, Result};
use crate::shader::FilterMode;
use crate::uniform::{RawValue, UniformType};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Output size of the chain.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RenderDefinition {
    #[serde(alias = "Width")]
    pub width: u32,
    #[serde(alias = "Height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TextureDefinition {
    #[serde(alias = "Path")]
    pub path: PathBuf,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Filter", default, deserialize_with = "deserialize_filter")]
    pub filter: FilterMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UniformDefinition {
    #[serde(alias = "Name")]
    pub name: String,
    /// Type spec such as `floatvec3`, `[]int` or `buffer`.
    #[serde(rename = "type", alias = "Type")]
    pub type_spec: String,
    #[serde(alias = "Value", default)]
    pub value: RawValue,
}

impl UniformDefinition {
    pub fn uniform_type(&self) -> Result<UniformType> {
        UniformType::parse(&self.type_spec)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StageDefinition {
    #[serde(rename = "fragmentShaderPath", alias = "FragmentShaderPath")]
    pub fragment_shader_path: PathBuf,
    #[serde(alias = "Textures", default)]
    pub textures: Vec<TextureDefinition>,
    #[serde(alias = "Uniforms", default)]
    pub uniforms: Vec<UniformDefinition>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Definition {
    #[serde(alias = "Render")]
    pub render: RenderDefinition,
    #[serde(alias = "Stages", default)]
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
}

impl DefinitionFormat {
    /// JSON for `.json` files, YAML for everything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DefinitionFormat::Json,
            _ => DefinitionFormat::Yaml,
        }
    }
}

impl Definition {
    /// Parses and validates a definition.
    ///
    /// Every uniform type spec is checked here, so a bad spec fails before
    /// any GPU resource exists.
    pub fn parse(text: &str, format: DefinitionFormat) -> Result<Self> {
        let definition: Definition = match format {
            DefinitionFormat::Yaml => serde_yaml::from_str(text).map_err(|e| Error::Definition(e.to_string()))?,
            DefinitionFormat::Json => serde_json::from_str(text).map_err(|e| Error::Definition(e.to_string()))?,
        };
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<()> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(Error::Definition(format!(
                "render size {}x{} is empty",
                self.render.width, self.render.height
            )));
        }
        for stage in &self.stages {
            for uniform in &stage.uniforms {
                uniform.uniform_type()?;
            }
        }
        Ok(())
    }
}

fn deserialize_filter<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<FilterMode, D::Error> {
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.as_deref().map(FilterMode::from_name).unwrap_or_default())
}
