//! Error type shared by the filter core.

use naga::ShaderStage;
use thiserror::Error;

/// Result alias for filter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building or running a filter chain.
///
/// None of these are retried: each one is an authoring or configuration
/// problem that has to be fixed before the chain is run again.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid definition: {0}")]
    Definition(String),

    #[error("invalid uniform type `{spec}`: {reason}")]
    InvalidTypeSpec { spec: String, reason: String },

    #[error("failed to compile {stage:?} shader:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("failed to link program:\n{log}")]
    ProgramLink { log: String },

    #[error("stage needs {required} texture units but only {available} are available")]
    TooManyTextures { required: u32, available: u32 },

    #[error("texture `{name}` has unsupported row stride {stride} (expected {expected})")]
    UnsupportedStride {
        name: String,
        stride: usize,
        expected: usize,
    },

    #[error("texture `{name}` is {width}x{height}, larger than the device maximum of {max}")]
    TextureTooLarge {
        name: String,
        width: u32,
        height: u32,
        max: u32,
    },

    #[error("texture `{name}` has no pixels")]
    EmptyTexture { name: String },

    #[error("pixel data is {actual} bytes, expected {expected}")]
    PixelDataSize { expected: usize, actual: usize },

    #[error("shape mismatch: expected {expected} components, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("unsupported uniform value kind: {kind}")]
    UnsupportedValueKind { kind: String },

    #[error("binding `{name}` not found in shader")]
    BindingNotFound { name: String },

    #[error("invalid uniform type for `{name}`: {reason}")]
    InvalidUniformType { name: String, reason: String },

    #[error("pipeline has no stages")]
    NoStages,

    #[error("pipeline is already initialized")]
    AlreadyInitialized,

    #[error("pipeline is not initialized")]
    NotInitialized,

    #[error("nothing has been rendered yet")]
    NothingRendered,

    #[error("engine was created without a present format")]
    PresentUnavailable,

    #[error("GPU error: {0}")]
    Gpu(String),
}
