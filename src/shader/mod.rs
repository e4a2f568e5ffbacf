//! GPU filter chain: compilation, binding, stages and the engine that runs them.

pub mod binder;
pub mod compile;
pub mod engine;
pub mod gpu_context;
pub mod reflect;
pub mod stage;

pub use binder::BindSession;
pub use engine::{EngineConfig, EngineState, PingPong, PipelineEngine};
pub use gpu_context::GpuContext;
pub use reflect::ShaderReflection;
pub use stage::{FilterMode, FilterStage, StageSpec, TextureSpec, UniformSpec};

/// Optional `ivec2` uniform that receives the render size.
pub const VIEWPORT_SIZE_BINDING: &str = "outputResolution";

/// Texture every stage after the first samples the previous stage's output
/// from. A sampler named `previousResultSampler` is bound alongside it.
pub const PREVIOUS_RESULT_BINDING: &str = "previousResult";
