//! glslfilter: chains GLSL fragment shader passes over an image on the GPU.
//!
//! A definition lists stages; each stage is a fragment shader with its own
//! textures and uniforms and samples the previous stage's output. The result
//! is shown in a window or exported as a PNG.

pub mod definition;
pub mod error;
pub mod frame;
pub mod loader;
pub mod output;
pub mod shader;
pub mod uniform;
pub mod utils;

pub use error::{Error, Result};
