//! Uniform type descriptors and value normalization.

mod normalize;
mod types;
mod value;

pub use normalize::{linearize_block, normalize};
pub use types::{NumericType, ScalarKind, UniformType, VectorSize};
pub use value::{RawValue, UniformValue};
