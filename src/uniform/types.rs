//! Declared uniform types, parsed from strings like `[]floatvec3` or `uint`.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

const ARRAY_PREFIX: &str = "[]";
const VEC_PREFIX: &str = "vec";
const BUFFER: &str = "buffer";

/// Scalar component kind of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
}

impl ScalarKind {
    fn keyword(self) -> &'static str {
        match self {
            ScalarKind::Float => "float",
            ScalarKind::Int => "int",
            ScalarKind::Uint => "uint",
        }
    }
}

/// Number of components per element. `One` is a plain scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VectorSize {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl VectorSize {
    pub fn components(self) -> usize {
        self as usize
    }

    pub fn from_components(n: usize) -> Option<Self> {
        match n {
            1 => Some(VectorSize::One),
            2 => Some(VectorSize::Two),
            3 => Some(VectorSize::Three),
            4 => Some(VectorSize::Four),
            _ => None,
        }
    }
}

/// Shape of a scalar, vector or array-of-vector uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumericType {
    pub scalar: ScalarKind,
    pub vector_size: VectorSize,
    pub is_array: bool,
}

impl NumericType {
    pub const fn new(scalar: ScalarKind, vector_size: VectorSize, is_array: bool) -> Self {
        Self {
            scalar,
            vector_size,
            is_array,
        }
    }

    /// Components in a single element, never zero.
    pub fn width(&self) -> usize {
        self.vector_size.components()
    }
}

/// A declared uniform type.
///
/// `Buffer` binds a whole uniform block and does not compose with the array
/// or vector modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Numeric(NumericType),
    Buffer,
}

impl UniformType {
    /// Parses the compact textual form. Matching is case-insensitive.
    pub fn parse(text: &str) -> Result<Self> {
        let lowered = text.trim().to_ascii_lowercase();
        let invalid = |reason: &str| Error::InvalidTypeSpec {
            spec: text.to_string(),
            reason: reason.to_string(),
        };

        if lowered == BUFFER {
            return Ok(UniformType::Buffer);
        }

        let (is_array, rest) = match lowered.strip_prefix(ARRAY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, lowered.as_str()),
        };

        let (scalar, rest) = [ScalarKind::Float, ScalarKind::Int, ScalarKind::Uint]
            .into_iter()
            .find_map(|kind| rest.strip_prefix(kind.keyword()).map(|rest| (kind, rest)))
            .ok_or_else(|| invalid("scalar type must be one of float, int, uint"))?;

        let vector_size = if rest.is_empty() {
            VectorSize::One
        } else {
            let digits = rest
                .strip_prefix(VEC_PREFIX)
                .ok_or_else(|| invalid("expected a `vec2`, `vec3` or `vec4` suffix"))?;
            match digits {
                "2" => VectorSize::Two,
                "3" => VectorSize::Three,
                "4" => VectorSize::Four,
                _ => return Err(invalid("vector size must be 2, 3 or 4")),
            }
        };

        Ok(UniformType::Numeric(NumericType::new(scalar, vector_size, is_array)))
    }
}

impl FromStr for UniformType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformType::Buffer => f.write_str(BUFFER),
            UniformType::Numeric(ty) => {
                if ty.is_array {
                    f.write_str(ARRAY_PREFIX)?;
                }
                f.write_str(ty.scalar.keyword())?;
                if ty.vector_size != VectorSize::One {
                    write!(f, "{}{}", VEC_PREFIX, ty.width())?;
                }
                Ok(())
            }
        }
    }
}
