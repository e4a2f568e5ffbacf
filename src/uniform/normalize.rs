//! Coercion of raw definition values into typed, shape-checked uniform data.

use super::types::{NumericType, ScalarKind};
use super::value::{RawValue, UniformValue};
use crate::error::{Error, Result};

/// Target scalar of a normalization run.
trait Coerce: Copy {
    fn from_float(v: f64) -> Self;
    fn from_int(v: i64) -> Self;
    fn from_uint(v: u64) -> Self;
}

impl Coerce for f32 {
    fn from_float(v: f64) -> Self {
        v as f32
    }
    fn from_int(v: i64) -> Self {
        v as f32
    }
    fn from_uint(v: u64) -> Self {
        v as f32
    }
}

// Float to integer conversions truncate toward zero and saturate; NaN is 0.
impl Coerce for i32 {
    fn from_float(v: f64) -> Self {
        v as i32
    }
    fn from_int(v: i64) -> Self {
        v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
    fn from_uint(v: u64) -> Self {
        v.min(i32::MAX as u64) as i32
    }
}

// Negative sources clamp to zero rather than wrapping.
impl Coerce for u32 {
    fn from_float(v: f64) -> Self {
        v as u32
    }
    fn from_int(v: i64) -> Self {
        v.clamp(0, u32::MAX as i64) as u32
    }
    fn from_uint(v: u64) -> Self {
        v.min(u32::MAX as u64) as u32
    }
}

/// Normalizes `raw` against a declared numeric type.
///
/// Non-array types produce exactly one element of `ty.width()` components.
/// Array types take a sequence and produce one element per entry.
pub fn normalize(raw: &RawValue, ty: &NumericType) -> Result<UniformValue> {
    Ok(match ty.scalar {
        ScalarKind::Float => UniformValue::Float(normalize_as(raw, ty)?),
        ScalarKind::Int => UniformValue::Int(normalize_as(raw, ty)?),
        ScalarKind::Uint => UniformValue::Uint(normalize_as(raw, ty)?),
    })
}

fn normalize_as<T: Coerce>(raw: &RawValue, ty: &NumericType) -> Result<Vec<T>> {
    if !ty.is_array {
        let run = flatten::<T>(raw)?;
        check_run(&run, ty.width())?;
        return Ok(run);
    }

    let RawValue::Sequence(elements) = raw else {
        return Err(Error::UnsupportedValueKind {
            kind: format!("{} where an array was declared", raw.kind_name()),
        });
    };

    let mut out = Vec::with_capacity(elements.len() * ty.width());
    for element in elements {
        let run = flatten::<T>(element)?;
        check_run(&run, ty.width())?;
        out.extend(run);
    }
    Ok(out)
}

/// Depth-first flattening of scalars and nested sequences into one run.
fn flatten<T: Coerce>(raw: &RawValue) -> Result<Vec<T>> {
    let mut out = Vec::new();
    flatten_into(raw, &mut out)?;
    Ok(out)
}

fn flatten_into<T: Coerce>(raw: &RawValue, out: &mut Vec<T>) -> Result<()> {
    match raw {
        RawValue::Float(v) => out.push(T::from_float(*v)),
        RawValue::Int(v) => out.push(T::from_int(*v)),
        RawValue::Uint(v) => out.push(T::from_uint(*v)),
        RawValue::Sequence(items) => {
            for item in items {
                flatten_into(item, out)?;
            }
        }
        other => {
            return Err(Error::UnsupportedValueKind {
                kind: other.kind_name().to_string(),
            })
        }
    }
    Ok(())
}

fn check_run<T>(run: &[T], expected: usize) -> Result<()> {
    if run.len() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            actual: run.len(),
        });
    }
    Ok(())
}

const WORD: usize = 4;

/// Lays out a nested value as a std140 uniform block image.
///
/// Each numeric leaf is one 32-bit word of its own kind. A nested sequence
/// is aligned to 8 bytes when it has two entries and to 16 bytes when it
/// has more, mirroring vec2 and vec3/vec4 alignment. The image is padded to
/// a multiple of 16 bytes.
pub fn linearize_block(raw: &RawValue) -> Result<Vec<u8>> {
    let RawValue::Sequence(items) = raw else {
        return Err(Error::UnsupportedValueKind {
            kind: format!("{} where a buffer block was declared", raw.kind_name()),
        });
    };

    let mut bytes = Vec::new();
    linearize_items(items, &mut bytes)?;
    pad_to(&mut bytes, 16);
    Ok(bytes)
}

fn linearize_items(items: &[RawValue], bytes: &mut Vec<u8>) -> Result<()> {
    for item in items {
        match item {
            RawValue::Float(v) => bytes.extend_from_slice(&(*v as f32).to_le_bytes()),
            RawValue::Int(v) => bytes.extend_from_slice(&i32::from_int(*v).to_le_bytes()),
            RawValue::Uint(v) => bytes.extend_from_slice(&u32::from_uint(*v).to_le_bytes()),
            RawValue::Sequence(nested) => {
                pad_to(bytes, std140_alignment(nested.len()));
                linearize_items(nested, bytes)?;
            }
            other => {
                return Err(Error::UnsupportedValueKind {
                    kind: other.kind_name().to_string(),
                })
            }
        }
    }
    Ok(())
}

fn std140_alignment(len: usize) -> usize {
    match len {
        0 | 1 => WORD,
        2 => WORD * 2,
        _ => WORD * 4,
    }
}

fn pad_to(bytes: &mut Vec<u8>, alignment: usize) {
    let rem = bytes.len() % alignment;
    if rem != 0 {
        bytes.resize(bytes.len() + alignment - rem, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniform::types::VectorSize;

    fn ty(scalar: ScalarKind, size: VectorSize, is_array: bool) -> NumericType {
        NumericType::new(scalar, size, is_array)
    }

    fn seq(values: Vec<RawValue>) -> RawValue {
        RawValue::Sequence(values)
    }

    #[test]
    fn float_to_int_truncates_toward_zero() {
        let int = ty(ScalarKind::Int, VectorSize::One, false);
        assert_eq!(
            normalize(&RawValue::Float(3.7), &int).unwrap(),
            UniformValue::Int(vec![3])
        );
        assert_eq!(
            normalize(&RawValue::Float(-3.7), &int).unwrap(),
            UniformValue::Int(vec![-3])
        );
    }

    #[test]
    fn uint_vector_from_mixed_sequence() {
        let uvec3 = ty(ScalarKind::Uint, VectorSize::Three, false);
        let raw = seq(vec![RawValue::Uint(1), RawValue::Int(2), RawValue::Float(3.0)]);
        assert_eq!(
            normalize(&raw, &uvec3).unwrap(),
            UniformValue::Uint(vec![1, 2, 3])
        );
    }

    #[test]
    fn array_of_vectors_is_flattened_in_order() {
        let vec2_array = ty(ScalarKind::Float, VectorSize::Two, true);
        let raw: RawValue = vec![vec![1u64, 2], vec![3, 4]].into();
        assert_eq!(
            normalize(&raw, &vec2_array).unwrap(),
            UniformValue::Float(vec![1.0, 2.0, 3.0, 4.0])
        );
    }

    #[test]
    fn scalar_array_takes_one_component_per_entry() {
        let uint_array = ty(ScalarKind::Uint, VectorSize::One, true);
        let raw: RawValue = vec![5u64, 6, 7].into();
        assert_eq!(
            normalize(&raw, &uint_array).unwrap(),
            UniformValue::Uint(vec![5, 6, 7])
        );
    }

    #[test]
    fn short_vector_is_a_shape_mismatch() {
        let vec3 = ty(ScalarKind::Float, VectorSize::Three, false);
        let raw: RawValue = vec![1u64, 2].into();
        match normalize(&raw, &vec3) {
            Err(Error::ShapeMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn array_element_with_wrong_width_fails() {
        let vec2_array = ty(ScalarKind::Float, VectorSize::Two, true);
        let raw = seq(vec![
            vec![1u64, 2].into(),
            vec![3u64, 4, 5].into(),
        ]);
        assert!(matches!(
            normalize(&raw, &vec2_array),
            Err(Error::ShapeMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn non_numeric_leaves_are_rejected() {
        let vec2 = ty(ScalarKind::Float, VectorSize::Two, false);
        let raw = seq(vec![RawValue::Float(1.0), RawValue::Text("x".into())]);
        assert!(matches!(
            normalize(&raw, &vec2),
            Err(Error::UnsupportedValueKind { kind }) if kind == "string"
        ));
    }

    #[test]
    fn array_type_needs_a_sequence() {
        let float_array = ty(ScalarKind::Float, VectorSize::One, true);
        assert!(matches!(
            normalize(&RawValue::Float(1.0), &float_array),
            Err(Error::UnsupportedValueKind { .. })
        ));
    }

    #[test]
    fn negative_values_saturate_to_zero_for_uint() {
        let uint = ty(ScalarKind::Uint, VectorSize::One, false);
        assert_eq!(
            normalize(&RawValue::Float(-2.5), &uint).unwrap(),
            UniformValue::Uint(vec![0])
        );
        assert_eq!(
            normalize(&RawValue::Int(-1), &uint).unwrap(),
            UniformValue::Uint(vec![0])
        );
        assert_eq!(
            normalize(&RawValue::Uint(u64::MAX), &uint).unwrap(),
            UniformValue::Uint(vec![u32::MAX])
        );
    }

    #[test]
    fn out_of_range_ints_saturate() {
        let int = ty(ScalarKind::Int, VectorSize::One, false);
        assert_eq!(
            normalize(&RawValue::Int(i64::MIN), &int).unwrap(),
            UniformValue::Int(vec![i32::MIN])
        );
        assert_eq!(
            normalize(&RawValue::Float(f64::NAN), &int).unwrap(),
            UniformValue::Int(vec![0])
        );
    }

    #[test]
    fn output_length_is_a_whole_number_of_elements() {
        let cases = [
            (ty(ScalarKind::Float, VectorSize::One, false), RawValue::Float(1.0)),
            (ty(ScalarKind::Int, VectorSize::Four, false), vec![1i64, 2, 3, 4].into()),
            (ty(ScalarKind::Uint, VectorSize::Three, true), vec![vec![1u64, 2, 3], vec![4, 5, 6]].into()),
            (ty(ScalarKind::Float, VectorSize::Two, true), RawValue::Sequence(Vec::new())),
        ];
        for (ty, raw) in cases {
            let value = normalize(&raw, &ty).unwrap();
            assert_eq!(value.len() % ty.width(), 0);
            if !ty.is_array {
                assert_eq!(value.len(), ty.width());
            }
        }
    }

    #[test]
    fn normalization_is_deterministic() {
        let ty = ty(ScalarKind::Float, VectorSize::Two, true);
        let raw: RawValue = vec![vec![0.25f64, 0.5], vec![0.75, 1.0]].into();
        assert_eq!(normalize(&raw, &ty).unwrap(), normalize(&raw, &ty).unwrap());
    }

    #[test]
    fn block_aligns_nested_vectors() {
        let raw = seq(vec![
            RawValue::Float(1.0),
            vec![2.0f64, 3.0, 4.0].into(),
            RawValue::Int(-1),
            vec![5u64, 6].into(),
        ]);
        let bytes = linearize_block(&raw).unwrap();

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();
        assert_eq!(words.len(), 12);
        assert_eq!(f32::from_bits(words[0]), 1.0);
        assert_eq!(&words[1..4], &[0, 0, 0]);
        assert_eq!(f32::from_bits(words[4]), 2.0);
        assert_eq!(f32::from_bits(words[6]), 4.0);
        assert_eq!(words[7] as i32, -1);
        assert_eq!(&words[8..10], &[5, 6]);
    }

    #[test]
    fn block_requires_a_sequence() {
        assert!(linearize_block(&RawValue::Float(1.0)).is_err());
        assert!(linearize_block(&seq(vec![RawValue::Bool(true)])).is_err());
    }
}
