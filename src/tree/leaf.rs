//! Leaf values: scalars, strings, the explicit null, and typed n-d arrays.

use std::fmt;

/// Homogeneous element buffer of an [`NdArray`].
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    I32(Vec<i32>),
    I64(Vec<i64>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::I32(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::U32(v) => v.len(),
            ArrayData::U64(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the element type, using the layout vocabulary of the binary protocol.
    pub fn dtype(&self) -> &'static str {
        match self {
            ArrayData::I32(_) => "int32",
            ArrayData::I64(_) => "int64",
            ArrayData::U32(_) => "uint32",
            ArrayData::U64(_) => "uint64",
            ArrayData::F32(_) => "float32",
            ArrayData::F64(_) => "float64",
        }
    }

    /// Lossy conversion of every element to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ArrayData::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayData::U32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::U64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayData::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::F64(v) => v.clone(),
        }
    }
}

/// A typed array with a shape. `shape.iter().product() == data.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Build an array, returning `None` when the shape does not cover the data.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    /// A 1-d array over `data`.
    pub fn vector(data: ArrayData) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (Vec<usize>, ArrayData) {
        (self.shape, self.data)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Str(String),
    Array(NdArray),
    /// Explicit absence of a value.
    Null,
}

impl Leaf {
    /// Name of the stored type, using the layout vocabulary of the binary protocol.
    pub fn dtype(&self) -> &'static str {
        match self {
            Leaf::Int32(_) => "int32",
            Leaf::Int64(_) => "int64",
            Leaf::UInt32(_) => "uint32",
            Leaf::UInt64(_) => "uint64",
            Leaf::Float32(_) => "float32",
            Leaf::Float64(_) => "float64",
            Leaf::Str(_) => "char8_str",
            Leaf::Array(a) => a.data().dtype(),
            Leaf::Null => "empty",
        }
    }

    /// Number of numeric elements this leaf flattens to.
    pub fn element_count(&self) -> usize {
        match self {
            Leaf::Array(a) => a.len(),
            _ => 1,
        }
    }

    /// Flatten to `f64`. Strings and nulls have no numeric value and return `None`.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Leaf::Int32(v) => Some(vec![f64::from(*v)]),
            Leaf::Int64(v) => Some(vec![*v as f64]),
            Leaf::UInt32(v) => Some(vec![f64::from(*v)]),
            Leaf::UInt64(v) => Some(vec![*v as f64]),
            Leaf::Float32(v) => Some(vec![f64::from(*v)]),
            Leaf::Float64(v) => Some(vec![*v]),
            Leaf::Array(a) => Some(a.data().to_f64_vec()),
            Leaf::Str(_) | Leaf::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Leaf::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric equality within `tol` (relative for large magnitudes), exact
    /// for strings and nulls. Integer and float leaves of equal value compare
    /// equal, as do arrays with equal shapes and elements.
    pub fn approx_eq(&self, other: &Leaf, tol: f64) -> bool {
        match (self, other) {
            (Leaf::Str(a), Leaf::Str(b)) => a == b,
            (Leaf::Null, Leaf::Null) => true,
            (Leaf::Array(a), Leaf::Array(b)) => {
                a.shape() == b.shape()
                    && close_all(&a.data().to_f64_vec(), &b.data().to_f64_vec(), tol)
            }
            (Leaf::Array(_), _) | (_, Leaf::Array(_)) => false,
            _ => match (self.to_f64_vec(), other.to_f64_vec()) {
                (Some(a), Some(b)) => close_all(&a, &b, tol),
                _ => false,
            },
        }
    }
}

fn close_all(a: &[f64], b: &[f64], tol: f64) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x == y || (x.is_nan() && y.is_nan()) || (x - y).abs() <= tol * x.abs().max(y.abs()).max(1.0)
        })
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Int32(v) => write!(f, "{v}"),
            Leaf::Int64(v) => write!(f, "{v}"),
            Leaf::UInt32(v) => write!(f, "{v}"),
            Leaf::UInt64(v) => write!(f, "{v}"),
            Leaf::Float32(v) => write!(f, "{v}"),
            Leaf::Float64(v) => write!(f, "{v}"),
            Leaf::Str(s) => write!(f, "{s:?}"),
            Leaf::Array(a) => write!(f, "<{} array {:?}>", a.data().dtype(), a.shape()),
            Leaf::Null => f.write_str("null"),
        }
    }
}

macro_rules! leaf_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Leaf {
            fn from(v: $t) -> Self {
                Leaf::$variant(v)
            }
        })*
    };
}

leaf_from!(i32 => Int32, i64 => Int64, u32 => UInt32, u64 => UInt64, f32 => Float32, f64 => Float64, String => Str);

impl From<&str> for Leaf {
    fn from(v: &str) -> Self {
        Leaf::Str(v.to_string())
    }
}

impl From<NdArray> for Leaf {
    fn from(v: NdArray) -> Self {
        Leaf::Array(v)
    }
}

impl From<Vec<f64>> for Leaf {
    fn from(v: Vec<f64>) -> Self {
        Leaf::Array(NdArray::vector(ArrayData::F64(v)))
    }
}

impl From<Vec<i64>> for Leaf {
    fn from(v: Vec<i64>) -> Self {
        Leaf::Array(NdArray::vector(ArrayData::I64(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_must_cover_data() {
        assert!(NdArray::new(vec![2, 2], ArrayData::F64(vec![1.0; 4])).is_some());
        assert!(NdArray::new(vec![2, 3], ArrayData::F64(vec![1.0; 4])).is_none());
    }

    #[test]
    fn approx_eq_crosses_numeric_types() {
        assert!(Leaf::Int32(3).approx_eq(&Leaf::Int64(3), 1e-12));
        assert!(Leaf::Float32(0.1).approx_eq(&Leaf::Float64(0.1), 1e-6));
        assert!(!Leaf::Int64(3).approx_eq(&Leaf::Str("3".into()), 1e-12));
        assert!(Leaf::Float64(f64::NAN).approx_eq(&Leaf::Float64(f64::NAN), 0.0));
    }

    #[test]
    fn strings_have_no_numeric_value() {
        assert_eq!(Leaf::Str("x".into()).to_f64_vec(), None);
        assert_eq!(Leaf::Null.to_f64_vec(), None);
        assert_eq!(Leaf::from(vec![1i64, 2]).to_f64_vec(), Some(vec![1.0, 2.0]));
    }
}
