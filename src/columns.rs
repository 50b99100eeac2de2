//! Column tables and jagged array stacking.
//!
//! A [`ColumnTable`] maps a scalar path to an `f64` [`Column`]. Columns built
//! by translation are 2-d (one row per sample); columns loaded from archives
//! may have any dimensionality.
//!
//! [`stack_jagged`] is the concatenation primitive shared by translation and
//! [`crate::stack::Stacker`]: arrays are promoted to at least 2-d, padded with
//! NaN up to the largest extent on every axis except the first, then
//! concatenated along the first axis.
//!
//! ```
//! use sheaf::columns::{Column, stack_jagged};
//!
//! let short = Column::row(vec![1.0, 2.0, 3.0]);
//! let long = Column::row(vec![4.0, 5.0, 6.0, 7.0, 8.0]);
//! let stacked = stack_jagged(&[short, long]).unwrap();
//! assert_eq!(stacked.shape(), &[2, 5]);
//! assert!(stacked.data()[3].is_nan());
//! ```

use crate::error::{Result, SheafError};

/// Row-major `f64` array. `shape.iter().product() == data.len()`; an empty
/// shape is a 0-d scalar.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Column {
    /// Returns `None` when the shape does not cover the data.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    /// A single row: shape `(1, n)`.
    pub fn row(values: Vec<f64>) -> Self {
        Self {
            shape: vec![1, values.len()],
            data: values,
        }
    }

    /// A `(1, 1)` NaN row, the sentinel for a missing value.
    pub fn missing() -> Self {
        Self::row(vec![f64::NAN])
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Number of rows along the first axis (1 for 0-d scalars).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// View with at least two dimensions: `()` → `(1, 1)`, `(n,)` → `(1, n)`.
    pub fn atleast_2d(&self) -> Column {
        let shape = match self.shape.len() {
            0 => vec![1, 1],
            1 => vec![1, self.shape[0]],
            _ => self.shape.clone(),
        };
        Column {
            shape,
            data: self.data.clone(),
        }
    }

    /// Copy into a larger array of shape `target`, filling new cells with `fill`.
    /// `target` must have the same dimensionality and no smaller extent.
    fn pad_to(&self, target: &[usize], fill: f64) -> Column {
        let mut out = vec![fill; target.iter().product()];
        let ndim = self.shape.len();
        if ndim == 0 || self.data.is_empty() {
            return Column {
                shape: target.to_vec(),
                data: out,
            };
        }
        let inner = self.shape[ndim - 1];
        let mut idx = vec![0usize; ndim - 1];
        for chunk in self.data.chunks(inner) {
            let mut offset = 0usize;
            for (axis, &i) in idx.iter().enumerate() {
                offset = offset * target[axis] + i;
            }
            offset *= target[ndim - 1];
            out[offset..offset + inner].copy_from_slice(chunk);
            for axis in (0..ndim - 1).rev() {
                idx[axis] += 1;
                if idx[axis] < self.shape[axis] {
                    break;
                }
                idx[axis] = 0;
            }
        }
        Column {
            shape: target.to_vec(),
            data: out,
        }
    }
}

/// Per-dimension maximum of the (at least 2-d) shapes of `arrays`.
///
/// # Errors
/// [`SheafError::ShapeMismatch`] when `arrays` is empty or the arrays differ
/// in dimensionality.
pub fn find_max_dims(arrays: &[Column]) -> Result<Vec<usize>> {
    let mut iter = arrays.iter().map(Column::atleast_2d);
    let mut dims = iter
        .next()
        .ok_or_else(|| SheafError::ShapeMismatch("no arrays to stack".to_string()))?
        .shape;
    for a in iter {
        if a.shape.len() != dims.len() {
            return Err(SheafError::ShapeMismatch(format!(
                "cannot combine {}-d and {}-d arrays",
                dims.len(),
                a.shape.len()
            )));
        }
        for (d, &s) in dims.iter_mut().zip(&a.shape) {
            *d = (*d).max(s);
        }
    }
    Ok(dims)
}

/// Pad every array (promoted to at least 2-d) up to `dims` with `fill`. When
/// `dont_pad_first` is set the first axis keeps each array's own extent.
pub fn pad_many(arrays: &[Column], dims: &[usize], dont_pad_first: bool, fill: f64) -> Vec<Column> {
    arrays
        .iter()
        .map(|a| {
            let a = a.atleast_2d();
            let mut target = dims.to_vec();
            if dont_pad_first {
                target[0] = a.shape[0];
            }
            if target == a.shape {
                a
            } else {
                a.pad_to(&target, fill)
            }
        })
        .collect()
}

/// Concatenate arrays along the first axis. All trailing extents must agree.
pub fn vstack(arrays: &[Column]) -> Result<Column> {
    let first = arrays
        .first()
        .ok_or_else(|| SheafError::ShapeMismatch("no arrays to stack".to_string()))?;
    let tail = &first.shape[1..];
    let mut rows = 0usize;
    let mut data = Vec::with_capacity(arrays.iter().map(|a| a.data.len()).sum());
    for a in arrays {
        if a.shape.len() != first.shape.len() || &a.shape[1..] != tail {
            return Err(SheafError::ShapeMismatch(format!(
                "cannot stack {:?} onto {:?}",
                a.shape, first.shape
            )));
        }
        rows += a.shape[0];
        data.extend_from_slice(&a.data);
    }
    let mut shape = vec![rows];
    shape.extend_from_slice(tail);
    Ok(Column { shape, data })
}

/// Pad jagged arrays with NaN on every axis but the first, then stack them
/// vertically.
pub fn stack_jagged(arrays: &[Column]) -> Result<Column> {
    let dims = find_max_dims(arrays)?;
    let padded = pad_many(arrays, &dims, true, f64::NAN);
    vstack(&padded)
}

/// Ordered mapping from scalar path to column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnTable {
    columns: Vec<(String, Column)>,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Insert or replace, keeping the first insertion position.
    pub fn insert(&mut self, path: impl Into<String>, column: Column) {
        let path = path.into();
        match self.columns.iter_mut().find(|(p, _)| *p == path) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((path, column)),
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<Column> {
        let i = self.columns.iter().position(|(p, _)| p == path)?;
        Some(self.columns.remove(i).1)
    }

    pub fn get(&self, path: &str) -> Option<&Column> {
        self.columns.iter().find(|(p, _)| p == path).map(|(_, c)| c)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(p, _)| p.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(p, c)| (p.as_str(), c))
    }
}

impl IntoIterator for ColumnTable {
    type Item = (String, Column);
    type IntoIter = std::vec::IntoIter<(String, Column)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl FromIterator<(String, Column)> for ColumnTable {
    fn from_iter<I: IntoIterator<Item = (String, Column)>>(iter: I) -> Self {
        let mut table = ColumnTable::new();
        for (p, c) in iter {
            table.insert(p, c);
        }
        table
    }
}
