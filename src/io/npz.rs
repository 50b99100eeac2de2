//! Column archives (`.npz`).
//!
//! A [`ColumnTable`] is saved as a zip of `.npy` arrays, one per column, named
//! by the column path and written deflate-compressed. Loading converts every
//! numeric array to `f64`. Without the `io-npz` feature both operations return
//! [`SheafError::ProtocolUnavailable`].

use crate::columns::ColumnTable;
#[cfg(feature = "io-npz")]
use crate::columns::Column;
use crate::error::{Result, SheafError};
#[cfg(feature = "io-npz")]
use npyz::WriterBuilder;
use std::path::Path;

/// Write `table` to `path`, replacing any existing file.
#[cfg(feature = "io-npz")]
pub fn save_npz(table: &ColumnTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let ctx = |e| SheafError::io(format!("write {}", path.display()), e);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| SheafError::io(format!("mkdir -p {}", parent.display()), e))?;
    }
    let mut npz = npyz::npz::NpzWriter::create(path).map_err(ctx)?;
    for (name, column) in table.iter() {
        let shape: Vec<u64> = column.shape().iter().map(|&d| d as u64).collect();
        let mut writer: npyz::NpyWriter<f64, _> = npz
            .array(name, Default::default())
            .map_err(ctx)?
            .default_dtype()
            .shape(&shape)
            .begin_nd()
            .map_err(ctx)?;
        writer.extend(column.data().iter().copied()).map_err(ctx)?;
        writer.finish().map_err(ctx)?;
    }
    tracing::debug!(file = %path.display(), columns = table.len(), "wrote column archive");
    Ok(())
}

/// Read every array in the archive at `path`, sorted by name.
#[cfg(feature = "io-npz")]
pub fn load_npz(path: impl AsRef<Path>) -> Result<ColumnTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SheafError::FileNotFound(path.to_path_buf()));
    }
    let ctx = |e| SheafError::io(format!("read {}", path.display()), e);
    let mut npz = npyz::npz::NpzArchive::open(path).map_err(ctx)?;
    let mut names: Vec<String> = npz.array_names().map(str::to_string).collect();
    names.sort();
    let mut table = ColumnTable::new();
    for name in names {
        let npy = npz
            .by_name(&name)
            .map_err(ctx)?
            .ok_or_else(|| SheafError::malformed(path, format!("array '{name}' listed but absent")))?;
        let shape: Vec<usize> = npy.shape().iter().map(|&d| d as usize).collect();
        let type_str = match npy.dtype() {
            npyz::DType::Plain(ts) => ts.to_string(),
            other => {
                return Err(SheafError::malformed(path, format!("{name}: structured dtype {other:?}")));
            }
        };
        let data: Vec<f64> = match type_str.get(1..).unwrap_or_default() {
            "f8" => npy.into_vec::<f64>().map_err(ctx)?,
            "f4" => npy.into_vec::<f32>().map_err(ctx)?.into_iter().map(f64::from).collect(),
            "i8" => npy.into_vec::<i64>().map_err(ctx)?.into_iter().map(|v| v as f64).collect(),
            "i4" => npy.into_vec::<i32>().map_err(ctx)?.into_iter().map(f64::from).collect(),
            "u8" => npy.into_vec::<u64>().map_err(ctx)?.into_iter().map(|v| v as f64).collect(),
            "u4" => npy.into_vec::<u32>().map_err(ctx)?.into_iter().map(f64::from).collect(),
            other => {
                return Err(SheafError::malformed(path, format!("{name}: unsupported dtype '{other}'")));
            }
        };
        let column = Column::new(shape, data)
            .ok_or_else(|| SheafError::malformed(path, format!("{name}: shape does not cover the data")))?;
        table.insert(name, column);
    }
    Ok(table)
}

#[cfg(not(feature = "io-npz"))]
pub fn save_npz(_table: &ColumnTable, _path: impl AsRef<Path>) -> Result<()> {
    Err(unavailable())
}

#[cfg(not(feature = "io-npz"))]
pub fn load_npz(_path: impl AsRef<Path>) -> Result<ColumnTable> {
    Err(unavailable())
}

#[cfg(not(feature = "io-npz"))]
fn unavailable() -> SheafError {
    SheafError::ProtocolUnavailable {
        protocol: "npz".to_string(),
        reason: "built without the io-npz feature",
    }
}
