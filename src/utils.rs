use std::fs::File;
use std::path::Path;

use ndarray::ArrayView1;
use polars::prelude::*;

use crate::error::{Error, Result};

/// On-disk formats of the tabular outputs, chosen from the file extension.
/// `.json` files hold one array of row objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Parquet,
    Ipc,
    Json,
}

impl FrameFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("parquet") => Ok(FrameFormat::Parquet),
            Some("ipc") | Some("arrow") | Some("feather") => Ok(FrameFormat::Ipc),
            Some("json") => Ok(FrameFormat::Json),
            _ => Err(Error::Configuration(format!(
                "unsupported table format {:?} (expected .parquet, .ipc, .arrow or .json)",
                path
            ))),
        }
    }
}

pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<()> {
    let format = FrameFormat::from_path(path)?;
    let file = File::create(path)?;
    match format {
        FrameFormat::Parquet => {
            ParquetWriter::new(file).finish(df)?;
        }
        FrameFormat::Ipc => IpcWriter::new(file).finish(df)?,
        FrameFormat::Json => JsonWriter::new(file)
            .with_json_format(JsonFormat::Json)
            .finish(df)?,
    }
    Ok(())
}

pub fn read_frame(path: &Path) -> Result<DataFrame> {
    let format = FrameFormat::from_path(path)?;
    let file = File::open(path)?;
    let df = match format {
        FrameFormat::Parquet => ParquetReader::new(file).finish()?,
        FrameFormat::Ipc => IpcReader::new(file).finish()?,
        FrameFormat::Json => JsonReader::new(file)
            .with_json_format(JsonFormat::Json)
            .finish()?,
    };
    Ok(df)
}

/**
Mean and population standard deviation of a series of scores.
Returns `(NaN, NaN)` for an empty series.
 */
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let values = ArrayView1::from(values);
    match values.mean() {
        Some(mean) => (mean, values.std(0.0)),
        None => (f64::NAN, f64::NAN),
    }
}
