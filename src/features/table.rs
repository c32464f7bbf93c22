/*!
Persistence of the feature table.

Column layout: `image_id`, `label`, then `f1..fK`. Readers reject any other
layout instead of reordering it. JSON row objects are the exception: their
keys carry no order, so a JSON table only has to hold the expected columns.
 */
use std::path::Path;

use polars::prelude::*;

use super::{descriptor_column, FeatureRow, FeatureTable, IMAGE_ID_COLUMN, LABEL_COLUMN};
use crate::error::{Error, Result};
use crate::utils::{self, FrameFormat};

pub fn to_dataframe(table: &FeatureTable) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(table.dim() + 2);
    columns.push(Series::new(IMAGE_ID_COLUMN, table.image_ids()));
    columns.push(Series::new(LABEL_COLUMN, table.labels()));
    for j in 0..table.dim() {
        let values = table.rows().iter().map(|row| row.descriptor[j]).collect::<Vec<f32>>();
        columns.push(Series::new(&descriptor_column(j), values));
    }
    Ok(DataFrame::new(columns)?)
}

fn layout(dim: usize) -> Vec<String> {
    [IMAGE_ID_COLUMN.to_string(), LABEL_COLUMN.to_string()]
        .into_iter()
        .chain((0..dim).map(descriptor_column))
        .collect()
}

pub fn from_dataframe(df: &DataFrame) -> Result<FeatureTable> {
    let names = df.get_column_names();
    let dim = names.len().saturating_sub(2);
    let expected = layout(dim);
    if dim == 0 || names != expected {
        return Err(Error::Configuration(format!(
            "unexpected feature table layout {:?}, expected {:?}",
            names, expected
        )));
    }

    let ids = string_column(df, IMAGE_ID_COLUMN)?;
    let labels = string_column(df, LABEL_COLUMN)?;
    let mut descriptors = vec![Vec::with_capacity(dim); df.height()];
    for j in 0..dim {
        let name = descriptor_column(j);
        let column = df.column(&name)?.cast(&DataType::Float32)?;
        for (descriptor, value) in descriptors.iter_mut().zip(column.f32()?.into_iter()) {
            let value = value.ok_or_else(|| Error::Configuration(format!("null value in column {}", name)))?;
            descriptor.push(value);
        }
    }

    let rows = ids
        .into_iter()
        .zip(labels)
        .zip(descriptors)
        .map(|((image_id, label), descriptor)| FeatureRow {
            image_id,
            label,
            descriptor,
        })
        .collect();
    FeatureTable::new(rows)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    df.column(name)?
        .utf8()?
        .into_iter()
        .map(|value| {
            value
                .map(str::to_string)
                .ok_or_else(|| Error::Configuration(format!("null value in column {}", name)))
        })
        .collect()
}

pub fn save_table(table: &FeatureTable, path: &Path) -> Result<()> {
    let mut df = to_dataframe(table)?;
    utils::write_frame(&mut df, path)
}

fn restore_layout(df: DataFrame) -> Result<DataFrame> {
    let expected = layout(df.width().saturating_sub(2));
    let mut names = df.get_column_names();
    names.sort_unstable();
    let mut sorted = expected.clone();
    sorted.sort_unstable();
    if names != sorted {
        return Ok(df);
    }
    Ok(df.select(&expected)?)
}

pub fn load_table(path: &Path) -> Result<FeatureTable> {
    let df = utils::read_frame(path)?;
    let df = match FrameFormat::from_path(path)? {
        FrameFormat::Json => restore_layout(df)?,
        FrameFormat::Parquet | FrameFormat::Ipc => df,
    };
    from_dataframe(&df)
}
