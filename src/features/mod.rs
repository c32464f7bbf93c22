pub mod aggregate;
pub mod table;

use std::collections::HashSet;
use std::sync::OnceLock;

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use crate::embedding::PatchEmbedder;
use crate::error::{Error, Result};
use crate::input::ImageRecord;
use crate::patches::generate_patches;

pub use self::aggregate::{aggregate, Aggregation};

pub const IMAGE_ID_COLUMN: &str = "image_id";
pub const LABEL_COLUMN: &str = "label";

/// Name of the descriptor column at position `i` (0-based): `f1`, `f2`, ...
pub fn descriptor_column(i: usize) -> String {
    format!("f{}", i + 1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub image_id: String,
    pub label: String,
    pub descriptor: Vec<f32>,
}

/**
One row per image, keyed by `image_id`.

Rows are kept sorted by id and every descriptor has the same length, so two
tables built from the same images compare equal whatever order the images
were processed in.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    dim: usize,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(mut rows: Vec<FeatureRow>) -> Result<Self> {
        let dim = rows
            .first()
            .ok_or_else(|| Error::EmptyInput("feature table without rows".into()))?
            .descriptor
            .len();
        if dim == 0 {
            return Err(Error::Configuration("embedding dimension is zero".into()));
        }
        if let Some(row) = rows.iter().find(|row| row.descriptor.len() != dim) {
            return Err(Error::Configuration(format!(
                "embedding dimension changed within the run: {} has {} values, expected {}",
                row.image_id,
                row.descriptor.len(),
                dim
            )));
        }

        let mut seen = HashSet::with_capacity(rows.len());
        if let Some(row) = rows.iter().find(|row| !seen.insert(row.image_id.as_str())) {
            return Err(Error::Configuration(format!("duplicated image id {}", row.image_id)));
        }

        rows.sort_by(|a, b| a.image_id.cmp(&b.image_id));
        Ok(Self { dim, rows })
    }

    /// Descriptor length `K`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `image_id`, `label`, then `f1..fK`.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![IMAGE_ID_COLUMN.to_string(), LABEL_COLUMN.to_string()];
        names.extend((0..self.dim).map(descriptor_column));
        names
    }

    pub fn image_ids(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.image_id.clone()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.label.clone()).collect()
    }

    /// [n_rows, K] descriptor matrix, rows in table order.
    pub fn matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), self.dim), |(i, j)| {
            self.rows[i].descriptor[j] as f64
        })
    }
}

/**
Embedding length of a run, fixed by the first embedding checked.

Shared by every image of a build, so an extractor whose output length changes
stops the run at the first offending patch.
 */
#[derive(Debug, Default)]
pub struct EmbeddingDim(OnceLock<usize>);

impl EmbeddingDim {
    pub fn check(&self, image_id: &str, patch: usize, embedding: &[f32]) -> Result<()> {
        let expected = *self.0.get_or_init(|| embedding.len());
        if embedding.is_empty() || embedding.len() != expected {
            return Err(Error::Configuration(format!(
                "embedding dimension changed within the run: {} patch {} has {} values, expected {}",
                image_id,
                patch,
                embedding.len(),
                expected
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(Error::Configuration(format!(
                "non-finite value in the embedding of {} patch {}",
                image_id, patch
            )));
        }
        Ok(())
    }
}

/// Patches -> embeddings -> descriptor for a single image.
pub fn describe_image<E: PatchEmbedder + ?Sized>(
    image: &ImageRecord,
    embedder: &E,
    dim: &EmbeddingDim,
    patch_size: usize,
    stride: usize,
    aggregation: Aggregation,
) -> Result<Vec<f32>> {
    let patches = generate_patches(image, patch_size, stride)?;
    if patches.len() == 0 {
        return Err(Error::EmptyInput(format!(
            "image {} ({}x{}) is smaller than the {}px patch",
            image.id,
            image.height(),
            image.width(),
            patch_size
        )));
    }
    debug!("{}: {} patches", image.id, patches.len());

    let embeddings = patches
        .map(|patch| -> Result<Vec<f32>> {
            let embedding = embedder.embed(&patch)?;
            dim.check(&image.id, patch.index, &embedding)?;
            Ok(embedding)
        })
        .collect::<Result<Vec<_>>>()?;
    aggregate(&embeddings, aggregation)
}

/**
Build the feature table of a set of images.

Images are processed in parallel. Any image that cannot be described aborts
the whole build: a table missing rows would silently change the training
distribution.
 */
pub fn build_table<E: PatchEmbedder + ?Sized>(
    images: &[ImageRecord],
    embedder: &E,
    patch_size: usize,
    stride: usize,
    aggregation: Aggregation,
) -> Result<FeatureTable> {
    if images.is_empty() {
        return Err(Error::EmptyInput("no image to process".into()));
    }
    info!(
        "Describing {} images ({}px patches, stride {}, {} aggregation)",
        images.len(),
        patch_size,
        stride,
        aggregation
    );

    let dim = EmbeddingDim::default();
    let rows = images
        .par_iter()
        .map(|image| -> Result<FeatureRow> {
            Ok(FeatureRow {
                image_id: image.id.clone(),
                label: image.label.clone(),
                descriptor: describe_image(image, embedder, &dim, patch_size, stride, aggregation)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table = FeatureTable::new(rows)?;
    info!("Feature table: {} rows, K = {}", table.len(), table.dim());
    Ok(table)
}
