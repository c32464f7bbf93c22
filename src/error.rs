/*!
Error types shared by every stage of the pipeline.

None of these are retried: the same inputs would fail the same way.
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Inconsistent embedding dimension, malformed grid, bad table layout...
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An image produced no patch, or an aggregation received nothing.
    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("dimension mismatch: expected {expected} values, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("cannot split data: class {class:?} has {size} member(s), {required} required")]
    DataSplit {
        class: String,
        size: usize,
        required: usize,
    },

    #[error("classifier training failed: {0}")]
    Training(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),

    #[error(transparent)]
    Torch(#[from] tch::TchError),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
