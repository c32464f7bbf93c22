/*!
Reduction of the per-patch embeddings of one image into its descriptor.
 */
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    Mean,
    Max,
}

impl std::str::FromStr for Aggregation {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Aggregation::Mean),
            "max" => Ok(Aggregation::Max),
            _ => Err(format!("{} is not a valid aggregation (mean, max)", s)),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Mean => write!(f, "mean"),
            Aggregation::Max => write!(f, "max"),
        }
    }
}

/**
Elementwise mean or max over a non-empty sequence of equal-length embeddings.

The mean is accumulated in f64 so the result does not depend on the order of
the embeddings. A NaN component makes that component NaN under both
operations, whatever its position.
 */
pub fn aggregate<E: AsRef<[f32]>>(embeddings: &[E], operation: Aggregation) -> Result<Vec<f32>> {
    let first = embeddings
        .first()
        .ok_or_else(|| Error::EmptyInput("no embedding to aggregate".into()))?
        .as_ref();
    let dim = first.len();
    if let Some(bad) = embeddings.iter().map(|e| e.as_ref()).find(|e| e.len() != dim) {
        return Err(Error::DimensionMismatch {
            expected: dim,
            found: bad.len(),
        });
    }

    let descriptor = match operation {
        Aggregation::Mean => {
            let mut sum = vec![0f64; dim];
            for embedding in embeddings {
                for (acc, v) in sum.iter_mut().zip(embedding.as_ref()) {
                    *acc += *v as f64;
                }
            }
            let n = embeddings.len() as f64;
            sum.into_iter().map(|s| (s / n) as f32).collect()
        }
        Aggregation::Max => embeddings.iter().skip(1).fold(first.to_vec(), |mut acc, embedding| {
            for (a, v) in acc.iter_mut().zip(embedding.as_ref()) {
                if v.is_nan() || *v > *a {
                    *a = *v;
                }
            }
            acc
        }),
    };
    Ok(descriptor)
}
