/*!
RBF-kernel support vector classifier.

Hyperparameters:
- `C`: penalty of margin violations, applied to both classes
- `gamma`: kernel width, `k(x, y) = exp(-gamma * |x - y|²)`
 */
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_rows, BinaryClasses, Classifier, Configuration, HyperparameterGrid, Predictor};
use crate::error::{Error, Result};

pub const PENALTY: &str = "C";
pub const GAMMA: &str = "gamma";

pub fn default_grid() -> HyperparameterGrid {
    HyperparameterGrid::new()
        .with(PENALTY, vec![0.1, 1.0, 10.0, 100.0])
        .with(GAMMA, vec![0.001, 0.01, 0.1, 1.0])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SvmClassifier;

enum Fitted {
    /// The training rows held a single class.
    Constant(String),
    Kernel {
        svm: Svm<f64, bool>,
        classes: BinaryClasses,
    },
}

/**
A trained classifier.

The checkpoint written by `save` holds the frozen configuration, the class
mapping and the training rows. Training is deterministic, so `load` fits back the very same
model.
 */
pub struct SvmModel {
    fitted: Fitted,
    checkpoint: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Checkpoint {
    configuration: Configuration,
    /// `None` when the training rows held a single class.
    classes: Option<BinaryClasses>,
    records: Vec<Vec<f64>>,
    labels: Vec<String>,
}

fn positive(name: &str, configuration: &Configuration) -> Result<f64> {
    let value = configuration.get(name)?;
    if value <= 0.0 {
        return Err(Error::Configuration(format!("{} must be positive, got {}", name, value)));
    }
    Ok(value)
}

impl Classifier for SvmClassifier {
    type Model = SvmModel;

    fn train(&self, x: ArrayView2<'_, f64>, y: &[String], configuration: &Configuration) -> Result<SvmModel> {
        check_rows(x, y)?;
        let penalty = positive(PENALTY, configuration)?;
        let gamma = positive(GAMMA, configuration)?;
        if y.is_empty() {
            return Err(Error::EmptyInput("no training row".into()));
        }

        let mut checkpoint = Checkpoint {
            configuration: configuration.clone(),
            classes: None,
            records: x.rows().into_iter().map(|row| row.to_vec()).collect(),
            labels: y.to_vec(),
        };

        if y.iter().all(|label| *label == y[0]) {
            return Ok(SvmModel {
                fitted: Fitted::Constant(y[0].clone()),
                checkpoint,
            });
        }

        let classes = BinaryClasses::from_labels(y)?;
        checkpoint.classes = Some(classes.clone());
        let targets = y
            .iter()
            .map(|label| classes.is_positive(label))
            .collect::<Result<Array1<bool>>>()?;
        let dataset = Dataset::new(x.to_owned(), targets);
        let svm = Svm::<_, bool>::params()
            .pos_neg_weights(penalty, penalty)
            .gaussian_kernel(1.0 / gamma)
            .fit(&dataset)
            .map_err(|err| Error::Training(err.to_string()))?;

        Ok(SvmModel {
            fitted: Fitted::Kernel { svm, classes },
            checkpoint,
        })
    }
}

impl Predictor for SvmModel {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<String>> {
        let dim = self.checkpoint.records.first().map_or(0, Vec::len);
        if x.ncols() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                found: x.ncols(),
            });
        }
        match &self.fitted {
            Fitted::Constant(label) => Ok(vec![label.clone(); x.nrows()]),
            Fitted::Kernel { svm, classes } => {
                let predicted: Array1<bool> = svm.predict(&x);
                Ok(predicted.iter().map(|&p| classes.label(p).to_string()).collect())
            }
        }
    }
}

impl SvmModel {
    pub fn configuration(&self) -> &Configuration {
        &self.checkpoint.configuration
    }

    /// The negative/positive mapping learnt at training time.
    pub fn classes(&self) -> Result<&BinaryClasses> {
        self.checkpoint.classes.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "classifier was trained on the single class {:?}",
                self.checkpoint.labels.first()
            ))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, &self.checkpoint)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = serde_json::from_reader(file)?;
        let dim = checkpoint.records.first().map_or(0, Vec::len);
        let flat = checkpoint.records.iter().flatten().copied().collect::<Vec<_>>();
        let x = Array2::from_shape_vec((checkpoint.records.len(), dim), flat)
            .map_err(|err| Error::Configuration(format!("corrupted checkpoint {:?}: {}", path, err)))?;
        let model = SvmClassifier.train(x.view(), &checkpoint.labels, &checkpoint.configuration)?;
        if model.checkpoint.classes != checkpoint.classes {
            return Err(Error::Configuration(format!(
                "corrupted checkpoint {:?}: class mapping does not match its labels",
                path
            )));
        }
        Ok(model)
    }
}
