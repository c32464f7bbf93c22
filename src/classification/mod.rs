/*!
Descriptor classification: model selection, training and evaluation.

The classifier is consumed through `Classifier` / `Predictor` so the pipeline
owns no model state. `SvmClassifier` is the concrete implementation.
 */
pub mod evaluation;
pub mod grid;
pub mod split;
pub mod svm;
pub mod tuning;

use log::info;
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::FeatureTable;

pub use self::evaluation::{evaluate, HoldoutEvaluation, Misclassification};
pub use self::grid::{Configuration, HyperparameterGrid};
pub use self::svm::{SvmClassifier, SvmModel};
pub use self::tuning::{cross_validate, tune, CrossValidationReport, TuningReport};

pub trait Classifier: Sync {
    type Model: Predictor;

    /// Deterministic for identical inputs.
    fn train(&self, x: ArrayView2<'_, f64>, y: &[String], configuration: &Configuration) -> Result<Self::Model>;
}

pub trait Predictor {
    /// One label per row of `x`, same order.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<String>>;
}

/// The two labels of a binary problem, sorted: the first is the negative class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryClasses {
    pub negative: String,
    pub positive: String,
}

impl BinaryClasses {
    pub fn from_labels(labels: &[String]) -> Result<Self> {
        let mut classes = labels.iter().collect::<Vec<_>>();
        classes.sort();
        classes.dedup();
        match classes.as_slice() {
            [negative, positive] => Ok(Self {
                negative: negative.to_string(),
                positive: positive.to_string(),
            }),
            _ => Err(Error::Configuration(format!(
                "binary classification needs exactly 2 classes, found {:?}",
                classes
            ))),
        }
    }

    pub fn is_positive(&self, label: &str) -> Result<bool> {
        if label == self.positive {
            Ok(true)
        } else if label == self.negative {
            Ok(false)
        } else {
            Err(Error::Configuration(format!(
                "label {:?} is neither {:?} nor {:?}",
                label, self.negative, self.positive
            )))
        }
    }

    pub fn label(&self, positive: bool) -> &str {
        if positive {
            &self.positive
        } else {
            &self.negative
        }
    }
}

pub(crate) fn take<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

pub(crate) fn check_rows(x: ArrayView2<'_, f64>, y: &[String]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(Error::DimensionMismatch {
            expected: x.nrows(),
            found: y.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSettings {
    pub grid: HyperparameterGrid,
    pub folds: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            grid: svm::default_grid(),
            folds: 10,
            test_fraction: 0.2,
            seed: 0,
        }
    }
}

pub struct ClassificationOutcome<M> {
    pub classes: BinaryClasses,
    pub tuning: TuningReport,
    /// Fold scores of the selected configuration on the training part.
    pub cross_validation: CrossValidationReport,
    /// Scores on the held-out part, never seen during selection.
    pub holdout: HoldoutEvaluation,
    pub model: M,
}

/**
Select, train and evaluate a classifier on a feature table.

The hold-out rows are split off first; tuning and cross-validation only see
the training rows.
 */
pub fn run<C: Classifier>(
    classifier: &C,
    table: &FeatureTable,
    settings: &ClassificationSettings,
) -> Result<ClassificationOutcome<C::Model>> {
    settings.grid.validate()?;

    let x = table.matrix();
    let y = table.labels();
    let ids = table.image_ids();
    let classes = BinaryClasses::from_labels(&y)?;
    info!("Classes: {} (negative), {} (positive)", classes.negative, classes.positive);

    let (train_idx, test_idx) = split::stratified_split(&y, settings.test_fraction, settings.seed)?;
    let x_train = x.select(Axis(0), &train_idx);
    let y_train = take(&y, &train_idx);
    let x_test = x.select(Axis(0), &test_idx);
    let y_test = take(&y, &test_idx);
    let ids_test = take(&ids, &test_idx);
    info!("{} training rows, {} held-out rows", train_idx.len(), test_idx.len());
    if train_idx.len() < settings.folds {
        return Err(Error::Configuration(format!(
            "{} folds need at least {} training rows, {} are left once {} rows are held out",
            settings.folds,
            settings.folds,
            train_idx.len(),
            test_idx.len()
        )));
    }

    let tuning = tune(classifier, x_train.view(), &y_train, &settings.grid, settings.folds)?;
    info!(
        "Optimal hyper-parameters: {} (mean fold accuracy {:.4})",
        tuning.best, tuning.best_score
    );

    let cross_validation = cross_validate(classifier, x_train.view(), &y_train, &tuning.best, settings.folds)?;
    info!(
        "Cross-validation: accuracy {:.4} ± {:.4} over {} folds {:?}",
        cross_validation.mean,
        cross_validation.std_dev,
        cross_validation.fold_accuracies.len(),
        cross_validation.fold_accuracies
    );

    let model = classifier.train(x_train.view(), &y_train, &tuning.best)?;
    let holdout = evaluate(&model, x_test.view(), &y_test, &ids_test, &classes)?;
    info!("Hold-out: accuracy {:.4}, {}", holdout.accuracy, holdout.confusion);
    info!("{} misclassified image(s)", holdout.misclassified.len());

    Ok(ClassificationOutcome {
        classes,
        tuning,
        cross_validation,
        holdout,
        model,
    })
}
