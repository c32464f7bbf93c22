/*!
Grid search with stratified k-fold cross-validation.
 */
use log::debug;
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;

use super::evaluation::accuracy;
use super::split::stratified_kfold;
use super::{check_rows, take, Classifier, Configuration, HyperparameterGrid, Predictor};
use crate::error::Result;
use crate::utils::mean_std;

type Folds = [(Vec<usize>, Vec<usize>)];

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub configuration: Configuration,
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningReport {
    pub best: Configuration,
    pub best_score: f64,
    /// Every grid point, in enumeration order.
    pub candidates: Vec<CandidateScore>,
}

/// Per-fold accuracies of one configuration. Not a hold-out score.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidationReport {
    pub configuration: Configuration,
    pub fold_accuracies: Vec<f64>,
    pub mean: f64,
    pub std_dev: f64,
}

fn fold_accuracies<C: Classifier>(
    classifier: &C,
    x: ArrayView2<'_, f64>,
    y: &[String],
    configuration: &Configuration,
    folds: &Folds,
) -> Result<Vec<f64>> {
    folds
        .iter()
        .map(|(train, test)| -> Result<f64> {
            let model = classifier.train(x.select(Axis(0), train).view(), &take(y, train), configuration)?;
            let predicted = model.predict(x.select(Axis(0), test).view())?;
            accuracy(&predicted, &take(y, test))
        })
        .collect()
}

/**
Score every grid point by mean fold accuracy and keep the best.

Candidates are evaluated in parallel; ties go to the candidate that comes
first in the grid's enumeration order.
 */
pub fn tune<C: Classifier>(
    classifier: &C,
    x: ArrayView2<'_, f64>,
    y: &[String],
    grid: &HyperparameterGrid,
    k: usize,
) -> Result<TuningReport> {
    let configurations = grid.configurations()?;
    check_rows(x, y)?;
    let folds = stratified_kfold(y, k)?;

    let candidates = configurations
        .into_par_iter()
        .map(|configuration| -> Result<CandidateScore> {
            let fold_accuracies = fold_accuracies(classifier, x, y, &configuration, &folds)?;
            let (mean_accuracy, _) = mean_std(&fold_accuracies);
            debug!("{}: {:.4} {:?}", configuration, mean_accuracy, fold_accuracies);
            Ok(CandidateScore {
                configuration,
                fold_accuracies,
                mean_accuracy,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut best = 0;
    for (i, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.mean_accuracy > candidates[best].mean_accuracy {
            best = i;
        }
    }

    Ok(TuningReport {
        best: candidates[best].configuration.clone(),
        best_score: candidates[best].mean_accuracy,
        candidates,
    })
}

pub fn cross_validate<C: Classifier>(
    classifier: &C,
    x: ArrayView2<'_, f64>,
    y: &[String],
    configuration: &Configuration,
    k: usize,
) -> Result<CrossValidationReport> {
    check_rows(x, y)?;
    let folds = stratified_kfold(y, k)?;
    let fold_accuracies = fold_accuracies(classifier, x, y, configuration, &folds)?;
    let (mean, std_dev) = mean_std(&fold_accuracies);
    Ok(CrossValidationReport {
        configuration: configuration.clone(),
        fold_accuracies,
        mean,
        std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::svm::{SvmClassifier, GAMMA, PENALTY};
    use crate::classification::tests::Threshold;
    use crate::error::Error;
    use ndarray::Array2;

    /// 10 negatives on the first feature in [0, 1), 10 positives in [2, 3).
    fn dataset() -> (Array2<f64>, Vec<String>) {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| {
            let base = if i < 10 { 0.0 } else { 2.0 };
            base + (i % 10) as f64 * 0.1 + j as f64 * 0.05
        });
        let y = (0..20).map(|i| (if i < 10 { "neg" } else { "pos" }).to_string()).collect();
        (x, y)
    }

    #[test]
    fn picks_the_most_accurate_configuration() {
        let (x, y) = dataset();
        let grid = HyperparameterGrid::new().with("threshold", vec![-1.0, 1.5, 2.5]);
        let report = tune(&Threshold, x.view(), &y, &grid, 5).unwrap();

        assert_eq!(report.best.get("threshold").unwrap(), 1.5);
        assert_eq!(report.best_score, 1.0);
        let means = report.candidates.iter().map(|c| c.mean_accuracy).collect::<Vec<_>>();
        assert_eq!(means[0], 0.5);
        assert!(means[2] < 1.0);
    }

    #[test]
    fn ties_go_to_the_first_configuration() {
        let (x, y) = dataset();
        let grid = HyperparameterGrid::new().with("threshold", vec![1.2, 1.5, 1.8, -5.0]);
        let report = tune(&Threshold, x.view(), &y, &grid, 10).unwrap();
        assert_eq!(report.best.get("threshold").unwrap(), 1.2);
        assert_eq!(report.candidates.len(), 4);
    }

    #[test]
    fn svm_tuning_is_deterministic() {
        let (x, y) = dataset();
        let grid = HyperparameterGrid::new()
            .with(PENALTY, vec![0.1, 1.0, 10.0])
            .with(GAMMA, vec![0.1, 1.0]);
        let first = tune(&SvmClassifier, x.view(), &y, &grid, 10).unwrap();
        let second = tune(&SvmClassifier, x.view(), &y, &grid, 10).unwrap();
        assert_eq!(first.best, second.best);
        assert_eq!(first.candidates, second.candidates);
    }

    #[test]
    fn malformed_grid_is_rejected() {
        let (x, y) = dataset();
        let grid = HyperparameterGrid::new().with("threshold", Vec::<f64>::new());
        assert!(matches!(tune(&Threshold, x.view(), &y, &grid, 10), Err(Error::Configuration(_))));
    }

    #[test]
    fn cross_validation_reports_fold_statistics() {
        let (x, y) = dataset();
        let configuration = Configuration::default().with("threshold", 2.45);
        let report = cross_validate(&Threshold, x.view(), &y, &configuration, 10).unwrap();

        assert_eq!(report.fold_accuracies.len(), 10);
        // positives from 2.0 to 2.4 fall below the threshold
        let wrong = report.fold_accuracies.iter().filter(|&&a| a < 1.0).count();
        assert_eq!(wrong, 5);
        assert_eq!(report.mean, 0.75);
        assert_eq!(report.std_dev, 0.25);
    }

    #[test]
    fn rows_and_labels_must_match() {
        let (x, mut y) = dataset();
        y.pop();
        let configuration = Configuration::default().with("threshold", 1.5);
        assert!(matches!(
            cross_validate(&Threshold, x.view(), &y, &configuration, 5),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
