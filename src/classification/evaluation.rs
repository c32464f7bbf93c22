/*!
Hold-out evaluation of a trained model: accuracy, confusion counts and the
misclassified images.
 */
use std::path::Path;

use ndarray::ArrayView2;
use polars::prelude::*;
use serde::Serialize;

use super::{BinaryClasses, Predictor};
use crate::error::{Error, Result};
use crate::features::FeatureTable;
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionCounts {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl std::fmt::Display for ConfusionCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TN: {}, FP: {}, FN: {}, TP: {}",
            self.true_negative, self.false_positive, self.false_negative, self.true_positive
        )
    }
}

/// A wrongly classified row, traced back to its image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Misclassification {
    pub predicted: String,
    pub actual: String,
    pub image_id: String,
}

/// Single-split result. Not to be confused with a cross-validation report.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutEvaluation {
    pub accuracy: f64,
    pub confusion: ConfusionCounts,
    pub misclassified: Vec<Misclassification>,
}

fn check_lengths(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::DimensionMismatch { expected, found });
    }
    Ok(())
}

pub fn accuracy(predicted: &[String], actual: &[String]) -> Result<f64> {
    check_lengths(actual.len(), predicted.len())?;
    if actual.is_empty() {
        return Err(Error::EmptyInput("no prediction to score".into()));
    }
    let hits = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    Ok(hits as f64 / actual.len() as f64)
}

pub fn confusion_counts(predicted: &[String], actual: &[String], classes: &BinaryClasses) -> Result<ConfusionCounts> {
    check_lengths(actual.len(), predicted.len())?;
    let mut counts = ConfusionCounts::default();
    for (p, a) in predicted.iter().zip(actual) {
        match (classes.is_positive(p)?, classes.is_positive(a)?) {
            (false, false) => counts.true_negative += 1,
            (true, false) => counts.false_positive += 1,
            (false, true) => counts.false_negative += 1,
            (true, true) => counts.true_positive += 1,
        }
    }
    Ok(counts)
}

/// Every row where the prediction differs, in row order.
pub fn misclassified(predicted: &[String], actual: &[String], image_ids: &[String]) -> Result<Vec<Misclassification>> {
    check_lengths(actual.len(), predicted.len())?;
    check_lengths(actual.len(), image_ids.len())?;
    Ok(predicted
        .iter()
        .zip(actual)
        .zip(image_ids)
        .filter(|((p, a), _)| p != a)
        .map(|((p, a), id)| Misclassification {
            predicted: p.clone(),
            actual: a.clone(),
            image_id: id.clone(),
        })
        .collect())
}

/// `image_ids[i]` identifies row `i` of `x_test`.
pub fn evaluate<P: Predictor + ?Sized>(
    model: &P,
    x_test: ArrayView2<'_, f64>,
    y_test: &[String],
    image_ids: &[String],
    classes: &BinaryClasses,
) -> Result<HoldoutEvaluation> {
    check_lengths(x_test.nrows(), y_test.len())?;
    let predicted = model.predict(x_test)?;
    Ok(HoldoutEvaluation {
        accuracy: accuracy(&predicted, y_test)?,
        confusion: confusion_counts(&predicted, y_test, classes)?,
        misclassified: misclassified(&predicted, y_test, image_ids)?,
    })
}

/// Score a model on every row of a table. `classes` comes from the model, so
/// a table holding only one of the two classes is fine.
pub fn evaluate_table<P: Predictor + ?Sized>(
    model: &P,
    table: &FeatureTable,
    classes: &BinaryClasses,
) -> Result<HoldoutEvaluation> {
    evaluate(model, table.matrix().view(), &table.labels(), &table.image_ids(), classes)
}

/// Columns `Prediction`, `Actual`, `ImageName`, one row per misclassified image.
pub fn write_misclassified(records: &[Misclassification], path: &Path) -> Result<()> {
    let predicted = records.iter().map(|r| r.predicted.clone()).collect::<Vec<_>>();
    let actual = records.iter().map(|r| r.actual.clone()).collect::<Vec<_>>();
    let image_ids = records.iter().map(|r| r.image_id.clone()).collect::<Vec<_>>();
    let mut df = DataFrame::new(vec![
        Series::new("Prediction", predicted),
        Series::new("Actual", actual),
        Series::new("ImageName", image_ids),
    ])?;
    utils::write_frame(&mut df, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::tests::Fixed;
    use ndarray::Array2;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn classes() -> BinaryClasses {
        BinaryClasses::from_labels(&strings(&["classA", "classB"])).unwrap()
    }

    #[test]
    fn misclassified_rows_keep_their_image_id() {
        let model = Fixed(strings(&["classA", "classB", "classA", "classB"]));
        let x = Array2::zeros((4, 2));
        let y = strings(&["classA", "classB", "classB", "classB"]);
        let ids = strings(&["img_000", "img_001", "img_002", "img_003"]);

        let result = evaluate(&model, x.view(), &y, &ids, &classes()).unwrap();

        assert_eq!(
            result.misclassified,
            vec![Misclassification {
                predicted: "classA".into(),
                actual: "classB".into(),
                image_id: "img_002".into(),
            }]
        );
        assert_eq!(result.accuracy, 0.75);
    }

    #[test]
    fn confusion_counts_use_sorted_classes() {
        let predicted = strings(&["classA", "classB", "classB", "classA", "classB"]);
        let actual = strings(&["classA", "classA", "classB", "classB", "classB"]);
        let counts = confusion_counts(&predicted, &actual, &classes()).unwrap();
        assert_eq!(
            counts,
            ConfusionCounts {
                true_negative: 1,
                false_positive: 1,
                false_negative: 1,
                true_positive: 2,
            }
        );
    }

    #[test]
    fn unknown_label_is_rejected() {
        let res = confusion_counts(&strings(&["classC"]), &strings(&["classA"]), &classes());
        assert!(matches!(res, Err(Error::Configuration(_))));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let res = accuracy(&strings(&["classA"]), &strings(&["classA", "classB"]));
        assert!(matches!(res, Err(Error::DimensionMismatch { expected: 2, found: 1 })));
    }

    #[test]
    fn report_file_has_fixed_columns() {
        let path = std::env::temp_dir().join(format!("patch-fusion-misclassified-{}.parquet", std::process::id()));
        let records = vec![Misclassification {
            predicted: "classA".into(),
            actual: "classB".into(),
            image_id: "img_002".into(),
        }];
        write_misclassified(&records, &path).unwrap();
        let df = utils::read_frame(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(df.get_column_names(), vec!["Prediction", "Actual", "ImageName"]);
        assert_eq!(df.column("ImageName").unwrap().utf8().unwrap().get(0), Some("img_002"));
    }
}
