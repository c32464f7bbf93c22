/*!
Index partitions of a labeled dataset: stratified k-fold for model
selection, stratified hold-out for the final evaluation.
 */
use std::collections::BTreeMap;

use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};

/// Row indices of each class, classes sorted by label, indices ascending.
fn class_members(labels: &[String]) -> BTreeMap<&str, Vec<usize>> {
    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        members.entry(label.as_str()).or_default().push(i);
    }
    members
}

/**
`k` (train, test) index pairs. Deterministic, no shuffling.

Members of each class are dealt over the folds in turn, so every fold holds
about `n/k` rows with the class proportions of the whole set.
 */
pub fn stratified_kfold(labels: &[String], k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        return Err(Error::Configuration(format!("at least 2 folds are needed, got {}", k)));
    }
    if labels.len() < k {
        return Err(Error::Configuration(format!(
            "cannot make {} folds out of {} rows",
            k,
            labels.len()
        )));
    }

    let mut fold_of = vec![0; labels.len()];
    let mut dealt = 0;
    for (class, members) in class_members(labels) {
        if members.len() < k {
            warn!(
                "class {:?} has {} member(s), fewer than the {} folds",
                class,
                members.len(),
                k
            );
        }
        for i in members {
            fold_of[i] = dealt % k;
            dealt += 1;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (train, test)
        })
        .collect())
}

/**
Seeded stratified (train, test) split.

Each class sends `round(n_class * test_fraction)` of its members to the
test side, at least one and never all of them. A class with fewer than two
members cannot be split.
 */
pub fn stratified_split(labels: &[String], test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::Configuration(format!(
            "test fraction must be in ]0, 1[, got {}",
            test_fraction
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for (class, mut members) in class_members(labels) {
        let size = members.len();
        if size < 2 {
            return Err(Error::DataSplit {
                class: class.to_string(),
                size,
                required: 2,
            });
        }
        members.shuffle(&mut rng);
        let n_test = ((size as f64 * test_fraction).round() as usize).clamp(1, size - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(counts: &[(&str, usize)]) -> Vec<String> {
        counts
            .iter()
            .flat_map(|(label, n)| std::iter::repeat(label.to_string()).take(*n))
            .collect()
    }

    fn count(labels: &[String], indices: &[usize], class: &str) -> usize {
        indices.iter().filter(|&&i| labels[i] == class).count()
    }

    #[test]
    fn kfold_partitions_every_row_once() {
        let y = labels(&[("a", 23), ("b", 12)]);
        let folds = stratified_kfold(&y, 10).unwrap();
        assert_eq!(folds.len(), 10);

        let mut seen = vec![0; y.len()];
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), y.len());
            assert!(!test.is_empty());
            for &i in test {
                seen[i] += 1;
                assert!(!train.contains(&i));
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn kfold_is_stratified() {
        let y = labels(&[("a", 40), ("b", 20)]);
        for (_, test) in stratified_kfold(&y, 10).unwrap() {
            assert_eq!(count(&y, &test, "a"), 4);
            assert_eq!(count(&y, &test, "b"), 2);
        }
    }

    #[test]
    fn kfold_is_deterministic() {
        let y = labels(&[("a", 13), ("b", 7)]);
        assert_eq!(stratified_kfold(&y, 4).unwrap(), stratified_kfold(&y, 4).unwrap());
    }

    #[test]
    fn kfold_needs_enough_rows() {
        let y = labels(&[("a", 5), ("b", 3)]);
        assert!(matches!(stratified_kfold(&y, 10), Err(Error::Configuration(_))));
        assert!(matches!(stratified_kfold(&y, 1), Err(Error::Configuration(_))));
    }

    #[test]
    fn split_keeps_class_proportions() {
        let y = labels(&[("a", 40), ("b", 10)]);
        let (train, test) = stratified_split(&y, 0.2, 0).unwrap();
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 40);
        assert_eq!(count(&y, &test, "a"), 8);
        assert_eq!(count(&y, &test, "b"), 2);
        assert!(test.iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        let y = labels(&[("a", 30), ("b", 30)]);
        let first = stratified_split(&y, 0.2, 0).unwrap();
        assert_eq!(first, stratified_split(&y, 0.2, 0).unwrap());
        assert_ne!(first, stratified_split(&y, 0.2, 1).unwrap());
    }

    #[test]
    fn singleton_class_cannot_be_split() {
        let y = labels(&[("a", 9), ("b", 1)]);
        match stratified_split(&y, 0.2, 0) {
            Err(Error::DataSplit { class, size, required }) => {
                assert_eq!(class, "b");
                assert_eq!(size, 1);
                assert_eq!(required, 2);
            }
            other => panic!("expected a split error, got {:?}", other),
        }
    }

    #[test]
    fn small_classes_keep_one_row_on_each_side() {
        let y = labels(&[("a", 8), ("b", 2)]);
        let (train, test) = stratified_split(&y, 0.2, 0).unwrap();
        assert_eq!(count(&y, &test, "b"), 1);
        assert_eq!(count(&y, &train, "b"), 1);
        assert_eq!(count(&y, &test, "a"), 2);
    }
}
