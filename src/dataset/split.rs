//! Stratified, seeded train/test partitioning.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Partitioning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitOptions {
    /// Share of rows assigned to the test partition, in `(0, 1)`.
    pub test_fraction: f64,
    /// Seed for the per-class shuffles.
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Row indices of the two partitions, each in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("test fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),
    #[error("cannot split an empty dataset")]
    Empty,
    #[error("class {label} has only {count} member(s); a stratified split needs at least 2")]
    ClassTooSmall { label: i64, count: usize },
    #[error("{partition} partition would hold {size} rows, fewer than the {n_classes} classes")]
    PartitionTooSmall {
        partition: &'static str,
        size: usize,
        n_classes: usize,
    },
}

/// Split row indices so each label keeps its share in both partitions.
///
/// `n_test = ceil(n * test_fraction)`. Each class gets the floor of its
/// proportional share of the test rows; leftover slots go to the classes with
/// the largest remainders, ties resolved by label order. A class never gives
/// all of its rows to the test partition.
pub fn stratified_split(
    labels: &[i64],
    options: &SplitOptions,
) -> Result<TrainTestSplit, SplitError> {
    let fraction = options.test_fraction;
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SplitError::InvalidFraction(fraction));
    }
    let n = labels.len();
    if n == 0 {
        return Err(SplitError::Empty);
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }
    if let Some((&label, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(SplitError::ClassTooSmall {
            label,
            count: rows.len(),
        });
    }

    let n_classes = by_class.len();
    let n_test = ((n as f64) * fraction).ceil() as usize;
    let n_train = n - n_test;
    if n_test < n_classes {
        return Err(SplitError::PartitionTooSmall {
            partition: "test",
            size: n_test,
            n_classes,
        });
    }
    if n_train < n_classes {
        return Err(SplitError::PartitionTooSmall {
            partition: "train",
            size: n_train,
            n_classes,
        });
    }

    let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
    let test_counts = allocate_test_counts(&counts, n_test, n);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (mut rows, take) in by_class.into_values().zip(test_counts) {
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..take]);
        train.extend_from_slice(&rows[take..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    tracing::debug!(
        train = train.len(),
        test = test.len(),
        classes = n_classes,
        "Stratified split"
    );
    Ok(TrainTestSplit { train, test })
}

fn allocate_test_counts(counts: &[usize], n_test: usize, n: usize) -> Vec<usize> {
    let mut allocated = Vec::with_capacity(counts.len());
    let mut remainders = Vec::with_capacity(counts.len());
    for (class_idx, &count) in counts.iter().enumerate() {
        let exact = (n_test * count) as f64 / n as f64;
        let floor = (exact.floor() as usize).min(count - 1);
        allocated.push(floor);
        remainders.push((exact - floor as f64, class_idx));
    }
    remainders.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut left = n_test.saturating_sub(allocated.iter().sum());
    for (_, class_idx) in remainders {
        if left == 0 {
            break;
        }
        if allocated[class_idx] + 1 < counts[class_idx] {
            allocated[class_idx] += 1;
            left -= 1;
        }
    }
    allocated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn labels_with_rate(n: usize, positives: usize) -> Vec<i64> {
        (0..n).map(|idx| i64::from(idx < positives)).collect()
    }

    #[test]
    fn thirty_percent_positives_give_sixty_in_test() {
        let labels = labels_with_rate(1000, 300);
        let split = stratified_split(&labels, &SplitOptions::default()).unwrap();
        assert_eq!(split.test.len(), 200);
        assert_eq!(split.train.len(), 800);
        let test_pos = split.test.iter().filter(|&&idx| labels[idx] == 1).count();
        let train_pos = split.train.iter().filter(|&&idx| labels[idx] == 1).count();
        assert_eq!(test_pos, 60);
        assert_eq!(train_pos, 240);
    }

    #[test]
    fn partitions_are_disjoint_and_cover_all_rows() {
        let labels: Vec<i64> = (0..157).map(|idx| i64::from(idx % 7 == 0)).collect();
        let split = stratified_split(&labels, &SplitOptions::default()).unwrap();
        let train: HashSet<usize> = split.train.iter().copied().collect();
        let test: HashSet<usize> = split.test.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), labels.len());
        assert!(split.train.windows(2).all(|w| w[0] < w[1]));
        assert!(split.test.windows(2).all(|w| w[0] < w[1]));

        let overall = labels.iter().filter(|&&y| y == 1).count() as f64 / labels.len() as f64;
        let test_rate =
            split.test.iter().filter(|&&idx| labels[idx] == 1).count() as f64 / test.len() as f64;
        assert!((test_rate - overall).abs() < 0.05);
    }

    #[test]
    fn same_seed_same_assignment_other_seed_differs() {
        let labels = labels_with_rate(500, 120);
        let a = stratified_split(&labels, &SplitOptions::default()).unwrap();
        let b = stratified_split(&labels, &SplitOptions::default()).unwrap();
        assert_eq!(a, b);
        let c = stratified_split(
            &labels,
            &SplitOptions {
                seed: 7,
                ..SplitOptions::default()
            },
        )
        .unwrap();
        assert_ne!(a.test, c.test);
        assert_eq!(a.test.len(), c.test.len());
    }

    #[test]
    fn singleton_class_is_rejected() {
        let labels = vec![0, 0, 0, 0, 1];
        let err = stratified_split(&labels, &SplitOptions::default()).unwrap_err();
        assert!(matches!(err, SplitError::ClassTooSmall { label: 1, count: 1 }));
    }

    #[test]
    fn tiny_test_partition_is_rejected() {
        let labels = vec![0, 0, 0, 1, 1, 1];
        let options = SplitOptions {
            test_fraction: 0.1,
            seed: 42,
        };
        let err = stratified_split(&labels, &options).unwrap_err();
        assert!(matches!(
            err,
            SplitError::PartitionTooSmall {
                partition: "test",
                size: 1,
                n_classes: 2
            }
        ));
    }

    #[test]
    fn fraction_bounds_are_checked() {
        for bad in [0.0, 1.0, -0.1, f64::NAN] {
            let options = SplitOptions {
                test_fraction: bad,
                seed: 42,
            };
            assert!(matches!(
                stratified_split(&[0, 1, 0, 1], &options),
                Err(SplitError::InvalidFraction(_))
            ));
        }
    }

    #[test]
    fn small_classes_keep_a_training_row() {
        let counts = allocate_test_counts(&[2, 2, 96], 50, 100);
        assert!(counts[0] < 2 && counts[1] < 2);
        assert_eq!(counts.iter().sum::<usize>(), 50);
    }
}
