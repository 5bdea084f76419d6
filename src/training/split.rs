//! Seeded train/test split with optional stratification

use crate::error::{ExoError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// Row indices of a train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub stratified: bool,
    /// Why stratification was skipped, when it was
    pub warning: Option<String>,
}

/// Number of held-out rows for `n` samples
pub fn test_count(n: usize, test_size: f64) -> usize {
    (test_size * n as f64).ceil() as usize
}

/// Split rows into train and test sets.
///
/// Stratifies by class when there are at least two classes, every class has
/// at least two rows and both sides can hold one row of each class.
/// Otherwise falls back to a plain shuffled split and reports why.
pub fn train_test_split(y: &[usize], n_classes: usize, test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ExoError::invalid_param("test_size", test_size, "must be between 0 and 1"));
    }
    let n = y.len();
    let n_test = test_count(n, test_size);
    if n_test == 0 || n_test >= n {
        return Err(ExoError::InsufficientData(format!(
            "{} rows cannot be split with test_size {}",
            n, test_size
        )));
    }
    let n_train = n - n_test;

    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &c) in y.iter().enumerate() {
        by_class[c].push(i);
    }
    let present: Vec<usize> = (0..n_classes).filter(|&c| !by_class[c].is_empty()).collect();

    let reason = if present.len() < 2 {
        Some("only one class present".to_string())
    } else if let Some(&c) = present.iter().find(|&&c| by_class[c].len() < 2) {
        Some(format!("class index {} has fewer than 2 rows", c))
    } else if n_test < present.len() || n_train < present.len() {
        Some(format!(
            "{} classes do not fit in {} test / {} train rows",
            present.len(),
            n_test,
            n_train
        ))
    } else {
        None
    };

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    if let Some(reason) = reason {
        let warning = format!("Stratified split not possible ({}); using random split", reason);
        warn!(%warning, "Falling back to unstratified split");
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let train = order.split_off(n_test);
        return Ok(SplitIndices { train, test: order, stratified: false, warning: Some(warning) });
    }

    let counts: Vec<usize> = by_class.iter().map(Vec::len).collect();
    let allocation = allocate_test_rows(&counts, n_test);

    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (rows, &k) in by_class.iter_mut().zip(&allocation) {
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..k]);
        train.extend_from_slice(&rows[k..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test, stratified: true, warning: None })
}

/// Held-out rows per class: proportional, at least one and at most
/// `count - 1` for every present class, summing to `n_test`.
fn allocate_test_rows(counts: &[usize], n_test: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts.iter().map(|&c| c as f64 * n_test as f64 / n as f64).collect();
    let mut alloc: Vec<usize> = counts
        .iter()
        .zip(&exact)
        .map(|(&c, &e)| if c == 0 { 0 } else { (e.floor() as usize).clamp(1, c - 1) })
        .collect();

    // Largest remainder first; lower class index wins ties
    let mut order: Vec<usize> = (0..counts.len()).filter(|&c| counts[c] > 0).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - alloc[a] as f64;
        let rb = exact[b] - alloc[b] as f64;
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut total: usize = alloc.iter().sum();
    while total < n_test {
        let Some(&c) = order.iter().find(|&&c| alloc[c] + 1 < counts[c]) else { break };
        alloc[c] += 1;
        total += 1;
        let shift = order.iter().position(|&o| o == c).map_or(0, |p| p + 1);
        order.rotate_left(shift);
    }
    while total > n_test {
        let Some(&c) = order.iter().rev().find(|&&c| alloc[c] > 1) else { break };
        alloc[c] -= 1;
        total -= 1;
    }
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_preserves_class_balance() {
        let y: Vec<usize> = (0..100).map(|i| usize::from(i >= 80)).collect();
        let split = train_test_split(&y, 2, 0.2, 42).unwrap();

        assert!(split.stratified);
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let minority_in_test = split.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(minority_in_test, 4);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let y: Vec<usize> = (0..50).map(|i| i % 3).collect();
        let a = train_test_split(&y, 3, 0.3, 42).unwrap();
        let b = train_test_split(&y, 3, 0.3, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_partition_is_complete() {
        let y: Vec<usize> = (0..37).map(|i| i % 4).collect();
        let split = train_test_split(&y, 4, 0.25, 7).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
        assert_eq!(split.test.len(), test_count(37, 0.25));
    }

    #[test]
    fn test_singleton_class_falls_back() {
        let y = vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let split = train_test_split(&y, 2, 0.2, 42).unwrap();
        assert!(!split.stratified);
        assert!(split.warning.is_some());
        assert_eq!(split.test.len(), 2);
    }

    #[test]
    fn test_invalid_test_size() {
        assert!(matches!(
            train_test_split(&[0, 1], 2, 1.0, 42),
            Err(ExoError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_too_few_rows() {
        assert!(matches!(
            train_test_split(&[0], 1, 0.2, 42),
            Err(ExoError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_allocation_sums_to_target() {
        let alloc = allocate_test_rows(&[5, 3, 2], 4);
        assert_eq!(alloc.iter().sum::<usize>(), 4);
        assert!(alloc.iter().all(|&k| k >= 1));
    }
}
