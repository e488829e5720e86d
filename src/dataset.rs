use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PipelineError, Result};
use crate::types::{Sample, Split, SplitData};

/// Tolerance for the train/val/test ratios summing to one.
pub const RATIO_TOLERANCE: f64 = 1e-6;

/// Train/val/test proportions, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self> {
        validate_split_ratios(train, val, test)?;
        Ok(Self { train, val, test })
    }
}

/// Reject ratios outside [0, 1] or not summing to 1.0 within [`RATIO_TOLERANCE`].
pub fn validate_split_ratios(train: f64, val: f64, test: f64) -> Result<()> {
    for (name, value) in [("train", train), ("val", val), ("test", test)] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(PipelineError::Config(format!(
                "{} ratio {} must be between 0.0 and 1.0",
                name, value
            )));
        }
    }
    let sum = train + val + test;
    if (sum - 1.0).abs() > RATIO_TOLERANCE {
        return Err(PipelineError::Config(format!(
            "split ratios must sum to 1.0, got {} + {} + {} = {}",
            train, val, test, sum
        )));
    }
    Ok(())
}

// Number of items a ratio claims; the epsilon keeps 3.0000000000000004 at 3.
fn portion(len: usize, ratio: f64) -> usize {
    ((len as f64 * ratio) - 1e-9).ceil().max(0.0) as usize
}

/// Split the samples into training, validation, and testing sets
///
/// Samples are ordered by stem before the seeded shuffle, so the result does not
/// depend on the order in which the raw files were discovered.
pub fn split_samples(mut samples: Vec<Sample>, ratios: SplitRatios, seed: u64) -> SplitData {
    samples.sort_by(|a, b| a.stem.cmp(&b.stem));
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total = samples.len();
    let test_size = portion(total, ratios.test).min(total);
    let val_size = portion(total, ratios.val).min(total - test_size);

    let test = samples.drain(0..test_size).collect();
    let val = samples.drain(0..val_size).collect();

    SplitData {
        train: samples,
        val,
        test,
    }
}

/// K-fold partition of a training pool, persisted with the seed that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    pub seed: u64,
    pub k: usize,
    /// Member stems of each fold, sorted.
    pub folds: Vec<Vec<String>>,
}

impl FoldAssignment {
    /// Items held out as validation data in fold `index`, `None` past the last fold.
    pub fn held_out(&self, index: usize) -> Option<&[String]> {
        self.folds.get(index).map(Vec::as_slice)
    }

    /// Items the fold-`index` variant trains on: every other fold, sorted.
    pub fn training_complement(&self, index: usize) -> Vec<String> {
        let mut items: Vec<String> = self
            .folds
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .flat_map(|(_, fold)| fold.iter().cloned())
            .collect();
        items.sort();
        items
    }

    /// Check the folds are disjoint, near-equal in size and together equal `pool`.
    pub fn verify_partition(&self, pool: &[String]) -> Result<()> {
        let sizes: Vec<usize> = self.folds.iter().map(Vec::len).collect();
        let (min, max) = (
            sizes.iter().copied().min().unwrap_or(0),
            sizes.iter().copied().max().unwrap_or(0),
        );
        if max - min > 1 {
            return Err(PipelineError::Config(format!(
                "fold sizes differ by more than one: {:?}",
                sizes
            )));
        }

        let mut seen = BTreeSet::new();
        for item in self.folds.iter().flatten() {
            if !seen.insert(item.as_str()) {
                return Err(PipelineError::Config(format!(
                    "'{}' appears in more than one fold",
                    item
                )));
            }
        }
        let expected: BTreeSet<&str> = pool.iter().map(String::as_str).collect();
        if seen != expected {
            return Err(PipelineError::Config(
                "folds do not reconstruct the training pool".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partition `pool` into `k` disjoint folds whose sizes differ by at most one.
pub fn assign_folds(pool: &[String], k: usize, seed: u64) -> Result<FoldAssignment> {
    if k < 2 {
        return Err(PipelineError::Config(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if pool.len() < k {
        warn!(
            "Training pool of {} items is smaller than {} folds; some folds will be empty",
            pool.len(),
            k
        );
    }

    let mut items: Vec<String> = pool.to_vec();
    items.sort();
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let mut folds = vec![Vec::with_capacity(items.len() / k + 1); k];
    for (position, item) in items.into_iter().enumerate() {
        folds[position % k].push(item);
    }
    for fold in &mut folds {
        fold.sort();
    }

    info!(
        "Assigned {} training items to {} folds (sizes {:?})",
        pool.len(),
        k,
        folds.iter().map(Vec::len).collect::<Vec<_>>()
    );

    Ok(FoldAssignment { seed, k, folds })
}

/// Box count per class name for every split.
pub fn class_instance_counts(
    split_data: &SplitData,
    classes: &[String],
) -> BTreeMap<Split, BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for split in Split::ALL {
        let mut per_class: BTreeMap<String, usize> =
            classes.iter().map(|name| (name.clone(), 0)).collect();
        for sample in split_data.get(split) {
            for b in &sample.boxes {
                if let Some(name) = classes.get(b.class_id) {
                    *per_class.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }
        counts.insert(split, per_class);
    }
    counts
}
