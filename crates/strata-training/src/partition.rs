//! Contiguous train / validation / test split of a dataset.
//!
//! Splits are row ranges over the borrowed dataset; tensors are only
//! materialized on request.

use crate::dataset::Dataset;
use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use strata_engine::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitPolicy {
    pub train_fraction: f64,
    pub validation_fraction: f64,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self { train_fraction: 0.37, validation_fraction: 0.25 }
    }
}

impl SplitPolicy {
    pub fn validate(&self) -> TrainingResult<()> {
        let in_range = |f: f64| f > 0.0 && f < 1.0;
        if !in_range(self.train_fraction) || !in_range(self.validation_fraction) {
            return Err(TrainingError::InvalidSpec(format!(
                "split fractions must be in (0, 1), got {} / {}",
                self.train_fraction, self.validation_fraction
            )));
        }
        if self.train_fraction + self.validation_fraction > 1.0 {
            return Err(TrainingError::InvalidSpec(
                "train and validation fractions sum past 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `(train_count, validation_count)` for `len` rows, each floored.
    #[must_use]
    pub fn counts(&self, len: usize) -> (usize, usize) {
        let n = len as f64;
        let train = (self.train_fraction * n).floor() as usize;
        let validation = (self.validation_fraction * n).floor() as usize;
        (train, validation)
    }
}

/// A row range of a dataset.
#[derive(Debug, Clone)]
pub struct Split<'a> {
    dataset: &'a Dataset,
    rows: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct TensorSet {
    pub x: Matrix,
    pub y: Matrix,
}

impl Split<'_> {
    #[must_use]
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn tensors(&self) -> TrainingResult<TensorSet> {
        let (x, y) = self.dataset.tensors(self.rows.clone())?;
        Ok(TensorSet { x, y })
    }
}

#[derive(Debug, Clone)]
pub struct Partitions<'a> {
    pub train: Split<'a>,
    pub validation: Split<'a>,
    /// Rows past train and validation. Only evaluated on request.
    pub test: Split<'a>,
}

impl Partitions<'_> {
    #[must_use]
    pub fn sizes(&self) -> PartitionSizes {
        PartitionSizes {
            train: self.train.len(),
            validation: self.validation.len(),
            test: self.test.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Splits `dataset` into `[0, train)`, `[train, train + validation)` and the
/// remainder.
///
/// Fails when the dataset is empty or too small to give both the train and
/// validation splits at least one row.
pub fn partition<'a>(dataset: &'a Dataset, policy: &SplitPolicy) -> TrainingResult<Partitions<'a>> {
    policy.validate()?;
    let len = dataset.len();
    if len == 0 {
        return Err(TrainingError::Dataset("dataset has no rows".to_string()));
    }
    let (train, validation) = policy.counts(len);
    if train == 0 || validation == 0 {
        return Err(TrainingError::Dataset(format!(
            "{len} rows give {train} training and {validation} validation rows"
        )));
    }
    let split = |rows: Range<usize>| Split { dataset, rows };
    Ok(Partitions {
        train: split(0..train),
        validation: split(train..train + validation),
        test: split(train + validation..len),
    })
}
