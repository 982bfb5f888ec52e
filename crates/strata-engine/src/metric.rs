//! Metrics reported alongside the loss.
//!
//! Metrics never feed gradients, so they are computed on the host from the
//! predictions of a batch.

use crate::error::{EngineError, EngineResult};
use crate::matrix::Matrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const EPSILON: f64 = 1e-7;
const THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Accuracy,
    BinaryAccuracy,
    BinaryCrossentropy,
    CategoricalAccuracy,
    CategoricalCrossentropy,
    CosineProximity,
    Mape,
    MeanAbsoluteError,
    MeanAbsolutePercentageError,
    MeanSquaredError,
    Mse,
    Precision,
    R2Score,
    Recall,
    SparseCategoricalAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 15] = [
        Self::Accuracy,
        Self::BinaryAccuracy,
        Self::BinaryCrossentropy,
        Self::CategoricalAccuracy,
        Self::CategoricalCrossentropy,
        Self::CosineProximity,
        Self::Mape,
        Self::MeanAbsoluteError,
        Self::MeanAbsolutePercentageError,
        Self::MeanSquaredError,
        Self::Mse,
        Self::Precision,
        Self::R2Score,
        Self::Recall,
        Self::SparseCategoricalAccuracy,
    ];

    /// Identifier, also used as the key in training logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::BinaryAccuracy => "binaryAccuracy",
            Self::BinaryCrossentropy => "binaryCrossentropy",
            Self::CategoricalAccuracy => "categoricalAccuracy",
            Self::CategoricalCrossentropy => "categoricalCrossentropy",
            Self::CosineProximity => "cosineProximity",
            Self::Mape => "mape",
            Self::MeanAbsoluteError => "meanAbsoluteError",
            Self::MeanAbsolutePercentageError => "meanAbsolutePercentageError",
            Self::MeanSquaredError => "meanSquaredError",
            Self::Mse => "mse",
            Self::Precision => "precision",
            Self::R2Score => "r2Score",
            Self::Recall => "recall",
            Self::SparseCategoricalAccuracy => "sparseCategoricalAccuracy",
        }
    }

    pub fn compute(self, pred: &Matrix, target: &Matrix) -> EngineResult<f64> {
        if self != Self::SparseCategoricalAccuracy {
            if pred.shape() != target.shape() {
                return Err(EngineError::Shape(format!(
                    "predictions {:?} vs labels {:?}",
                    pred.shape(),
                    target.shape()
                )));
            }
        } else if pred.rows() != target.rows() || target.cols() != 1 {
            return Err(EngineError::Shape(format!(
                "sparse labels must be [{}, 1], got {:?}",
                pred.rows(),
                target.shape()
            )));
        }
        if pred.is_empty() {
            return Err(EngineError::Shape("metric over an empty batch".to_string()));
        }

        let value = match self {
            // `accuracy` resolves by output width, one column meaning binary.
            Self::Accuracy if pred.cols() == 1 => binary_accuracy(pred, target),
            Self::Accuracy | Self::CategoricalAccuracy => categorical_accuracy(pred, target),
            Self::BinaryAccuracy => binary_accuracy(pred, target),
            Self::BinaryCrossentropy => mean_elementwise(pred, target, |p, t| {
                let p = p.clamp(EPSILON, 1.0 - EPSILON);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            }),
            Self::CategoricalCrossentropy => categorical_crossentropy(pred, target),
            Self::CosineProximity => cosine_proximity(pred, target),
            Self::Mape | Self::MeanAbsolutePercentageError => {
                mean_elementwise(pred, target, |p, t| 100.0 * (t - p).abs() / t.abs().max(EPSILON))
            }
            Self::MeanAbsoluteError => mean_elementwise(pred, target, |p, t| (p - t).abs()),
            Self::MeanSquaredError | Self::Mse => {
                mean_elementwise(pred, target, |p, t| (p - t).powi(2))
            }
            Self::Precision => {
                let (tp, fp, _) = confusion(pred, target);
                ratio(tp, tp + fp)
            }
            Self::Recall => {
                let (tp, _, fn_) = confusion(pred, target);
                ratio(tp, tp + fn_)
            }
            Self::R2Score => r2_score(pred, target),
            Self::SparseCategoricalAccuracy => {
                let hits = (0..pred.rows())
                    .filter(|&r| pred.argmax_row(r) as f32 == target.get(r, 0).round())
                    .count();
                ratio(hits, pred.rows())
            }
        };
        Ok(value)
    }
}

fn mean_elementwise(pred: &Matrix, target: &Matrix, f: impl Fn(f64, f64) -> f64) -> f64 {
    let sum: f64 = pred
        .as_slice()
        .iter()
        .zip(target.as_slice())
        .map(|(&p, &t)| f(f64::from(p), f64::from(t)))
        .sum();
    sum / pred.as_slice().len().max(1) as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn binary_accuracy(pred: &Matrix, target: &Matrix) -> f64 {
    let hits = pred
        .as_slice()
        .iter()
        .zip(target.as_slice())
        .filter(|&(&p, &t)| (p > THRESHOLD) == (t > THRESHOLD))
        .count();
    ratio(hits, pred.as_slice().len())
}

fn categorical_accuracy(pred: &Matrix, target: &Matrix) -> f64 {
    let hits = (0..pred.rows()).filter(|&r| pred.argmax_row(r) == target.argmax_row(r)).count();
    ratio(hits, pred.rows())
}

fn categorical_crossentropy(pred: &Matrix, target: &Matrix) -> f64 {
    let mut total = 0.0;
    for r in 0..pred.rows() {
        let norm: f64 = pred.row(r).iter().map(|&p| f64::from(p)).sum::<f64>().max(EPSILON);
        for (&p, &t) in pred.row(r).iter().zip(target.row(r)) {
            let p = (f64::from(p) / norm).clamp(EPSILON, 1.0 - EPSILON);
            total -= f64::from(t) * p.ln();
        }
    }
    total / pred.rows() as f64
}

fn cosine_proximity(pred: &Matrix, target: &Matrix) -> f64 {
    let mut total = 0.0;
    let norm = |row: &[f32]| {
        row.iter().map(|&v| f64::from(v).powi(2)).sum::<f64>().sqrt().max(EPSILON)
    };
    for r in 0..pred.rows() {
        let (p_row, t_row) = (pred.row(r), target.row(r));
        let (pn, tn) = (norm(p_row), norm(t_row));
        let dot: f64 = p_row.iter().zip(t_row).map(|(&p, &t)| f64::from(p) * f64::from(t)).sum();
        total -= dot / (pn * tn);
    }
    total / pred.rows() as f64
}

/// `(true positives, false positives, false negatives)` at a 0.5 threshold.
fn confusion(pred: &Matrix, target: &Matrix) -> (usize, usize, usize) {
    let mut counts = (0, 0, 0);
    for (&p, &t) in pred.as_slice().iter().zip(target.as_slice()) {
        match (p > THRESHOLD, t > THRESHOLD) {
            (true, true) => counts.0 += 1,
            (true, false) => counts.1 += 1,
            (false, true) => counts.2 += 1,
            (false, false) => {}
        }
    }
    counts
}

fn r2_score(pred: &Matrix, target: &Matrix) -> f64 {
    let n = target.as_slice().len() as f64;
    let mean = target.as_slice().iter().map(|&t| f64::from(t)).sum::<f64>() / n;
    let ss_res = mean_elementwise(pred, target, |p, t| (t - p).powi(2)) * n;
    let ss_tot: f64 = target.as_slice().iter().map(|&t| (f64::from(t) - mean).powi(2)).sum();
    1.0 - ss_res / (ss_tot + EPSILON)
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EngineError::UnknownMetric(s.to_string()))
    }
}
