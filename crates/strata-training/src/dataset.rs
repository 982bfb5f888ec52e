use crate::error::{TrainingError, TrainingResult};
use crate::ids::{DataRefId, DatasetId};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use strata_engine::Matrix;

/// Raw supervised data: one feature vector and one label vector per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub x: Vec<Vec<f32>>,
    pub y: Vec<Vec<f32>>,
    #[serde(default)]
    pub xshape: Vec<usize>,
    #[serde(default)]
    pub yshape: Vec<usize>,
}

impl Dataset {
    #[must_use]
    pub fn new(x: Vec<Vec<f32>>, y: Vec<Vec<f32>>) -> Self {
        let xshape = x.first().map(|r| vec![r.len()]).unwrap_or_default();
        let yshape = y.first().map(|r| vec![r.len()]).unwrap_or_default();
        Self { x, y, xshape, yshape }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.x.len() != self.y.len() {
            return Err(TrainingError::Dataset(format!(
                "{} feature rows but {} label rows",
                self.x.len(),
                self.y.len()
            )));
        }
        check_rows("x", &self.x, &self.xshape)?;
        check_rows("y", &self.y, &self.yshape)?;
        Ok(())
    }

    /// Copies `rows` into a feature matrix and a label matrix.
    pub fn tensors(&self, rows: Range<usize>) -> TrainingResult<(Matrix, Matrix)> {
        let end = rows.end.min(self.len());
        let start = rows.start.min(end);
        let stack = |rows: &[Vec<f32>]| {
            Matrix::from_rows(rows).map_err(|e| TrainingError::Dataset(e.to_string()))
        };
        Ok((stack(&self.x[start..end])?, stack(&self.y[start..end])?))
    }
}

/// `shape` may describe one sample (`[4]`) or the whole array (`[rows, 4]`).
fn shape_matches(shape: &[usize], rows: usize, width: usize) -> bool {
    let product = |dims: &[usize]| dims.iter().try_fold(1_usize, |acc, &d| acc.checked_mul(d));
    if shape.is_empty() || product(shape) == Some(width) {
        return true;
    }
    shape.len() > 1 && shape[0] == rows && product(&shape[1..]) == Some(width)
}

fn check_rows(name: &str, rows: &[Vec<f32>], shape: &[usize]) -> TrainingResult<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let width = first.len();
    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(TrainingError::Dataset(format!(
            "{name}[{idx}] has {} values, expected {width}",
            row.len()
        )));
    }
    if !shape_matches(shape, rows.len(), width) {
        return Err(TrainingError::Dataset(format!(
            "{name} rows have {width} values, which does not fit shape {shape:?}"
        )));
    }
    Ok(())
}

/// Named dataset document; the data itself lives behind `dataref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    #[serde(default)]
    pub name: String,
    pub dataref: DataRefId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRef {
    pub id: DataRefId,
    pub data: Dataset,
}
