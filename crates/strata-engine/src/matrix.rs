//! Host-side row-major batches.
//!
//! Datasets are held as `[rows, cols]` matrices, one row per sample with
//! features flattened into columns. They are copied into backend tensors one
//! batch at a time; all numeric work happens on the backend.

use crate::error::{EngineError, EngineResult};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> EngineResult<Self> {
        if Some(data.len()) != rows.checked_mul(cols) {
            return Err(EngineError::Shape(format!(
                "buffer of {} values cannot hold [{rows}, {cols}]",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Stacks sample rows into a matrix. All rows must have the same width.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> EngineResult<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(EngineError::Shape(format!(
                    "row {idx} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { rows: rows.len(), cols, data })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[must_use]
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    /// Copies the listed rows, in the listed order, into a new matrix.
    #[must_use]
    pub fn gather_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &r in indices {
            data.extend_from_slice(self.row(r));
        }
        Self { rows: indices.len(), cols: self.cols, data }
    }

    #[must_use]
    pub fn slice_rows(&self, range: Range<usize>) -> Self {
        let start = range.start.min(self.rows);
        let end = range.end.clamp(start, self.rows);
        Self {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }

    /// Index of the largest value in row `r`; the first one wins on ties.
    #[must_use]
    pub fn argmax_row(&self, r: usize) -> usize {
        let row = self.row(r);
        let mut best = 0;
        for (idx, &v) in row.iter().enumerate() {
            if v > row[best] {
                best = idx;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let rows: Vec<Vec<f32>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(Matrix::from_rows(&rows), Err(EngineError::Shape(_))));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Matrix::from_vec(2, 2, vec![1.0; 3]).is_err());
        assert!(Matrix::from_vec(usize::MAX, 2, Vec::new()).is_err());
    }

    #[test]
    fn test_gather_and_slice_rows() {
        let m = Matrix::from_vec(4, 1, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.gather_rows(&[3, 1]).as_slice(), &[3.0, 1.0]);
        assert_eq!(m.slice_rows(1..3).as_slice(), &[1.0, 2.0]);
        assert!(m.slice_rows(5..9).is_empty());
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        let m = Matrix::from_rows(&[[0.2_f32, 0.7, 0.7]]).unwrap();
        assert_eq!(m.argmax_row(0), 1);
    }
}
