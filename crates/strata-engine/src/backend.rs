//! Backend selection and host/backend transfers.
//!
//! Training runs on `Autodiff<NdArray>`; evaluation runs the same weights on
//! the inner `NdArray` backend, where dropout is inert.

use crate::error::{EngineError, EngineResult};
use crate::matrix::Matrix;
use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;

pub type EvalBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<EvalBackend>;
pub type Device = <TrainBackend as Backend>::Device;

pub(crate) fn to_tensor<B: Backend>(matrix: Matrix, device: &B::Device) -> Tensor<B, 2> {
    let shape = matrix.shape();
    Tensor::from_data(TensorData::new(matrix.into_vec(), shape), device)
}

pub(crate) fn to_matrix<B: Backend>(tensor: Tensor<B, 2>) -> EngineResult<Matrix> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| EngineError::Data(format!("{e:?}")))?;
    Matrix::from_vec(rows, cols, values)
}
