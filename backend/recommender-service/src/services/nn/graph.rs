use crate::error::{RecommenderError, Result};
use crate::services::dataset::CsrMatrix;
use candle_core::{Device, Tensor};

/// Square sparse matrix kept as COO index tensors, so `A · X` stays
/// differentiable in `X` and costs O(nnz · dim) instead of O(n² · dim).
#[derive(Debug, Clone)]
pub struct SparseAdjacency {
    rows: Tensor,
    cols: Tensor,
    /// `(nnz, 1)`, broadcast over the embedding dimension.
    values: Tensor,
    size: usize,
}

impl SparseAdjacency {
    pub fn from_csr(matrix: &CsrMatrix, device: &Device) -> Result<Self> {
        let (size, cols) = matrix.shape();
        if size != cols {
            return Err(RecommenderError::InvalidInput(format!(
                "adjacency must be square, got {}x{}",
                size, cols
            )));
        }

        let nnz = matrix.nnz();
        let mut row_ids = Vec::with_capacity(nnz);
        let mut col_ids = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        for (r, c, v) in matrix.iter() {
            row_ids.push(r as u32);
            col_ids.push(c as u32);
            values.push(v);
        }

        Ok(Self {
            rows: Tensor::from_vec(row_ids, nnz, device)?,
            cols: Tensor::from_vec(col_ids, nnz, device)?,
            values: Tensor::from_vec(values, (nnz, 1), device)?,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `A · x` for a dense `(size, dim)` right-hand side.
    pub fn matmul(&self, x: &Tensor) -> Result<Tensor> {
        let (rows, _) = x.dims2()?;
        if rows != self.size {
            return Err(RecommenderError::InvalidInput(format!(
                "adjacency of size {} cannot multiply {} rows",
                self.size, rows
            )));
        }
        let messages = x.index_select(&self.cols, 0)?.broadcast_mul(&self.values)?;
        Ok(x.zeros_like()?.index_add(&self.rows, &messages, 0)?)
    }
}
