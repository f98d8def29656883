use super::lock_vars;
use crate::error::{RecommenderError, Result};
use crate::services::dataset::CsrMatrix;
use candle_core::{Device, Shape, Tensor, Var};
use candle_nn::{AdamW, Linear, Optimizer, ParamsAdamW, VarMap};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Register `name` in `varmap` with the given initial values and return its
/// tensor. The tensor shares storage with the variable, so optimizer steps
/// and checkpoint loads show through it.
pub fn new_var<S: Into<Shape>>(
    varmap: &VarMap,
    name: &str,
    shape: S,
    values: Vec<f32>,
    device: &Device,
) -> Result<Tensor> {
    let var = Var::from_tensor(&Tensor::from_vec(values, shape, device)?)?;
    let tensor = var.as_tensor().clone();

    let mut vars = lock_vars(varmap);
    if vars.contains_key(name) {
        return Err(RecommenderError::InvalidInput(format!("duplicate variable {}", name)));
    }
    vars.insert(name.to_string(), var);
    Ok(tensor)
}

/// `in_dim -> out_dim` layer registered as `{prefix}.weight` `(out, in)` and
/// `{prefix}.bias`, both drawn from U(-1/sqrt(in_dim), 1/sqrt(in_dim)).
pub fn linear_layer<R: Rng + ?Sized>(
    varmap: &VarMap,
    prefix: &str,
    in_dim: usize,
    out_dim: usize,
    rng: &mut R,
    device: &Device,
) -> Result<Linear> {
    let bound = 1.0 / (in_dim.max(1) as f32).sqrt();
    let uniform = Uniform::new_inclusive(-bound, bound);
    let weight_values: Vec<f32> = (0..in_dim * out_dim).map(|_| uniform.sample(&mut *rng)).collect();
    let bias_values: Vec<f32> = (0..out_dim).map(|_| uniform.sample(&mut *rng)).collect();

    let weight = new_var(varmap, &format!("{}.weight", prefix), (out_dim, in_dim), weight_values, device)?;
    let bias = new_var(varmap, &format!("{}.bias", prefix), out_dim, bias_values, device)?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Plain Adam over every variable in `varmap`.
pub fn adam(varmap: &VarMap, learning_rate: f32) -> Result<AdamW> {
    let params = ParamsAdamW {
        lr: learning_rate as f64,
        weight_decay: 0.0,
        ..ParamsAdamW::default()
    };
    Ok(AdamW::new(varmap.all_vars(), params)?)
}

/// `ln(1 + e^x)` as `max(x, 0) + ln(1 + e^-|x|)`, finite for large `|x|`.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    Ok(x.relu()?.add(&tail)?)
}

pub fn to_array2(tensor: &Tensor) -> Result<Array2<f32>> {
    let (rows, cols) = tensor.dims2()?;
    let values = tensor.flatten_all()?.to_vec1::<f32>()?;
    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| RecommenderError::InvalidInput(format!("tensor to array: {}", e)))
}

/// Dense `(rows.len(), cols)` tensor holding the selected rows of `matrix`.
pub fn dense_rows(matrix: &CsrMatrix, rows: &[usize], device: &Device) -> Result<Tensor> {
    let (height, cols) = matrix.shape();
    let mut values = vec![0.0f32; rows.len() * cols];
    for (slot, &row) in rows.iter().enumerate() {
        if row >= height {
            return Err(RecommenderError::InvalidInput(format!("row {} out of range", row)));
        }
        for (&col, &value) in matrix.row_indices(row).iter().zip(matrix.row_values(row)) {
            values[slot * cols + col] = value;
        }
    }
    Ok(Tensor::from_vec(values, (rows.len(), cols), device)?)
}
