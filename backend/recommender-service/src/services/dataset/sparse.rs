use ndarray::{Array1, Array2};

/// Compressed sparse row matrix of `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
}

impl CsrMatrix {
    /// Build from (row, col, value) triplets. Duplicate coordinates are summed;
    /// column indices within a row come out sorted.
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[(usize, usize, f32)]) -> Self {
        let mut per_row: Vec<Vec<(usize, f32)>> = vec![Vec::new(); rows];
        for &(r, c, v) in triplets {
            debug_assert!(r < rows && c < cols, "triplet ({}, {}) out of bounds", r, c);
            per_row[r].push((c, v));
        }

        let mut indptr = Vec::with_capacity(rows + 1);
        let mut indices = Vec::with_capacity(triplets.len());
        let mut data = Vec::with_capacity(triplets.len());
        indptr.push(0);

        for mut entries in per_row {
            entries.sort_by_key(|&(c, _)| c);
            let mut last_col: Option<usize> = None;
            for (c, v) in entries {
                if last_col == Some(c) {
                    if let Some(slot) = data.last_mut() {
                        *slot += v;
                    }
                } else {
                    indices.push(c);
                    data.push(v);
                    last_col = Some(c);
                }
            }
            indptr.push(indices.len());
        }

        Self {
            rows,
            cols,
            indptr,
            indices,
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices of the non-zeros in row `r`.
    pub fn row_indices(&self, r: usize) -> &[usize] {
        &self.indices[self.indptr[r]..self.indptr[r + 1]]
    }

    pub fn row_values(&self, r: usize) -> &[f32] {
        &self.data[self.indptr[r]..self.indptr[r + 1]]
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        match self.row_indices(r).binary_search(&c) {
            Ok(pos) => self.row_values(r)[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.rows).flat_map(move |r| {
            self.row_indices(r)
                .iter()
                .zip(self.row_values(r))
                .map(move |(&c, &v)| (r, c, v))
        })
    }

    pub fn transpose(&self) -> CsrMatrix {
        let triplets: Vec<(usize, usize, f32)> = self.iter().map(|(r, c, v)| (c, r, v)).collect();
        CsrMatrix::from_triplets(self.cols, self.rows, &triplets)
    }

    pub fn row_sums(&self) -> Array1<f32> {
        Array1::from_iter((0..self.rows).map(|r| self.row_values(r).iter().sum::<f32>()))
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((self.rows, self.cols));
        for (r, c, v) in self.iter() {
            out[[r, c]] = v;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let m = CsrMatrix::from_triplets(2, 3, &[(0, 2, 1.0), (0, 0, 1.0), (0, 2, 1.0), (1, 1, 3.0)]);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.row_indices(0), &[0, 2]);
        assert_eq!(m.get(0, 2), 2.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn test_transpose_and_dense() {
        let m = CsrMatrix::from_triplets(2, 3, &[(0, 0, 1.0), (0, 1, 2.0), (1, 2, 3.0)]);
        assert_eq!(m.transpose().to_dense(), m.to_dense().t().to_owned());
        assert_eq!(m.row_sums(), array![3.0, 3.0]);
    }

    #[test]
    fn test_empty_rows() {
        let m = CsrMatrix::from_triplets(3, 2, &[(2, 1, 1.0)]);
        assert!(m.row_indices(0).is_empty());
        assert!(m.row_indices(1).is_empty());
        assert_eq!(m.row_indices(2), &[1]);
    }
}
