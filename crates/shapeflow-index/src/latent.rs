use crate::error::LatentIndexError;

/// A dense row-major `[rows, dims]` matrix of latent codes.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentMatrix {
    rows: usize,
    dims: usize,
    data: Vec<f32>,
}

impl LatentMatrix {
    /// Create a matrix from a flat row-major buffer.
    pub fn new(rows: usize, dims: usize, data: Vec<f32>) -> Result<Self, LatentIndexError> {
        if rows == 0 || dims == 0 || data.len() != rows * dims {
            return Err(LatentIndexError::InvalidShape {
                rows,
                dims,
                len: data.len(),
            });
        }
        Ok(Self { rows, dims, data })
    }

    /// Create a matrix from one vector per row.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, LatentIndexError> {
        let dims = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|r| r.len() != dims) {
            return Err(LatentIndexError::DimensionMismatch {
                expected: dims,
                found: row.len(),
            });
        }
        let num_rows = rows.len();
        Self::new(num_rows, dims, rows.into_iter().flatten().collect())
    }

    /// A matrix filled with zeros.
    pub fn zeros(rows: usize, dims: usize) -> Result<Self, LatentIndexError> {
        Self::new(rows, dims, vec![0.0; rows * dims])
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Width of every row.
    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// A single row.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        self.data.get(index * self.dims..(index + 1) * self.dims)
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dims)
    }

    /// All values, row-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// All values, row-major, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the matrix and return its values, row-major.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Select rows by index, in the given order. Indices may repeat.
    pub fn gather(&self, indices: &[usize]) -> Result<Self, LatentIndexError> {
        let mut data = Vec::with_capacity(indices.len() * self.dims);
        for &index in indices {
            let row = self.row(index).ok_or(LatentIndexError::RowOutOfBounds {
                index,
                rows: self.rows,
            })?;
            data.extend_from_slice(row);
        }
        Self::new(indices.len(), self.dims, data)
    }

    /// Repeat the whole matrix `times` times along the row dimension.
    pub fn repeat(&self, times: usize) -> Result<Self, LatentIndexError> {
        let mut data = Vec::with_capacity(self.data.len() * times);
        for _ in 0..times {
            data.extend_from_slice(&self.data);
        }
        Self::new(self.rows * times, self.dims, data)
    }

    /// Sum of all rows.
    pub fn sum_rows(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.dims];
        for row in self.iter() {
            for (o, v) in out.iter_mut().zip(row) {
                *o += v;
            }
        }
        out
    }
}
