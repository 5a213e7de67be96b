use serde::{Deserialize, Serialize};

use crate::error::PointSetError;

/// Axis across which a shape family is bilaterally symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymmetryAxis {
    /// Mirror across the YZ plane.
    X,
    /// Mirror across the XZ plane.
    Y,
    /// Mirror across the XY plane.
    Z,
}

impl SymmetryAxis {
    /// Coordinate index of the axis.
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            SymmetryAxis::X => 0,
            SymmetryAxis::Y => 1,
            SymmetryAxis::Z => 2,
        }
    }

    /// Reflect a single point across the axis.
    #[inline]
    pub fn mirror(&self, point: [f32; 3]) -> [f32; 3] {
        let mut out = point;
        out[self.index()] = -out[self.index()];
        out
    }

    /// Map a gradient taken over a mirrored set back onto the original points.
    ///
    /// `grad` must hold `2 * n` rows laid out as produced by [`PointBatch::mirrored`]:
    /// the original points first, then their reflections. The reflected half is
    /// reflected back and accumulated onto its source point.
    pub fn fold_grad(&self, grad: &[[f32; 3]]) -> Vec<[f32; 3]> {
        let n = grad.len() / 2;
        let (direct, reflected) = grad.split_at(n);
        direct
            .iter()
            .zip(reflected.iter())
            .map(|(d, r)| {
                let r = self.mirror(*r);
                [d[0] + r[0], d[1] + r[1], d[2] + r[2]]
            })
            .collect()
    }
}

/// A dense batch of point sets with shape `[batch, n, 3]`.
///
/// Every entry holds the same number of points. Points are stored entry-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PointBatch {
    batch: usize,
    num_points: usize,
    data: Vec<[f32; 3]>,
}

impl PointBatch {
    /// Create a batch from a flat buffer and a `[batch, n, dims]` shape.
    ///
    /// Fails when `dims != 3`, when `batch` or `n` is zero, or when the buffer
    /// length does not match the shape.
    pub fn from_shape_vec(shape: [usize; 3], data: Vec<f32>) -> Result<Self, PointSetError> {
        let [batch, num_points, dims] = shape;
        if dims != 3 || batch == 0 || num_points == 0 {
            return Err(PointSetError::InvalidShape(shape.to_vec()));
        }
        let expected = batch * num_points * dims;
        if data.len() != expected {
            return Err(PointSetError::LengthMismatch {
                shape: shape.to_vec(),
                expected,
                found: data.len(),
            });
        }
        let data = data
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect::<Vec<_>>();
        Ok(Self {
            batch,
            num_points,
            data,
        })
    }

    /// Create a batch from one vector of points per entry.
    pub fn from_sets(sets: Vec<Vec<[f32; 3]>>) -> Result<Self, PointSetError> {
        let Some(first) = sets.first() else {
            return Err(PointSetError::InvalidShape(vec![0, 0, 3]));
        };
        let num_points = first.len();
        for (entry, set) in sets.iter().enumerate() {
            if set.is_empty() {
                return Err(PointSetError::EmptyPointSet(entry));
            }
            if set.len() != num_points {
                return Err(PointSetError::RaggedBatch {
                    entry,
                    expected: num_points,
                    found: set.len(),
                });
            }
        }
        let batch = sets.len();
        let data = sets.into_iter().flatten().collect();
        Ok(Self {
            batch,
            num_points,
            data,
        })
    }

    /// Create a batch holding a single point set.
    pub fn from_points(points: Vec<[f32; 3]>) -> Result<Self, PointSetError> {
        Self::from_sets(vec![points])
    }

    /// Number of entries in the batch.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch
    }

    /// Number of points per entry.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// The `[batch, n, 3]` shape of the batch.
    pub fn shape(&self) -> [usize; 3] {
        [self.batch, self.num_points, 3]
    }

    /// Points of a single entry.
    pub fn entry(&self, index: usize) -> Option<&[[f32; 3]]> {
        if index >= self.batch {
            return None;
        }
        let start = index * self.num_points;
        self.data.get(start..start + self.num_points)
    }

    /// Iterate over the entries of the batch.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, [f32; 3]> {
        self.data.chunks_exact(self.num_points)
    }

    /// All points, entry-major.
    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.data
    }

    /// Consume the batch and return its points, entry-major.
    pub fn into_vec(self) -> Vec<[f32; 3]> {
        self.data
    }

    /// Repeat the whole batch `times` times along the batch dimension.
    pub fn repeat(&self, times: usize) -> Result<Self, PointSetError> {
        if times == 0 {
            return Err(PointSetError::InvalidShape(vec![0, self.num_points, 3]));
        }
        let mut data = Vec::with_capacity(self.data.len() * times);
        for _ in 0..times {
            data.extend_from_slice(&self.data);
        }
        Ok(Self {
            batch: self.batch * times,
            num_points: self.num_points,
            data,
        })
    }

    /// Select entries by index, in the given order. Indices may repeat.
    pub fn gather(&self, indices: &[usize]) -> Result<Self, PointSetError> {
        if indices.is_empty() {
            return Err(PointSetError::InvalidShape(vec![0, self.num_points, 3]));
        }
        let mut data = Vec::with_capacity(indices.len() * self.num_points);
        for &index in indices {
            let entry = self.entry(index).ok_or(PointSetError::EntryOutOfBounds {
                index,
                len: self.batch,
            })?;
            data.extend_from_slice(entry);
        }
        Ok(Self {
            batch: indices.len(),
            num_points: self.num_points,
            data,
        })
    }

    /// Extend each entry with its reflection across `axis`, doubling `n`.
    pub fn mirrored(&self, axis: SymmetryAxis) -> Self {
        let mut data = Vec::with_capacity(self.data.len() * 2);
        for entry in self.iter() {
            data.extend_from_slice(entry);
            data.extend(entry.iter().map(|p| axis.mirror(*p)));
        }
        Self {
            batch: self.batch,
            num_points: self.num_points * 2,
            data,
        }
    }
}
