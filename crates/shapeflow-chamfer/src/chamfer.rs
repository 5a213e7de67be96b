use glam::Vec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::batch::{PointBatch, SymmetryAxis};
use crate::error::PointSetError;

/// How the two directional distances are combined into one value per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Average of the two directional means.
    #[default]
    Mean,
    /// Maximum of the two directional maxima.
    Max,
}

/// Result of a batched Chamfer distance evaluation.
///
/// Distances are squared Euclidean. The index fields hold the nearest neighbour
/// chosen for every point, so a gradient can be taken with the assignment fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChamferOutput {
    /// For every point of A, distance to its nearest point in B. `[batch][n]`.
    pub accuracy: Vec<Vec<f32>>,
    /// For every point of B, distance to its nearest point in A. `[batch][m]`.
    pub completeness: Vec<Vec<f32>>,
    /// Reduced symmetric distance per entry. `[batch]`.
    pub symmetric: Vec<f32>,
    /// Index into B of the nearest neighbour of every point of A.
    pub accuracy_index: Vec<Vec<u32>>,
    /// Index into A of the nearest neighbour of every point of B.
    pub completeness_index: Vec<Vec<u32>>,
}

impl ChamferOutput {
    /// Number of entries in the evaluated batch.
    pub fn batch_size(&self) -> usize {
        self.symmetric.len()
    }

    /// Mean accuracy per entry.
    pub fn accuracy_means(&self) -> Vec<f32> {
        self.accuracy.iter().map(|d| mean(d)).collect()
    }

    /// Mean completeness per entry.
    pub fn completeness_means(&self) -> Vec<f32> {
        self.completeness.iter().map(|d| mean(d)).collect()
    }
}

/// Gradients of the directional means of one entry with respect to A's points.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalGrads {
    /// Gradient of `mean(accuracy)`.
    pub accuracy: Vec<[f32; 3]>,
    /// Gradient of `mean(completeness)`.
    pub completeness: Vec<[f32; 3]>,
}

impl DirectionalGrads {
    /// Gradient of the mean-reduced symmetric distance.
    pub fn symmetric(&self) -> Vec<[f32; 3]> {
        self.accuracy
            .iter()
            .zip(self.completeness.iter())
            .map(|(a, c)| {
                [
                    0.5 * (a[0] + c[0]),
                    0.5 * (a[1] + c[1]),
                    0.5 * (a[2] + c[2]),
                ]
            })
            .collect()
    }
}

/// Bidirectional nearest-neighbour distance between two batches of point sets.
///
/// Each entry is matched independently with a k-d tree built on the other set.
/// When a symmetry axis is set, both sets are extended with their reflection
/// before matching, so the per-point outputs have twice the input length.
#[derive(Debug, Clone, Default)]
pub struct ChamferDistance {
    reduction: Reduction,
    symmetry: Option<SymmetryAxis>,
}

impl ChamferDistance {
    /// Create a distance with the given reduction and no symmetry padding.
    pub fn new(reduction: Reduction) -> Self {
        Self {
            reduction,
            symmetry: None,
        }
    }

    /// Mirror both point sets across `axis` before matching.
    pub fn with_symmetry(mut self, axis: Option<SymmetryAxis>) -> Self {
        self.symmetry = axis;
        self
    }

    /// The current reduction.
    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// Change the reduction used for the symmetric term.
    pub fn set_reduction(&mut self, reduction: Reduction) {
        self.reduction = reduction;
    }

    /// The symmetry axis, if any.
    pub fn symmetry(&self) -> Option<SymmetryAxis> {
        self.symmetry
    }

    /// Compute accuracy, completeness and the reduced symmetric distance.
    ///
    /// # Arguments
    ///
    /// * `a` - Batch of shape `[batch, n, 3]`.
    /// * `b` - Batch of shape `[batch, m, 3]`.
    pub fn compute(&self, a: &PointBatch, b: &PointBatch) -> Result<ChamferOutput, PointSetError> {
        if a.batch_size() != b.batch_size() {
            return Err(PointSetError::BatchMismatch(a.batch_size(), b.batch_size()));
        }

        let (a, b) = match self.symmetry {
            Some(axis) => (a.mirrored(axis), b.mirrored(axis)),
            None => (a.clone(), b.clone()),
        };

        log::trace!(
            "chamfer: batch={} n={} m={}",
            a.batch_size(),
            a.num_points(),
            b.num_points()
        );

        let entries = a
            .iter()
            .zip(b.iter())
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(pa, pb)| {
                let (accuracy, accuracy_index) = nearest_neighbors(pa, pb);
                let (completeness, completeness_index) = nearest_neighbors(pb, pa);
                (accuracy, accuracy_index, completeness, completeness_index)
            })
            .collect::<Vec<_>>();

        let mut output = ChamferOutput {
            accuracy: Vec::with_capacity(entries.len()),
            completeness: Vec::with_capacity(entries.len()),
            symmetric: Vec::with_capacity(entries.len()),
            accuracy_index: Vec::with_capacity(entries.len()),
            completeness_index: Vec::with_capacity(entries.len()),
        };

        for (accuracy, accuracy_index, completeness, completeness_index) in entries {
            let symmetric = match self.reduction {
                Reduction::Mean => 0.5 * (mean(&accuracy) + mean(&completeness)),
                Reduction::Max => max(&accuracy).max(max(&completeness)),
            };
            output.accuracy.push(accuracy);
            output.completeness.push(completeness);
            output.symmetric.push(symmetric);
            output.accuracy_index.push(accuracy_index);
            output.completeness_index.push(completeness_index);
        }

        Ok(output)
    }

    /// Gradients of the directional means of `entry` with respect to A's points.
    ///
    /// `a` and `b` must be the batches passed to [`ChamferDistance::compute`] that
    /// produced `output`. The nearest-neighbour assignment is held constant, and
    /// with symmetry padding the gradient of the mirrored half is folded back, so
    /// the result always has one row per point of the unpadded entry.
    pub fn mean_grads(
        &self,
        output: &ChamferOutput,
        a: &PointBatch,
        b: &PointBatch,
        entry: usize,
    ) -> Result<DirectionalGrads, PointSetError> {
        let out_of_bounds = PointSetError::EntryOutOfBounds {
            index: entry,
            len: a.batch_size(),
        };
        let pa = a.entry(entry).ok_or(out_of_bounds.clone())?;
        let pb = b.entry(entry).ok_or(out_of_bounds.clone())?;
        let accuracy_index = output.accuracy_index.get(entry).ok_or(out_of_bounds.clone())?;
        let completeness_index = output
            .completeness_index
            .get(entry)
            .ok_or(out_of_bounds)?;

        let (pa, pb) = match self.symmetry {
            Some(axis) => (mirror_set(pa, axis), mirror_set(pb, axis)),
            None => (pa.to_vec(), pb.to_vec()),
        };

        let n = pa.len() as f32;
        let m = pb.len() as f32;

        let accuracy = pa
            .iter()
            .zip(accuracy_index.iter())
            .map(|(p, &j)| {
                let d = Vec3::from_array(*p) - Vec3::from_array(pb[j as usize]);
                (d * (2.0 / n)).to_array()
            })
            .collect::<Vec<_>>();

        let mut completeness = vec![Vec3::ZERO; pa.len()];
        for (q, &i) in pb.iter().zip(completeness_index.iter()) {
            let i = i as usize;
            let d = Vec3::from_array(pa[i]) - Vec3::from_array(*q);
            completeness[i] += d * (2.0 / m);
        }
        let completeness = completeness
            .into_iter()
            .map(|g| g.to_array())
            .collect::<Vec<_>>();

        Ok(match self.symmetry {
            Some(axis) => DirectionalGrads {
                accuracy: axis.fold_grad(&accuracy),
                completeness: axis.fold_grad(&completeness),
            },
            None => DirectionalGrads {
                accuracy,
                completeness,
            },
        })
    }
}

/// Chamfer distance without symmetry padding.
///
/// Example:
///
/// ```
/// use shapeflow_chamfer::{chamfer_distance, PointBatch, Reduction};
///
/// let a = PointBatch::from_points(vec![[0.0, 0.0, 0.0]]).unwrap();
/// let b = PointBatch::from_points(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
/// let out = chamfer_distance(&a, &b, Reduction::Mean).unwrap();
/// assert_eq!(out.accuracy[0], vec![0.0]);
/// assert_eq!(out.completeness[0], vec![0.0, 3.0]);
/// ```
pub fn chamfer_distance(
    a: &PointBatch,
    b: &PointBatch,
    reduction: Reduction,
) -> Result<ChamferOutput, PointSetError> {
    ChamferDistance::new(reduction).compute(a, b)
}

// squared distance from every source point to its nearest target point
fn nearest_neighbors(source: &[[f32; 3]], target: &[[f32; 3]]) -> (Vec<f32>, Vec<u32>) {
    let kdtree: ImmutableKdTree<f32, u32, 3, 32> = ImmutableKdTree::new_from_slice(target);
    source
        .iter()
        .map(|p| {
            let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(p);
            (nn.distance, nn.item)
        })
        .unzip()
}

fn mirror_set(points: &[[f32; 3]], axis: SymmetryAxis) -> Vec<[f32; 3]> {
    points
        .iter()
        .copied()
        .chain(points.iter().map(|p| axis.mirror(*p)))
        .collect()
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn max(values: &[f32]) -> f32 {
    values.iter().copied().fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_batch(rng: &mut StdRng, batch: usize, n: usize) -> PointBatch {
        let sets = (0..batch)
            .map(|_| {
                (0..n)
                    .map(|_| [rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>()])
                    .collect()
            })
            .collect();
        PointBatch::from_sets(sets).unwrap()
    }

    fn brute_force(source: &[[f32; 3]], target: &[[f32; 3]]) -> Vec<f32> {
        source
            .iter()
            .map(|p| {
                target
                    .iter()
                    .map(|q| (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2) + (p[2] - q[2]).powi(2))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect()
    }

    #[test]
    fn test_chamfer_single_point() -> Result<(), PointSetError> {
        let a = PointBatch::from_points(vec![[0.0, 0.0, 0.0]])?;
        let b = PointBatch::from_points(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]])?;
        let out = chamfer_distance(&a, &b, Reduction::Mean)?;
        assert_eq!(out.accuracy, vec![vec![0.0]]);
        assert_eq!(out.completeness, vec![vec![0.0, 3.0]]);
        assert_eq!(out.completeness_index, vec![vec![0, 0]]);
        assert_relative_eq!(out.symmetric[0], 0.75);

        let out = chamfer_distance(&a, &b, Reduction::Max)?;
        assert_relative_eq!(out.symmetric[0], 3.0);
        Ok(())
    }

    #[test]
    fn test_chamfer_identity() -> Result<(), PointSetError> {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_batch(&mut rng, 3, 50);
        let out = chamfer_distance(&a, &a, Reduction::Mean)?;
        for entry in out.accuracy.iter().chain(out.completeness.iter()) {
            assert!(entry.iter().all(|&d| d == 0.0));
        }
        assert!(out.symmetric.iter().all(|&d| d == 0.0));
        Ok(())
    }

    #[test]
    fn test_chamfer_directions_swap() -> Result<(), PointSetError> {
        let mut rng = StdRng::seed_from_u64(11);
        let a = random_batch(&mut rng, 2, 40);
        let b = random_batch(&mut rng, 2, 25);
        let ab = chamfer_distance(&a, &b, Reduction::Mean)?;
        let ba = chamfer_distance(&b, &a, Reduction::Mean)?;
        assert_eq!(ab.completeness, ba.accuracy);
        assert_eq!(ab.accuracy, ba.completeness);
        Ok(())
    }

    #[test]
    fn test_chamfer_matches_brute_force() -> Result<(), PointSetError> {
        let mut rng = StdRng::seed_from_u64(3);
        let a = random_batch(&mut rng, 2, 64);
        let b = random_batch(&mut rng, 2, 80);
        let out = chamfer_distance(&a, &b, Reduction::Mean)?;
        for e in 0..2 {
            let (pa, pb) = (a.entry(e).unwrap(), b.entry(e).unwrap());
            for (got, want) in out.accuracy[e].iter().zip(brute_force(pa, pb)) {
                assert_relative_eq!(*got, want, epsilon = 1e-6);
            }
            for (got, want) in out.completeness[e].iter().zip(brute_force(pb, pa)) {
                assert_relative_eq!(*got, want, epsilon = 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_chamfer_batch_mismatch() -> Result<(), PointSetError> {
        let a = PointBatch::from_sets(vec![vec![[0.0; 3]], vec![[0.0; 3]]])?;
        let b = PointBatch::from_points(vec![[0.0; 3]])?;
        assert_eq!(
            chamfer_distance(&a, &b, Reduction::Mean),
            Err(PointSetError::BatchMismatch(2, 1))
        );
        Ok(())
    }

    #[test]
    fn test_chamfer_symmetry_padding() -> Result<(), PointSetError> {
        // b is the mirror of a: unpadded distance is non-zero, padded it vanishes
        let a = PointBatch::from_points(vec![[0.0, 0.0, 1.0], [1.0, 0.0, 2.0]])?;
        let b = PointBatch::from_points(vec![[0.0, 0.0, -1.0], [1.0, 0.0, -2.0]])?;
        let plain = ChamferDistance::new(Reduction::Mean).compute(&a, &b)?;
        assert!(plain.symmetric[0] > 0.0);

        let padded = ChamferDistance::new(Reduction::Mean)
            .with_symmetry(Some(SymmetryAxis::Z))
            .compute(&a, &b)?;
        assert_eq!(padded.accuracy[0].len(), 4);
        assert_eq!(padded.symmetric[0], 0.0);
        Ok(())
    }

    #[test]
    fn test_mean_grads_match_finite_differences() -> Result<(), PointSetError> {
        let mut rng = StdRng::seed_from_u64(5);
        let a = random_batch(&mut rng, 1, 12);
        let b = random_batch(&mut rng, 1, 9);

        for symmetry in [None, Some(SymmetryAxis::X)] {
            let dist = ChamferDistance::new(Reduction::Mean).with_symmetry(symmetry);
            let out = dist.compute(&a, &b)?;
            let grads = dist.mean_grads(&out, &a, &b, 0)?;
            assert_eq!(grads.accuracy.len(), 12);

            // perturb one coordinate; the assignment stays fixed for a tiny step
            let eps = 1e-3;
            let (i, k) = (4, 1);
            let mut shifted = a.as_slice().to_vec();
            shifted[i][k] += eps;
            let shifted = PointBatch::from_points(shifted)?;
            let out_shifted = dist.compute(&shifted, &b)?;

            let d_acc = (out_shifted.accuracy_means()[0] - out.accuracy_means()[0]) / eps;
            let d_comp = (out_shifted.completeness_means()[0] - out.completeness_means()[0]) / eps;
            assert_relative_eq!(grads.accuracy[i][k], d_acc, epsilon = 2e-3);
            assert_relative_eq!(grads.completeness[i][k], d_comp, epsilon = 2e-3);
        }
        Ok(())
    }
}
