use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::error::LatentIndexError;
use crate::latent::LatentMatrix;

/// The k nearest indexed codes of every query row, sorted by ascending distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    /// Euclidean distances, `[queries][k]`.
    pub distances: Vec<Vec<f32>>,
    /// Row indices into the indexed latent matrix, `[queries][k]`.
    pub indices: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_sq: f32,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

// ties are broken by row index so results are reproducible
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct Node {
    index: u32,
    split_dimension: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn build(latents: &LatentMatrix, mut rows: Vec<u32>, depth: usize) -> Option<Box<Node>> {
        if rows.is_empty() {
            return None;
        }

        // cycle the split axis with depth
        let split_dimension = depth % latents.dims();
        let coord = |row: u32| latents.as_slice()[row as usize * latents.dims() + split_dimension];

        let median = rows.len() / 2;
        rows.select_nth_unstable_by(median, |&a, &b| {
            coord(a).total_cmp(&coord(b)).then(a.cmp(&b))
        });

        let right_rows = rows.split_off(median + 1);
        let index = rows.pop()?;

        Some(Box::new(Node {
            index,
            split_dimension,
            left: Node::build(latents, rows, depth + 1),
            right: Node::build(latents, right_rows, depth + 1),
        }))
    }

    fn knn_search(
        &self,
        latents: &LatentMatrix,
        query: &[f32],
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let point = &latents.as_slice()
            [self.index as usize * latents.dims()..(self.index as usize + 1) * latents.dims()];
        let candidate = Candidate {
            distance_sq: squared_distance(point, query),
            index: self.index,
        };

        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let split_distance = query[self.split_dimension] - point[self.split_dimension];
        let (nearer, further) = if split_distance < 0.0 {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(node) = nearer {
            node.knn_search(latents, query, k, heap);
        }

        // the far side can only hold a closer code if the splitting plane is within reach
        let worst = if heap.len() < k {
            f32::INFINITY
        } else {
            heap.peek().map_or(f32::INFINITY, |c| c.distance_sq)
        };
        if split_distance * split_distance <= worst {
            if let Some(node) = further {
                node.knn_search(latents, query, k, heap);
            }
        }
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// A static nearest-neighbour index over a fixed set of latent codes.
///
/// The index is immutable once built. Changing any indexed code requires a
/// full [`LatentIndex::rebuild`].
#[derive(Debug, Clone)]
pub struct LatentIndex {
    latents: LatentMatrix,
    root: Option<Box<Node>>,
}

impl LatentIndex {
    /// Build the index over the rows of `latents`.
    pub fn new(latents: LatentMatrix) -> Self {
        let rows = (0..latents.rows() as u32).collect::<Vec<_>>();
        let root = Node::build(&latents, rows, 0);
        log::debug!(
            "built latent index over {} codes of width {}",
            latents.rows(),
            latents.dims()
        );
        Self { latents, root }
    }

    /// Replace every indexed code and rebuild the tree from scratch.
    pub fn rebuild(&mut self, latents: LatentMatrix) {
        *self = Self::new(latents);
    }

    /// Number of indexed codes.
    pub fn len(&self) -> usize {
        self.latents.rows()
    }

    /// Whether the index holds no codes.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Width of the indexed codes.
    pub fn dims(&self) -> usize {
        self.latents.dims()
    }

    /// The indexed codes.
    pub fn latents(&self) -> &LatentMatrix {
        &self.latents
    }

    /// The `k` nearest codes to a single query, as `(distance, index)` pairs.
    pub fn query_one(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>, LatentIndexError> {
        self.check_k(k)?;
        if query.len() != self.dims() {
            return Err(LatentIndexError::DimensionMismatch {
                expected: self.dims(),
                found: query.len(),
            });
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = &self.root {
            root.knn_search(&self.latents, query, k, &mut heap);
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.distance_sq.sqrt(), c.index as usize))
            .collect())
    }

    /// The `k` nearest codes to every row of `queries`.
    ///
    /// # Errors
    ///
    /// [`LatentIndexError::InvalidQuery`] when `k` is zero or exceeds the number
    /// of indexed codes, [`LatentIndexError::DimensionMismatch`] when the query
    /// width differs from the indexed width.
    pub fn query(&self, queries: &LatentMatrix, k: usize) -> Result<Neighbors, LatentIndexError> {
        self.check_k(k)?;
        if queries.dims() != self.dims() {
            return Err(LatentIndexError::DimensionMismatch {
                expected: self.dims(),
                found: queries.dims(),
            });
        }

        let results = queries
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|q| self.query_one(q, k))
            .collect::<Result<Vec<_>, _>>()?;

        let (distances, indices) = results
            .into_iter()
            .map(|r| r.into_iter().unzip::<_, _, Vec<_>, Vec<_>>())
            .unzip();

        Ok(Neighbors { distances, indices })
    }

    fn check_k(&self, k: usize) -> Result<(), LatentIndexError> {
        if k == 0 || k > self.len() {
            return Err(LatentIndexError::InvalidQuery { k, len: self.len() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn brute_force(latents: &LatentMatrix, query: &[f32], k: usize) -> Vec<usize> {
        let mut all = latents
            .iter()
            .enumerate()
            .map(|(i, row)| (squared_distance(row, query), i))
            .collect::<Vec<_>>();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn test_knn_single() -> Result<(), LatentIndexError> {
        let latents = LatentMatrix::from_rows(vec![
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ])?;
        let index = LatentIndex::new(latents);
        let res = index.query_one(&[0.1, 0.0, 0.0], 2)?;
        assert_eq!(res[0].1, 0);
        assert_eq!(res[1].1, 1);
        assert_relative_eq!(res[0].0, 0.1, epsilon = 1e-6);
        assert_relative_eq!(res[1].0, 0.9, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_knn_matches_brute_force() -> Result<(), LatentIndexError> {
        let mut rng = StdRng::seed_from_u64(17);
        let dims = 8;
        let data = (0..300 * dims).map(|_| rng.random::<f32>()).collect();
        let latents = LatentMatrix::new(300, dims, data)?;
        let index = LatentIndex::new(latents.clone());

        for _ in 0..20 {
            let query = (0..dims).map(|_| rng.random::<f32>()).collect::<Vec<_>>();
            let got = index
                .query_one(&query, 10)?
                .into_iter()
                .map(|(_, i)| i)
                .collect::<Vec<_>>();
            assert_eq!(got, brute_force(&latents, &query, 10));
        }
        Ok(())
    }

    #[test]
    fn test_query_invalid_k() -> Result<(), LatentIndexError> {
        let index = LatentIndex::new(LatentMatrix::from_rows(vec![vec![0.0], vec![1.0]])?);
        let q = LatentMatrix::from_rows(vec![vec![0.5]])?;
        assert_eq!(
            index.query(&q, 3),
            Err(LatentIndexError::InvalidQuery { k: 3, len: 2 })
        );
        assert_eq!(
            index.query(&q, 0),
            Err(LatentIndexError::InvalidQuery { k: 0, len: 2 })
        );
        Ok(())
    }

    #[test]
    fn test_query_dimension_mismatch() -> Result<(), LatentIndexError> {
        let index = LatentIndex::new(LatentMatrix::from_rows(vec![vec![0.0, 0.0]])?);
        let q = LatentMatrix::from_rows(vec![vec![0.5]])?;
        assert_eq!(
            index.query(&q, 1),
            Err(LatentIndexError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
        Ok(())
    }

    #[test]
    fn test_rebuild() -> Result<(), LatentIndexError> {
        let mut index = LatentIndex::new(LatentMatrix::from_rows(vec![vec![0.0], vec![10.0]])?);
        assert_eq!(index.query_one(&[9.0], 1)?[0].1, 1);
        index.rebuild(LatentMatrix::from_rows(vec![vec![9.0], vec![0.0], vec![5.0]])?);
        assert_eq!(index.len(), 3);
        assert_eq!(index.query_one(&[9.0], 1)?[0].1, 0);
        Ok(())
    }
}
