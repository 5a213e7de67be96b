//! Mini-batch samplers over reference shape indices.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Produces the reference indices of the next mini-batch.
pub trait BatchSampler {
    /// Indices of the next mini-batch. Empty only for an empty pool.
    fn next_batch(&mut self, rng: &mut StdRng) -> Vec<usize>;

    /// Number of indices per mini-batch.
    fn batch_size(&self) -> usize;
}

// shuffled pool emitted in full batches, reshuffled when exhausted
#[derive(Debug, Clone)]
struct ShuffledPool {
    pool: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    epoch: usize,
}

impl ShuffledPool {
    fn new(pool: Vec<usize>, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, pool.len().max(1));
        Self {
            // start exhausted so the first call shuffles
            cursor: pool.len(),
            pool,
            batch_size,
            epoch: 0,
        }
    }

    fn next_batch(&mut self, rng: &mut StdRng) -> Vec<usize> {
        if self.pool.is_empty() {
            return Vec::new();
        }
        // drop the incomplete tail of an epoch
        if self.cursor + self.batch_size > self.pool.len() {
            self.pool.shuffle(rng);
            self.cursor = 0;
            self.epoch += 1;
            log::trace!("sampler epoch {}", self.epoch);
        }
        let batch = self.pool[self.cursor..self.cursor + self.batch_size].to_vec();
        self.cursor += self.batch_size;
        batch
    }
}

/// Samples every reference index without replacement within an epoch.
///
/// The batch size is clamped to the number of references. When fewer than a
/// full batch remain, the epoch ends and the indices are reshuffled.
#[derive(Debug, Clone)]
pub struct EpochSampler {
    inner: ShuffledPool,
}

impl EpochSampler {
    /// Sampler over `0..len`.
    pub fn new(len: usize, batch_size: usize) -> Self {
        Self {
            inner: ShuffledPool::new((0..len).collect(), batch_size),
        }
    }
}

impl BatchSampler for EpochSampler {
    fn next_batch(&mut self, rng: &mut StdRng) -> Vec<usize> {
        self.inner.next_batch(rng)
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size
    }
}

/// Samples only from a fixed neighbourhood of reference indices.
///
/// The neighbourhood is repeated `oversample` times per epoch and emitted in
/// batches the size of the neighbourhood, so indices recur within a batch.
#[derive(Debug, Clone)]
pub struct NeighborhoodSampler {
    inner: ShuffledPool,
}

impl NeighborhoodSampler {
    /// Sampler over `neighbors`, each repeated `oversample` times per epoch.
    pub fn new(neighbors: &[usize], oversample: usize) -> Self {
        let batch_size = neighbors.len();
        let pool = neighbors
            .iter()
            .copied()
            .cycle()
            .take(neighbors.len() * oversample.max(1))
            .collect();
        Self {
            inner: ShuffledPool::new(pool, batch_size),
        }
    }
}

impl BatchSampler for NeighborhoodSampler {
    fn next_batch(&mut self, rng: &mut StdRng) -> Vec<usize> {
        self.inner.next_batch(rng)
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_epoch_sampler_covers_each_index_once() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut sampler = EpochSampler::new(12, 4);
        let mut seen = (0..3)
            .flat_map(|_| sampler.next_batch(&mut rng))
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_epoch_sampler_reshuffles_and_drops_tail() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sampler = EpochSampler::new(10, 4);
        // two full batches per epoch, the remaining two indices are dropped
        for _ in 0..7 {
            let batch = sampler.next_batch(&mut rng);
            assert_eq!(batch.len(), 4);
            let mut unique = batch.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 4);
        }
    }

    #[test]
    fn test_epoch_sampler_clamps_batch_size() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut sampler = EpochSampler::new(3, 32);
        assert_eq!(sampler.batch_size(), 3);
        let mut batch = sampler.next_batch(&mut rng);
        batch.sort_unstable();
        assert_eq!(batch, vec![0, 1, 2]);
    }

    #[test]
    fn test_neighborhood_sampler() {
        let mut rng = StdRng::seed_from_u64(3);
        let neighbors = [7, 2, 9];
        let mut sampler = NeighborhoodSampler::new(&neighbors, 10);
        assert_eq!(sampler.batch_size(), 3);
        let mut counts = [0usize; 10];
        for _ in 0..10 {
            for i in sampler.next_batch(&mut rng) {
                counts[i] += 1;
            }
        }
        // one epoch: every neighbour exactly `oversample` times
        assert_eq!(counts[7], 10);
        assert_eq!(counts[2], 10);
        assert_eq!(counts[9], 10);
        assert_eq!(counts.iter().sum::<usize>(), 30);
    }

    #[test]
    fn test_sampler_is_deterministic() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut sampler = EpochSampler::new(50, 8);
            (0..10).map(|_| sampler.next_batch(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(draw(5), draw(5));
        assert_ne!(draw(5), draw(6));
    }
}
