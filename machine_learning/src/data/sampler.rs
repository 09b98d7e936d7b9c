use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Decides which samples an epoch visits and in what order.
///
/// Every order depends only on the seed and the epoch, so ranks agree on it
/// and a resumed run sees the same batches it would have seen.
#[derive(Debug, Clone, PartialEq)]
pub enum Sampler {
    Sequential,
    Random {
        seed: u64,
    },
    /// Splits the dataset between `world_size` ranks. The index list is
    /// padded by wrapping around so every rank gets the same amount of samples.
    Distributed {
        rank: usize,
        world_size: usize,
        shuffle: bool,
        seed: u64,
    },
}

impl Sampler {
    /// Returns the amount of samples this sampler yields per epoch.
    pub fn num_samples(&self, len: usize) -> usize {
        match *self {
            Sampler::Sequential | Sampler::Random { .. } => len,
            Sampler::Distributed { world_size, .. } => len.div_ceil(world_size.max(1)),
        }
    }

    /// Returns the sample indices of `epoch` over a dataset of `len` samples.
    pub fn indices(&self, len: usize, epoch: usize) -> Vec<usize> {
        match *self {
            Sampler::Sequential => (0..len).collect(),
            Sampler::Random { seed } => permutation(len, seed, epoch),
            Sampler::Distributed {
                rank,
                world_size,
                shuffle,
                seed,
            } => {
                if len == 0 {
                    return Vec::new();
                }

                let world_size = world_size.max(1);
                let mut indices = if shuffle {
                    permutation(len, seed, epoch)
                } else {
                    (0..len).collect()
                };

                let total = self.num_samples(len) * world_size;
                let mut i = 0;
                while indices.len() < total {
                    indices.push(indices[i]);
                    i += 1;
                }

                indices.into_iter().skip(rank).step_by(world_size).collect()
            }
        }
    }
}

fn permutation(len: usize, seed: u64, epoch: usize) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut rng);
    indices
}
