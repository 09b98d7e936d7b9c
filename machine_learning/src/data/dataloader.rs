use std::{
    sync::{
        Arc,
        mpsc::{Receiver, sync_channel},
    },
    thread,
};

use log::debug;

use super::{Batch, Dataset, Sampler};
use crate::{MlErr, Result};

/// Splits a dataset into batches following a sampler.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Arc<Dataset>,
    sampler: Sampler,
    batch_size: usize,
    drop_last: bool,
    num_workers: usize,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to batch.
    /// * `sampler` - The sampler choosing each epoch's indices.
    /// * `batch_size` - The amount of samples per batch.
    /// * `drop_last` - Whether to drop the trailing partial batch.
    /// * `num_workers` - When non zero, batches are built ahead on a background thread.
    ///
    /// # Returns
    /// A new `DataLoader` or an error if the batch size is zero.
    pub fn new(
        dataset: Arc<Dataset>,
        sampler: Sampler,
        batch_size: usize,
        drop_last: bool,
        num_workers: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(MlErr::InvalidBatchSize(batch_size));
        }

        Ok(Self {
            dataset,
            sampler,
            batch_size,
            drop_last,
            num_workers,
        })
    }

    /// Returns the amount of batches per epoch.
    pub fn len(&self) -> usize {
        let n = self.sampler.num_samples(self.dataset.len());
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Iterates over the batches of `epoch`.
    pub fn iter(&self, epoch: usize) -> Batches {
        self.iter_from(epoch, 0)
    }

    /// Iterates over the batches of `epoch`, skipping the first `skip` ones.
    pub fn iter_from(&self, epoch: usize, skip: usize) -> Batches {
        let mut chunks: Vec<Vec<usize>> = self
            .sampler
            .indices(self.dataset.len(), epoch)
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        chunks.truncate(self.len());
        chunks.drain(..skip.min(chunks.len()));

        if self.num_workers == 0 {
            return Batches::Inline {
                dataset: Arc::clone(&self.dataset),
                chunks: chunks.into_iter(),
            };
        }

        // The producer stops as soon as the receiving end is dropped.
        let (tx, rx) = sync_channel(2 * self.num_workers);
        let dataset = Arc::clone(&self.dataset);
        thread::spawn(move || {
            for chunk in chunks {
                if tx.send(dataset.batch(&chunk)).is_err() {
                    debug!(epoch = epoch; "batch consumer went away, stopping prefetch");
                    return;
                }
            }
        });

        Batches::Prefetch { rx }
    }
}

/// The batches of one epoch.
pub enum Batches {
    Inline {
        dataset: Arc<Dataset>,
        chunks: std::vec::IntoIter<Vec<usize>>,
    },
    Prefetch {
        rx: Receiver<Batch>,
    },
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Batches::Inline { dataset, chunks } => chunks.next().map(|chunk| dataset.batch(&chunk)),
            Batches::Prefetch { rx } => rx.recv().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn dataset(n: usize) -> Arc<Dataset> {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f32);
        Arc::new(Dataset::new(x, vec![0; n], 1).unwrap())
    }

    #[test]
    fn drop_last_controls_the_trailing_batch() {
        let kept = DataLoader::new(dataset(10), Sampler::Sequential, 4, false, 0).unwrap();
        let dropped = DataLoader::new(dataset(10), Sampler::Sequential, 4, true, 0).unwrap();

        assert_eq!(kept.len(), 3);
        assert_eq!(kept.iter(0).last().unwrap().len(), 2);
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped.iter(0).count(), 2);
    }

    #[test]
    fn prefetch_yields_the_same_batches() {
        let sampler = Sampler::Random { seed: 4 };
        let inline = DataLoader::new(dataset(33), sampler.clone(), 5, true, 0).unwrap();
        let prefetch = DataLoader::new(dataset(33), sampler, 5, true, 3).unwrap();

        let a: Vec<_> = inline.iter(1).collect();
        let b: Vec<_> = prefetch.iter(1).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn iter_from_skips_leading_batches() {
        let loader = DataLoader::new(dataset(12), Sampler::Random { seed: 2 }, 3, true, 0).unwrap();
        let all: Vec<_> = loader.iter(5).collect();
        let rest: Vec<_> = loader.iter_from(5, 2).collect();
        assert_eq!(rest, all[2..]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            DataLoader::new(dataset(3), Sampler::Sequential, 0, false, 0),
            Err(MlErr::InvalidBatchSize(0))
        ));
    }

    #[test]
    fn dropping_a_prefetching_iterator_does_not_hang() {
        let loader = DataLoader::new(dataset(100), Sampler::Sequential, 1, false, 1).unwrap();
        let mut batches = loader.iter(0);
        assert!(batches.next().is_some());
        drop(batches);
    }
}
