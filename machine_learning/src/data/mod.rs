mod blobs;
mod dataloader;
mod dataset;
mod sampler;

pub use blobs::Blobs;
pub use dataloader::{Batches, DataLoader};
pub use dataset::{Batch, Dataset};
pub use sampler::Sampler;
