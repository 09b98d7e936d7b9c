//! Helpers adapting single participant objects to the process group.

use std::sync::Arc;

use log::{debug, info};
use machine_learning::{
    arch::{Model, Network},
    data::{DataLoader, Dataset, Sampler},
};

use crate::{Context, Result};

/// What a loader would look like on a single participant.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub num_workers: usize,
    pub shuffle: bool,
    pub drop_last: bool,
    pub seed: u64,
}

/// Builds a loader for this participant.
///
/// In a group of more than one, the batch size is split between ranks, the
/// workers between the participants of a node, and a distributed sampler hands
/// each rank its own share of the samples.
///
/// # Arguments
/// * `dataset` - The dataset to load.
/// * `options` - The single participant loader options.
/// * `ctx` - The participant's context.
///
/// # Returns
/// The loader or an error if the resulting batch size is invalid.
pub fn auto_dataloader(
    dataset: Arc<Dataset>,
    options: LoaderOptions,
    ctx: &Context,
) -> Result<DataLoader> {
    let LoaderOptions {
        mut batch_size,
        mut num_workers,
        shuffle,
        drop_last,
        seed,
    } = options;

    let world_size = ctx.world_size();
    let sampler = if world_size > 1 {
        batch_size = (batch_size / world_size).max(1);
        num_workers = num_workers.div_ceil(ctx.nproc_per_node());

        Sampler::Distributed {
            rank: ctx.rank(),
            world_size,
            shuffle,
            seed,
        }
    } else if shuffle {
        Sampler::Random { seed }
    } else {
        Sampler::Sequential
    };

    if ctx.is_leader() {
        info!(
            batch_size = batch_size,
            num_workers = num_workers,
            shuffle = shuffle,
            drop_last = drop_last;
            "using a {} loader on {}",
            sampler_name(&sampler),
            ctx.device()
        );
    }

    Ok(DataLoader::new(
        dataset,
        sampler,
        batch_size,
        drop_last,
        num_workers,
    )?)
}

/// Makes every replica start from rank 0's parameters.
pub async fn auto_model<M: Model>(network: &mut Network<M>, ctx: &mut Context) -> Result<()> {
    if ctx.world_size() > 1 {
        debug!(rank = ctx.rank(); "broadcasting the initial parameters");
        ctx.broadcast(network.params_mut(), 0).await?;
    }

    Ok(())
}

/// Averages the gradient across replicas.
pub async fn sync_gradients<M: Model>(network: &mut Network<M>, ctx: &mut Context) -> Result<()> {
    let world_size = ctx.world_size();
    if world_size == 1 {
        return Ok(());
    }

    let grad = network.grad_mut();
    ctx.all_reduce(grad).await?;

    let scale = 1.0 / world_size as f32;
    grad.iter_mut().for_each(|g| *g *= scale);
    Ok(())
}

fn sampler_name(sampler: &Sampler) -> &'static str {
    match sampler {
        Sampler::Sequential => "sequential",
        Sampler::Random { .. } => "random",
        Sampler::Distributed { .. } => "distributed",
    }
}
