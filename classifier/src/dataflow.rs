use std::sync::Arc;

use distributed::{
    Context,
    auto::{LoaderOptions, auto_dataloader},
};
use machine_learning::data::DataLoader;

use crate::{Config, Result, datasets};

/// Builds this participant's train and test loaders.
///
/// Rank 0 generates the dataset if needed while the others wait for it, then
/// every rank loads it from `data_path`.
///
/// # Returns
/// The shuffled train loader and the sequential test loader.
pub async fn get_dataflow(config: &Config, ctx: &mut Context) -> Result<(DataLoader, DataLoader)> {
    let data_path = config.data_path.clone();
    ctx.run_once(|| async move { datasets::materialize(&data_path) })
        .await?
        .transpose()?;

    let (train, test) = datasets::get_train_test_datasets(&config.data_path)?;

    let train_loader = auto_dataloader(
        Arc::new(train),
        LoaderOptions {
            batch_size: config.batch_size,
            num_workers: config.num_workers,
            shuffle: true,
            drop_last: true,
            seed: config.seed,
        },
        ctx,
    )?;

    let test_loader = auto_dataloader(
        Arc::new(test),
        LoaderOptions {
            batch_size: 2 * config.batch_size,
            num_workers: config.num_workers,
            shuffle: false,
            drop_last: false,
            seed: config.seed,
        },
        ctx,
    )?;

    Ok((train_loader, test_loader))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serial_loaders_follow_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().join("blobs"),
            batch_size: 100,
            num_workers: 0,
            ..Config::default()
        };

        let mut ctx = Context::serial();
        let (train, test) = get_dataflow(&config, &mut ctx).await.unwrap();

        assert_eq!(train.batch_size(), 100);
        assert_eq!(test.batch_size(), 200);
        assert_eq!(train.len(), train.dataset().len() / 100);
        assert_eq!(test.len(), test.dataset().len().div_ceil(200));
    }
}
