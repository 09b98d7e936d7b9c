use std::path::Path;

use log::info;
use machine_learning::data::{Blobs, Dataset};

use crate::Result;

const TRAIN_FILE: &str = "train.json";
const TEST_FILE: &str = "test.json";

/// Writes the train and test splits under `data_path` unless both are already there.
///
/// # Returns
/// Whether the splits were generated.
pub fn materialize(data_path: &Path) -> Result<bool> {
    let train = data_path.join(TRAIN_FILE);
    let test = data_path.join(TEST_FILE);
    if train.exists() && test.exists() {
        return Ok(false);
    }

    let blobs = Blobs::default();
    info!(
        features = blobs.features,
        classes = blobs.classes;
        "generating the blobs dataset into {}",
        data_path.display()
    );

    std::fs::create_dir_all(data_path)?;
    let (train_set, test_set) = blobs.generate()?;
    train_set.save(&train)?;
    test_set.save(&test)?;
    Ok(true)
}

/// Loads the splits `materialize` wrote.
pub fn get_train_test_datasets(data_path: &Path) -> Result<(Dataset, Dataset)> {
    let train = Dataset::load(data_path.join(TRAIN_FILE))?;
    let test = Dataset::load(data_path.join(TEST_FILE))?;
    Ok((train, test))
}
