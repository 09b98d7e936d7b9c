use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Stateful;
use crate::{EngineErr, Result};

/// The components of a checkpoint by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    components: BTreeMap<String, Value>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the state of `component` under `name`, names are unique.
    pub fn insert<S: Stateful + ?Sized>(&mut self, name: &str, component: &S) -> Result<()> {
        if self.components.contains_key(name) {
            return Err(EngineErr::DuplicateComponent(name.to_string()));
        }

        self.components
            .insert(name.to_string(), component.state_dict()?);
        Ok(())
    }

    /// Restores `component` in place from the state saved under `name`.
    pub fn restore<S: Stateful + ?Sized>(&self, name: &str, component: &mut S) -> Result<()> {
        let state = self
            .components
            .get(name)
            .ok_or_else(|| EngineErr::MissingComponent(name.to_string()))?;

        component.load_state_dict(state.clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}

/// Reads a checkpoint file.
///
/// # Returns
/// The bundle or `EngineErr::MissingCheckpoint` if `path` does not exist.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Bundle> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineErr::MissingCheckpoint(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
