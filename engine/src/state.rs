use std::{collections::BTreeMap, time::Duration};

/// The progress of a run.
///
/// `epoch` and `iteration` are one based once the run started and count
/// completed work otherwise; `iteration` is global across epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub epoch: usize,
    pub iteration: usize,
    pub epoch_length: usize,
    pub max_epochs: usize,
    /// The last captured batch loss, `-1.0` until one is captured.
    pub saved_batch_loss: f32,
    /// The named scalars of the last step.
    pub output: BTreeMap<String, f32>,
    /// Values handlers derive from the outputs, e.g. running averages.
    pub metrics: BTreeMap<String, f32>,
    /// How long the last completed epoch took.
    pub epoch_time: Option<Duration>,
    pub(crate) should_terminate: bool,
}

impl State {
    /// Asks the engine to stop once the current iteration completes.
    pub fn terminate(&mut self) {
        self.should_terminate = true;
    }

    pub fn should_terminate(&self) -> bool {
        self.should_terminate
    }

    pub fn is_done(&self) -> bool {
        self.epoch_length > 0 && self.iteration >= self.epoch_length * self.max_epochs
    }
}

impl Default for State {
    fn default() -> Self {
        Self {
            epoch: 0,
            iteration: 0,
            epoch_length: 0,
            max_epochs: 0,
            saved_batch_loss: -1.0,
            output: BTreeMap::new(),
            metrics: BTreeMap::new(),
            epoch_time: None,
            should_terminate: false,
        }
    }
}
