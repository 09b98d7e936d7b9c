use machine_learning::{
    arch::{Model, Network},
    optimization::{PiecewiseLinear, Sgd},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, State};

/// An object that can be written into a checkpoint and restored in place.
pub trait Stateful {
    fn state_dict(&self) -> Result<Value>;

    fn load_state_dict(&mut self, state: Value) -> Result<()>;
}

/// The persisted part of the engine state.
#[derive(Serialize, Deserialize)]
struct TrainerState {
    epoch: usize,
    iteration: usize,
    epoch_length: usize,
    max_epochs: usize,
    saved_batch_loss: f32,
}

impl Stateful for State {
    fn state_dict(&self) -> Result<Value> {
        let state = TrainerState {
            epoch: self.epoch,
            iteration: self.iteration,
            epoch_length: self.epoch_length,
            max_epochs: self.max_epochs,
            saved_batch_loss: self.saved_batch_loss,
        };

        Ok(serde_json::to_value(state)?)
    }

    fn load_state_dict(&mut self, state: Value) -> Result<()> {
        let TrainerState {
            epoch,
            iteration,
            epoch_length,
            max_epochs,
            saved_batch_loss,
        } = serde_json::from_value(state)?;

        self.epoch = epoch;
        self.iteration = iteration;
        self.epoch_length = epoch_length;
        self.max_epochs = max_epochs;
        self.saved_batch_loss = saved_batch_loss;
        Ok(())
    }
}

impl<M: Model> Stateful for Network<M> {
    fn state_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.params())?)
    }

    fn load_state_dict(&mut self, state: Value) -> Result<()> {
        let params: Vec<f32> = serde_json::from_value(state)?;
        self.set_params(&params)?;
        Ok(())
    }
}

impl Stateful for Sgd {
    fn state_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn load_state_dict(&mut self, state: Value) -> Result<()> {
        *self = serde_json::from_value(state)?;
        Ok(())
    }
}

impl Stateful for PiecewiseLinear {
    fn state_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn load_state_dict(&mut self, state: Value) -> Result<()> {
        *self = serde_json::from_value(state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{Sequential, layers::Dense},
        optimization::Optimizer,
    };

    use super::*;

    #[test]
    fn trainer_state_skips_transient_fields() {
        let mut state = State {
            epoch: 2,
            iteration: 17,
            epoch_length: 8,
            max_epochs: 5,
            saved_batch_loss: 0.25,
            ..State::default()
        };
        state.output.insert("batch loss".into(), 1.0);
        let dict = state.state_dict().unwrap();

        let mut restored = State::default();
        restored.load_state_dict(dict).unwrap();
        assert_eq!((restored.epoch, restored.iteration), (2, 17));
        assert_eq!(restored.saved_batch_loss, 0.25);
        assert!(restored.output.is_empty());
    }

    #[test]
    fn optimizer_momentum_survives_a_restore() {
        let mut sgd = Sgd::new(0.1, 0.9, 0.0, true);
        let mut params = [1.0, 2.0];
        sgd.update_params(&mut params, &[0.5, 0.5]).unwrap();

        let mut restored = Sgd::new(0.0, 0.0, 0.0, false);
        restored.load_state_dict(sgd.state_dict().unwrap()).unwrap();
        assert_eq!(restored, sgd);
    }

    #[test]
    fn network_rejects_params_of_another_model() {
        let small = Network::new(Sequential::new([Dense::new((2, 2), None)]), 0).unwrap();
        let mut big = Network::new(Sequential::new([Dense::new((3, 2), None)]), 0).unwrap();
        assert!(big.load_state_dict(small.state_dict().unwrap()).is_err());
    }
}
