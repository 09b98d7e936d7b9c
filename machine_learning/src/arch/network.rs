use ndarray::{Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng};

use super::{Model, loss::LossFn};
use crate::{MlErr, Result};

/// A model together with the flat parameter and gradient buffers it trains.
#[derive(Debug, Clone)]
pub struct Network<M: Model> {
    model: M,
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl<M: Model> Network<M> {
    /// Creates a new `Network` with parameters initialized from `seed`.
    ///
    /// # Arguments
    /// * `model` - The model architecture.
    /// * `seed` - The seed of the parameter initialization.
    ///
    /// # Returns
    /// A new `Network` instance or an error if the initialization failed.
    pub fn new(model: M, seed: u64) -> Result<Self> {
        let size = model.size();
        let mut params = vec![0.0; size];
        model.init_params(&mut StdRng::seed_from_u64(seed), &mut params)?;

        Ok(Self {
            model,
            params,
            grad: vec![0.0; size],
        })
    }

    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut [f32] {
        &mut self.grad
    }

    /// Gives the parameters and the gradient at once, the way optimizers need them.
    pub fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    /// Replaces the parameters, the new ones must have the same length.
    pub fn set_params(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "network parameters",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(params);
        Ok(())
    }

    /// Computes this batch's gradient into the network's gradient buffer.
    ///
    /// # Returns
    /// The batch loss.
    pub fn backprop<L: LossFn>(
        &mut self,
        loss_fn: &L,
        x: ArrayView2<f32>,
        y: &[usize],
    ) -> Result<f32> {
        self.model
            .backprop(&self.params, &mut self.grad, loss_fn, x, y)
    }

    pub fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.model.predict(&self.params, x)
    }
}
