use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::loss::LossFn;
use crate::Result;

/// A differentiable model whose parameters live in a flat slice owned by the caller.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Writes freshly initialized parameters into `params`.
    fn init_params<R: Rng>(&self, rng: &mut R, params: &mut [f32]) -> Result<()>;

    /// Computes the output for `x` without keeping any backward metadata.
    fn predict(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Computes the gradient of the loss with respect to the parameters over one batch.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer the gradient gets written into, overwritten entirely.
    /// * `loss_fn` - The loss function.
    /// * `x` - The batch inputs.
    /// * `y` - The batch class targets.
    ///
    /// # Returns
    /// The batch loss.
    fn backprop<L: LossFn>(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        loss_fn: &L,
        x: ArrayView2<f32>,
        y: &[usize],
    ) -> Result<f32>;
}
