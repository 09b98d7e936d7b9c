use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{Model, layers::Dense, loss::LossFn};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Makes a forward pass through the network keeping every layer's metadata.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("sequential parameters", params.len())?;

        let mut rest = params;
        let mut a = x.to_owned();

        for layer in self.layers.iter_mut() {
            let (head, tail) = rest.split_at(layer.size());
            a = layer.forward(head, a.view())?;
            rest = tail;
        }

        Ok(a)
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(Dense::size).sum()
    }

    fn init_params<R: Rng>(&self, rng: &mut R, params: &mut [f32]) -> Result<()> {
        self.check_len("sequential parameters", params.len())?;

        let mut rest = params;
        for layer in &self.layers {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(layer.size());
            layer.init(rng, head);
            rest = tail;
        }

        Ok(())
    }

    fn predict(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("sequential parameters", params.len())?;

        let mut rest = params;
        let mut a = x.to_owned();

        for layer in &self.layers {
            let (head, tail) = rest.split_at(layer.size());
            a = layer.predict(head, a.view())?;
            rest = tail;
        }

        Ok(a)
    }

    fn backprop<L: LossFn>(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        loss_fn: &L,
        x: ArrayView2<f32>,
        y: &[usize],
    ) -> Result<f32> {
        self.check_len("sequential gradient", grad.len())?;

        let y_pred = self.forward(params, x)?;
        let loss = loss_fn.loss(y_pred.view(), y)?;
        let mut d = loss_fn.loss_prime(y_pred.view(), y)?;

        // Walk the flat buffers from the back, one layer at a time.
        let mut params_rest = params;
        let mut grad_rest = grad;

        for layer in self.layers.iter_mut().rev() {
            let at = params_rest.len() - layer.size();
            let (p_head, p_tail) = params_rest.split_at(at);
            let (g_head, g_tail) = std::mem::take(&mut grad_rest).split_at_mut(at);

            d = layer.backward(p_tail, g_tail, d)?;
            params_rest = p_head;
            grad_rest = g_head;
        }

        Ok(loss)
    }
}
