use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::{MlErr, Result};

/// Stochastic gradient descent with momentum, optional Nesterov correction and
/// L2 weight decay added to the gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    weight_decay: f32,
    nesterov: bool,
    velocity: Vec<f32>,
}

impl Sgd {
    /// Returns a new `Sgd`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `update_params`.
    /// * `momentum` - The decay of the velocity, zero disables it.
    /// * `weight_decay` - The L2 penalty coefficient.
    /// * `nesterov` - Whether to look ahead along the velocity.
    pub fn new(learning_rate: f32, momentum: f32, weight_decay: f32, nesterov: bool) -> Self {
        Self {
            learning_rate,
            momentum,
            weight_decay,
            nesterov,
            velocity: Vec::new(),
        }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }
}

impl Optimizer for Sgd {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        if params.len() != grad.len() {
            return Err(MlErr::SizeMismatch {
                what: "sgd gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        let Self {
            learning_rate: lr,
            momentum,
            weight_decay: wd,
            nesterov,
            ref mut velocity,
        } = *self;

        if momentum == 0.0 {
            for (w, &g) in params.iter_mut().zip(grad) {
                *w -= lr * (g + wd * *w);
            }
            return Ok(());
        }

        // The first step seeds the velocity with the raw step.
        let first = velocity.is_empty();
        if first {
            velocity.resize(params.len(), 0.0);
        } else if velocity.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "sgd velocity",
                got: velocity.len(),
                expected: params.len(),
            });
        }

        for ((w, &g), v) in params.iter_mut().zip(grad).zip(velocity.iter_mut()) {
            let d = g + wd * *w;
            *v = if first { d } else { momentum * *v + d };

            let step = if nesterov { d + momentum * *v } else { *v };
            *w -= lr * step;
        }

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_step_follows_the_gradient() {
        let mut sgd = Sgd::new(0.5, 0.0, 0.0, false);
        let mut params = [1.0, -1.0];
        sgd.update_params(&mut params, &[2.0, -2.0]).unwrap();
        assert_eq!(params, [0.0, 0.0]);
    }

    #[test]
    fn weight_decay_shrinks_the_params() {
        let mut sgd = Sgd::new(1.0, 0.0, 0.5, false);
        let mut params = [2.0];
        sgd.update_params(&mut params, &[0.0]).unwrap();
        assert_eq!(params, [1.0]);
    }

    #[test]
    fn nesterov_momentum_two_steps() {
        let mut sgd = Sgd::new(1.0, 0.5, 0.0, true);
        let mut params = [0.0];

        // v = 1, step = 1 + 0.5 * 1
        sgd.update_params(&mut params, &[1.0]).unwrap();
        assert_eq!(params, [-1.5]);

        // v = 0.5 * 1 + 1 = 1.5, step = 1 + 0.5 * 1.5
        sgd.update_params(&mut params, &[1.0]).unwrap();
        assert_eq!(params, [-3.25]);
    }

    #[test]
    fn classic_momentum_uses_the_velocity() {
        let mut sgd = Sgd::new(1.0, 0.5, 0.0, false);
        let mut params = [0.0];
        sgd.update_params(&mut params, &[1.0]).unwrap();
        sgd.update_params(&mut params, &[1.0]).unwrap();
        assert_eq!(params, [-2.5]);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let mut sgd = Sgd::new(1.0, 0.0, 0.0, false);
        assert!(sgd.update_params(&mut [0.0; 2], &[0.0]).is_err());
    }
}
