use machine_learning::arch::loss::LossFn;
use ndarray::ArrayView2;

use super::Metric;
use crate::Result;

/// The mean of a loss function over every sample seen.
#[derive(Debug, Default, Clone)]
pub struct Loss<L> {
    loss_fn: L,
    // [sum of batch loss * batch size, seen]
    sums: [f32; 2],
}

impl<L: LossFn> Loss<L> {
    pub fn new(loss_fn: L) -> Self {
        Self {
            loss_fn,
            sums: [0.0; 2],
        }
    }
}

impl<L: LossFn + Send> Metric for Loss<L> {
    fn name(&self) -> &'static str {
        "loss"
    }

    fn reset(&mut self) {
        self.sums = [0.0; 2];
    }

    fn update(&mut self, y_pred: ArrayView2<f32>, y: &[usize]) -> Result<()> {
        let n = y.len() as f32;
        self.sums[0] += self.loss_fn.loss(y_pred, y)? * n;
        self.sums[1] += n;
        Ok(())
    }

    fn accumulators(&mut self) -> &mut [f32] {
        &mut self.sums
    }

    fn compute(&self) -> Option<f64> {
        let [total, seen] = self.sums;
        (seen > 0.0).then(|| total as f64 / seen as f64)
    }
}
