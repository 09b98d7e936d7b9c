mod accuracy;
mod loss;

pub use accuracy::Accuracy;
pub use loss::Loss;

use ndarray::ArrayView2;

use crate::Result;

/// An online metric over batches of model outputs.
///
/// The state is a handful of sums, so replicas combine by adding them up.
pub trait Metric: Send {
    fn name(&self) -> &'static str;

    fn reset(&mut self);

    fn update(&mut self, y_pred: ArrayView2<f32>, y: &[usize]) -> Result<()>;

    /// The sums this metric accumulates.
    fn accumulators(&mut self) -> &mut [f32];

    /// The value of the metric, `None` when nothing was accumulated.
    fn compute(&self) -> Option<f64>;
}
