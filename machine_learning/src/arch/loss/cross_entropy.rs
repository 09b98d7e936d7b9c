use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Softmax cross entropy over raw logits.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    /// Row-wise softmax, shifted by the row maximum for stability.
    pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
        let mut probs = logits.to_owned();

        for mut row in probs.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }

        probs
    }

    fn check(y_pred: ArrayView2<f32>, y: &[usize]) -> Result<()> {
        if y_pred.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                what: "loss targets",
                got: y.len(),
                expected: y_pred.nrows(),
            });
        }

        let classes = y_pred.ncols();
        match y.iter().find(|&&label| label >= classes) {
            Some(&label) => Err(MlErr::LabelOutOfRange { label, classes }),
            None => Ok(()),
        }
    }

    fn log_sum_exp(row: ArrayView1<f32>) -> f32 {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        max + row.mapv(|v| (v - max).exp()).sum().ln()
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: &[usize]) -> Result<f32> {
        Self::check(y_pred, y)?;
        if y.is_empty() {
            return Ok(0.0);
        }

        let total: f32 = y_pred
            .axis_iter(Axis(0))
            .zip(y)
            .map(|(row, &label)| Self::log_sum_exp(row) - row[label])
            .sum();

        Ok(total / y.len() as f32)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &[usize]) -> Result<Array2<f32>> {
        Self::check(y_pred, y)?;

        let n = y.len().max(1) as f32;
        let mut d = Self::softmax(y_pred);

        for (mut row, &label) in d.rows_mut().into_iter().zip(y) {
            row[label] -= 1.0;
            row.mapv_inplace(|v| v / n);
        }

        Ok(d)
    }
}
