use ndarray::{ArrayView2, Axis};

use super::Metric;
use crate::Result;

/// The share of samples whose highest output is the target class.
#[derive(Debug, Default, Clone)]
pub struct Accuracy {
    // [correct, seen]
    sums: [f32; 2],
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn reset(&mut self) {
        self.sums = [0.0; 2];
    }

    fn update(&mut self, y_pred: ArrayView2<f32>, y: &[usize]) -> Result<()> {
        let correct = y_pred
            .axis_iter(Axis(0))
            .zip(y)
            .filter(|(row, label)| argmax(row.iter().copied()) == Some(**label))
            .count();

        self.sums[0] += correct as f32;
        self.sums[1] += y.len() as f32;
        Ok(())
    }

    fn accumulators(&mut self) -> &mut [f32] {
        &mut self.sums
    }

    fn compute(&self) -> Option<f64> {
        let [correct, seen] = self.sums;
        (seen > 0.0).then(|| correct as f64 / seen as f64)
    }
}

fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    values
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn counts_the_argmax_hits() {
        let mut acc = Accuracy::new();
        let y_pred = array![[0.1f32, 0.9], [0.8, 0.2], [0.3, 0.7], [0.6, 0.4]];
        acc.update(y_pred.view(), &[1, 0, 0, 1]).unwrap();
        assert_eq!(acc.compute(), Some(0.5));

        acc.reset();
        assert_eq!(acc.compute(), None);
    }

    #[test]
    fn ties_pick_the_first_class() {
        assert_eq!(argmax([1.0f32, 1.0, 0.5].into_iter()), Some(0));
    }
}
