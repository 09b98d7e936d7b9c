use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::{MlErr, Result};

/// Piecewise linear learning rate schedule over event indices.
///
/// Before the first milestone the first value is used, after the last
/// milestone the last value is used, and in between values are linearly
/// interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseLinear {
    milestones: Vec<(usize, f32)>,
    event_index: usize,
}

impl PiecewiseLinear {
    /// Creates a new `PiecewiseLinear`.
    ///
    /// # Arguments
    /// * `milestones` - At least two `(event index, value)` pairs with non decreasing indices.
    ///
    /// # Returns
    /// A new `PiecewiseLinear` or an error if the milestones are invalid.
    pub fn new(milestones: Vec<(usize, f32)>) -> Result<Self> {
        if milestones.len() < 2 {
            return Err(MlErr::InvalidMilestones(format!(
                "expected at least 2 milestones, got {}",
                milestones.len()
            )));
        }

        if let Some(w) = milestones.windows(2).find(|w| w[1].0 < w[0].0) {
            return Err(MlErr::InvalidMilestones(format!(
                "milestone {} comes after {}",
                w[1].0, w[0].0
            )));
        }

        Ok(Self {
            milestones,
            event_index: 0,
        })
    }

    pub fn event_index(&self) -> usize {
        self.event_index
    }

    pub fn milestones(&self) -> &[(usize, f32)] {
        &self.milestones
    }

    /// Returns the value of the schedule at `index`.
    pub fn value_at(&self, index: usize) -> f32 {
        let ms = &self.milestones;

        match ms.iter().position(|&(m, _)| m > index) {
            Some(0) => ms[0].1,
            None => ms[ms.len() - 1].1,
            Some(j) => {
                let (start, v0) = ms[j - 1];
                let (end, v1) = ms[j];
                let t = (index - start) as f32 / (end - start) as f32;
                v0 + (v1 - v0) * t
            }
        }
    }

    /// Sets the optimizer's learning rate for the current event and advances.
    pub fn apply<O: Optimizer>(&mut self, optimizer: &mut O) {
        optimizer.set_learning_rate(self.value_at(self.event_index));
        self.event_index += 1;
    }
}
