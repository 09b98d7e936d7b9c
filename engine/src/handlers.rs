use async_trait::async_trait;
use log::warn;

use crate::{Handler, Result, State};

/// Stops the run as soon as a step outputs a non finite value.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminateOnNan;

#[async_trait]
impl<C: Send> Handler<C> for TerminateOnNan {
    async fn handle(&mut self, state: &mut State, _: &mut C) -> Result<()> {
        if let Some((name, value)) = state.output.iter().find(|(_, v)| !v.is_finite()) {
            warn!(
                iteration = state.iteration;
                "{name} is {value}, terminating the run"
            );
            state.terminate();
        }

        Ok(())
    }
}

/// Exponential moving average of a step output, restarted every epoch.
///
/// Attach to `Event::IterationCompleted`, the average is written into
/// `state.metrics` under the output's name.
#[derive(Debug, Clone)]
pub struct RunningAverage {
    name: String,
    alpha: f32,
    value: Option<f32>,
}

impl RunningAverage {
    pub fn new(name: impl Into<String>, alpha: f32) -> Self {
        Self {
            name: name.into(),
            alpha,
            value: None,
        }
    }

    fn update(&mut self, state: &mut State) {
        let first_of_epoch =
            state.epoch_length > 0 && (state.iteration - 1) % state.epoch_length == 0;
        if first_of_epoch {
            self.value = None;
        }

        let Some(&x) = state.output.get(&self.name) else {
            return;
        };

        let avg = match self.value {
            Some(avg) => avg * self.alpha + (1.0 - self.alpha) * x,
            None => x,
        };

        self.value = Some(avg);
        state.metrics.insert(self.name.clone(), avg);
    }
}

#[async_trait]
impl<C: Send> Handler<C> for RunningAverage {
    async fn handle(&mut self, state: &mut State, _: &mut C) -> Result<()> {
        self.update(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(avg: &mut RunningAverage, state: &mut State, iteration: usize, loss: f32) -> f32 {
        state.iteration = iteration;
        state.output.insert("batch loss".into(), loss);
        avg.update(state);
        state.metrics["batch loss"]
    }

    #[test]
    fn running_average_restarts_each_epoch() {
        let mut avg = RunningAverage::new("batch loss", 0.5);
        let mut state = State {
            epoch_length: 3,
            ..State::default()
        };

        assert_eq!(step(&mut avg, &mut state, 1, 4.0), 4.0);
        assert_eq!(step(&mut avg, &mut state, 2, 2.0), 3.0);
        assert_eq!(step(&mut avg, &mut state, 3, 1.0), 2.0);
        assert_eq!(step(&mut avg, &mut state, 4, 8.0), 8.0);
    }

    #[tokio::test]
    async fn non_finite_outputs_request_termination() {
        let mut state = State::default();
        state.output.insert("batch loss".into(), f32::INFINITY);

        TerminateOnNan.handle(&mut state, &mut ()).await.unwrap();
        assert!(state.should_terminate());
    }
}
