use std::collections::BTreeMap;

use distributed::Context;
use log::debug;
use machine_learning::{
    arch::{Model, Network, loss::CrossEntropy},
    data::DataLoader,
};

use crate::{
    EngineErr, Result,
    metrics::{Accuracy, Loss, Metric},
};

/// Named metric values.
pub type Metrics = BTreeMap<String, f64>;

/// Runs inference over a loader and reduces its metrics across the group.
pub struct Evaluator {
    metrics: Vec<Box<dyn Metric>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(vec![
            Box::new(Accuracy::new()),
            Box::new(Loss::new(CrossEntropy)),
        ])
    }
}

impl Evaluator {
    pub fn new(metrics: Vec<Box<dyn Metric>>) -> Self {
        Self { metrics }
    }

    /// Evaluates `network` over every batch of `loader`.
    ///
    /// # Arguments
    /// * `network` - The model and its parameters.
    /// * `loader` - The evaluation batches.
    /// * `ctx` - The participant's context, every participant must call this.
    ///
    /// # Returns
    /// The same metric values on every participant.
    pub async fn run<M: Model>(
        &mut self,
        network: &Network<M>,
        loader: &DataLoader,
        ctx: &mut Context,
    ) -> Result<Metrics> {
        self.metrics.iter_mut().for_each(|m| m.reset());

        for batch in loader.iter(0) {
            let y_pred = network.predict(batch.x.view())?;
            for metric in self.metrics.iter_mut() {
                metric.update(y_pred.view(), &batch.y)?;
            }
        }

        let mut sums: Vec<f32> = self
            .metrics
            .iter_mut()
            .flat_map(|m| m.accumulators().to_vec())
            .collect();
        ctx.all_reduce(&mut sums).await?;

        let mut rest = sums.as_slice();
        for metric in self.metrics.iter_mut() {
            let acc = metric.accumulators();
            let (head, tail) = rest.split_at(acc.len());
            acc.copy_from_slice(head);
            rest = tail;
        }

        let mut values = Metrics::new();
        for metric in &self.metrics {
            let value = metric.compute().ok_or(EngineErr::EmptyLoader)?;
            values.insert(metric.name().to_string(), value);
        }

        debug!(rank = ctx.rank(); "evaluated {values:?}");
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use machine_learning::{
        arch::{Sequential, layers::Dense},
        data::{Dataset, Sampler},
    };
    use ndarray::array;

    use super::*;

    #[tokio::test]
    async fn identity_model_scores_its_own_labels() {
        // w = I, b = 0 so the prediction is the input
        let mut network = Network::new(Sequential::new([Dense::new((2, 2), None)]), 0).unwrap();
        network.set_params(&[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();

        let x = array![[1.0f32, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let dataset = Arc::new(Dataset::new(x, vec![0, 1, 1, 1], 2).unwrap());
        let loader = DataLoader::new(dataset, Sampler::Sequential, 3, false, 0).unwrap();

        let metrics = Evaluator::default()
            .run(&network, &loader, &mut Context::serial())
            .await
            .unwrap();

        assert_eq!(metrics["accuracy"], 0.75);
        assert!(metrics["loss"] > 0.0);
    }
}
