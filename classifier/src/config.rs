use std::path::PathBuf;

use distributed::{Backend, LaunchOptions};
use serde::{Deserialize, Serialize};

use crate::{ClassifierErr, Result, models};

/// The hyperparameters of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub seed: u64,
    pub data_path: PathBuf,
    /// The base output directory, rank 0 replaces it with the run directory.
    pub output_path: PathBuf,
    pub model: String,
    /// The total batch size, split between ranks.
    pub batch_size: usize,
    pub momentum: f32,
    pub weight_decay: f32,
    pub num_workers: usize,
    pub num_epochs: usize,
    /// The peak of the learning rate schedule.
    pub learning_rate: f32,
    pub num_warmup_epochs: usize,
    pub validate_every: usize,
    pub checkpoint_every: usize,
    pub backend: Backend,
    pub resume_from: Option<PathBuf>,
    /// Zero disables loss capture and progress logging.
    pub log_every_iters: usize,
    pub stop_iteration: Option<usize>,
    #[serde(flatten)]
    pub launch: LaunchOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 543,
            data_path: PathBuf::from("/tmp/blobs"),
            output_path: PathBuf::from("/tmp/output-blobs"),
            model: "mlp".into(),
            batch_size: 512,
            momentum: 0.9,
            weight_decay: 1e-4,
            num_workers: 12,
            num_epochs: 24,
            learning_rate: 0.4,
            num_warmup_epochs: 4,
            validate_every: 3,
            checkpoint_every: 200,
            backend: Backend::Serial,
            resume_from: None,
            log_every_iters: 15,
            stop_iteration: None,
            launch: LaunchOptions::default(),
        }
    }
}

impl Config {
    /// Checks the values that would otherwise fail in the middle of a run.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("num_epochs", self.num_epochs),
            ("validate_every", self.validate_every),
            ("checkpoint_every", self.checkpoint_every),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(invalid(format!("{name} must be positive")));
        }

        if self.num_warmup_epochs > self.num_epochs {
            return Err(invalid(format!(
                "num_warmup_epochs ({}) exceeds num_epochs ({})",
                self.num_warmup_epochs, self.num_epochs
            )));
        }

        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(invalid(format!(
                "learning_rate must be a non negative number, got {}",
                self.learning_rate
            )));
        }

        if !(0.0..1.0).contains(&self.momentum) {
            return Err(invalid(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }

        if self.stop_iteration == Some(0) {
            return Err(invalid("stop_iteration must be positive".into()));
        }

        if !models::MODELS.contains(&self.model.as_str()) {
            return Err(invalid(format!(
                "unknown model {:?}, expected one of {}",
                self.model,
                models::MODELS.join(", ")
            )));
        }

        Ok(())
    }
}

fn invalid(detail: String) -> ClassifierErr {
    ClassifierErr::InvalidConfig(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            Config {
                batch_size: 0,
                ..Config::default()
            },
            Config {
                num_warmup_epochs: 30,
                ..Config::default()
            },
            Config {
                model: "resnet18".into(),
                ..Config::default()
            },
            Config {
                stop_iteration: Some(0),
                ..Config::default()
            },
            Config {
                learning_rate: f32::NAN,
                ..Config::default()
            },
        ];

        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(ClassifierErr::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn serializes_launch_options_inline() {
        let config = Config {
            launch: LaunchOptions {
                num_procs_per_node: Some(2),
                ..LaunchOptions::default()
            },
            ..Config::default()
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["num_procs_per_node"], 2);
        assert_eq!(value["backend"], "none");

        let back: Config = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
