use machine_learning::arch::{Sequential, activations::ActFn, layers::Dense};

use crate::{ClassifierErr, Result};

/// The names `get_model` knows.
pub const MODELS: [&str; 4] = ["linear", "mlp", "mlp-deep", "mlp-sigmoid"];

/// Builds a classifier by name.
///
/// # Arguments
/// * `name` - One of `MODELS`.
/// * `features` - The width of the input.
/// * `classes` - The amount of logits.
///
/// # Returns
/// The model or `InvalidConfig` if the name is unknown.
pub fn get_model(name: &str, features: usize, classes: usize) -> Result<Sequential> {
    let layers = match name {
        "linear" => vec![Dense::new((features, classes), None)],
        "mlp" => vec![
            Dense::new((features, 64), Some(ActFn::relu())),
            Dense::new((64, classes), None),
        ],
        "mlp-deep" => vec![
            Dense::new((features, 128), Some(ActFn::relu())),
            Dense::new((128, 64), Some(ActFn::relu())),
            Dense::new((64, classes), None),
        ],
        "mlp-sigmoid" => vec![
            Dense::new((features, 64), Some(ActFn::sigmoid(1.0))),
            Dense::new((64, classes), None),
        ],
        other => {
            return Err(ClassifierErr::InvalidConfig(format!(
                "unknown model {other:?}"
            )));
        }
    };

    Ok(Sequential::new(layers))
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::Model;

    use super::*;

    #[test]
    fn every_known_model_maps_features_to_classes() {
        for name in MODELS {
            let model = get_model(name, 16, 10).unwrap();
            let layers = model.layers();
            assert_eq!(layers[0].dim().0, 16, "{name}");
            assert_eq!(layers[layers.len() - 1].dim().1, 10, "{name}");
        }
    }

    #[test]
    fn linear_has_one_weight_per_feature_and_class() {
        let model = get_model("linear", 16, 10).unwrap();
        assert_eq!(model.size(), 16 * 10 + 10);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            get_model("resnet18", 16, 10),
            Err(ClassifierErr::InvalidConfig(_))
        ));
    }
}
