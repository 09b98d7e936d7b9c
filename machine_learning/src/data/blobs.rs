use ndarray::{Array2, Axis};
use ndarray_rand::{
    RandomExt,
    rand_distr::{Normal, Uniform},
};
use rand::{SeedableRng, rngs::StdRng};

use super::Dataset;
use crate::{MlErr, Result};

/// A synthetic classification problem: isotropic Gaussian clouds around
/// uniformly drawn centers, one cloud per class.
#[derive(Debug, Clone)]
pub struct Blobs {
    pub features: usize,
    pub classes: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub spread: f32,
    pub center_box: f32,
    pub seed: u64,
}

impl Blobs {
    /// Generates the train and test splits. Both splits share the same centers
    /// and the result only depends on the fields of `self`.
    ///
    /// # Returns
    /// The train and test datasets or an error if the configuration is invalid.
    pub fn generate(&self) -> Result<(Dataset, Dataset)> {
        if self.classes == 0 || self.features == 0 {
            return Err(MlErr::EmptyDataset);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let centers = Array2::random_using(
            (self.classes, self.features),
            Uniform::new(-self.center_box, self.center_box)
                .map_err(|e| MlErr::InvalidDistribution(e.to_string()))?,
            &mut rng,
        );

        let train = self.sample(&centers, self.train_samples, &mut rng)?;
        let test = self.sample(&centers, self.test_samples, &mut rng)?;
        Ok((train, test))
    }

    fn sample(&self, centers: &Array2<f32>, n: usize, rng: &mut StdRng) -> Result<Dataset> {
        let noise = Normal::new(0.0, self.spread)
            .map_err(|e| MlErr::InvalidDistribution(e.to_string()))?;

        // Round robin labels keep the classes balanced.
        let y: Vec<usize> = (0..n).map(|i| i % self.classes).collect();
        let x = centers.select(Axis(0), &y) + Array2::random_using((n, self.features), noise, rng);

        Dataset::new(x, y, self.classes)
    }
}

impl Default for Blobs {
    fn default() -> Self {
        Self {
            features: 16,
            classes: 10,
            train_samples: 4096,
            test_samples: 1024,
            spread: 1.5,
            center_box: 4.0,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Blobs {
        Blobs {
            features: 4,
            classes: 3,
            train_samples: 30,
            test_samples: 9,
            seed: 5,
            ..Default::default()
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let (a_train, a_test) = small().generate().unwrap();
        let (b_train, b_test) = small().generate().unwrap();
        assert_eq!(a_train, b_train);
        assert_eq!(a_test, b_test);
    }

    #[test]
    fn splits_have_the_requested_shape() {
        let (train, test) = small().generate().unwrap();
        assert_eq!((train.len(), train.features(), train.classes()), (30, 4, 3));
        assert_eq!(test.len(), 9);
        assert_eq!(train.y().iter().filter(|&&c| c == 0).count(), 10);
    }
}
