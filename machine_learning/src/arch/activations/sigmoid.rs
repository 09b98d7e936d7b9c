/// Logistic function scaled by `amp`.
#[derive(Clone, Debug, Default)]
pub struct Sigmoid {
    amp: f32,
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp / (1. + (-z).exp())
    }

    pub fn df(&self, z: f32) -> f32 {
        let e = (-z).exp();
        (self.amp * e) / (e + 1.).powi(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_matches_finite_difference() {
        let s = Sigmoid::new(2.0);
        let h = 1e-3;

        for z in [-2.0f32, -0.5, 0.0, 0.7, 3.0] {
            let numeric = (s.f(z + h) - s.f(z - h)) / (2.0 * h);
            assert!((numeric - s.df(z)).abs() < 1e-3, "z={z}");
        }
    }
}
