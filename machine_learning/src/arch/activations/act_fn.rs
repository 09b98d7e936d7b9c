use super::{Relu, Sigmoid};

/// Element-wise activation applied after a dense layer.
#[derive(Debug, Clone)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu(Relu),
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.f(x),
            Self::Relu(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.df(x),
            Self::Relu(a) => a.df(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_dispatches_to_the_unit_activation() {
        let act = ActFn::relu();
        assert!(matches!(act, ActFn::Relu(_)));
        assert_eq!(act.f(-2.0), 0.0);
        assert_eq!(act.f(3.0), 3.0);
        assert_eq!(act.df(-2.0), 0.0);
        assert_eq!(act.df(3.0), 1.0);
    }

    #[test]
    fn sigmoid_dispatches_to_the_scaled_activation() {
        let act = ActFn::sigmoid(1.0);
        assert!(matches!(act, ActFn::Sigmoid(_)));
        assert_eq!(act.f(0.0), 0.5);
        assert_eq!(act.df(0.0), 0.25);
    }
}
