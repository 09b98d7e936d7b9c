use ndarray::prelude::*;
use rand::Rng;

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer, `a = act(x · w + b)`.
///
/// Parameters live outside the layer in a flat slice laid out as the
/// row-major `(n_in, n_out)` weight matrix followed by the `n_out` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output dimensions.
    /// * `act_fn` - An optional activation applied to the output.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Writes this layer's initial parameters: uniform weights scaled by the
    /// fan in (Kaiming for rectifiers, Xavier otherwise) and zero biases.
    pub fn init<R: Rng>(&self, rng: &mut R, params: &mut [f32]) {
        let (fan_in, fan_out) = self.dim;
        let limit = match self.act_fn {
            Some(ActFn::Relu(_)) => (6.0 / fan_in as f32).sqrt(),
            _ => (6.0 / (fan_in + fan_out) as f32).sqrt(),
        };

        let w_size = self.size - fan_out;
        let (weights, biases) = params.split_at_mut(w_size);
        weights
            .iter_mut()
            .for_each(|w| *w = rng.random_range(-limit..limit));
        biases.fill(0.0);
    }

    /// Computes the layer output and keeps what `backward` needs.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.affine(params, x)?;
        let a = self.activate(&z);

        self.x = x.to_owned();
        self.z = z;
        Ok(a)
    }

    /// Computes the layer output without touching the forward metadata.
    pub fn predict(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.affine(params, x)?;
        Ok(self.activate(&z))
    }

    /// Backpropagates `d`, the loss derivative with respect to this layer's output.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's slice of the gradient, gets overwritten.
    /// * `d` - The incoming delta.
    ///
    /// # Returns
    /// The delta with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "dense delta rows",
                got: d.nrows(),
                expected: self.z.nrows(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&self.x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn affine(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        Ok(x.dot(&w) + &b)
    }

    fn activate(&self, z: &Array2<f32>) -> Array2<f32> {
        match &self.act_fn {
            Some(act_fn) => z.mapv(|v| act_fn.f(v)),
            None => z.clone(),
        }
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}
