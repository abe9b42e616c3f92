use ndarray::{Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    pub fn accumulate(&mut self, other: &LinearGradients) {
        self.weight = &self.weight + &other.weight;
        self.bias = &self.bias + &other.bias;
    }
}

/// A fully connected (linear/dense) layer.
///
/// Performs the transformation: output = weight @ input + bias
/// where weight has shape (output_size, input_size) and bias has shape
/// (output_size, 1), broadcast across the batch columns.
///
/// The classifier head of the echo experiment is one such layer shared
/// across every timestep: the same weight matrix and bias map each
/// per-timestep hidden output to unnormalized class scores.
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>, // (output_size, input_size)
    pub bias: Array2<f64>,   // (output_size, 1)
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot uniform initialization.
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (input_size + output_size) as f64).sqrt();
        let weight = Array2::random_using(
            (output_size, input_size),
            Uniform::new(-scale, scale),
            rng,
        );
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Create a new linear layer from existing parameters.
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(
            bias.shape(),
            &[output_size, 1],
            "Bias shape must be (output_size, 1)"
        );

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Forward pass: `(input_size, batch)` in, `(output_size, batch)` out.
    ///
    /// Pure function of the input and current parameters; the caller keeps
    /// the input around for the backward pass, since one shared head is
    /// applied at many timesteps per training step.
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        assert_eq!(
            input.nrows(),
            self.input_size,
            "Input size {} doesn't match layer input size {}",
            input.nrows(),
            self.input_size
        );

        &self.weight.dot(input) + &self.bias
    }

    /// Backward pass for one application of the layer.
    ///
    /// `grad_output` is the loss gradient w.r.t. this application's output,
    /// `input` the value that was fed forward. Returns the parameter
    /// gradients and the gradient w.r.t. the input.
    pub fn backward(
        &self,
        grad_output: &Array2<f64>,
        input: &Array2<f64>,
    ) -> (LinearGradients, Array2<f64>) {
        assert_eq!(grad_output.nrows(), self.output_size, "Gradient output size mismatch");
        assert_eq!(input.nrows(), self.input_size, "Input size mismatch");
        assert_eq!(grad_output.ncols(), input.ncols(), "Batch size mismatch");

        // Gradient w.r.t. weight: grad_output @ input^T
        let weight_grad = grad_output.dot(&input.t());

        // Gradient w.r.t. bias: sum over batch dimension, keep as column vector
        let bias_grad = grad_output.sum_axis(Axis(1)).insert_axis(Axis(1));

        // Gradient w.r.t. input: weight^T @ grad_output
        let input_grad = self.weight.t().dot(grad_output);

        let gradients = LinearGradients {
            weight: weight_grad,
            bias: bias_grad,
        };

        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &LinearGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
