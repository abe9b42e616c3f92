use ndarray::{Array1, Array2, Axis};

/// Loss over one timestep of predictions.
///
/// `logits` is `(num_classes, batch_size)`; `labels` holds one true class
/// index per batch column. Label values outside `[0, num_classes)` are a
/// precondition violation.
pub trait LossFunction {
    /// Scalar loss, averaged over the batch columns
    fn compute_loss(&self, logits: &Array2<f64>, labels: &[usize]) -> f64;

    /// Gradient of the averaged loss with respect to the logits
    fn compute_gradient(&self, logits: &Array2<f64>, labels: &[usize]) -> Array2<f64>;
}

/// Softmax cross-entropy against sparse integer labels
pub struct SoftmaxCrossEntropy;

impl LossFunction for SoftmaxCrossEntropy {
    fn compute_loss(&self, logits: &Array2<f64>, labels: &[usize]) -> f64 {
        assert_eq!(logits.ncols(), labels.len(), "logits/labels batch mismatch");
        let probs = softmax(logits);
        let epsilon = 1e-15;

        let mut total = 0.0;
        for (j, &label) in labels.iter().enumerate() {
            assert!(
                label < logits.nrows(),
                "label {} outside [0, {})",
                label,
                logits.nrows()
            );
            total -= (probs[[label, j]] + epsilon).ln();
        }
        total / labels.len() as f64
    }

    fn compute_gradient(&self, logits: &Array2<f64>, labels: &[usize]) -> Array2<f64> {
        assert_eq!(logits.ncols(), labels.len(), "logits/labels batch mismatch");
        let mut grad = softmax(logits);
        for (j, &label) in labels.iter().enumerate() {
            assert!(
                label < logits.nrows(),
                "label {} outside [0, {})",
                label,
                logits.nrows()
            );
            grad[[label, j]] -= 1.0;
        }
        grad / labels.len() as f64
    }
}

/// Numerically stable softmax over each batch column
pub fn softmax(x: &Array2<f64>) -> Array2<f64> {
    let mut result = Array2::zeros(x.raw_dim());

    for (i, col) in x.axis_iter(Axis(1)).enumerate() {
        let max_val = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp_vals: Array1<f64> = col.map(|&val| (val - max_val).exp());
        let sum_exp = exp_vals.sum();

        for (j, &exp_val) in exp_vals.iter().enumerate() {
            result[[j, i]] = exp_val / sum_exp;
        }
    }

    result
}
