/// Utility functions shared across the crate.
use ndarray::Array2;

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Picks the most probable class for every batch column of a
/// `(num_classes, batch_size)` probability matrix.
pub fn predicted_classes(probs: &Array2<f64>) -> Vec<usize> {
    probs
        .axis_iter(ndarray::Axis(1))
        .map(|col| {
            col.iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(idx, _)| idx)
                .unwrap()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(1000.0) > 0.99);
        assert!(sigmoid(-1000.0) < 0.01);
    }

    #[test]
    fn test_predicted_classes() {
        let probs = arr2(&[[0.9, 0.2, 0.5], [0.1, 0.8, 0.5]]);
        assert_eq!(predicted_classes(&probs), vec![0, 1, 0]);
    }
}
