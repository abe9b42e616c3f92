use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        *param = &*param - self.learning_rate * gradient;
    }

    fn reset(&mut self) {
        // SGD has no state to reset
    }
}

/// Adagrad: G_t = G_{t-1} + g_t²
///          θ_t = θ_{t-1} - η * g_t / (√G_t + ε)
///
/// The per-parameter accumulator grows monotonically, so frequently updated
/// parameters see their effective step size shrink over the run. Accumulators
/// start at 0.1 rather than zero to keep the first steps bounded.
pub struct Adagrad {
    learning_rate: f64,
    initial_accumulator: f64,
    epsilon: f64,
    accumulators: HashMap<String, Array2<f64>>, // running sums of squared gradients
}

impl Adagrad {
    pub fn new(learning_rate: f64) -> Self {
        Adagrad::with_params(learning_rate, 0.1, 1e-10)
    }

    pub fn with_params(learning_rate: f64, initial_accumulator: f64, epsilon: f64) -> Self {
        Adagrad {
            learning_rate,
            initial_accumulator,
            epsilon,
            accumulators: HashMap::new(),
        }
    }
}

impl Optimizer for Adagrad {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        if !self.accumulators.contains_key(param_id) {
            self.accumulators.insert(
                param_id.to_string(),
                Array2::from_elem(param.raw_dim(), self.initial_accumulator),
            );
        }

        let acc = self.accumulators.get_mut(param_id).unwrap();

        // Accumulate squared gradient magnitudes
        *acc = &*acc + gradient * gradient;

        // Parameter update
        let update = self.learning_rate * gradient / (acc.map(|x| x.sqrt()) + self.epsilon);
        *param = &*param - update;
    }

    fn reset(&mut self) {
        self.accumulators.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - 0.1 * &gradient;
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-10);
    }

    #[test]
    fn test_adagrad_first_step() {
        let mut optimizer = Adagrad::with_params(0.3, 0.1, 0.0);
        let mut param = arr2(&[[1.0]]);
        let gradient = arr2(&[[0.5]]);

        optimizer.update("p", &mut param, &gradient);

        // acc = 0.1 + 0.25 = 0.35; step = 0.3 * 0.5 / sqrt(0.35)
        let expected = 1.0 - 0.3 * 0.5 / 0.35f64.sqrt();
        assert!((param[[0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_adagrad_steps_shrink() {
        let mut optimizer = Adagrad::new(0.3);
        let mut param = arr2(&[[0.0]]);
        let gradient = arr2(&[[1.0]]);

        optimizer.update("p", &mut param, &gradient);
        let first_step = -param[[0, 0]];
        let before = param[[0, 0]];
        optimizer.update("p", &mut param, &gradient);
        let second_step = before - param[[0, 0]];

        assert!(second_step < first_step, "accumulator must damp later steps");
        assert!(second_step > 0.0);
    }

    #[test]
    fn test_adagrad_state_is_per_parameter() {
        let mut optimizer = Adagrad::new(0.3);
        let mut a = arr2(&[[0.0]]);
        let mut b = arr2(&[[0.0]]);
        let gradient = arr2(&[[1.0]]);

        optimizer.update("a", &mut a, &gradient);
        optimizer.update("a", &mut a, &gradient);
        optimizer.update("b", &mut b, &gradient);

        // "b" took one fresh step, "a" two damped ones.
        assert!((-b[[0, 0]]) > (-a[[0, 0]]) / 2.0);
        optimizer.reset();
        let mut b2 = arr2(&[[0.0]]);
        optimizer.update("b", &mut b2, &gradient);
        assert!((b2[[0, 0]] - b[[0, 0]]).abs() < 1e-12);
    }
}
