use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{generate_echo_pair, EchoBatches};
use crate::layers::linear::LinearLayer;
use crate::loss::{softmax, LossFunction, SoftmaxCrossEntropy};
use crate::models::lstm_network::{LayerState, StackedLstm};
use crate::optimizers::{Adagrad, Optimizer};
use crate::viz::Visualizer;

/// Hyperparameters of the echo experiment.
///
/// Everything is fixed for a run; the defaults reproduce the reference
/// experiment. `validate` must pass before a trainer can be built.
#[derive(Clone, Debug)]
pub struct ExperimentConfig {
    pub num_epochs: usize,
    pub total_length: usize,
    pub chunk_length: usize,
    pub state_width: usize,
    pub num_classes: usize,
    pub echo_lag: usize,
    pub batch_size: usize,
    pub num_layers: usize,
    pub learning_rate: f64,
    /// Invoke the visualizer every this many chunks within an epoch.
    pub render_every: usize,
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            num_epochs: 100,
            total_length: 50_000,
            chunk_length: 15,
            state_width: 4,
            num_classes: 2,
            echo_lag: 3,
            batch_size: 5,
            num_layers: 3,
            learning_rate: 0.3,
            render_every: 100,
            seed: 42,
        }
    }
}

impl ExperimentConfig {
    pub fn row_length(&self) -> usize {
        self.total_length / self.batch_size
    }

    pub fn num_chunks(&self) -> usize {
        self.row_length() / self.chunk_length
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_epochs == 0
            || self.total_length == 0
            || self.chunk_length == 0
            || self.state_width == 0
            || self.batch_size == 0
            || self.num_layers == 0
            || self.render_every == 0
        {
            return Err(ConfigError::ZeroDimension);
        }
        if self.num_classes < 2 {
            return Err(ConfigError::TooFewClasses {
                num_classes: self.num_classes,
            });
        }
        if self.total_length % self.batch_size != 0 {
            return Err(ConfigError::LengthNotDivisibleByBatch {
                total_length: self.total_length,
                batch_size: self.batch_size,
            });
        }
        if self.row_length() % self.chunk_length != 0 {
            return Err(ConfigError::RowNotDivisibleByChunk {
                row_length: self.row_length(),
                chunk_length: self.chunk_length,
            });
        }
        Ok(())
    }
}

/// Configuration errors caught before a run starts.
///
/// All of these indicate a wrong setup rather than a transient condition,
/// so nothing is retried: the run refuses to start.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    ZeroDimension,
    TooFewClasses {
        num_classes: usize,
    },
    LengthNotDivisibleByBatch {
        total_length: usize,
        batch_size: usize,
    },
    RowNotDivisibleByChunk {
        row_length: usize,
        chunk_length: usize,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroDimension => {
                write!(f, "every dimension and interval must be non-zero")
            }
            ConfigError::TooFewClasses { num_classes } => {
                write!(f, "need at least 2 classes, got {}", num_classes)
            }
            ConfigError::LengthNotDivisibleByBatch {
                total_length,
                batch_size,
            } => write!(
                f,
                "total length {} not divisible by batch size {}",
                total_length, batch_size
            ),
            ConfigError::RowNotDivisibleByChunk {
                row_length,
                chunk_length,
            } => write!(
                f,
                "row length {} not divisible by chunk length {}",
                row_length, chunk_length
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Orchestrates truncated backpropagation-through-time over the echo task.
///
/// Owns the recurrent state between chunks: the network borrows it for one
/// forward pass and hands back a fresh value, which replaces the held one.
/// The state's numeric value is carried from chunk to chunk within an epoch
/// and reset to zero at every epoch start; gradients never cross a chunk
/// boundary.
pub struct EchoTrainer<L: LossFunction, O: Optimizer, V: Visualizer> {
    pub config: ExperimentConfig,
    network: StackedLstm,
    head: LinearLayer,
    loss_function: L,
    optimizer: O,
    visualizer: V,
    state: Vec<LayerState>,
    loss_history: Vec<f64>,
    rng: StdRng,
}

impl<L: LossFunction, O: Optimizer, V: Visualizer> EchoTrainer<L, O, V> {
    pub fn new(
        config: ExperimentConfig,
        loss_function: L,
        optimizer: O,
        visualizer: V,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let network = StackedLstm::new(1, config.state_width, config.num_layers, &mut rng);
        let head = LinearLayer::new(config.state_width, config.num_classes, &mut rng);
        let state = network.zero_state(config.batch_size);

        Ok(EchoTrainer {
            config,
            network,
            head,
            loss_function,
            optimizer,
            visualizer,
            state,
            loss_history: Vec::new(),
            rng,
        })
    }

    /// Runs the whole experiment: `num_epochs` passes, each over freshly
    /// generated data, chunk by chunk in temporal order.
    pub fn run(&mut self) {
        for epoch in 0..self.config.num_epochs {
            let batches = self.begin_epoch();
            println!("New data, epoch {}", epoch);

            for k in 0..batches.num_chunks() {
                let (input_chunk, echo_chunk) = batches.chunk(k);
                let (loss, predictions) = self.train_chunk(input_chunk, echo_chunk);

                if k % self.config.render_every == 0 {
                    println!("Step {} Loss {}", k, loss);
                    self.visualizer.render(
                        &self.loss_history,
                        &predictions,
                        input_chunk,
                        echo_chunk,
                    );
                }
            }
        }
    }

    /// Samples a fresh sequence pair for the next epoch and zeroes the
    /// carried recurrent state.
    pub fn begin_epoch(&mut self) -> EchoBatches {
        let (input, echo) = generate_echo_pair(
            self.config.total_length,
            self.config.echo_lag,
            &mut self.rng,
        );
        self.state = self.network.zero_state(self.config.batch_size);
        EchoBatches::new(input, echo, self.config.batch_size, self.config.chunk_length)
    }

    /// One TBPTT step over a single chunk.
    ///
    /// Forward through the stack and the shared head, reduce the
    /// per-timestep cross-entropy to one scalar, backpropagate through this
    /// chunk's unrolled graph only, update every parameter in place, and
    /// replace the held state with the stack's outgoing state.
    ///
    /// Returns the scalar loss and the per-timestep class probabilities.
    pub fn train_chunk(
        &mut self,
        input_chunk: ArrayView2<'_, u8>,
        echo_chunk: ArrayView2<'_, u8>,
    ) -> (f64, Vec<Array2<f64>>) {
        let chunk_length = input_chunk.ncols();
        assert_eq!(
            echo_chunk.dim(),
            input_chunk.dim(),
            "input/echo chunk shape mismatch"
        );

        let forward = self.network.forward_chunk(input_chunk, &self.state);

        let mut chunk_loss = 0.0;
        let mut predictions = Vec::with_capacity(chunk_length);
        let mut d_top = Vec::with_capacity(chunk_length);
        let mut head_gradients = self.head.zero_gradients();

        for t in 0..chunk_length {
            let labels: Vec<usize> = echo_chunk
                .column(t)
                .iter()
                .map(|&bit| bit as usize)
                .collect();

            let logits = self.head.forward(&forward.outputs[t]);
            chunk_loss += self.loss_function.compute_loss(&logits, &labels);

            // Mean over the chunk: scale each timestep's gradient by 1/T
            let d_logits =
                self.loss_function.compute_gradient(&logits, &labels) / chunk_length as f64;
            let (step_gradients, d_hidden) = self.head.backward(&d_logits, &forward.outputs[t]);
            head_gradients.accumulate(&step_gradients);
            d_top.push(d_hidden);

            predictions.push(softmax(&logits));
        }
        let chunk_loss = chunk_loss / chunk_length as f64;

        let cell_gradients = self.network.backward_chunk(&d_top, &forward.cache);
        self.network
            .update_parameters(&cell_gradients, &mut self.optimizer);
        self.head
            .update_parameters(&head_gradients, &mut self.optimizer, "classifier");

        self.state = forward.states;
        self.loss_history.push(chunk_loss);

        (chunk_loss, predictions)
    }

    /// The carried recurrent state as the next chunk will see it.
    pub fn state(&self) -> &[LayerState] {
        &self.state
    }

    /// One scalar per chunk processed so far, across all epochs.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    pub fn network(&self) -> &StackedLstm {
        &self.network
    }

    pub fn head(&self) -> &LinearLayer {
        &self.head
    }
}

/// The reference experiment: default constants, softmax cross-entropy, and
/// Adagrad with the fixed 0.3 step size.
pub fn create_echo_trainer<V: Visualizer>(
    config: ExperimentConfig,
    visualizer: V,
) -> Result<EchoTrainer<SoftmaxCrossEntropy, Adagrad, V>, ConfigError> {
    let learning_rate = config.learning_rate;
    EchoTrainer::new(
        config,
        SoftmaxCrossEntropy,
        Adagrad::new(learning_rate),
        visualizer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::NullVisualizer;

    fn small_config() -> ExperimentConfig {
        ExperimentConfig {
            num_epochs: 2,
            total_length: 600,
            chunk_length: 10,
            state_width: 4,
            num_classes: 2,
            echo_lag: 3,
            batch_size: 5,
            num_layers: 2,
            learning_rate: 0.3,
            render_every: 100,
            seed: 7,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_indivisible_batch() {
        let config = ExperimentConfig {
            total_length: 1001,
            ..ExperimentConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::LengthNotDivisibleByBatch {
                total_length: 1001,
                batch_size: 5,
            })
        );
    }

    #[test]
    fn test_validate_rejects_indivisible_chunk() {
        let config = ExperimentConfig {
            total_length: 50,
            batch_size: 5,
            chunk_length: 3,
            ..ExperimentConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::RowNotDivisibleByChunk {
                row_length: 10,
                chunk_length: 3,
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let config = ExperimentConfig {
            state_width: 0,
            ..ExperimentConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDimension));
    }

    #[test]
    fn test_trainer_rejects_bad_config() {
        let config = ExperimentConfig {
            total_length: 7,
            ..ExperimentConfig::default()
        };
        assert!(create_echo_trainer(config, NullVisualizer).is_err());
    }

    #[test]
    fn test_state_resets_at_epoch_start() {
        let mut trainer = create_echo_trainer(small_config(), NullVisualizer).unwrap();

        let batches = trainer.begin_epoch();
        let (x, y) = batches.chunk(0);
        trainer.train_chunk(x, y);
        assert!(
            trainer.state().iter().any(|s| !s.is_zero()),
            "state should move away from zero after a chunk"
        );

        trainer.begin_epoch();
        assert!(
            trainer.state().iter().all(|s| s.is_zero()),
            "epoch start must reset the carried state to zero"
        );
    }

    #[test]
    fn test_loss_history_grows_per_chunk() {
        let mut trainer = create_echo_trainer(small_config(), NullVisualizer).unwrap();
        let batches = trainer.begin_epoch();

        for k in 0..3 {
            let (x, y) = batches.chunk(k);
            trainer.train_chunk(x, y);
        }

        assert_eq!(trainer.loss_history().len(), 3);
        assert!(trainer.loss_history().iter().all(|l| l.is_finite()));
    }

    #[test]
    fn test_predictions_shape_matches_chunk() {
        let mut trainer = create_echo_trainer(small_config(), NullVisualizer).unwrap();
        let batches = trainer.begin_epoch();
        let (x, y) = batches.chunk(0);

        let (_, predictions) = trainer.train_chunk(x, y);

        assert_eq!(predictions.len(), 10);
        for p in &predictions {
            assert_eq!(p.shape(), &[2, 5]);
            for col in p.axis_iter(ndarray::Axis(1)) {
                assert!((col.sum() - 1.0).abs() < 1e-9);
            }
        }
    }
}
