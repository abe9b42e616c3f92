//! # rust-tbptt
//!
//! A didactic sequence-learning experiment: a stacked LSTM learns to
//! reproduce a time-shifted echo of a random binary stream, trained with
//! truncated backpropagation-through-time (TBPTT) over fixed-length chunks.
//!
//! ## Core Components
//!
//! - **Data**: per-epoch echo sequence generation and the batch/chunk layout
//! - **LSTM Cell & Stack**: batched gated memory cells with full
//!   backpropagation through each chunk's unrolled graph
//! - **Classifier Head**: one linear map shared across all timesteps
//! - **Training**: the TBPTT loop — numeric state carried across chunks,
//!   gradients truncated at chunk boundaries, state reset every epoch
//! - **Optimizers**: Adagrad (the experiment's default) and SGD
//! - **Visualization**: a pluggable sink rendering the loss curve and
//!   predicted-vs-true bars in the terminal
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_tbptt::training::{create_echo_trainer, ExperimentConfig};
//! use rust_tbptt::viz::NullVisualizer;
//!
//! let config = ExperimentConfig {
//!     num_epochs: 1,
//!     total_length: 600,
//!     ..ExperimentConfig::default()
//! };
//! let mut trainer = create_echo_trainer(config, NullVisualizer).unwrap();
//! trainer.run();
//! assert_eq!(trainer.loss_history().len(), 8);
//! ```

/// Main library module.
pub mod utils;
pub mod data;
pub mod layers;
pub mod models;
pub mod loss;
pub mod optimizers;
pub mod training;
pub mod viz;

// Re-export commonly used items
pub use data::{generate_echo_pair, EchoBatches};
pub use layers::linear::LinearLayer;
pub use layers::lstm_cell::LSTMCell;
pub use loss::{LossFunction, SoftmaxCrossEntropy};
pub use models::lstm_network::{LayerState, StackedLstm};
pub use optimizers::{Adagrad, Optimizer, SGD};
pub use training::{create_echo_trainer, ConfigError, EchoTrainer, ExperimentConfig};
pub use viz::{NullVisualizer, TerminalVisualizer, Visualizer};
