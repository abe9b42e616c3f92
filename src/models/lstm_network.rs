use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;

/// One layer's recurrent memory: a hidden value and a cell value, each
/// `(state_width, batch_size)`.
#[derive(Clone)]
pub struct LayerState {
    pub hidden: Array2<f64>,
    pub cell: Array2<f64>,
}

impl LayerState {
    pub fn zeros(state_width: usize, batch_size: usize) -> Self {
        LayerState {
            hidden: Array2::zeros((state_width, batch_size)),
            cell: Array2::zeros((state_width, batch_size)),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hidden.iter().all(|&v| v == 0.0) && self.cell.iter().all(|&v| v == 0.0)
    }
}

/// Per-timestep, per-layer caches recorded while unrolling one chunk.
pub struct ChunkCache {
    steps: Vec<Vec<LSTMCellCache>>, // [timestep][layer]
}

/// Result of unrolling one chunk through the stack.
pub struct ChunkForward {
    /// Top-layer hidden value at each timestep, `(state_width, batch_size)`.
    pub outputs: Vec<Array2<f64>>,
    /// State after the last timestep, one entry per layer. Feeding this into
    /// the next `forward_chunk` call is what carries memory across chunks.
    pub states: Vec<LayerState>,
    pub cache: ChunkCache,
}

/// A stack of LSTM cells unrolled over fixed-length chunks.
///
/// Layer 0 consumes the scalar input bit expanded to a width-1 feature
/// vector; every deeper layer consumes the hidden output of the layer below
/// at the same timestep. Each layer's own recurrence runs along time within
/// the chunk, seeded at t = 0 by the incoming state for that layer.
///
/// The stack never retains state between calls: `forward_chunk` borrows the
/// incoming state and returns a fresh outgoing one, so the caller stays the
/// sole owner of the carried memory.
#[derive(Clone)]
pub struct StackedLstm {
    cells: Vec<LSTMCell>,
    pub input_size: usize,
    pub state_width: usize,
    pub num_layers: usize,
}

impl StackedLstm {
    pub fn new<R: Rng>(
        input_size: usize,
        state_width: usize,
        num_layers: usize,
        rng: &mut R,
    ) -> Self {
        let mut cells = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let layer_input_size = if i == 0 { input_size } else { state_width };
            cells.push(LSTMCell::new(layer_input_size, state_width, rng));
        }

        StackedLstm {
            cells,
            input_size,
            state_width,
            num_layers,
        }
    }

    /// All-zero state for every layer, the value fed in at epoch start.
    pub fn zero_state(&self, batch_size: usize) -> Vec<LayerState> {
        (0..self.num_layers)
            .map(|_| LayerState::zeros(self.state_width, batch_size))
            .collect()
    }

    /// Unrolls one `(batch_size, chunk_length)` bit chunk through the stack.
    ///
    /// Timesteps are processed strictly in order; the recurrence along time
    /// cannot be parallelized. The incoming `states` seed each layer at
    /// t = 0 and are not modified.
    pub fn forward_chunk(&self, chunk: ArrayView2<'_, u8>, states: &[LayerState]) -> ChunkForward {
        assert_eq!(states.len(), self.num_layers, "state/layer count mismatch");
        let batch_size = chunk.nrows();
        let chunk_length = chunk.ncols();
        for state in states {
            assert_eq!(
                state.hidden.dim(),
                (self.state_width, batch_size),
                "state shape mismatch"
            );
            assert_eq!(
                state.cell.dim(),
                (self.state_width, batch_size),
                "state shape mismatch"
            );
        }

        let mut states: Vec<LayerState> = states.to_vec();
        let mut outputs = Vec::with_capacity(chunk_length);
        let mut steps = Vec::with_capacity(chunk_length);

        for t in 0..chunk_length {
            // Scalar bit per batch row, expanded to a width-1 feature vector
            let column = chunk.column(t);
            let mut input = Array2::zeros((1, batch_size));
            for (j, &bit) in column.iter().enumerate() {
                input[[0, j]] = f64::from(bit);
            }

            let mut layer_caches = Vec::with_capacity(self.num_layers);
            for (l, cell) in self.cells.iter().enumerate() {
                let (hy, cy, cache) =
                    cell.forward_with_cache(&input, &states[l].hidden, &states[l].cell);
                layer_caches.push(cache);
                input = hy.clone();
                states[l] = LayerState { hidden: hy, cell: cy };
            }

            outputs.push(states[self.num_layers - 1].hidden.clone());
            steps.push(layer_caches);
        }

        ChunkForward {
            outputs,
            states,
            cache: ChunkCache { steps },
        }
    }

    /// Backpropagates through one unrolled chunk.
    ///
    /// `d_top` holds the loss gradient w.r.t. the top layer's hidden output
    /// at each timestep. Gradients flow down the stack at every timestep and
    /// backward along time within the chunk; the gradient that reaches the
    /// chunk's incoming state is discarded, which is the truncation that
    /// bounds the backprop window to one chunk.
    pub fn backward_chunk(
        &self,
        d_top: &[Array2<f64>],
        cache: &ChunkCache,
    ) -> Vec<LSTMCellGradients> {
        let chunk_length = cache.steps.len();
        assert_eq!(d_top.len(), chunk_length, "gradient/timestep count mismatch");
        assert!(chunk_length > 0, "cannot backpropagate an empty chunk");

        let batch_size = d_top[0].ncols();
        let mut gradients: Vec<LSTMCellGradients> =
            self.cells.iter().map(|cell| cell.zero_gradients()).collect();

        // Recurrent gradients flowing from timestep t+1 back into t, per layer
        let mut dh_next: Vec<Array2<f64>> = (0..self.num_layers)
            .map(|_| Array2::zeros((self.state_width, batch_size)))
            .collect();
        let mut dc_next: Vec<Array2<f64>> = (0..self.num_layers)
            .map(|_| Array2::zeros((self.state_width, batch_size)))
            .collect();

        for t in (0..chunk_length).rev() {
            // Gradient arriving at the current layer's hidden output from
            // above: the classifier head for the top layer, then the next
            // layer's input gradient on the way down.
            let mut dh_above = d_top[t].clone();

            for l in (0..self.num_layers).rev() {
                let dhy = &dh_above + &dh_next[l];
                let (cell_grads, dx, dhx, dcx) =
                    self.cells[l].backward(&dhy, &dc_next[l], &cache.steps[t][l]);

                gradients[l].accumulate(&cell_grads);
                dh_next[l] = dhx;
                dc_next[l] = dcx;
                dh_above = dx;
            }
            // dh_above is now the gradient w.r.t. the raw input bit; unused.
        }
        // dh_next/dc_next hold the gradient w.r.t. the incoming carried
        // state. Dropping them here treats that state as a constant.

        gradients
    }

    /// Update parameters for all layers using computed gradients
    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &[LSTMCellGradients],
        optimizer: &mut O,
    ) {
        assert_eq!(gradients.len(), self.num_layers, "gradient/layer count mismatch");
        for (i, (cell, cell_gradients)) in
            self.cells.iter_mut().zip(gradients.iter()).enumerate()
        {
            let prefix = format!("layer_{}", i);
            cell.update_parameters(cell_gradients, optimizer, &prefix);
        }
    }

    pub fn get_cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    pub fn get_cells_mut(&mut self) -> &mut [LSTMCell] {
        &mut self.cells
    }

    pub fn num_parameters(&self) -> usize {
        self.cells
            .iter()
            .map(|c| c.w_ih.len() + c.w_hh.len() + c.b_ih.len() + c.b_hh.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_chunk() -> Array2<u8> {
        arr2(&[[1, 0, 1, 1], [0, 0, 1, 0], [1, 1, 0, 0]])
    }

    #[test]
    fn test_forward_chunk_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = StackedLstm::new(1, 4, 3, &mut rng);
        let chunk = toy_chunk();
        let states = net.zero_state(3);

        let fwd = net.forward_chunk(chunk.view(), &states);

        assert_eq!(fwd.outputs.len(), 4);
        for output in &fwd.outputs {
            assert_eq!(output.shape(), &[4, 3]);
        }
        assert_eq!(fwd.states.len(), 3);
        for state in &fwd.states {
            assert_eq!(state.hidden.shape(), &[4, 3]);
            assert_eq!(state.cell.shape(), &[4, 3]);
        }
    }

    #[test]
    fn test_last_output_is_top_layer_state() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = StackedLstm::new(1, 2, 2, &mut rng);
        let chunk = toy_chunk();

        let fwd = net.forward_chunk(chunk.view(), &net.zero_state(3));

        let last = fwd.outputs.last().unwrap();
        assert!((last - &fwd.states[1].hidden)
            .iter()
            .all(|d| d.abs() == 0.0));
    }

    #[test]
    fn test_incoming_state_seeds_first_timestep() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = StackedLstm::new(1, 2, 2, &mut rng);
        let chunk = toy_chunk();

        let first = net.forward_chunk(chunk.view(), &net.zero_state(3));
        let second = net.forward_chunk(chunk.view(), &first.states);

        // The cache records exactly the state each layer saw at t = 0.
        for l in 0..2 {
            let seen = &second.cache.steps[0][l];
            assert_eq!(seen.hx, first.states[l].hidden);
            assert_eq!(seen.cx, first.states[l].cell);
        }
    }

    #[test]
    fn test_carried_state_changes_outputs() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = StackedLstm::new(1, 4, 2, &mut rng);
        let chunk = toy_chunk();

        let from_zero = net.forward_chunk(chunk.view(), &net.zero_state(3));
        let carried = net.forward_chunk(chunk.view(), &from_zero.states);

        let diff: f64 = (&from_zero.outputs[0] - &carried.outputs[0])
            .iter()
            .map(|d| d.abs())
            .sum();
        assert!(diff > 0.0, "carried state must influence the forward pass");
    }

    #[test]
    fn test_backward_chunk_gradient_shapes() {
        let mut rng = StdRng::seed_from_u64(4);
        let net = StackedLstm::new(1, 4, 3, &mut rng);
        let chunk = toy_chunk();

        let fwd = net.forward_chunk(chunk.view(), &net.zero_state(3));
        let d_top: Vec<Array2<f64>> = fwd
            .outputs
            .iter()
            .map(|o| Array2::from_elem(o.raw_dim(), 0.1))
            .collect();

        let gradients = net.backward_chunk(&d_top, &fwd.cache);

        assert_eq!(gradients.len(), 3);
        assert_eq!(gradients[0].w_ih.shape(), &[16, 1]);
        assert_eq!(gradients[1].w_ih.shape(), &[16, 4]);
        assert_eq!(gradients[2].w_hh.shape(), &[16, 4]);
        // Every layer receives some gradient signal.
        for g in &gradients {
            assert!(g.w_ih.iter().any(|&v| v != 0.0));
        }
    }
}
