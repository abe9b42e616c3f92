use ndarray::{s, Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

/// Generates one epoch of the echo task: a Bernoulli(0.5) bit stream and its
/// copy shifted right by `lag` positions, with the first `lag` positions
/// zero-filled.
///
/// Fresh arrays are returned on every call so each epoch trains on newly
/// sampled data.
pub fn generate_echo_pair<R: Rng>(
    total_length: usize,
    lag: usize,
    rng: &mut R,
) -> (Array1<u8>, Array1<u8>) {
    let dist = Bernoulli::new(0.5).unwrap();
    let input = Array1::from_iter((0..total_length).map(|_| u8::from(dist.sample(rng))));

    let mut echo = Array1::zeros(total_length);
    if lag < total_length {
        echo.slice_mut(s![lag..])
            .assign(&input.slice(s![..total_length - lag]));
    }

    (input, echo)
}

/// Batch layout over one epoch of echo data.
///
/// Both flat sequences are reshaped row-major into `[batch_size, row_length]`
/// (batch index slowest-varying), and the time axis is consumed as
/// non-overlapping column windows of `chunk_length`.
///
/// Divisibility of `total_length` by `batch_size` and of the resulting row
/// length by `chunk_length` is a precondition; violations are caller errors
/// and panic. `ExperimentConfig::validate` reports the same conditions as
/// recoverable errors before a run starts.
pub struct EchoBatches {
    input: Array2<u8>,
    echo: Array2<u8>,
    chunk_length: usize,
}

impl EchoBatches {
    pub fn new(
        input: Array1<u8>,
        echo: Array1<u8>,
        batch_size: usize,
        chunk_length: usize,
    ) -> Self {
        let total_length = input.len();
        assert_eq!(input.len(), echo.len(), "input/echo length mismatch");
        assert_eq!(
            total_length % batch_size,
            0,
            "total length {} not divisible by batch size {}",
            total_length,
            batch_size
        );
        let row_length = total_length / batch_size;
        assert_eq!(
            row_length % chunk_length,
            0,
            "row length {} not divisible by chunk length {}",
            row_length,
            chunk_length
        );

        let input = input
            .into_shape((batch_size, row_length))
            .expect("row-major reshape cannot fail after the divisibility check");
        let echo = echo
            .into_shape((batch_size, row_length))
            .expect("row-major reshape cannot fail after the divisibility check");

        EchoBatches {
            input,
            echo,
            chunk_length,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.input.nrows()
    }

    pub fn row_length(&self) -> usize {
        self.input.ncols()
    }

    pub fn num_chunks(&self) -> usize {
        self.row_length() / self.chunk_length
    }

    /// Column window `[k*chunk_length, (k+1)*chunk_length)` of the input and
    /// echo grids. Windows do not overlap and must be consumed in increasing
    /// `k` within an epoch, since recurrent state is carried between them.
    pub fn chunk(&self, k: usize) -> (ArrayView2<'_, u8>, ArrayView2<'_, u8>) {
        assert!(k < self.num_chunks(), "chunk index {} out of range", k);
        let start = k * self.chunk_length;
        let end = start + self.chunk_length;
        (
            self.input.slice(s![.., start..end]),
            self.echo.slice(s![.., start..end]),
        )
    }

    pub fn input_grid(&self) -> ArrayView2<'_, u8> {
        self.input.view()
    }

    pub fn echo_grid(&self) -> ArrayView2<'_, u8> {
        self.echo.view()
    }
}
