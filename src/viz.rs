use ndarray::{Array2, ArrayView2};

use crate::utils::predicted_classes;

/// Sink for training snapshots.
///
/// `render` receives the full loss history (one scalar per chunk), the
/// per-timestep class-probability matrices for the chunk just processed
/// (each `(num_classes, batch_size)`), and the chunk's input and echo grids.
/// Implementations must not mutate their arguments; everything arrives
/// borrowed and read-only.
pub trait Visualizer {
    fn render(
        &mut self,
        loss_history: &[f64],
        predictions: &[Array2<f64>],
        input_chunk: ArrayView2<'_, u8>,
        echo_chunk: ArrayView2<'_, u8>,
    );
}

/// No-op sink for headless runs and tests.
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {
    fn render(
        &mut self,
        _loss_history: &[f64],
        _predictions: &[Array2<f64>],
        _input_chunk: ArrayView2<'_, u8>,
        _echo_chunk: ArrayView2<'_, u8>,
    ) {
    }
}

/// Renders training snapshots as text.
///
/// One line sketches the recent loss curve as a fixed-width sparkline; then
/// each batch row gets three aligned bar lines: the input bits, the echo
/// bits, and the class predicted at each timestep.
pub struct TerminalVisualizer {
    width: usize,
}

impl TerminalVisualizer {
    pub fn new() -> Self {
        TerminalVisualizer { width: 60 }
    }

    pub fn with_width(width: usize) -> Self {
        assert!(width > 0, "sparkline width must be positive");
        TerminalVisualizer { width }
    }

    fn sparkline(&self, loss_history: &[f64]) -> String {
        const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

        let start = loss_history.len().saturating_sub(self.width);
        let window = &loss_history[start..];
        let max = window
            .iter()
            .cloned()
            .filter(|v| v.is_finite())
            .fold(f64::MIN_POSITIVE, f64::max);

        window
            .iter()
            .map(|&v| {
                if !v.is_finite() {
                    return '!';
                }
                let level = ((v / max) * (LEVELS.len() - 1) as f64).round() as usize;
                LEVELS[level.min(LEVELS.len() - 1)]
            })
            .collect()
    }

    fn bits_line(bits: ndarray::ArrayView1<'_, u8>) -> String {
        bits.iter().map(|&b| if b == 1 { '█' } else { '·' }).collect()
    }
}

impl Default for TerminalVisualizer {
    fn default() -> Self {
        TerminalVisualizer::new()
    }
}

impl Visualizer for TerminalVisualizer {
    fn render(
        &mut self,
        loss_history: &[f64],
        predictions: &[Array2<f64>],
        input_chunk: ArrayView2<'_, u8>,
        echo_chunk: ArrayView2<'_, u8>,
    ) {
        let latest = loss_history.last().copied().unwrap_or(f64::NAN);
        println!("loss {:>8.5}  {}", latest, self.sparkline(loss_history));

        // Predicted class per timestep, transposed into per-row series
        let per_step: Vec<Vec<usize>> = predictions.iter().map(predicted_classes).collect();

        for row in 0..input_chunk.nrows() {
            let predicted: String = per_step
                .iter()
                .map(|classes| if classes[row] == 1 { '█' } else { '·' })
                .collect();
            println!("  row {}  input {}", row, Self::bits_line(input_chunk.row(row)));
            println!("         echo  {}", Self::bits_line(echo_chunk.row(row)));
            println!("         pred  {}", predicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_null_visualizer_accepts_anything() {
        let mut viz = NullVisualizer;
        let predictions = vec![arr2(&[[0.4, 0.9], [0.6, 0.1]])];
        let input = arr2(&[[1u8, 0], [0, 1]]);
        let echo = arr2(&[[0u8, 1], [1, 0]]);
        viz.render(&[0.5], &predictions, input.view(), echo.view());
    }

    #[test]
    fn test_sparkline_is_window_sized() {
        let viz = TerminalVisualizer::with_width(10);
        let history: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let line = viz.sparkline(&history);
        assert_eq!(line.chars().count(), 10);
    }

    #[test]
    fn test_sparkline_marks_non_finite_losses() {
        let viz = TerminalVisualizer::with_width(4);
        let line = viz.sparkline(&[0.1, f64::NAN, 0.2]);
        assert!(line.contains('!'));
    }

    #[test]
    fn test_bits_line() {
        let grid = arr2(&[[1u8, 0, 1]]);
        assert_eq!(TerminalVisualizer::bits_line(grid.row(0)), "█·█");
    }
}
