/// Module for the gated recurrent memory cell.
pub mod lstm_cell;

/// Module for the linear classifier head.
pub mod linear;
