use thiserror::Error;

/// Contract violations detected before any coprocessor instruction is issued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvError {
  #[error("{what}: dimension {index} mismatch ({lhs} vs {rhs})")]
  DimMismatch {
    what: &'static str,
    index: usize,
    lhs: usize,
    rhs: usize,
  },

  #[error("input channels {input_channels} not divisible by filter input channels {filter_channels}")]
  Groups {
    input_channels: usize,
    filter_channels: usize,
  },

  #[error("output channels {output_channels} not divisible by group count {groups}")]
  FiltersPerGroup { output_channels: usize, groups: usize },

  #[error("{what} holds {actual} elements, expected {expected}")]
  BufferLen {
    what: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("channel {channel}: multiplier {multiplier} with shift {shift} outside the fixed-point range")]
  Quantization { channel: usize, multiplier: i32, shift: i32 },

  #[error("invalid conv params: {0}")]
  Params(String),

  #[error("incompatible matrix dimensions for multiplication: lhs {lhs_rows}x{lhs_cols}, rhs {rhs_rows}x{rhs_cols}")]
  GemmShape {
    lhs_rows: usize,
    lhs_cols: usize,
    rhs_rows: usize,
    rhs_cols: usize,
  },

  #[error("tile width {tile} outside 1..={hw_tile}")]
  Tile { tile: usize, hw_tile: usize },

  #[error("coprocessor lock poisoned by an earlier panic")]
  CfuPoisoned,
}

pub type Result<T> = std::result::Result<T, ConvError>;
