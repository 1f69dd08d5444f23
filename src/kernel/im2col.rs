//! Rewrites a convolution as `Result = LHS x RHS`.
//!
//! Both operands share one contraction ordering: tap `(fy, fx, ic)` of a group maps to column
//! (LHS) / row (RHS) `fx + fy * filter_width + ic * filter_height * filter_width`.

use super::matrix::Matrix;
use super::params::{ConvGeometry, ConvParams};
use crate::tensor::TensorShape;

/// Per-invocation GEMM buffers, owned by the caller and reused across calls.
#[derive(Debug, Clone, Default)]
pub struct ConvScratch {
  pub lhs: Matrix,
  pub rhs: Matrix,
  /// RHS columns of the current group when the conv is grouped.
  pub rhs_group: Matrix,
  pub result: Matrix,
}

impl ConvScratch {
  pub fn new() -> Self {
    Self::default()
  }
}

#[inline]
fn tap_index(geo: &ConvGeometry, fy: usize, fx: usize, ic: usize) -> usize {
  fx + fy * geo.filter_width + ic * geo.filter_height * geo.filter_width
}

/// Unrolls one batch of one group of `input` into `lhs`.
///
/// Taps that land inside the image hold `input + input_offset`. Taps in the padding ring hold
/// a literal zero, so padding never contributes to the accumulator.
pub fn unroll_input(
  input: &[i8],
  input_shape: &TensorShape,
  geo: &ConvGeometry,
  params: &ConvParams,
  batch: usize,
  group: usize,
  lhs: &mut Matrix,
) {
  lhs.reshape(geo.gemm_rows(), geo.gemm_depth());
  let channel_base = group * geo.filter_input_depth;

  for out_y in 0..geo.output_height {
    let in_y_origin = (out_y * params.stride_height) as isize - params.pad_height as isize;
    for out_x in 0..geo.output_width {
      let in_x_origin = (out_x * params.stride_width) as isize - params.pad_width as isize;
      let row = out_x + out_y * geo.output_width;

      for fy in 0..geo.filter_height {
        let in_y = in_y_origin + (params.dilation_height * fy) as isize;
        for fx in 0..geo.filter_width {
          let in_x = in_x_origin + (params.dilation_width * fx) as isize;
          let inside = in_y >= 0
            && (in_y as usize) < geo.input_height
            && in_x >= 0
            && (in_x as usize) < geo.input_width;

          for ic in 0..geo.filter_input_depth {
            let value = if inside {
              let at = input_shape.offset(batch, in_y as usize, in_x as usize, channel_base + ic);
              (input[at] as i32).wrapping_add(params.input_offset)
            } else {
              0
            };
            lhs.set(row, tap_index(geo, fy, fx, ic), value);
          }
        }
      }
    }
  }
}

/// Unrolls every filter into `rhs`, one column per output channel.
pub fn unroll_filter(filter: &[i8], filter_shape: &TensorShape, geo: &ConvGeometry, rhs: &mut Matrix) {
  rhs.reshape(geo.gemm_depth(), geo.output_depth);
  for oc in 0..geo.output_depth {
    for fy in 0..geo.filter_height {
      for fx in 0..geo.filter_width {
        for ic in 0..geo.filter_input_depth {
          let value = filter[filter_shape.offset(oc, fy, fx, ic)] as i32;
          rhs.set(tap_index(geo, fy, fx, ic), oc, value);
        }
      }
    }
  }
}
