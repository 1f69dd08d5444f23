//! Direct nested-loop convolutions. No unrolling and no coprocessor; these are the ground truth
//! the GEMM path is checked against and the fallback for 16-bit activations.

use super::conv::check_operands;
use super::params::{ConvGeometry, ConvParams};
use crate::error::{ConvError, Result};
use crate::quant::{multiply_by_quantized_multiplier_i64, requantize, PerChannelQuantization, WIDE_SHIFT_RANGE};
use crate::tensor::TensorShape;

/// Input coordinate of tap (fy, fx) for output (out_y, out_x), or `None` in the padding ring.
#[inline]
fn tap(
  geo: &ConvGeometry,
  params: &ConvParams,
  out_y: usize,
  out_x: usize,
  fy: usize,
  fx: usize,
) -> Option<(usize, usize)> {
  let in_y = (out_y * params.stride_height + fy * params.dilation_height) as isize - params.pad_height as isize;
  let in_x = (out_x * params.stride_width + fx * params.dilation_width) as isize - params.pad_width as isize;
  let inside = in_y >= 0 && (in_y as usize) < geo.input_height && in_x >= 0 && (in_x as usize) < geo.input_width;
  inside.then_some((in_y as usize, in_x as usize))
}

/// Int8 reference: identical contract to [`super::conv::conv_per_channel`].
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel_i8(
  params: &ConvParams,
  quant: &PerChannelQuantization,
  input_shape: &TensorShape,
  input: &[i8],
  filter_shape: &TensorShape,
  filter: &[i8],
  bias: Option<&[i32]>,
  output_shape: &TensorShape,
  output: &mut [i8],
) -> Result<()> {
  let geo = check_operands(
    params,
    quant,
    input_shape,
    input.len(),
    filter_shape,
    filter.len(),
    bias.map(|b| b.len()),
    output_shape,
    output.len(),
  )?;

  for batch in 0..geo.batches {
    for out_y in 0..geo.output_height {
      for out_x in 0..geo.output_width {
        for out_channel in 0..geo.output_depth {
          let group = out_channel / geo.filters_per_group;
          let mut acc: i32 = 0;
          for fy in 0..geo.filter_height {
            for fx in 0..geo.filter_width {
              // Zero padding by omitting the taps outside the image.
              let Some((in_y, in_x)) = tap(&geo, params, out_y, out_x, fy, fx) else {
                continue;
              };
              for ic in 0..geo.filter_input_depth {
                let in_c = ic + group * geo.filter_input_depth;
                let input_val = input[input_shape.offset(batch, in_y, in_x, in_c)] as i32;
                let filter_val = filter[filter_shape.offset(out_channel, fy, fx, ic)] as i32;
                acc = acc.wrapping_add(filter_val.wrapping_mul(input_val.wrapping_add(params.input_offset)));
              }
            }
          }
          let value = requantize(
            acc,
            bias.map_or(0, |b| b[out_channel]),
            quant.multiplier[out_channel],
            quant.shift[out_channel],
            params.output_offset,
            params.activation_min,
            params.activation_max,
          );
          output[output_shape.offset(batch, out_y, out_x, out_channel)] = value as i8;
        }
      }
    }
  }
  Ok(())
}

/// 16-bit activations with an 8-bit filter and a 64-bit accumulator.
///
/// Inputs are symmetric, so neither offset of `params` is applied. Each product is bounded by
/// 127 * 65535 (about 2^23), which leaves ample room in 64 bits.
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel_i16(
  params: &ConvParams,
  quant: &PerChannelQuantization,
  input_shape: &TensorShape,
  input: &[i16],
  filter_shape: &TensorShape,
  filter: &[i8],
  bias: Option<&[i64]>,
  output_shape: &TensorShape,
  output: &mut [i16],
) -> Result<()> {
  if params.activation_min < i16::MIN as i32 || params.activation_max > i16::MAX as i32 {
    return Err(ConvError::Params(format!(
      "activation range [{}, {}] exceeds int16",
      params.activation_min, params.activation_max
    )));
  }
  let geo = check_operands(
    params,
    quant,
    input_shape,
    input.len(),
    filter_shape,
    filter.len(),
    bias.map(|b| b.len()),
    output_shape,
    output.len(),
  )?;
  quant.check_range(WIDE_SHIFT_RANGE)?;

  for batch in 0..geo.batches {
    for out_y in 0..geo.output_height {
      for out_x in 0..geo.output_width {
        for out_channel in 0..geo.output_depth {
          let group = out_channel / geo.filters_per_group;
          let mut acc: i64 = 0;
          for fy in 0..geo.filter_height {
            for fx in 0..geo.filter_width {
              let Some((in_y, in_x)) = tap(&geo, params, out_y, out_x, fy, fx) else {
                continue;
              };
              for ic in 0..geo.filter_input_depth {
                let in_c = ic + group * geo.filter_input_depth;
                let input_val = input[input_shape.offset(batch, in_y, in_x, in_c)] as i64;
                let filter_val = filter[filter_shape.offset(out_channel, fy, fx, ic)] as i64;
                acc += filter_val * input_val;
              }
            }
          }
          if let Some(b) = bias {
            acc += b[out_channel];
          }
          let scaled = multiply_by_quantized_multiplier_i64(acc, quant.multiplier[out_channel], quant.shift[out_channel])
            .max(params.activation_min)
            .min(params.activation_max);
          output[output_shape.offset(batch, out_y, out_x, out_channel)] = scaled as i16;
        }
      }
    }
  }
  Ok(())
}
