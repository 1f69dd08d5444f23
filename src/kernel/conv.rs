//! Per-channel quantized int8 convolution through an unrolled GEMM.

use super::gemm::MatMul;
use super::im2col::{unroll_filter, unroll_input, ConvScratch};
use super::matrix::Matrix;
use super::params::{ConvGeometry, ConvParams};
use crate::error::{ConvError, Result};
use crate::quant::int4::unpack_dense_int4_into_int8;
use crate::quant::{requantize, PerChannelQuantization};
use crate::tensor::TensorShape;

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
  if expected != actual {
    return Err(ConvError::BufferLen {
      what,
      expected,
      actual,
    });
  }
  Ok(())
}

/// Every contract check shared by the conv kernels. Runs before any work or hardware access.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_operands(
  params: &ConvParams,
  quant: &PerChannelQuantization,
  input_shape: &TensorShape,
  input_len: usize,
  filter_shape: &TensorShape,
  filter_len: usize,
  bias_len: Option<usize>,
  output_shape: &TensorShape,
  output_len: usize,
) -> Result<ConvGeometry> {
  params.validate()?;
  let geo = ConvGeometry::new(input_shape, filter_shape, output_shape)?;
  quant.validate(geo.output_depth)?;
  if let Some(len) = bias_len {
    check_len("bias", geo.output_depth, len)?;
  }
  check_len("input", input_shape.flat_size(), input_len)?;
  check_len("filter", filter_shape.flat_size(), filter_len)?;
  check_len("output", output_shape.flat_size(), output_len)?;
  Ok(geo)
}

/// Rescales one group's raw result into the output tensor, channel by channel.
#[allow(clippy::too_many_arguments)]
fn write_output(
  result: &Matrix,
  geo: &ConvGeometry,
  params: &ConvParams,
  quant: &PerChannelQuantization,
  bias: Option<&[i32]>,
  batch: usize,
  group: usize,
  output_shape: &TensorShape,
  output: &mut [i8],
) {
  let first = group * geo.filters_per_group;
  for col in 0..geo.filters_per_group {
    let out_channel = first + col;
    let channel_bias = bias.map_or(0, |b| b[out_channel]);
    for out_y in 0..geo.output_height {
      for out_x in 0..geo.output_width {
        let acc = result.get(out_x + out_y * geo.output_width, col);
        let value = requantize(
          acc,
          channel_bias,
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

/// Int8 activations, int8 filter, optional int32 bias, per-channel requantization.
///
/// The filter is unrolled once; every batch and group unrolls its input, multiplies through
/// `engine` and rescales into `output`. Scratch buffers are resized as needed and hold no state
/// between calls.
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel<E: MatMul>(
  params: &ConvParams,
  quant: &PerChannelQuantization,
  input_shape: &TensorShape,
  input: &[i8],
  filter_shape: &TensorShape,
  filter: &[i8],
  bias: Option<&[i32]>,
  output_shape: &TensorShape,
  output: &mut [i8],
  engine: &mut E,
  scratch: &mut ConvScratch,
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
  log::debug!(
    "conv: input {:?} filter {:?} output {:?}, groups {}, gemm {}x{}x{}",
    input_shape.dims(),
    filter_shape.dims(),
    output_shape.dims(),
    geo.groups,
    geo.gemm_rows(),
    geo.gemm_depth(),
    geo.filters_per_group
  );

  let ConvScratch {
    lhs,
    rhs,
    rhs_group,
    result,
  } = scratch;
  unroll_filter(filter, filter_shape, &geo, rhs);

  for batch in 0..geo.batches {
    for group in 0..geo.groups {
      unroll_input(input, input_shape, &geo, params, batch, group, lhs);
      let group_rhs = if geo.groups == 1 {
        &*rhs
      } else {
        rhs.column_block_into(group * geo.filters_per_group, geo.filters_per_group, rhs_group);
        &*rhs_group
      };
      engine.matmul(lhs, group_rhs, result)?;
      write_output(result, &geo, params, quant, bias, batch, group, output_shape, output);
    }
  }
  Ok(())
}

/// Same as [`conv_per_channel`] with a filter of packed signed 4-bit weights, expanded into
/// `unpacked_filter` first.
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel_packed_int4<E: MatMul>(
  params: &ConvParams,
  quant: &PerChannelQuantization,
  input_shape: &TensorShape,
  input: &[i8],
  filter_shape: &TensorShape,
  packed_filter: &[i8],
  unpacked_filter: &mut [i8],
  bias: Option<&[i32]>,
  output_shape: &TensorShape,
  output: &mut [i8],
  engine: &mut E,
  scratch: &mut ConvScratch,
) -> Result<()> {
  let count = filter_shape.flat_size();
  unpack_dense_int4_into_int8(packed_filter, count, unpacked_filter)?;
  conv_per_channel(
    params,
    quant,
    input_shape,
    input,
    filter_shape,
    &unpacked_filter[..count],
    bias,
    output_shape,
    output,
    engine,
    scratch,
  )
}
