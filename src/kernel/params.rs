use crate::error::{ConvError, Result};
use crate::tensor::{matching_dim, TensorShape};
use serde::{Deserialize, Serialize};

/// Padding scheme used to derive `pad_height`/`pad_width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
  Same,
  Valid,
}

/// Convolution geometry plus the quantized offsets and activation range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvParams {
  pub stride_height: usize,
  pub stride_width: usize,
  pub dilation_height: usize,
  pub dilation_width: usize,
  pub pad_height: usize,
  pub pad_width: usize,
  /// Added to every in-bounds input value (the negated input zero point).
  pub input_offset: i32,
  /// Output zero point.
  pub output_offset: i32,
  pub activation_min: i32,
  pub activation_max: i32,
}

impl Default for ConvParams {
  fn default() -> Self {
    Self {
      stride_height: 1,
      stride_width: 1,
      dilation_height: 1,
      dilation_width: 1,
      pad_height: 0,
      pad_width: 0,
      input_offset: 0,
      output_offset: 0,
      activation_min: i8::MIN as i32,
      activation_max: i8::MAX as i32,
    }
  }
}

fn effective_filter(filter: usize, dilation: usize) -> usize {
  if filter == 0 {
    0
  } else {
    (filter - 1) * dilation + 1
  }
}

fn out_size(padding: Padding, image: usize, filter: usize, stride: usize, dilation: usize) -> usize {
  let effective = effective_filter(filter, dilation);
  match padding {
    Padding::Same => (image + stride - 1) / stride,
    Padding::Valid => (image + stride).saturating_sub(effective) / stride,
  }
}

fn leading_pad(stride: usize, dilation: usize, image: usize, filter: usize, out: usize) -> usize {
  if out == 0 {
    return 0;
  }
  let effective = effective_filter(filter, dilation);
  let total = ((out - 1) * stride + effective).saturating_sub(image);
  total / 2
}

impl ConvParams {
  pub fn validate(&self) -> Result<()> {
    if self.activation_min > self.activation_max {
      return Err(ConvError::Params(format!(
        "activation_min {} > activation_max {}",
        self.activation_min, self.activation_max
      )));
    }
    if self.stride_height == 0 || self.stride_width == 0 {
      return Err(ConvError::Params("stride must be at least 1".to_string()));
    }
    if self.dilation_height == 0 || self.dilation_width == 0 {
      return Err(ConvError::Params("dilation must be at least 1".to_string()));
    }
    Ok(())
  }

  /// Sets `pad_height`/`pad_width` for `padding` and returns the resulting output shape.
  pub fn apply_padding(
    &mut self,
    padding: Padding,
    input: &TensorShape,
    filter: &TensorShape,
  ) -> Result<TensorShape> {
    self.validate()?;
    let out_h = out_size(padding, input.height, filter.height, self.stride_height, self.dilation_height);
    let out_w = out_size(padding, input.width, filter.width, self.stride_width, self.dilation_width);
    self.pad_height = leading_pad(self.stride_height, self.dilation_height, input.height, filter.height, out_h);
    self.pad_width = leading_pad(self.stride_width, self.dilation_width, input.width, filter.width, out_w);
    Ok(TensorShape::new(input.batch, out_h, out_w, filter.batch))
  }

  /// Output shape implied by the current explicit padding.
  pub fn output_shape(&self, input: &TensorShape, filter: &TensorShape) -> Result<TensorShape> {
    self.validate()?;
    // No output position when the filter does not fit the padded image.
    let extent = |image: usize, pad: usize, filter: usize, stride: usize, dilation: usize| {
      let padded = image + 2 * pad;
      let effective = effective_filter(filter, dilation);
      if padded < effective {
        0
      } else {
        (padded - effective) / stride + 1
      }
    };
    let out_h = extent(input.height, self.pad_height, filter.height, self.stride_height, self.dilation_height);
    let out_w = extent(input.width, self.pad_width, filter.width, self.stride_width, self.dilation_width);
    Ok(TensorShape::new(input.batch, out_h, out_w, filter.batch))
  }
}

/// Dimensions shared by every conv kernel, checked once up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
  pub batches: usize,
  pub input_height: usize,
  pub input_width: usize,
  pub input_depth: usize,
  pub filter_height: usize,
  pub filter_width: usize,
  pub filter_input_depth: usize,
  pub output_height: usize,
  pub output_width: usize,
  pub output_depth: usize,
  pub groups: usize,
  pub filters_per_group: usize,
}

impl ConvGeometry {
  pub fn new(input: &TensorShape, filter: &TensorShape, output: &TensorShape) -> Result<Self> {
    let batches = matching_dim("input/output batch", input, 0, output, 0)?;
    let output_depth = matching_dim("filter/output depth", filter, 0, output, 3)?;
    let input_depth = input.channel;
    let filter_input_depth = filter.channel;
    if filter_input_depth == 0 || input_depth % filter_input_depth != 0 {
      return Err(ConvError::Groups {
        input_channels: input_depth,
        filter_channels: filter_input_depth,
      });
    }
    let groups = input_depth / filter_input_depth;
    if groups == 0 || output_depth % groups != 0 {
      return Err(ConvError::FiltersPerGroup {
        output_channels: output_depth,
        groups,
      });
    }
    Ok(Self {
      batches,
      input_height: input.height,
      input_width: input.width,
      input_depth,
      filter_height: filter.height,
      filter_width: filter.width,
      filter_input_depth,
      output_height: output.height,
      output_width: output.width,
      output_depth,
      groups,
      filters_per_group: output_depth / groups,
    })
  }

  /// Rows of the unrolled input: one per output pixel.
  pub fn gemm_rows(&self) -> usize {
    self.output_height * self.output_width
  }

  /// Contraction length: one column per filter tap of one group.
  pub fn gemm_depth(&self) -> usize {
    self.filter_height * self.filter_width * self.filter_input_depth
  }
}
