use crate::error::{ConvError, Result};
use serde::{Deserialize, Serialize};

/// Dense row-major 4-D shape in NHWC order.
///
/// Filters reuse the same slots as (output channels, kernel height, kernel width,
/// input channels per group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[usize; 4]", into = "[usize; 4]")]
pub struct TensorShape {
  pub batch: usize,
  pub height: usize,
  pub width: usize,
  pub channel: usize,
}

impl TensorShape {
  pub const fn new(batch: usize, height: usize, width: usize, channel: usize) -> Self {
    Self {
      batch,
      height,
      width,
      channel,
    }
  }

  pub fn dims(&self) -> [usize; 4] {
    [self.batch, self.height, self.width, self.channel]
  }

  pub fn dim(&self, index: usize) -> usize {
    self.dims()[index]
  }

  pub fn flat_size(&self) -> usize {
    self.batch * self.height * self.width * self.channel
  }

  /// Flat offset of (b, y, x, c). Coordinates are only checked in debug builds.
  #[inline]
  pub fn offset(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
    debug_assert!(b < self.batch, "batch {} out of {}", b, self.batch);
    debug_assert!(y < self.height, "row {} out of {}", y, self.height);
    debug_assert!(x < self.width, "col {} out of {}", x, self.width);
    debug_assert!(c < self.channel, "channel {} out of {}", c, self.channel);
    ((b * self.height + y) * self.width + x) * self.channel + c
  }
}

impl From<[usize; 4]> for TensorShape {
  fn from(d: [usize; 4]) -> Self {
    Self::new(d[0], d[1], d[2], d[3])
  }
}

impl From<TensorShape> for [usize; 4] {
  fn from(shape: TensorShape) -> Self {
    shape.dims()
  }
}

/// Returns dimension `i` of `a` if it equals dimension `j` of `b`.
pub fn matching_dim(
  what: &'static str,
  a: &TensorShape,
  i: usize,
  b: &TensorShape,
  j: usize,
) -> Result<usize> {
  let (lhs, rhs) = (a.dim(i), b.dim(j));
  if lhs != rhs {
    return Err(ConvError::DimMismatch {
      what,
      index: i,
      lhs,
      rhs,
    });
  }
  Ok(lhs)
}
