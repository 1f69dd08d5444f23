//! Fixed-point rescaling of raw accumulators into the output's quantized domain.
//!
//! A real scale `s` is carried as a Q0.31 `multiplier` in [2^30, 2^31) and a power-of-two
//! `shift` (positive = left), so that `s ~= multiplier * 2^(shift - 31)`.

pub mod int4;

use crate::error::{ConvError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Shifts the int32 rescale accepts.
pub const SHIFT_RANGE: RangeInclusive<i32> = -31..=30;

/// Shifts the 64-bit rescale accepts; the total right shift `15 - shift` stays positive.
pub const WIDE_SHIFT_RANGE: RangeInclusive<i32> = -31..=7;

/// One multiplier/shift pair per output channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerChannelQuantization {
  pub multiplier: Vec<i32>,
  pub shift: Vec<i32>,
}

impl PerChannelQuantization {
  pub fn new(multiplier: Vec<i32>, shift: Vec<i32>) -> Self {
    Self { multiplier, shift }
  }

  /// Multiplier 2^30 with left shift 1 rescales by exactly 1.0.
  pub fn identity(channels: usize) -> Self {
    Self {
      multiplier: vec![1 << 30; channels],
      shift: vec![1; channels],
    }
  }

  pub fn len(&self) -> usize {
    self.multiplier.len()
  }

  pub fn is_empty(&self) -> bool {
    self.multiplier.is_empty()
  }

  pub fn validate(&self, output_depth: usize) -> Result<()> {
    if self.multiplier.len() != output_depth {
      return Err(ConvError::BufferLen {
        what: "output multiplier",
        expected: output_depth,
        actual: self.multiplier.len(),
      });
    }
    if self.shift.len() != output_depth {
      return Err(ConvError::BufferLen {
        what: "output shift",
        expected: output_depth,
        actual: self.shift.len(),
      });
    }
    self.check_range(SHIFT_RANGE)
  }

  /// Every multiplier must be non-negative and every shift inside `shifts`.
  pub fn check_range(&self, shifts: RangeInclusive<i32>) -> Result<()> {
    for (channel, (&multiplier, &shift)) in self.multiplier.iter().zip(&self.shift).enumerate() {
      if multiplier < 0 || !shifts.contains(&shift) {
        return Err(ConvError::Quantization {
          channel,
          multiplier,
          shift,
        });
      }
    }
    Ok(())
  }
}

/// High 32 bits of `2 * a * b`, rounded to nearest. Only `MIN * MIN` saturates.
#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
  if a == i32::MIN && b == i32::MIN {
    return i32::MAX;
  }
  let ab = a as i64 * b as i64;
  let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
  ((ab + nudge) / (1i64 << 31)) as i32
}

/// `x / 2^exponent`, ties rounded away from zero.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
  debug_assert!((0..=31).contains(&exponent), "exponent {}", exponent);
  let mask = ((1i64 << exponent) - 1) as i32;
  let remainder = x & mask;
  let threshold = (mask >> 1) + (x < 0) as i32;
  (x >> exponent) + (remainder > threshold) as i32
}

#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
  debug_assert!(SHIFT_RANGE.contains(&shift), "shift {}", shift);
  let left_shift = shift.max(0);
  let right_shift = (-shift).max(0);
  rounding_divide_by_pot(
    saturating_rounding_doubling_high_mul(x.wrapping_mul(1 << left_shift), multiplier),
    right_shift,
  )
}

/// Wide-accumulator variant used by the 16-bit activation kernel.
///
/// The multiplier is reduced to 16 bits so the product of a 48-bit accumulator still fits
/// in 64 bits.
#[inline]
pub fn multiply_by_quantized_multiplier_i64(x: i64, multiplier: i32, shift: i32) -> i32 {
  debug_assert!(multiplier >= 0);
  debug_assert!(WIDE_SHIFT_RANGE.contains(&shift), "shift {}", shift);
  debug_assert!((-(1i64 << 47)..(1i64 << 47)).contains(&x));
  let reduced: i32 = if multiplier < 0x7FFF_0000 {
    (multiplier + (1 << 15)) >> 16
  } else {
    0x7FFF
  };
  let total_shift = 15 - shift;
  let x = x * reduced as i64 + (1i64 << (total_shift - 1));
  (x >> total_shift) as i32
}

/// Accumulator to output activation: bias, rescale, zero point, clamp.
#[inline]
pub fn requantize(
  acc: i32,
  bias: i32,
  multiplier: i32,
  shift: i32,
  output_offset: i32,
  activation_min: i32,
  activation_max: i32,
) -> i32 {
  let scaled = multiply_by_quantized_multiplier(acc.wrapping_add(bias), multiplier, shift);
  scaled
    .wrapping_add(output_offset)
    .max(activation_min)
    .min(activation_max)
}
