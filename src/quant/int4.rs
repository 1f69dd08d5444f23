use crate::error::{ConvError, Result};

/// Expands `count` packed signed 4-bit values into one `i8` each.
///
/// Each byte holds two values, low nibble first. When `count` is odd the high nibble of the
/// last byte is ignored.
pub fn unpack_dense_int4_into_int8(packed: &[i8], count: usize, out: &mut [i8]) -> Result<()> {
  let needed = count.div_ceil(2);
  if packed.len() < needed {
    return Err(ConvError::BufferLen {
      what: "packed int4 filter",
      expected: needed,
      actual: packed.len(),
    });
  }
  if out.len() < count {
    return Err(ConvError::BufferLen {
      what: "unpacked filter",
      expected: count,
      actual: out.len(),
    });
  }

  for i in 0..count / 2 {
    let byte = packed[i];
    out[2 * i] = (byte << 4) >> 4;
    out[2 * i + 1] = byte >> 4;
  }
  if count % 2 == 1 {
    out[count - 1] = (packed[count / 2] << 4) >> 4;
  }
  Ok(())
}
