/// Dense row-major `i32` matrix used for the unrolled GEMM operands and the raw result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
  data: Vec<i32>,
  rows: usize,
  cols: usize,
}

impl Matrix {
  pub fn new(rows: usize, cols: usize) -> Self {
    Self {
      data: vec![0; rows * cols],
      rows,
      cols,
    }
  }

  pub fn from_rows(rows: &[Vec<i32>]) -> Self {
    let cols = rows.first().map_or(0, |r| r.len());
    let mut matrix = Self::new(rows.len(), cols);
    for (i, row) in rows.iter().enumerate() {
      assert_eq!(row.len(), cols, "ragged row {}", i);
      matrix.row_mut(i).copy_from_slice(row);
    }
    matrix
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  /// Resize to `rows x cols` and zero every cell, keeping the allocation.
  pub fn reshape(&mut self, rows: usize, cols: usize) {
    self.rows = rows;
    self.cols = cols;
    self.data.clear();
    self.data.resize(rows * cols, 0);
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> i32 {
    debug_assert!(row < self.rows && col < self.cols);
    self.data[row * self.cols + col]
  }

  #[inline]
  pub fn set(&mut self, row: usize, col: usize, value: i32) {
    debug_assert!(row < self.rows && col < self.cols);
    self.data[row * self.cols + col] = value;
  }

  /// Wrapping `+=`, the accumulator's natural 32-bit behaviour.
  #[inline]
  pub fn add_assign_at(&mut self, row: usize, col: usize, value: i32) {
    debug_assert!(row < self.rows && col < self.cols);
    let cell = &mut self.data[row * self.cols + col];
    *cell = cell.wrapping_add(value);
  }

  pub fn row(&self, row: usize) -> &[i32] {
    &self.data[row * self.cols..(row + 1) * self.cols]
  }

  pub fn row_mut(&mut self, row: usize) -> &mut [i32] {
    &mut self.data[row * self.cols..(row + 1) * self.cols]
  }

  /// Copy of columns `start..start + len` into `out`.
  pub fn column_block_into(&self, start: usize, len: usize, out: &mut Matrix) {
    debug_assert!(start + len <= self.cols);
    out.reshape(self.rows, len);
    for r in 0..self.rows {
      out.row_mut(r).copy_from_slice(&self.row(r)[start..start + len]);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reshape_zeroes() {
    let mut m = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]);
    m.reshape(3, 1);
    assert_eq!((m.rows(), m.cols()), (3, 1));
    assert_eq!(m.get(2, 0), 0);
  }

  #[test]
  fn test_add_assign_wraps() {
    let mut m = Matrix::new(1, 1);
    m.set(0, 0, i32::MAX);
    m.add_assign_at(0, 0, 1);
    assert_eq!(m.get(0, 0), i32::MIN);
  }

  #[test]
  fn test_column_block() {
    let m = Matrix::from_rows(&[vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    let mut out = Matrix::default();
    m.column_block_into(1, 2, &mut out);
    assert_eq!(out, Matrix::from_rows(&[vec![2, 3], vec![6, 7]]));
  }
}
