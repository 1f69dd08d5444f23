//! GEMM engines for the unrolled convolution.

use super::matrix::Matrix;
use crate::arch::cfu::{Cfu, CfuOp, CfuStats, Funct, Word, LANES};
use crate::error::{ConvError, Result};

/// `result = lhs x rhs` in wrapping 32-bit arithmetic. `result` is resized and overwritten.
pub trait MatMul {
  fn matmul(&mut self, lhs: &Matrix, rhs: &Matrix, result: &mut Matrix) -> Result<()>;
}

fn check_shapes(lhs: &Matrix, rhs: &Matrix) -> Result<()> {
  if lhs.cols() != rhs.rows() {
    log::error!(
      "incompatible matrix dimensions for multiplication: {}x{} * {}x{}",
      lhs.rows(),
      lhs.cols(),
      rhs.rows(),
      rhs.cols()
    );
    return Err(ConvError::GemmShape {
      lhs_rows: lhs.rows(),
      lhs_cols: lhs.cols(),
      rhs_rows: rhs.rows(),
      rhs_cols: rhs.cols(),
    });
  }
  Ok(())
}

/// Plain triple loop on the host CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarGemm;

impl MatMul for ScalarGemm {
  fn matmul(&mut self, lhs: &Matrix, rhs: &Matrix, result: &mut Matrix) -> Result<()> {
    check_shapes(lhs, rhs)?;
    result.reshape(lhs.rows(), rhs.cols());
    for i in 0..lhs.rows() {
      let a = lhs.row(i);
      for j in 0..rhs.cols() {
        let mut acc: i32 = 0;
        for (k, av) in a.iter().enumerate() {
          acc = acc.wrapping_add(av.wrapping_mul(rhs.get(k, j)));
        }
        result.set(i, j, acc);
      }
    }
    Ok(())
  }
}

/// Drives the coprocessor tile by tile.
///
/// Rows and columns of the logical GEMM are cut into tiles of at most `tile`; the contraction
/// is never split, so each tile is one compute burst over the full K.
pub struct TiledGemm<'a, H> {
  cfu: &'a Cfu<H>,
  tile: usize,
  last_stats: CfuStats,
  total_stats: CfuStats,
}

impl<'a, H: CfuOp> TiledGemm<'a, H> {
  /// Uses the widest tile the hardware accepts.
  pub fn new(cfu: &'a Cfu<H>) -> Self {
    Self {
      cfu,
      tile: cfu.hw_tile(),
      last_stats: CfuStats::default(),
      total_stats: CfuStats::default(),
    }
  }

  pub fn with_tile(cfu: &'a Cfu<H>, tile: usize) -> Result<Self> {
    if tile == 0 || tile > cfu.hw_tile() {
      return Err(ConvError::Tile {
        tile,
        hw_tile: cfu.hw_tile(),
      });
    }
    Ok(Self {
      tile,
      ..Self::new(cfu)
    })
  }

  pub fn tile(&self) -> usize {
    self.tile
  }

  /// Instruction counts of the most recent dispatch.
  pub fn last_stats(&self) -> CfuStats {
    self.last_stats
  }

  /// Instruction counts summed over every dispatch of this engine.
  pub fn total_stats(&self) -> CfuStats {
    self.total_stats
  }

  fn accumulate(&mut self, stats: CfuStats) {
    self.last_stats = stats;
    let total = &mut self.total_stats;
    total.instructions += stats.instructions;
    total.config += stats.config;
    total.a_writes += stats.a_writes;
    total.b_writes += stats.b_writes;
    total.starts += stats.starts;
    total.reads += stats.reads;
  }
}

impl<H: CfuOp> MatMul for TiledGemm<'_, H> {
  /// An empty product (M, N or K zero) returns zeros without acquiring or resetting the unit.
  fn matmul(&mut self, lhs: &Matrix, rhs: &Matrix, result: &mut Matrix) -> Result<()> {
    check_shapes(lhs, rhs)?;
    let (m_total, k, n_total) = (lhs.rows(), lhs.cols(), rhs.cols());
    let t = self.tile;
    result.reshape(m_total, n_total);
    if m_total == 0 || n_total == 0 || k == 0 {
      return Ok(());
    }

    let cfu = self.cfu;
    let mut session = cfu.acquire()?;
    session.op(Funct::SetK, k as Word, k as Word);

    for m in (0..m_total).step_by(t) {
      let m_tile = t.min(m_total - m);
      for n in (0..n_total).step_by(t) {
        let n_tile = t.min(n_total - n);
        log::debug!("CFU tile: rows {}..{}, cols {}..{}, K = {}", m, m + m_tile, n, n + n_tile, k);

        session.op(Funct::SetM, m_tile as Word, m_tile as Word);
        session.op(Funct::SetN, n_tile as Word, n_tile as Word);

        for i in 0..m_tile {
          for (kk, a) in lhs.row(m + i).iter().enumerate() {
            session.op(Funct::WriteA, (i * k + kk) as Word, *a);
          }
        }
        for kk in 0..k {
          for j in 0..n_tile {
            session.op(Funct::WriteB, (kk * n_tile + j) as Word, rhs.get(kk, n + j));
          }
        }

        // Completion of Start implies the results are readable.
        session.op(Funct::Start, 0, 0);

        for i in 0..m_tile {
          for j in (0..n_tile).step_by(LANES) {
            for lane in 0..LANES {
              if j + lane >= n_tile {
                break;
              }
              let value = session.op(Funct::read_lane(lane), (i * n_tile + j + lane) as Word, 0);
              result.add_assign_at(m + i, n + j + lane, value);
            }
          }
        }
      }
    }

    let stats = session.stats();
    drop(session);
    log::debug!(
      "CFU gemm {}x{}x{} done: {} instructions, {} bursts",
      m_total,
      k,
      n_total,
      stats.instructions,
      stats.starts
    );
    self.accumulate(stats);
    Ok(())
  }
}
