use super::{CfuOp, Funct, Word};
use crate::error::{ConvError, Result};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Instruction counts for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CfuStats {
  pub instructions: u64,
  pub config: u64,
  pub a_writes: u64,
  pub b_writes: u64,
  pub starts: u64,
  pub reads: u64,
}

impl CfuStats {
  fn record(&mut self, funct: Funct) {
    self.instructions += 1;
    match funct {
      Funct::Reset | Funct::SetK | Funct::SetM | Funct::SetN => self.config += 1,
      Funct::WriteA => self.a_writes += 1,
      Funct::WriteB => self.b_writes += 1,
      Funct::Start => self.starts += 1,
      Funct::ReadLane0 | Funct::ReadLane1 | Funct::ReadLane2 | Funct::ReadLane3 => self.reads += 1,
    }
  }
}

/// Owner of one coprocessor. Callers share it by reference and take turns through
/// [`Cfu::acquire`].
#[derive(Debug)]
pub struct Cfu<H> {
  hw: Mutex<H>,
  hw_tile: usize,
}

impl<H: CfuOp> Cfu<H> {
  pub fn new(hw: H) -> Self {
    let hw_tile = hw.hw_tile();
    Self {
      hw: Mutex::new(hw),
      hw_tile,
    }
  }

  pub fn hw_tile(&self) -> usize {
    self.hw_tile
  }

  /// Blocks until the unit is free, then resets it. The unit is released when the returned
  /// session is dropped.
  pub fn acquire(&self) -> Result<CfuSession<'_, H>> {
    let guard = self.hw.lock().map_err(|_| ConvError::CfuPoisoned)?;
    let mut session = CfuSession {
      hw: guard,
      stats: CfuStats::default(),
    };
    session.op(Funct::Reset, 0, 0);
    Ok(session)
  }

  /// Direct access to the unit between sessions, e.g. to read model counters.
  pub fn with_hw<R>(&self, f: impl FnOnce(&mut H) -> R) -> Result<R> {
    let mut guard = self.hw.lock().map_err(|_| ConvError::CfuPoisoned)?;
    Ok(f(&mut guard))
  }
}

/// Exclusive use of the coprocessor for one dispatch.
pub struct CfuSession<'a, H> {
  hw: MutexGuard<'a, H>,
  stats: CfuStats,
}

impl<H: CfuOp> CfuSession<'_, H> {
  #[inline]
  pub fn op(&mut self, funct: Funct, rs1: Word, rs2: Word) -> Word {
    self.stats.record(funct);
    self.hw.op(funct, rs1, rs2)
  }

  pub fn stats(&self) -> CfuStats {
    self.stats
  }
}

impl<H> Drop for CfuSession<'_, H> {
  fn drop(&mut self) {
    log::debug!("CFU: session released after {} instructions", self.stats.instructions);
  }
}
