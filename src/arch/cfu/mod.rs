//! Custom function unit (CFU): a small matrix-multiply coprocessor driven one instruction at a
//! time. Every instruction carries a function code and two 32-bit operands and yields one
//! 32-bit result.

mod model;
mod session;

pub use model::{CfuModel, DEFAULT_HW_TILE};
pub use session::{Cfu, CfuSession, CfuStats};

pub type Word = i32;

/// Number of result lanes the unit packs into one read.
pub const LANES: usize = 4;

/// Function codes understood by the unit.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Funct {
  Reset = 1,
  SetK = 2,
  SetM = 4,
  SetN = 6,
  WriteA = 8,
  WriteB = 10,
  Start = 12,
  ReadLane3 = 14,
  ReadLane2 = 15,
  ReadLane1 = 16,
  ReadLane0 = 17,
}

impl Funct {
  pub const ALL: [Funct; 11] = [
    Funct::Reset,
    Funct::SetK,
    Funct::SetM,
    Funct::SetN,
    Funct::WriteA,
    Funct::WriteB,
    Funct::Start,
    Funct::ReadLane3,
    Funct::ReadLane2,
    Funct::ReadLane1,
    Funct::ReadLane0,
  ];

  pub fn from_raw(raw: u32) -> Option<Self> {
    Self::ALL.iter().copied().find(|f| *f as u32 == raw)
  }

  /// Read instruction for result lane 0..=3.
  pub fn read_lane(lane: usize) -> Self {
    match lane {
      0 => Funct::ReadLane0,
      1 => Funct::ReadLane1,
      2 => Funct::ReadLane2,
      3 => Funct::ReadLane3,
      _ => panic!("result lane {} out of 0..{}", lane, LANES),
    }
  }

  pub fn lane(self) -> Option<usize> {
    match self {
      Funct::ReadLane0 => Some(0),
      Funct::ReadLane1 => Some(1),
      Funct::ReadLane2 => Some(2),
      Funct::ReadLane3 => Some(3),
      _ => None,
    }
  }
}

/// The instruction port of a CFU.
pub trait CfuOp {
  fn op(&mut self, funct: Funct, rs1: Word, rs2: Word) -> Word;

  /// Largest M and N extent one compute burst accepts.
  fn hw_tile(&self) -> usize;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_funct_raw_roundtrip() {
    for f in Funct::ALL {
      assert_eq!(Funct::from_raw(f as u32), Some(f));
    }
    assert_eq!(Funct::from_raw(0), None);
    assert_eq!(Funct::from_raw(13), None);
  }

  #[test]
  fn test_read_lane_encoding() {
    assert_eq!(Funct::read_lane(0) as u32, 17);
    assert_eq!(Funct::read_lane(3) as u32, 14);
    for lane in 0..LANES {
      assert_eq!(Funct::read_lane(lane).lane(), Some(lane));
    }
    assert_eq!(Funct::Start.lane(), None);
  }
}
