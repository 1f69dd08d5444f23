use super::{CfuOp, Funct, Word};

/// M/N capacity of the reference unit.
pub const DEFAULT_HW_TILE: usize = 4;

/// Functional model of the matrix-multiply unit.
///
/// The unit keeps no tensor bounds: writes outside the staged buffers are dropped and reads
/// outside the result buffer return zero, exactly as the silicon behaves.
#[derive(Debug, Clone)]
pub struct CfuModel {
  hw_tile: usize,
  k: usize,
  m: usize,
  n: usize,
  // A: hw_tile x K, indexed i * K + t
  a_buf: Vec<Word>,
  // B: K x hw_tile, indexed t * N + j
  b_buf: Vec<Word>,
  // C: hw_tile x hw_tile, indexed i * N + j
  c_buf: Vec<Word>,
  counters: [u64; Funct::ALL.len()],
}

impl CfuModel {
  pub fn new() -> Self {
    Self::with_tile(DEFAULT_HW_TILE)
  }

  pub fn with_tile(hw_tile: usize) -> Self {
    assert!(hw_tile > 0, "hardware tile must be non-zero");
    Self {
      hw_tile,
      k: 0,
      m: 0,
      n: 0,
      a_buf: Vec::new(),
      b_buf: Vec::new(),
      c_buf: vec![0; hw_tile * hw_tile],
      counters: [0; Funct::ALL.len()],
    }
  }

  pub fn k(&self) -> usize {
    self.k
  }

  pub fn m(&self) -> usize {
    self.m
  }

  pub fn n(&self) -> usize {
    self.n
  }

  /// Instructions of kind `funct` executed since construction.
  pub fn count(&self, funct: Funct) -> u64 {
    self.counters[Self::slot(funct)]
  }

  /// True when the unit holds no tile parameters and no staged operands.
  pub fn is_idle(&self) -> bool {
    self.k == 0
      && self.m == 0
      && self.n == 0
      && self.a_buf.iter().all(|v| *v == 0)
      && self.b_buf.iter().all(|v| *v == 0)
      && self.c_buf.iter().all(|v| *v == 0)
  }

  /// Dispatch one instruction by raw function code.
  pub fn execute(&mut self, funct: u32, rs1: Word, rs2: Word) -> Word {
    match Funct::from_raw(funct) {
      Some(f) => self.op(f, rs1, rs2),
      None => {
        log::error!("CFU: encountered unknown instruction with funct: {}", funct);
        0
      },
    }
  }

  fn slot(funct: Funct) -> usize {
    Funct::ALL.iter().position(|f| *f == funct).unwrap_or(0)
  }

  fn reset(&mut self) {
    self.k = 0;
    self.m = 0;
    self.n = 0;
    self.a_buf.clear();
    self.b_buf.clear();
    self.c_buf.clear();
    self.c_buf.resize(self.hw_tile * self.hw_tile, 0);
    log::trace!("CFU: reset");
  }

  fn set_k(&mut self, k: Word) {
    self.k = k.max(0) as usize;
    self.a_buf.clear();
    self.a_buf.resize(self.hw_tile * self.k, 0);
    self.b_buf.clear();
    self.b_buf.resize(self.k * self.hw_tile, 0);
    log::trace!("CFU: K = {}", self.k);
  }

  fn clamp_extent(&self, name: &str, value: Word) -> usize {
    let value = value.max(0) as usize;
    if value > self.hw_tile {
      log::error!("CFU: {} = {} exceeds hardware tile {}, clamped", name, value, self.hw_tile);
      self.hw_tile
    } else {
      value
    }
  }

  fn write(buf: &mut [Word], name: &str, index: Word, value: Word) {
    match usize::try_from(index).ok().and_then(|i| buf.get_mut(i)) {
      Some(slot) => *slot = value,
      None => log::warn!("CFU: {} write at {} outside buffer of {}, dropped", name, index, buf.len()),
    }
  }

  fn start(&mut self) {
    let (k, m, n) = (self.k, self.m, self.n);
    for i in 0..m {
      for j in 0..n {
        let mut acc: Word = 0;
        for t in 0..k {
          acc = acc.wrapping_add(self.a_buf[i * k + t].wrapping_mul(self.b_buf[t * n + j]));
        }
        self.c_buf[i * n + j] = acc;
      }
    }
    log::trace!("CFU: start {}x{}x{}", m, k, n);
  }

  fn read(&self, lane: usize, index: Word) -> Word {
    let value = usize::try_from(index)
      .ok()
      .and_then(|i| self.c_buf.get(i).copied())
      .unwrap_or(0);
    log::trace!("CFU: read lane {} [{}] = {}", lane, index, value);
    value
  }
}

impl Default for CfuModel {
  fn default() -> Self {
    Self::new()
  }
}

impl CfuOp for CfuModel {
  fn op(&mut self, funct: Funct, rs1: Word, rs2: Word) -> Word {
    self.counters[Self::slot(funct)] += 1;

    match funct {
      Funct::Reset => self.reset(),
      Funct::SetK => self.set_k(rs1),
      Funct::SetM => self.m = self.clamp_extent("M", rs1),
      Funct::SetN => self.n = self.clamp_extent("N", rs1),
      Funct::WriteA => Self::write(&mut self.a_buf, "A", rs1, rs2),
      Funct::WriteB => Self::write(&mut self.b_buf, "B", rs1, rs2),
      Funct::Start => self.start(),
      Funct::ReadLane0 | Funct::ReadLane1 | Funct::ReadLane2 | Funct::ReadLane3 => {
        return self.read(funct.lane().unwrap_or(0), rs1);
      },
    }
    0
  }

  fn hw_tile(&self) -> usize {
    self.hw_tile
  }
}
