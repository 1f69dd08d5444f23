//! One int8 conv layer described in TOML, run end to end through a configured engine.

use crate::arch::cfu::{Cfu, CfuModel, CfuStats};
use crate::config::{AppConfig, EngineKind};
use crate::error::{ConvError, Result};
use crate::kernel::conv::{conv_per_channel, conv_per_channel_packed_int4};
use crate::kernel::gemm::{MatMul, ScalarGemm, TiledGemm};
use crate::kernel::im2col::ConvScratch;
use crate::kernel::params::{ConvParams, Padding};
use crate::kernel::reference::conv_per_channel_i8;
use crate::quant::PerChannelQuantization;
use crate::tensor::TensorShape;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConvCase {
  #[serde(default)]
  pub name: String,
  pub input_shape: TensorShape,
  pub filter_shape: TensorShape,
  /// Derived from `padding` or the explicit pads when absent.
  #[serde(default)]
  pub output_shape: Option<TensorShape>,
  /// Overrides `params.pad_height`/`pad_width` when set.
  #[serde(default)]
  pub padding: Option<Padding>,
  #[serde(default)]
  pub params: ConvParams,
  pub input: Vec<i8>,
  /// Packed two weights per byte when `int4_filter` is set.
  pub filter: Vec<i8>,
  #[serde(default)]
  pub int4_filter: bool,
  #[serde(default)]
  pub bias: Option<Vec<i32>>,
  /// Identity rescale per channel when absent.
  #[serde(default)]
  pub quant: Option<PerChannelQuantization>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
  pub name: String,
  pub engine: EngineKind,
  pub tile: Option<usize>,
  pub output_shape: TensorShape,
  pub output: Vec<i8>,
  pub stats: Option<CfuStats>,
  /// Whether the output matched the direct reference, when checked.
  pub verified: Option<bool>,
}

pub fn load_case(path: &Path) -> io::Result<ConvCase> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("cannot read case file {:?}: {}", path, e)))?;
  parse_case(&content)
}

pub fn parse_case(content: &str) -> io::Result<ConvCase> {
  toml::from_str::<ConvCase>(content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to parse case: {}", e)))
}

impl ConvCase {
  /// Final params and output shape after resolving the padding scheme.
  pub fn resolve(&self) -> Result<(ConvParams, TensorShape)> {
    let mut params = self.params;
    let derived = match self.padding {
      Some(padding) => params.apply_padding(padding, &self.input_shape, &self.filter_shape)?,
      None => params.output_shape(&self.input_shape, &self.filter_shape)?,
    };
    let output_shape = self.output_shape.unwrap_or(derived);
    Ok((params, output_shape))
  }

  fn quant(&self) -> PerChannelQuantization {
    self
      .quant
      .clone()
      .unwrap_or_else(|| PerChannelQuantization::identity(self.filter_shape.batch))
  }

  fn run_with<E: MatMul>(
    &self,
    params: &ConvParams,
    quant: &PerChannelQuantization,
    output_shape: &TensorShape,
    output: &mut [i8],
    unpacked: &mut [i8],
    engine: &mut E,
  ) -> Result<()> {
    let mut scratch = ConvScratch::new();
    if self.int4_filter {
      conv_per_channel_packed_int4(
        params,
        quant,
        &self.input_shape,
        &self.input,
        &self.filter_shape,
        &self.filter,
        unpacked,
        self.bias.as_deref(),
        output_shape,
        output,
        engine,
        &mut scratch,
      )
    } else {
      unpacked.copy_from_slice(&self.filter);
      conv_per_channel(
        params,
        quant,
        &self.input_shape,
        &self.input,
        &self.filter_shape,
        &self.filter,
        self.bias.as_deref(),
        output_shape,
        output,
        engine,
        &mut scratch,
      )
    }
  }
}

/// Runs `case` on the engine selected by `config`, optionally checking against the reference.
pub fn run_case(case: &ConvCase, config: &AppConfig) -> Result<CaseReport> {
  let (params, output_shape) = case.resolve()?;
  let quant = case.quant();
  let mut output = vec![0i8; output_shape.flat_size()];
  let filter_len = if case.int4_filter {
    case.filter_shape.flat_size()
  } else {
    case.filter.len()
  };
  let mut unpacked = vec![0i8; filter_len];

  let (tile, stats) = match config.cfu.engine {
    EngineKind::Cfu => {
      if config.cfu.hw_tile == 0 {
        return Err(ConvError::Tile {
          tile: config.cfu.tile,
          hw_tile: 0,
        });
      }
      let cfu = Cfu::new(CfuModel::with_tile(config.cfu.hw_tile));
      let mut gemm = TiledGemm::with_tile(&cfu, config.cfu.tile)?;
      case.run_with(&params, &quant, &output_shape, &mut output, &mut unpacked, &mut gemm)?;
      (Some(gemm.tile()), Some(gemm.total_stats()))
    }
    EngineKind::Scalar => {
      case.run_with(&params, &quant, &output_shape, &mut output, &mut unpacked, &mut ScalarGemm)?;
      (None, None)
    }
  };

  let verified = if config.run.verify {
    let mut expected = vec![0i8; output_shape.flat_size()];
    conv_per_channel_i8(
      &params,
      &quant,
      &case.input_shape,
      &case.input,
      &case.filter_shape,
      &unpacked,
      case.bias.as_deref(),
      &output_shape,
      &mut expected,
    )?;
    let mismatches = expected.iter().zip(&output).filter(|(e, o)| e != o).count();
    if mismatches > 0 {
      log::error!("case {:?}: {} of {} outputs differ from reference", case.name, mismatches, expected.len());
    }
    Some(mismatches == 0)
  } else {
    None
  };

  Ok(CaseReport {
    name: case.name.clone(),
    engine: config.cfu.engine,
    tile,
    output_shape,
    output,
    stats,
    verified,
  })
}
