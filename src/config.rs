use crate::arch::cfu::DEFAULT_HW_TILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Which GEMM engine runs the unrolled convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
  Cfu,
  Scalar,
}

/// Coprocessor section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CfuSection {
  #[serde(default = "default_engine")]
  pub engine: EngineKind,
  /// M/N capacity of the hardware
  #[serde(default = "default_hw_tile")]
  pub hw_tile: usize,
  /// Tile width used by the dispatcher, at most `hw_tile`
  #[serde(default = "default_hw_tile")]
  pub tile: usize,
}

fn default_engine() -> EngineKind {
  EngineKind::Cfu
}

fn default_hw_tile() -> usize {
  DEFAULT_HW_TILE
}

impl Default for CfuSection {
  fn default() -> Self {
    Self {
      engine: default_engine(),
      hw_tile: default_hw_tile(),
      tile: default_hw_tile(),
    }
  }
}

/// Run section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunSection {
  #[serde(default)]
  pub quiet: bool,
  /// Cross-check the output against the direct reference kernel
  #[serde(default)]
  pub verify: bool,
  /// Print the report as JSON
  #[serde(default)]
  pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub cfu: CfuSection,
  #[serde(default)]
  pub run: RunSection,
}

/// Fields an extra config file sets explicitly; absent fields keep the base value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverride {
  #[serde(default)]
  pub cfu: CfuOverride,
  #[serde(default)]
  pub run: RunOverride,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CfuOverride {
  pub engine: Option<EngineKind>,
  pub hw_tile: Option<usize>,
  pub tile: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunOverride {
  pub quiet: Option<bool>,
  pub verify: Option<bool>,
  pub json: Option<bool>,
}

/// Loads `config/default.toml` next to the manifest.
pub fn load_default_config() -> io::Result<AppConfig> {
  let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  load_config_file(&manifest_dir.join("config").join("default.toml"))
}

pub fn load_config_file(path: &Path) -> io::Result<AppConfig> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("cannot read config file {:?}: {}", path, e)))?;
  parse_config(&content)
}

pub fn parse_config(content: &str) -> io::Result<AppConfig> {
  toml::from_str::<AppConfig>(content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to parse TOML config: {}", e)))
}

pub fn load_override_file(path: &Path) -> io::Result<ConfigOverride> {
  let content = fs::read_to_string(path)
    .map_err(|e| io::Error::new(io::ErrorKind::NotFound, format!("cannot read config file {:?}: {}", path, e)))?;
  parse_override(&content)
}

pub fn parse_override(content: &str) -> io::Result<ConfigOverride> {
  toml::from_str::<ConfigOverride>(content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("failed to parse TOML config: {}", e)))
}

/// Every field the override file sets replaces the base value.
pub fn merge_config(mut base: AppConfig, over: ConfigOverride) -> AppConfig {
  if let Some(engine) = over.cfu.engine {
    base.cfu.engine = engine;
  }
  if let Some(hw_tile) = over.cfu.hw_tile {
    base.cfu.hw_tile = hw_tile;
  }
  if let Some(tile) = over.cfu.tile {
    base.cfu.tile = tile;
  }

  if let Some(quiet) = over.run.quiet {
    base.run.quiet = quiet;
  }
  if let Some(verify) = over.run.verify {
    base.run.verify = verify;
  }
  if let Some(json) = over.run.json {
    base.run.json = json;
  }

  base
}

/// Apply command line flags on top of the loaded configuration
pub fn apply_cli_overrides(
  config: &mut AppConfig,
  engine: Option<EngineKind>,
  tile: Option<usize>,
  quiet: bool,
  verify: bool,
  json: bool,
) {
  if let Some(engine) = engine {
    config.cfu.engine = engine;
  }
  if let Some(tile) = tile {
    config.cfu.tile = tile;
  }
  if quiet {
    config.run.quiet = true;
  }
  if verify {
    config.run.verify = true;
  }
  if json {
    config.run.json = true;
  }
}
