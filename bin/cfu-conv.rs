use cfu_conv::case::{load_case, run_case, CaseReport};
use cfu_conv::config::{apply_cli_overrides, load_default_config, load_override_file, merge_config, EngineKind};
use cfu_conv::utils::log::{init_log, set_log};
use clap::Parser;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

/// cfu-conv - quantized conv2d through a matrix-multiply coprocessor
#[derive(Parser, Debug)]
#[command(name = "cfu-conv")]
#[command(version = "0.1.0")]
#[command(about = "Run an int8 conv layer on the CFU model", long_about = None)]
struct Args {
  /// Conv layer description (TOML)
  #[arg(long, value_name = "FILE")]
  case: PathBuf,

  /// Extra configuration file merged over config/default.toml
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// GEMM engine: cfu or scalar
  #[arg(short, long, value_name = "ENGINE")]
  engine: Option<String>,

  /// Tile width handed to the coprocessor
  #[arg(short, long)]
  tile: Option<usize>,

  /// Check the result against the direct reference kernel
  #[arg(long)]
  verify: bool,

  /// Print the report as JSON
  #[arg(long)]
  json: bool,

  /// Quiet mode (suppress log messages)
  #[arg(short, long)]
  quiet: bool,
}

fn print_report(report: &CaseReport) {
  let shape = report.output_shape.dims();
  println!("case: {}", if report.name.is_empty() { "<unnamed>" } else { &report.name });
  println!("output shape: {:?}", shape);
  let row = shape[2] * shape[3];
  for chunk in report.output.chunks(row.max(1)) {
    let line: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
    println!("  {}", line.join(" "));
  }
  if let Some(stats) = report.stats {
    println!(
      "cfu: tile {}, {} instructions ({} bursts, {} A writes, {} B writes, {} reads)",
      report.tile.unwrap_or(0),
      stats.instructions,
      stats.starts,
      stats.a_writes,
      stats.b_writes,
      stats.reads
    );
  }
  match report.verified {
    Some(true) => println!("reference: match"),
    Some(false) => println!("reference: MISMATCH"),
    None => {}
  }
}

fn main() -> std::io::Result<()> {
  init_log();

  let args = Args::parse();

  let engine = match args.engine.as_deref().map(|e| e.to_lowercase()) {
    None => None,
    Some(e) if e == "cfu" => Some(EngineKind::Cfu),
    Some(e) if e == "scalar" => Some(EngineKind::Scalar),
    Some(e) => {
      return Err(Error::new(ErrorKind::InvalidInput, format!("Unknown engine: {}", e)));
    }
  };

  let mut config = load_default_config()?;
  if let Some(path) = &args.config {
    config = merge_config(config, load_override_file(path)?);
  }
  apply_cli_overrides(&mut config, engine, args.tile, args.quiet, args.verify, args.json);

  if config.run.quiet {
    set_log(false);
  }

  let case = load_case(&args.case)?;
  let report = run_case(&case, &config).map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))?;
  log::info!(
    "{:?} engine finished case {:?}: {} outputs",
    report.engine,
    report.name,
    report.output.len()
  );

  if config.run.json {
    let text = serde_json::to_string_pretty(&report).map_err(|e| Error::new(ErrorKind::Other, e.to_string()))?;
    println!("{}", text);
  } else {
    print_report(&report);
  }

  if report.verified == Some(false) {
    return Err(Error::new(ErrorKind::Other, "output differs from reference"));
  }
  Ok(())
}
