use cfu_conv::case::{load_case, run_case};
use cfu_conv::config::{load_default_config, EngineKind};
use cfu_conv::TensorShape;
use std::path::PathBuf;

fn case_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("cases").join(name)
}

#[test]
fn test_bundled_cases_match_reference() {
  let mut config = load_default_config().unwrap();
  config.run.verify = true;
  for name in ["same_3x3.toml", "grouped.toml"] {
    let case = load_case(&case_path(name)).unwrap();
    for engine in [EngineKind::Cfu, EngineKind::Scalar] {
      config.cfu.engine = engine;
      let report = run_case(&case, &config).unwrap();
      assert_eq!(report.verified, Some(true), "{} on {:?}", name, engine);
    }
  }
}

#[test]
fn test_grouped_case_shape_and_stats() {
  let config = load_default_config().unwrap();
  let case = load_case(&case_path("grouped.toml")).unwrap();
  let report = run_case(&case, &config).unwrap();
  assert_eq!(report.output_shape, TensorShape::new(1, 2, 2, 4));
  // Two groups of a 4x4x2 GEMM, one burst each.
  let stats = report.stats.unwrap();
  assert_eq!(stats.starts, 2);
  assert_eq!(stats.reads, 2 * 4 * 2);
}

#[test]
fn test_missing_case_file() {
  assert!(load_case(&case_path("no_such_case.toml")).is_err());
}
