/// Global logging configuration
use log::LevelFilter;

/// Install the `env_logger` backend. `RUST_LOG` overrides the default `info` filter.
pub fn init_log() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .format_timestamp(None)
    .format_target(false)
    .try_init();
}

/// Set logging enabled; quiet mode turns every record off
pub fn set_log(enabled: bool) {
  log::set_max_level(if enabled { LevelFilter::Trace } else { LevelFilter::Off });
}
