use env_logger::Builder;
use log::LevelFilter;

use crate::config;

/// Initializes the process-wide logger from the config's log section.
/// `RUST_LOG` still wins when set; safe to call more than once.
pub fn init(config: &config::Log) {
    let _ = Builder::from_env(env_logger::Env::default())
        .filter(None, level_filter(&config.level))
        .try_init();
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
