use log::LevelFilter;

use crate::config::LogLevel;

/// Install the `env_logger` backend.
///
/// Messages from this crate pass the backend untouched and are gated by
/// `log::set_max_level`, so a reload can change verbosity at runtime.
/// Dependencies are held at `warn`. `RUST_LOG` directives still apply.
pub fn init() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    apply(LogLevel::default());
}

/// Apply the configured verbosity. Skipped when `RUST_LOG` is set.
pub fn apply(level: LogLevel) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    log::set_max_level(level.level_filter());
}
