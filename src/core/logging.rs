//! Logging initialization

/// Initialize the logging system with the `info` default filter
///
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// stagehold::core::logging::init();
/// log::info!("Loader started");
/// ```
pub fn init() {
    init_with("info");
}

/// Initialize env_logger with `default_filter` unless RUST_LOG is set.
///
/// Timestamps have millisecond precision. Returns `false` if a logger was
/// already installed.
pub fn init_with(default_filter: &str) -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
