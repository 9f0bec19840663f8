use tracing_subscriber::EnvFilter;

/// Initialize tracing for the bridge.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used. Unknown levels
/// fall back to `info`.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init so tests can call this more than once
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
