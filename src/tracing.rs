use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set, so the binary logs at a sane level out of the box.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
