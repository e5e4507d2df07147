use color_eyre::eyre::{Result, WrapErr};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Targets, prelude::*};

/// Environment variable holding the log filter, e.g. `debug` or
/// `testwatch_core::sync=debug,info`.
pub const LOG_ENV: &str = "TESTWATCH_LOG";

/// Installs the stderr logger filtered by [`LOG_ENV`].
pub fn init() -> Result<()> {
    let level = std::env::var(LOG_ENV).unwrap_or_default();

    // An empty filter falls back to INFO.
    let targets = if level.is_empty() {
        Targets::new().with_default(LevelFilter::INFO)
    } else {
        level
            .parse()
            .wrap_err_with(|| format!("unable to parse {}", LOG_ENV))?
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(targets);

    tracing_subscriber::registry().with(layer).init();
    Ok(())
}
