use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::LoggingInitError;

const DEFAULT_LOG_FILTER: &str = "bill_organizer=info";
const VERBOSE_LOG_FILTER: &str = "bill_organizer=debug";

pub struct LogConfig {
    pub verbose: bool,
}

/// Installs the global subscriber: stderr only, filtered by `RUST_LOG` when
/// set. `verbose` wins over both.
pub fn init_logging(config: LogConfig) -> Result<(), LoggingInitError> {
    let filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()?;
    Ok(())
}
