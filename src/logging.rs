//! `tracing` subscriber setup for applications embedding the crate.
//!
//! The library itself only emits events; nothing is printed unless the host
//! installs a subscriber, either its own or the one built here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output style of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set (default: `info`)
    pub level: String,
    pub format: LogFormat,
    /// Include the module path of each event
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }
}

/// Installs the global subscriber.
///
/// Returns `false` when a global subscriber was already set; the existing
/// one stays in place.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_target(config.with_target))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(config.with_target))
            .try_init(),
    };
    result.is_ok()
}
