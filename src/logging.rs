//! Optional logging initialization helper.
//!
//! The compiler only emits `tracing` events. Hosts that already install a
//! subscriber do not need this.

#[cfg(feature = "napi")]
use napi_derive::napi;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "SVELTE_CSF_LOG";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub json_logs: bool,
    /// Directive used when neither `SVELTE_CSF_LOG` nor `RUST_LOG` is set.
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            default_filter: "warn".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(value) = std::env::var(LOG_ENV) {
        return EnvFilter::builder().parse_lossy(value);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter))
}

/// Install a global subscriber writing to stderr. Returns `false` when a
/// subscriber was already installed.
pub fn init_logging(config: LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(build_filter(&config));

    if config.json_logs {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).try_init().is_ok()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(fmt_layer).try_init().is_ok()
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn init_logging_native(json: Option<bool>) -> bool {
    init_logging(LoggingConfig::default().with_json_logs(json.unwrap_or(false)))
}
