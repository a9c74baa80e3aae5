//! Structured logging setup
//!
//! Text output by default, JSON when `LOG_FORMAT=json`. Filtering follows
//! `RUST_LOG` and falls back to `info`, e.g. `RUST_LOG=courier_comms=debug`.
//!
//! ```rust,ignore
//! courier_common::logging::init_logging("courier-dev");
//! tracing::info!(channel_id = %channel, priority = 1, "Listener client started");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are ignored; returns whether
/// this call installed it.
pub fn init_logging(service_name: &str) -> bool {
    let format = LogFormat::from_env();
    let registry = tracing_subscriber::registry().with(env_filter());

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(service = %service_name, format = ?format, "Logging initialized");
    }
    installed
}
