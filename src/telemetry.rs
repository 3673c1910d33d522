//! Logging setup for processes embedding the orchestrator
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the host. This module is the convenience for hosts that have none.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,ferry=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),

    /// The fallback filter directive does not parse
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// Directive as supplied
        filter: String,
        /// Parser message
        reason: String,
    },
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,

    /// Filter directive used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: true,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Human-readable output, for local runs and tests
    pub fn pretty() -> Self {
        Self {
            json: false,
            ..Default::default()
        }
    }

    /// Resolve the filter: `RUST_LOG` wins, then the configured default
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.default_filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global tracing subscriber
///
/// # Example
///
/// ```ignore
/// use ferry::telemetry::{init_tracing, TelemetryConfig};
///
/// init_tracing(TelemetryConfig::default())?;
/// ```
pub fn init_tracing(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = config.env_filter()?;

    let result = if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e: tracing_subscriber::util::TryInitError| {
        TelemetryError::SubscriberInit(e.to_string())
    })
}
