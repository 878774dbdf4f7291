//! Tracing Subscriber Initialization
//!
//! One `EnvFilter` plus one fmt layer, JSON for machines or pretty for
//! terminals. `RUST_LOG` overrides the default directive.

use std::str::FromStr;

use mondial_core::{ConfigError, MondialResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(ConfigError::InvalidValue {
                field: "MONDIAL_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected json or pretty".to_string(),
            }),
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: "mondial_loader=info,mondial_storage=info,warn".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `MONDIAL_LOG_FORMAT`. An unparseable value is an error rather than
    /// a silent fallback.
    pub fn from_env() -> MondialResult<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("MONDIAL_LOG_FORMAT") {
            config.format = raw.parse()?;
        }
        Ok(config)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Install the global subscriber. Call once at startup; a second call fails.
pub fn init_tracing(config: &TelemetryConfig) -> MondialResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    installed.map_err(|e| ConfigError::InvalidValue {
        field: "tracing subscriber".to_string(),
        value: format!("{:?}", config.format),
        reason: e.to_string(),
    })?;

    tracing::info!(format = ?config.format, "Telemetry initialized");
    Ok(())
}
