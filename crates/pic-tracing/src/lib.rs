//! Shared tracing configuration for the PIC device runtime crates.
//!
//! Binaries, integration tests and benchmarks install their `tracing`
//! subscriber through this crate so every entry point formats the
//! dispatch, transfer and residency events the same way.
//!
//! ```rust
//! use pic_tracing::{build_subscriber, TracingConfig, TracingProfile};
//!
//! let config = TracingConfig::for_profile(TracingProfile::Ci);
//! let subscriber = build_subscriber(&config).unwrap();
//! pic_tracing::tracing::subscriber::with_default(subscriber, || {
//!     pic_tracing::info!(devices = 2, "executor_created");
//! });
//! ```

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;
use std::str::FromStr;

pub use tracing;
pub use tracing::{debug, error, info, trace, warn};

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

const DEFAULT_DIRECTIVE: &str = "info";
const PERFORMANCE_DIRECTIVES: &str = "pic_backends=debug,pic_core=debug,info";

/// Named presets selected with `PIC_TRACING_PROFILE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingProfile {
    /// Pretty, coloured output; perf spans on in debug builds.
    #[default]
    Local,
    /// JSON without colour codes, for log collection.
    Ci,
    /// JSON with debug directives for the dispatch crates and span close
    /// events.
    Performance,
}

impl FromStr for TracingProfile {
    type Err = TracingSetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "ci" => Ok(Self::Ci),
            "performance" | "perf" => Ok(Self::Performance),
            other => Err(TracingSetupError::UnknownProfile(other.to_string())),
        }
    }
}

/// Output format of the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl FromStr for TracingOutput {
    type Err = TracingSetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TracingSetupError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    #[error("unknown tracing profile '{0}'")]
    UnknownProfile(String),

    #[error("unknown tracing format '{0}'")]
    UnknownFormat(String),

    /// Usually means a global subscriber is already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// How the shared subscriber filters and formats events.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives such as `pic_core=debug,info`. `None` defers to
    /// `RUST_LOG`, then to `info`.
    pub directives: Option<String>,
    pub include_targets: bool,
    pub ansi: bool,
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Gates [`performance::PerformanceSpan`] logging.
    pub enable_performance_tracing: bool,
    /// Spans faster than this are not logged.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_profile(TracingProfile::Local)
    }
}

impl TracingConfig {
    pub fn for_profile(profile: TracingProfile) -> Self {
        let base = Self {
            directives: None,
            include_targets: true,
            ansi: false,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Json,
            enable_performance_tracing: false,
            performance_threshold_us: None,
        };
        match profile {
            TracingProfile::Local => Self {
                ansi: true,
                output: TracingOutput::Pretty,
                enable_performance_tracing: cfg!(debug_assertions),
                ..base
            },
            TracingProfile::Ci => base,
            TracingProfile::Performance => Self {
                directives: Some(PERFORMANCE_DIRECTIVES.to_string()),
                span_events: FmtSpan::CLOSE,
                enable_performance_tracing: true,
                ..base
            },
        }
    }

    /// Build a configuration from the environment.
    ///
    /// | variable | effect |
    /// |---|---|
    /// | `PIC_TRACING_PROFILE` | `local` (default), `ci`, `performance` |
    /// | `PIC_TRACING_DIRECTIVES` | filter directives |
    /// | `PIC_TRACING_FORMAT` | `pretty`, `compact`, `json` |
    /// | `PIC_PERF_TRACING` | `true`/`1`/`yes` enables perf spans |
    /// | `PIC_PERF_THRESHOLD_US` | minimum logged span duration |
    ///
    /// Unparseable values are ignored and the profile's setting is kept.
    pub fn from_env() -> Self {
        let profile = env_value("PIC_TRACING_PROFILE")
            .and_then(|p| p.parse().ok())
            .unwrap_or_default();
        let mut config = Self::for_profile(profile);

        if let Some(directives) = env_value("PIC_TRACING_DIRECTIVES") {
            config.directives = Some(directives);
        }
        if let Some(output) = env_value("PIC_TRACING_FORMAT").and_then(|f| f.parse().ok()) {
            config.output = output;
            config.ansi &= output != TracingOutput::Json;
        }
        if let Some(flag) = env_value("PIC_PERF_TRACING") {
            config.enable_performance_tracing = matches!(flag.to_ascii_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(threshold) = env_value("PIC_PERF_THRESHOLD_US").and_then(|t| t.parse().ok()) {
            config.performance_threshold_us = Some(threshold);
        }
        config
    }

    fn filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = tracing_fmt::layer()
            .with_target(self.include_targets)
            .with_span_events(self.span_events.clone());
        match self.output {
            TracingOutput::Compact => Box::new(layer.compact().with_ansi(self.ansi)),
            TracingOutput::Pretty => Box::new(layer.pretty().with_ansi(self.ansi)),
            TracingOutput::Json => Box::new(layer.json().with_ansi(false)),
        }
    }
}

/// Non-empty, trimmed value of an environment variable.
fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Build a subscriber without installing it.
///
/// Also applies the performance span settings process-wide.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.filter()?;
    performance::configure(config.enable_performance_tracing, config.performance_threshold_us);
    Ok(Registry::default().with(config.fmt_layer()).with(filter))
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?.try_init()?;
    Ok(())
}
