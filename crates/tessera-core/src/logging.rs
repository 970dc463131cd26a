//! Structured logging configuration for Tessera.
//!
//! All crates log through `tracing` under their crate name as target, so
//! verbosity can be raised for one stage of the pipeline (for example the
//! optimizer's pass log) without flooding the output with per-call runtime
//! traces. Hosts that do not install their own subscriber can call
//! [`init_logging`] once at startup. The `TESSERA_LOG` environment variable,
//! when set, replaces the configured filter with any `EnvFilter` directive
//! (for example `TESSERA_LOG=tessera_graph=debug`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter, TestWriter},
    layer::SubscriberExt,
    registry::Registry,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Environment variable holding a filter directive that overrides the config.
pub const LOG_ENV_VAR: &str = "TESSERA_LOG";

/// Verbosity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-layer execution traces.
    Trace,
    /// Pass summaries, workload creation.
    Debug,
    /// Network load and unload.
    Info,
    /// Failed inferences, ignored backend preferences.
    Warn,
    /// Internal invariant violations.
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A pipeline stage whose level can be set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Graph construction and validation.
    Core,
    /// Backend registry and workloads.
    Backends,
    /// The optimizer and its passes.
    Optimizer,
    /// Loading and inference.
    Runtime,
}

impl Component {
    /// `tracing` target the component logs under.
    pub fn target(self) -> &'static str {
        match self {
            Component::Core => "tessera_core",
            Component::Backends => "tessera_backends",
            Component::Optimizer => "tessera_graph",
            Component::Runtime => "tessera_runtime",
        }
    }
}

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable.
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Where events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogWriter {
    /// Standard error.
    Stderr,
    /// Standard output.
    Stdout,
    /// libtest's captured output, shown only for failing tests.
    Test,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for every target without its own entry.
    pub level: LogLevel,
    /// Per-component overrides.
    pub components: BTreeMap<Component, LogLevel>,
    /// Event format.
    pub format: LogFormat,
    /// Destination.
    pub writer: LogWriter,
    /// Prefix events with a timestamp.
    pub with_timestamps: bool,
    /// Tag events with the emitting thread's name. Inference runs on caller
    /// threads, so this tells concurrent networks apart.
    pub with_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            components: BTreeMap::new(),
            format: LogFormat::Compact,
            writer: LogWriter::Stderr,
            with_timestamps: true,
            with_thread_names: false,
        }
    }
}

impl LoggingConfig {
    /// Defaults: info and above, compact lines on stderr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Override the level of one component.
    #[must_use]
    pub fn with_component_level(mut self, component: Component, level: LogLevel) -> Self {
        self.components.insert(component, level);
        self
    }

    /// Set the event format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the destination.
    #[must_use]
    pub fn with_writer(mut self, writer: LogWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Enable or disable timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    /// Enable or disable thread names.
    #[must_use]
    pub fn with_thread_names(mut self, enable: bool) -> Self {
        self.with_thread_names = enable;
        self
    }

    /// Pass-level optimizer output and thread-tagged runtime events.
    pub fn development() -> Self {
        Self::new()
            .with_level(LogLevel::Info)
            .with_component_level(Component::Optimizer, LogLevel::Debug)
            .with_component_level(Component::Runtime, LogLevel::Debug)
            .with_format(LogFormat::Pretty)
            .with_thread_names(true)
    }

    /// JSON lines for log aggregation.
    pub fn production() -> Self {
        Self::new().with_format(LogFormat::Json)
    }

    /// Warnings only, routed through libtest's capture.
    pub fn test() -> Self {
        Self::new()
            .with_level(LogLevel::Warn)
            .with_writer(LogWriter::Test)
            .with_timestamps(false)
    }

    /// The `EnvFilter` directive this config stands for.
    pub fn directive(&self) -> String {
        let mut directive = self.level.as_str().to_string();
        for (component, level) in &self.components {
            let _ = write!(directive, ",{}={}", component.target(), level.as_str());
        }
        directive
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_new(self.directive()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    fn make_writer(&self) -> BoxMakeWriter {
        match self.writer {
            LogWriter::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogWriter::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogWriter::Test => BoxMakeWriter::new(TestWriter::new()),
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(self.make_writer())
            .with_thread_names(self.with_thread_names);

        match (self.format, self.with_timestamps) {
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
        }
    }
}

/// Install the global subscriber, failing if one is already set.
pub fn try_init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter())
        .try_init()
}

/// Install the global subscriber.
///
/// Call once at startup; later calls are ignored.
///
/// # Example
///
/// ```no_run
/// use tessera_core::logging::{init_logging, Component, LogLevel, LoggingConfig};
///
/// init_logging(&LoggingConfig::new().with_component_level(Component::Optimizer, LogLevel::Debug));
/// ```
pub fn init_logging(config: &LoggingConfig) {
    if let Err(err) = try_init_logging(config) {
        tracing::debug!("Logging already initialized: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_lists_component_overrides() {
        assert_eq!(LoggingConfig::default().directive(), "info");

        let config = LoggingConfig::new()
            .with_level(LogLevel::Warn)
            .with_component_level(Component::Runtime, LogLevel::Trace)
            .with_component_level(Component::Core, LogLevel::Error);
        assert_eq!(
            config.directive(),
            "warn,tessera_core=error,tessera_runtime=trace"
        );
        assert!(EnvFilter::try_new(config.directive()).is_ok());
    }

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert_eq!(dev.components.get(&Component::Optimizer), Some(&LogLevel::Debug));
        assert_eq!(dev.format, LogFormat::Pretty);
        assert!(dev.with_thread_names);

        assert_eq!(LoggingConfig::production().format, LogFormat::Json);

        let test = LoggingConfig::test();
        assert_eq!(test.writer, LogWriter::Test);
        assert_eq!(test.directive(), "warn");
    }

    #[test]
    fn test_logging_config_from_json() -> Result<(), serde_json::Error> {
        let config: LoggingConfig = serde_json::from_str(
            r#"{"level":"warn","components":{"optimizer":"debug"},"format":"json"}"#,
        )?;
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directive(), "warn,tessera_graph=debug");
        assert_eq!(config.writer, LogWriter::Stderr);
        Ok(())
    }

    #[test]
    fn test_second_init_is_rejected() {
        init_logging(&LoggingConfig::test());
        assert!(try_init_logging(&LoggingConfig::default()).is_err());
    }
}
