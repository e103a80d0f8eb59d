//! Structured logging setup.
//!
//! Library code only emits `tracing` events; the embedding process decides
//! whether and how to print them by calling [`init_logging`]. The filter is
//! taken from `TFMODEL_LOG` when set, then `RUST_LOG`, then the configured
//! level.

use tracing::Level;
use tracing_subscriber::{
    fmt::{
        self,
        format::FmtSpan,
        writer::{BoxMakeWriter, TestWriter},
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable consulted first for the log filter.
pub const LOG_ENV_VAR: &str = "TFMODEL_LOG";

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One human-readable line per event.
    #[default]
    Text,
    /// One JSON object per event, with the current span attached.
    Json,
}

/// Where rendered events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    /// Standard error.
    Stderr,
    /// libtest's captured output, so logs only show for failing tests.
    TestCapture,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level when no filter is given in the environment.
    pub level: Level,
    /// Text or JSON.
    pub format: LogFormat,
    /// Stderr or the test harness.
    pub target: LogTarget,
    /// Include thread names and ids. Load and run work happens on the
    /// blocking pool, so this shows which request ran where.
    pub with_threads: bool,
    /// Include file and line of each event.
    pub with_source_location: bool,
    /// Log when the bridge's spans close, with their busy time.
    pub with_span_timing: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            target: LogTarget::Stderr,
            with_threads: false,
            with_source_location: false,
            with_span_timing: false,
        }
    }
}

impl LoggingConfig {
    /// Info level text on stderr.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable thread names and ids.
    pub fn with_threads(mut self, enable: bool) -> Self {
        self.with_threads = enable;
        self
    }

    /// Enable or disable file and line.
    pub fn with_source_location(mut self, enable: bool) -> Self {
        self.with_source_location = enable;
        self
    }

    /// Enable or disable span close events.
    pub fn with_span_timing(mut self, enable: bool) -> Self {
        self.with_span_timing = enable;
        self
    }

    /// Debug level with threads, locations and span timing.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            with_threads: true,
            with_source_location: true,
            with_span_timing: true,
            ..Self::default()
        }
    }

    /// JSON lines at info level.
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            ..Self::default()
        }
    }

    /// Debug level into the test harness's captured output.
    pub fn testing() -> Self {
        Self {
            level: Level::DEBUG,
            target: LogTarget::TestCapture,
            with_threads: true,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::default().add_directive(self.level.into()))
    }

    fn writer(&self) -> BoxMakeWriter {
        match self.target {
            LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogTarget::TestCapture => BoxMakeWriter::new(TestWriter::default()),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.with_span_timing {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is kept. Safe to call from every test.
///
/// # Example
///
/// ```no_run
/// use tfmodel_core::logging::{init_logging, LoggingConfig};
///
/// init_logging(&LoggingConfig::development());
/// ```
pub fn init_logging(config: &LoggingConfig) -> bool {
    let layer = fmt::layer()
        .with_writer(config.writer())
        .with_span_events(config.span_events())
        .with_thread_ids(config.with_threads)
        .with_thread_names(config.with_threads)
        .with_file(config.with_source_location)
        .with_line_number(config.with_source_location);

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json().with_current_span(true)).try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert_eq!(dev.level, Level::DEBUG);
        assert!(dev.with_threads && dev.with_span_timing);
        assert_eq!(dev.format, LogFormat::Text);

        let prod = LoggingConfig::production();
        assert_eq!(prod.level, Level::INFO);
        assert_eq!(prod.format, LogFormat::Json);
        assert_eq!(prod.target, LogTarget::Stderr);

        assert_eq!(LoggingConfig::testing().target, LogTarget::TestCapture);
    }

    #[test]
    fn test_span_timing_selects_close_events() {
        assert_eq!(LoggingConfig::new().span_events(), FmtSpan::NONE);
        assert_eq!(
            LoggingConfig::new().with_span_timing(true).span_events(),
            FmtSpan::CLOSE
        );
    }

    #[test]
    fn test_second_init_keeps_first_subscriber() {
        init_logging(&LoggingConfig::testing());
        assert!(!init_logging(&LoggingConfig::production()));
        tracing::debug!("logged through the test writer");
    }
}
