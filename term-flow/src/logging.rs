//! Logging configuration and helpers for term-flow.
//!
//! The engine logs through `tracing`. [`LogConfig`] decides which execution
//! events are worth emitting: per-row events are off by default because they
//! dominate the cost of small components, pipeline and component events are
//! cheap and on.

use tracing::Level;

/// Which engine events are logged, and how verbosely.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Most detailed level used for progress and other chatty events.
    pub level: Level,
    /// One trace event per processed row.
    pub row_events: bool,
    /// Component begin/success events, with a rendering of each result.
    pub component_events: bool,
    /// Row-processing begin/finish events with expected and processed rows.
    pub pipeline_events: bool,
    /// Rendered results longer than this are cut.
    pub max_result_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl LogConfig {
    /// Pipeline and component events, no per-row events.
    pub fn balanced() -> Self {
        Self {
            level: Level::INFO,
            row_events: false,
            component_events: true,
            pipeline_events: true,
            max_result_length: 256,
        }
    }

    /// Every event, including one per row. Meant for debugging small jobs.
    pub fn verbose() -> Self {
        Self {
            level: Level::TRACE,
            row_events: true,
            component_events: true,
            pipeline_events: true,
            max_result_length: 4096,
        }
    }

    /// Job outcomes and errors only.
    pub fn production() -> Self {
        Self {
            level: Level::WARN,
            row_events: false,
            component_events: false,
            pipeline_events: false,
            max_result_length: 128,
        }
    }

    pub fn with_row_events(mut self, enabled: bool) -> Self {
        self.row_events = enabled;
        self
    }

    /// True when events at `level` pass the configured detail.
    pub fn allows(&self, level: Level) -> bool {
        level <= self.level
    }
}

/// Debug event emitted only when the config allows `DEBUG` detail; arguments
/// are not evaluated otherwise.
#[macro_export]
macro_rules! perf_debug {
    ($config:expr, $($arg:tt)*) => {
        if $config.allows(tracing::Level::DEBUG) {
            tracing::debug!($($arg)*);
        }
    };
}

/// Per-row trace event, gated by `row_events`.
#[macro_export]
macro_rules! log_row {
    ($config:expr, $($arg:tt)*) => {
        if $config.row_events {
            tracing::trace!($($arg)*);
        }
    };
}

/// Component lifecycle event, gated by `component_events`.
#[macro_export]
macro_rules! log_lifecycle {
    ($config:expr, $($arg:tt)*) => {
        if $config.component_events {
            tracing::debug!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes without splitting a character,
/// noting how much was dropped.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let end = value
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_length)
        .last()
        .unwrap_or(0);
    format!("{} [+{} bytes]", &value[..end], value.len() - end)
}

/// Subscriber setup for applications embedding the engine.
pub mod setup {
    use crate::error::{FlowError, Result};

    /// Filter directives and output format of the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// `EnvFilter` directives, joined with commas.
        pub directives: Vec<String>,
        pub json_format: bool,
        /// Include the event target (module path) in each line.
        pub with_target: bool,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                directives: vec!["info".to_string(), "term_flow=debug".to_string()],
                json_format: false,
                with_target: true,
            }
        }
    }

    impl LoggingConfig {
        /// JSON lines, engine events from `INFO` up.
        pub fn production() -> Self {
            Self {
                directives: vec!["warn".to_string(), "term_flow=info".to_string()],
                json_format: true,
                with_target: false,
            }
        }

        pub fn development() -> Self {
            Self {
                directives: vec!["debug".to_string(), "term_flow=trace".to_string()],
                ..Self::default()
            }
        }

        pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
            self.directives.push(directive.into());
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn env_filter(&self) -> String {
            self.directives.join(",")
        }
    }

    /// Installs the global `tracing` subscriber.
    ///
    /// `RUST_LOG`, when set, replaces the configured directives. Invalid
    /// directives and an already installed subscriber are configuration errors.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use term_flow::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let filter = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
            _ => EnvFilter::try_new(config.env_filter()),
        }
        .map_err(|e| FlowError::configuration(format!("Invalid log directives: {e}")))?;

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(config.with_target)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(config.with_target)
                .boxed()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| FlowError::configuration(format!("Logging already initialized: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default(), LogConfig::balanced());
        assert!(!LogConfig::default().row_events);
        assert!(LogConfig::verbose().allows(Level::TRACE));
        assert!(LogConfig::production().allows(Level::ERROR));
        assert!(!LogConfig::production().allows(Level::INFO));
        assert!(!LogConfig::production().component_events);
        assert!(LogConfig::production().with_row_events(true).row_events);
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("short", 10), "short");
        assert_eq!(truncate_field("abcdefghij", 4), "abcd [+6 bytes]");
        // 'é' is two bytes, the cut falls back to the character start
        assert_eq!(truncate_field("ééé", 3), "é [+4 bytes]");
    }

    #[test]
    fn test_env_filter_directives() {
        let config = setup::LoggingConfig::default();
        assert_eq!(config.env_filter(), "info,term_flow=debug");
        let extended = config.with_directive("datafusion=warn");
        assert_eq!(extended.env_filter(), "info,term_flow=debug,datafusion=warn");
    }
}
