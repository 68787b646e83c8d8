//! Execution configuration.

use crate::error::{FlowError, Result};
use crate::logging::LogConfig;

/// Settings of an [`AnalysisRunner`](crate::engine::AnalysisRunner).
///
/// # Examples
///
/// ```rust
/// use term_flow::config::RunnerConfig;
///
/// let config = RunnerConfig::default()
///     .with_concurrency(4)
///     .with_progress_interval(500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of row tasks in flight
    pub concurrency: usize,
    /// Process rows inline on the producer, in source order
    pub single_threaded: bool,
    /// Rows between two progress callbacks
    pub progress_interval: u64,
    /// Cap on sampled rows per annotation
    pub max_sample_rows: usize,
    /// Cap on keys of the bounded collections given to components
    pub max_collection_entries: usize,
    /// Rows buffered per output data stream before its publisher waits
    pub stream_buffer_rows: usize,
    /// Push bounded-window filters into the source query
    pub query_optimization: bool,
    pub log: LogConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            single_threaded: false,
            progress_interval: 1000,
            max_sample_rows: 32,
            max_collection_entries: 10_000,
            stream_buffer_rows: 1024,
            query_optimization: true,
            log: LogConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// A single-threaded configuration, convenient for deterministic tests.
    pub fn single_threaded() -> Self {
        Self::default().with_single_threaded(true)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_single_threaded(mut self, single_threaded: bool) -> Self {
        self.single_threaded = single_threaded;
        self
    }

    pub fn with_progress_interval(mut self, rows: u64) -> Self {
        self.progress_interval = rows;
        self
    }

    pub fn with_max_sample_rows(mut self, rows: usize) -> Self {
        self.max_sample_rows = rows;
        self
    }

    pub fn with_max_collection_entries(mut self, entries: usize) -> Self {
        self.max_collection_entries = entries;
        self
    }

    pub fn with_stream_buffer_rows(mut self, rows: usize) -> Self {
        self.stream_buffer_rows = rows;
        self
    }

    pub fn with_query_optimization(mut self, enabled: bool) -> Self {
        self.query_optimization = enabled;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.single_threaded && self.concurrency == 0 {
            return Err(FlowError::configuration(
                "concurrency must be at least 1 in multi-threaded mode",
            ));
        }
        if self.progress_interval == 0 {
            return Err(FlowError::configuration("progress_interval must be at least 1"));
        }
        if self.stream_buffer_rows == 0 {
            return Err(FlowError::configuration("stream_buffer_rows must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunnerConfig::default();
        assert!(config.concurrency >= 1);
        assert!(!config.single_threaded);
        assert_eq!(config.progress_interval, 1000);
        assert_eq!(config.max_sample_rows, 32);
        assert_eq!(config.max_collection_entries, 10_000);
        assert_eq!(config.stream_buffer_rows, 1024);
        assert!(config.query_optimization);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_configuration_errors() {
        let zero = RunnerConfig::default().with_concurrency(0);
        assert!(zero.validate().unwrap_err().is_configuration());
        // concurrency is irrelevant when single threaded
        assert!(zero.with_single_threaded(true).validate().is_ok());

        let no_progress = RunnerConfig::single_threaded().with_progress_interval(0);
        assert!(no_progress.validate().is_err());

        let no_buffer = RunnerConfig::single_threaded().with_stream_buffer_rows(0);
        assert!(no_buffer.validate().unwrap_err().is_configuration());
    }
}
