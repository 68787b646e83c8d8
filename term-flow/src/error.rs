//! Error types for the term-flow job engine.
//!
//! All errors in the crate are represented by the [`FlowError`] enum. Errors are
//! cloneable so that a single failure can be recorded in the error list of a run
//! and handed to listeners at the same time.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::job::ComponentId;

/// The main error type for term-flow.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum FlowError {
    /// The job or a component is misconfigured. Raised before any row is read.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A component refers to a column that does not exist in its job.
    #[error("Column '{column}' not found in job '{job}'")]
    ColumnNotFound { job: String, column: String },

    /// A component type id is not present in the registry.
    #[error("Component type '{0}' is not registered")]
    ComponentNotFound(String),

    /// A component failed while processing a row or producing its result.
    #[error("Component '{component}' failed: {message}")]
    ComponentFailure { component: String, message: String },

    /// Work was skipped because an earlier failure poisoned the pipeline it belongs to.
    #[error("Previous errors exist in the processing pipeline")]
    PreviousErrorsExist,

    /// The run was cancelled before it completed.
    #[error("Analysis was cancelled")]
    Cancelled,

    /// Results were requested from a run that recorded errors or was cancelled.
    #[error("Analysis is erroneous ({errors} recorded errors)")]
    Errornous { errors: usize },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reading rows from a source failed.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Partial results could not be merged.
    #[error("Reduction failed: {0}")]
    Reduction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A wait exceeded its deadline.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, FlowError>`.
pub type Result<T> = std::result::Result<T, FlowError>;

impl FlowError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a component failure attributed to the named component.
    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ComponentFailure {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a data source error.
    pub fn data_source(msg: impl Into<String>) -> Self {
        Self::DataSource(msg.into())
    }

    /// Creates a reduction error.
    pub fn reduction(msg: impl Into<String>) -> Self {
        Self::Reduction(msg.into())
    }

    /// Creates an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for errors raised before execution started.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ColumnNotFound { .. } | Self::ComponentNotFound(_)
        )
    }
}

impl From<datafusion::error::DataFusionError> for FlowError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        Self::DataSource(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for FlowError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::DataSource(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// An error captured during a run, attributed to the job and component that raised it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedError {
    /// Name of the (sub-)job whose pipeline recorded the error.
    pub job: String,
    /// Component the error is attributed to, if any.
    pub component: Option<ComponentId>,
    /// Display name of that component.
    pub component_name: Option<String>,
    /// Physical id of the row being processed, for row-level failures.
    pub row_id: Option<u64>,
    pub error: FlowError,
}

impl RecordedError {
    pub fn new(job: impl Into<String>, error: FlowError) -> Self {
        Self {
            job: job.into(),
            component: None,
            component_name: None,
            row_id: None,
            error,
        }
    }

    pub fn with_component(mut self, id: ComponentId, name: impl Into<String>) -> Self {
        self.component = Some(id);
        self.component_name = Some(name.into());
        self
    }

    pub fn with_row(mut self, row_id: u64) -> Self {
        self.row_id = Some(row_id);
        self
    }

    fn sort_key(&self) -> (&str, Option<ComponentId>, Option<u64>, String) {
        (
            self.job.as_str(),
            self.component,
            self.row_id,
            self.error.to_string(),
        )
    }
}

impl Eq for RecordedError {}

impl PartialOrd for RecordedError {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordedError {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.job)?;
        if let Some(name) = &self.component_name {
            write!(f, " {name}")?;
        }
        if let Some(row) = self.row_id {
            write!(f, " (row {row})")?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<FlowError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| wrap(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(&f(), e.into()))
    }
}

fn wrap(msg: &str, error: FlowError) -> FlowError {
    match error {
        FlowError::Configuration(inner) => FlowError::Configuration(format!("{msg}: {inner}")),
        FlowError::Internal(inner) => FlowError::Internal(format!("{msg}: {inner}")),
        other => FlowError::Internal(format!("{msg}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_failure_display() {
        let err = FlowError::component("value distribution", "boom");
        assert_eq!(err.to_string(), "Component 'value distribution' failed: boom");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(FlowError::configuration("bad").is_configuration());
        assert!(FlowError::ComponentNotFound("x".to_string()).is_configuration());
        assert!(!FlowError::Cancelled.is_configuration());
        assert!(!FlowError::PreviousErrorsExist.is_configuration());
    }

    #[test]
    fn test_recorded_errors_sort_deterministically() {
        let a = RecordedError::new("job", FlowError::internal("b"))
            .with_component(ComponentId::new(2), "two")
            .with_row(7);
        let b = RecordedError::new("job", FlowError::internal("a"))
            .with_component(ComponentId::new(1), "one")
            .with_row(9);
        let c = RecordedError::new("job", FlowError::internal("a"))
            .with_component(ComponentId::new(2), "two")
            .with_row(3);

        let mut errors = vec![a.clone(), b.clone(), c.clone()];
        errors.sort();
        assert_eq!(errors, vec![b, c, a]);
    }

    #[test]
    fn test_error_context() {
        fn failing() -> Result<()> {
            Err(FlowError::configuration("missing key"))
        }

        let err = failing().context("building job").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: building job: missing key"
        );

        let err = Err::<(), _>(FlowError::Cancelled)
            .with_context(|| "waiting".to_string())
            .unwrap_err();
        assert_eq!(err.to_string(), "Internal error: waiting: Analysis was cancelled");
    }
}
