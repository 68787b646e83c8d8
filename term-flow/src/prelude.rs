//! Prelude for commonly used types and traits in term-flow.

pub use crate::components::{
    Analyzer, ComponentConfig, ComponentContext, ComponentDescriptor, ComponentRegistry, Filter,
    Transformer,
};
pub use crate::config::RunnerConfig;
pub use crate::engine::{AnalysisListener, AnalysisRunner, InputRow, PartitionedAnalysisRunner};
pub use crate::error::{ErrorContext, FlowError, Result};
pub use crate::job::{ComponentSpec, FilterOutcome, InputColumn, Job, JobBuilder, Requirement, Value};
pub use crate::logging::LogConfig;
pub use crate::result::{AnalysisResultFuture, AnalyzerResult, ResultHandle};
pub use crate::sources::{InMemoryRowSource, RowQuery, RowSource};
