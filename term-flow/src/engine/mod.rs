//! The job execution engine.
//!
//! An [`AnalysisRunner`] turns a frozen [`Job`](crate::job::Job) and a
//! [`RowSource`](crate::sources::RowSource) into one or more row-processing
//! pipelines:
//!
//! - a single producer reads the source and numbers the rows
//! - each row is one task, run inline or on a bounded pool of blocking
//!   workers, which pushes the row through every eligible component in
//!   dependency order
//! - components publishing to a consumed output data stream feed a nested
//!   pipeline, recursively
//!
//! Progress, results and errors are reported through [`AnalysisListener`]s
//! and collected on the returned
//! [`AnalysisResultFuture`](crate::result::AnalysisResultFuture).

mod consumer;
mod handler;
mod listener;
mod metrics;
mod optimizer;
mod output_stream;
mod partition;
mod publisher;
mod row;
mod runner;
pub(crate) mod state;
mod task_runner;

pub use handler::{ComponentError, ConsumeRowHandler, ConsumeRowResult};
pub use listener::{AnalysisListener, CompositeAnalysisListener, LoggingAnalysisListener};
pub use metrics::{AnalysisJobMetrics, ComponentMetrics, RowProcessingMetrics};
pub use output_stream::OutputRowCollector;
pub use partition::{PartitionedAnalysisRunner, PartitionedResults};
pub use row::InputRow;
pub use runner::AnalysisRunner;
