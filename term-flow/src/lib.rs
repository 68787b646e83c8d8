//! # term-flow - a data profiling job engine
//!
//! term-flow runs graphs of filters, transformers and analyzers over every row
//! of a dataset and collects a result per analyzer. Jobs are built once,
//! frozen, and executed any number of times; each execution gets fresh
//! component state.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use term_flow::prelude::*;
//! use term_flow::components::builtin::NumberAnalyzerResult;
//!
//! # async fn example() -> Result<()> {
//! let registry = ComponentRegistry::builtin();
//! let mut builder = JobBuilder::new("orders");
//! let amount = builder.add_source_column("amount");
//!
//! // only rows with an amount reach the analyzer
//! let present = builder.add_component(
//!     ComponentSpec::from_registry(registry, "null_check")?.with_input(&amount),
//! )?;
//! let stats = builder.add_component(
//!     ComponentSpec::from_registry(registry, "number")?
//!         .with_input(&amount)
//!         .requires(Requirement::Outcome(present.outcome("NOT_NULL"))),
//! )?;
//! let job = builder.build()?;
//!
//! let source = InMemoryRowSource::from_column("orders", "amount", vec![Some(10i64), None, Some(30)]);
//! let future = AnalysisRunner::default().run(&job, Arc::new(source))?;
//! future.wait().await;
//!
//! let result = future.result_for(stats.id())?;
//! let numbers = result.downcast::<NumberAnalyzerResult>().expect("number result");
//! assert_eq!(numbers.column("amount").and_then(|c| c.mean), Some(20.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`job`**: the component model. [`JobBuilder`](job::JobBuilder) validates
//!   and freezes a [`Job`](job::Job); requirements gate components on filter
//!   outcomes.
//! - **`components`**: the filter/transformer/analyzer contract, the
//!   component registry and the builtin components.
//! - **`engine`**: row-processing pipelines, the worker pool, output data
//!   streams feeding nested jobs, listeners and partitioned execution.
//! - **`result`**: analyzer results, [`AnalyzerResultFuture`](result::AnalyzerResultFuture),
//!   [`AnalysisResultFuture`](result::AnalysisResultFuture) and result reducers.
//! - **`sources`**: row sources, in memory or backed by DataFusion tables.
//!
//! ## Failure model
//!
//! Configuration errors are returned before any row is read. Errors raised
//! while processing rows are recorded on the execution and never stop other
//! rows; a recorded error or a cancellation makes the execution erroneous,
//! and its results are then only reachable through
//! [`result_map`](result::AnalysisResultFuture::result_map).

pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod prelude;
pub mod result;
pub mod sources;
