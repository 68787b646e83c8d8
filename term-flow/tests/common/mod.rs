//! Shared test components and helpers for the integration tests.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use term_flow::components::{ComponentRegistry, OutputArity};
use term_flow::engine::{AnalysisJobMetrics, OutputRowCollector, RowProcessingMetrics};
use term_flow::error::RecordedError;
use term_flow::job::{ComponentDefinition, ComponentId};
use term_flow::prelude::*;
use term_flow::result::{AnalyzerResultFuture, MetricValue};

/// Categorizes rows as `ODD` or `EVEN` by physical row id.
pub struct EvenOddFilter;

impl Filter for EvenOddFilter {
    fn categorize(&self, row: &InputRow) -> Result<String> {
        Ok(if row.id() % 2 == 0 { "EVEN" } else { "ODD" }.to_string())
    }
}

/// Prefixes its single input with `mocked: `.
pub struct MockTransformer {
    input: InputColumn,
}

impl Transformer for MockTransformer {
    fn transform(&self, row: &InputRow) -> Result<Vec<Value>> {
        let value = match row.get(self.input.id) {
            Value::Null => Value::Null,
            other => Value::Text(format!("mocked: {}", other.to_key().unwrap_or_default())),
        };
        Ok(vec![value])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectedRow {
    pub id: u64,
    pub number: u64,
    pub values: Vec<Value>,
}

/// Every row an analyzer saw, sorted by row id.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedRows {
    pub rows: Vec<CollectedRow>,
}

impl CollectedRows {
    pub fn ids(&self) -> Vec<u64> {
        self.rows.iter().map(|r| r.id).collect()
    }

    pub fn numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.rows.iter().map(|r| r.number).collect();
        numbers.sort_unstable();
        numbers
    }
}

impl AnalyzerResult for CollectedRows {
    fn metrics(&self) -> BTreeMap<String, MetricValue> {
        BTreeMap::from([("rows".to_string(), MetricValue::from(self.rows.len() as u64))])
    }
}

/// Records the input values of every row it is invoked for.
pub struct CollectingAnalyzer {
    inputs: Vec<InputColumn>,
    rows: Mutex<Vec<CollectedRow>>,
}

impl Analyzer for CollectingAnalyzer {
    fn run(&self, row: &InputRow, _weight: u64) -> Result<()> {
        self.rows.lock().push(CollectedRow {
            id: row.id(),
            number: row.number(),
            values: row.values_of(&self.inputs),
        });
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        let mut rows = self.rows.lock().clone();
        rows.sort_by_key(|r| r.id);
        Ok(ResultHandle::immediate(CollectedRows { rows }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowCount(pub u64);

impl AnalyzerResult for RowCount {
    fn metrics(&self) -> BTreeMap<String, MetricValue> {
        BTreeMap::from([("count".to_string(), MetricValue::from(self.0))])
    }
}

/// Counts rows and hands its result out as a future resolved after a delay.
pub struct FutureAnalyzer {
    count: Arc<AtomicU64>,
    delay: Duration,
}

impl Analyzer for FutureAnalyzer {
    fn run(&self, _row: &InputRow, weight: u64) -> Result<()> {
        self.count.fetch_add(weight, Ordering::SeqCst);
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        let count = Arc::clone(&self.count);
        let delay = self.delay;
        Ok(ResultHandle::Future(AnalyzerResultFuture::spawn(async move {
            tokio::time::sleep(delay).await;
            Ok(Arc::new(RowCount(count.load(Ordering::SeqCst))) as Arc<dyn AnalyzerResult>)
        })))
    }
}

/// Sleeps on every row.
pub struct SlowAnalyzer {
    delay: Duration,
    count: AtomicU64,
}

impl Analyzer for SlowAnalyzer {
    fn run(&self, _row: &InputRow, _weight: u64) -> Result<()> {
        std::thread::sleep(self.delay);
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        Ok(ResultHandle::immediate(RowCount(self.count.load(Ordering::SeqCst))))
    }
}

/// Fails on every row whose id is a multiple of `fail_every`.
pub struct FailingAnalyzer {
    fail_every: u64,
    count: AtomicU64,
}

impl Analyzer for FailingAnalyzer {
    fn run(&self, row: &InputRow, _weight: u64) -> Result<()> {
        if row.id() % self.fail_every == 0 {
            return Err(FlowError::component("failing", format!("row {} rejected", row.id())));
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        Ok(ResultHandle::immediate(RowCount(self.count.load(Ordering::SeqCst))))
    }
}

/// Fails on every row whose id is a multiple of `fail_every`, passes its
/// input through otherwise.
pub struct FailingTransformer {
    input: InputColumn,
    fail_every: u64,
}

impl Transformer for FailingTransformer {
    fn transform(&self, row: &InputRow) -> Result<Vec<Value>> {
        if row.id() % self.fail_every == 0 {
            return Err(FlowError::component("failing_transformer", format!("row {} rejected", row.id())));
        }
        Ok(vec![row.get(self.input.id).clone()])
    }
}

/// Panics on the row with id `panic_at`, passes values through otherwise.
pub struct PanickingTransformer {
    input: InputColumn,
    panic_at: u64,
}

impl Transformer for PanickingTransformer {
    fn transform(&self, row: &InputRow) -> Result<Vec<Value>> {
        if row.id() == self.panic_at {
            panic!("boom at row {}", row.id());
        }
        Ok(vec![row.get(self.input.id).clone()])
    }
}

pub const KEPT_STREAM: &str = "kept";

/// Counts its rows and republishes all of them except every third one,
/// starting with row number 4.
pub struct DropThirdAnalyzer {
    inputs: Vec<InputColumn>,
    stream: Option<Arc<OutputRowCollector>>,
    count: AtomicU64,
}

impl Analyzer for DropThirdAnalyzer {
    fn run(&self, row: &InputRow, _weight: u64) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let dropped = row.number() > 1 && row.number() % 3 == 1;
        if let (Some(stream), false) = (&self.stream, dropped) {
            stream.push(row.values_of(&self.inputs))?;
        }
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        Ok(ResultHandle::immediate(RowCount(self.count.load(Ordering::SeqCst))))
    }
}

pub const TRIPLED_STREAM: &str = "tripled";

/// Republishes every row with three times its weight.
pub struct TriplingAnalyzer {
    inputs: Vec<InputColumn>,
    stream: Option<Arc<OutputRowCollector>>,
    count: AtomicU64,
}

impl Analyzer for TriplingAnalyzer {
    fn run(&self, row: &InputRow, weight: u64) -> Result<()> {
        self.count.fetch_add(weight, Ordering::SeqCst);
        if let Some(stream) = &self.stream {
            stream.push_weighted(row.values_of(&self.inputs), weight * 3)?;
        }
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        Ok(ResultHandle::immediate(RowCount(self.count.load(Ordering::SeqCst))))
    }
}

/// The builtin components plus the mocks above.
pub fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins();
    let descriptors = vec![
        ComponentDescriptor::filter("even_odd", &["EVEN", "ODD"], |_, _| Ok(EvenOddFilter)).with_inputs(0, None),
        ComponentDescriptor::transformer("mock_transformer", OutputArity::Fixed(1), |_, ctx| {
            Ok(MockTransformer {
                input: ctx.inputs()[0].clone(),
            })
        })
        .with_inputs(1, Some(1)),
        ComponentDescriptor::analyzer("collect", |_, ctx| {
            Ok(CollectingAnalyzer {
                inputs: ctx.inputs().to_vec(),
                rows: Mutex::new(Vec::new()),
            })
        })
        .with_inputs(0, None),
        ComponentDescriptor::analyzer("future_count", |config, _| {
            Ok(FutureAnalyzer {
                count: Arc::new(AtomicU64::new(0)),
                delay: Duration::from_millis(config.u64_or("delay_ms", 50)?),
            })
        })
        .with_inputs(0, None),
        ComponentDescriptor::analyzer("slow", |config, _| {
            Ok(SlowAnalyzer {
                delay: Duration::from_millis(config.u64_or("delay_ms", 5)?),
                count: AtomicU64::new(0),
            })
        })
        .with_inputs(0, None),
        ComponentDescriptor::analyzer("failing", |config, _| {
            Ok(FailingAnalyzer {
                fail_every: config.u64_or("fail_every", 2)?.max(1),
                count: AtomicU64::new(0),
            })
        })
        .with_inputs(0, None),
        ComponentDescriptor::transformer("failing_transformer", OutputArity::Fixed(1), |config, ctx| {
            Ok(FailingTransformer {
                input: ctx.inputs()[0].clone(),
                fail_every: config.u64_or("fail_every", 2)?.max(1),
            })
        })
        .with_inputs(1, Some(1)),
        ComponentDescriptor::transformer("panicking", OutputArity::Fixed(1), |config, ctx| {
            Ok(PanickingTransformer {
                input: ctx.inputs()[0].clone(),
                panic_at: config.u64_or("panic_at", 1)?,
            })
        })
        .with_inputs(1, Some(1)),
        ComponentDescriptor::analyzer("drop_third", |_, ctx| {
            Ok(DropThirdAnalyzer {
                inputs: ctx.inputs().to_vec(),
                stream: ctx.output_stream(KEPT_STREAM),
                count: AtomicU64::new(0),
            })
        })
        .with_output_streams(&[KEPT_STREAM]),
        ComponentDescriptor::analyzer("triple", |_, ctx| {
            Ok(TriplingAnalyzer {
                inputs: ctx.inputs().to_vec(),
                stream: ctx.output_stream(TRIPLED_STREAM),
                count: AtomicU64::new(0),
            })
        })
        .with_output_streams(&[TRIPLED_STREAM]),
    ];
    for descriptor in descriptors {
        registry.register(descriptor).expect("mock type ids are unique");
    }
    registry
}

pub fn spec(registry: &ComponentRegistry, type_id: &str) -> ComponentSpec {
    ComponentSpec::from_registry(registry, type_id).expect("registered component")
}

/// Lifecycle calls observed by [`TrackedAnalyzer`] instances.
#[derive(Debug, Default)]
pub struct LifecycleLog {
    pub instances: AtomicUsize,
    pub inits: AtomicUsize,
    pub closes: AtomicUsize,
    pub rows: AtomicUsize,
    pub rows_after_close: AtomicUsize,
}

pub struct TrackedAnalyzer {
    log: Arc<LifecycleLog>,
    closed: std::sync::atomic::AtomicBool,
    fail_init: bool,
}

impl Analyzer for TrackedAnalyzer {
    fn init(&self) -> Result<()> {
        self.log.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(FlowError::component("tracked", "init failed"));
        }
        Ok(())
    }

    fn run(&self, _row: &InputRow, _weight: u64) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            self.log.rows_after_close.fetch_add(1, Ordering::SeqCst);
        }
        self.log.rows.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        Ok(ResultHandle::immediate(RowCount(self.log.rows.load(Ordering::SeqCst) as u64)))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A descriptor whose instances report to `log`.
pub fn tracked(type_id: &str, log: Arc<LifecycleLog>, fail_init: bool) -> ComponentDescriptor {
    ComponentDescriptor::analyzer(type_id, move |_, _| {
        log.instances.fetch_add(1, Ordering::SeqCst);
        Ok(TrackedAnalyzer {
            log: Arc::clone(&log),
            closed: std::sync::atomic::AtomicBool::new(false),
            fail_init,
        })
    })
    .with_inputs(0, None)
}

/// Records listener callbacks as strings.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl AnalysisListener for RecordingListener {
    fn job_begin(&self, job: &Job, _metrics: &AnalysisJobMetrics) {
        self.push(format!("job_begin:{}", job.name()));
    }

    fn job_success(&self, job: &Job, _metrics: &AnalysisJobMetrics) {
        self.push(format!("job_success:{}", job.name()));
    }

    fn job_failed(&self, job: &Job, _metrics: &AnalysisJobMetrics, errors: &[RecordedError]) {
        self.push(format!("job_failed:{}:{}", job.name(), errors.len()));
    }

    fn job_cancelled(&self, job: &Job, _metrics: &AnalysisJobMetrics) {
        self.push(format!("job_cancelled:{}", job.name()));
    }

    fn row_processing_begin(&self, job: &Job, metrics: &RowProcessingMetrics) {
        self.push(format!("row_processing_begin:{}:{:?}", job.name(), metrics.expected_rows()));
    }

    fn row_processing_progress(&self, job: &Job, _metrics: &RowProcessingMetrics, current_row: u64) {
        self.push(format!("progress:{}:{current_row}", job.name()));
    }

    fn row_processing_success(&self, job: &Job, _metrics: &RowProcessingMetrics) {
        self.push(format!("row_processing_success:{}", job.name()));
    }

    fn component_begin(&self, _job: &Job, component: &ComponentDefinition) {
        self.push(format!("component_begin:{}", component.name()));
    }

    fn component_success(
        &self,
        _job: &Job,
        component: &ComponentDefinition,
        result: Option<&Arc<dyn AnalyzerResult>>,
    ) {
        self.push(format!("component_success:{}:{}", component.name(), result.is_some()));
    }

    fn error_in_component(
        &self,
        _job: &Job,
        component: &ComponentDefinition,
        row_id: Option<u64>,
        _error: &FlowError,
    ) {
        self.push(format!("error:{}:{row_id:?}", component.name()));
    }
}

/// A single-column source with values `v1..=vN`.
pub fn numbered_source(rows: u64) -> Arc<InMemoryRowSource> {
    Arc::new(InMemoryRowSource::from_column(
        "numbered",
        "value",
        (1..=rows).map(|i| format!("v{i}")),
    ))
}

pub fn single_threaded() -> AnalysisRunner {
    AnalysisRunner::new(RunnerConfig::single_threaded())
}

pub fn multi_threaded(concurrency: usize) -> AnalysisRunner {
    AnalysisRunner::new(RunnerConfig::default().with_concurrency(concurrency))
}

/// Runs to completion and returns the future.
pub async fn run_to_end(runner: &AnalysisRunner, job: &Arc<Job>, source: Arc<dyn RowSource>) -> AnalysisResultFuture {
    let future = runner.run(job, source).expect("job starts");
    future
        .wait_timeout(Duration::from_secs(30))
        .await
        .expect("job finishes in time");
    future
}

pub fn result_of<T: AnalyzerResult>(future: &AnalysisResultFuture, component: ComponentId) -> Arc<T> {
    future
        .result_for(component)
        .expect("result available")
        .downcast::<T>()
        .expect("result of expected type")
}
