//! Nested jobs fed by output data streams.

mod common;

use std::sync::Arc;

use common::*;
use term_flow::components::builtin::CompletenessResult;
use term_flow::job::ComponentHandle;
use term_flow::prelude::*;

/// Adds a `drop_third` analyzer over the `value` column of `builder`.
fn add_drop_third(builder: &mut JobBuilder, name: &str) -> ComponentHandle {
    let registry = registry();
    let value = builder.source_column("value").unwrap().clone();
    builder
        .add_component(spec(&registry, "drop_third").named(name).with_input(&value))
        .unwrap()
}

#[tokio::test]
async fn test_three_levels_of_nested_streams() {
    let mut root = JobBuilder::new("root");
    root.add_source_column("value");
    let first = add_drop_third(&mut root, "first");

    let mut middle = root.stream_builder(&first, KEPT_STREAM).unwrap();
    let second = add_drop_third(&mut middle, "second");

    let mut leaf = middle.stream_builder(&second, KEPT_STREAM).unwrap();
    let third = add_drop_third(&mut leaf, "third");

    middle.attach_stream(&second, KEPT_STREAM, leaf).unwrap();
    root.attach_stream(&first, KEPT_STREAM, middle).unwrap();
    let job = root.build().unwrap();

    assert_eq!(job.all_components().len(), 3);
    assert_eq!(job.stream_jobs().count(), 1);

    for runner in [single_threaded(), multi_threaded(4)] {
        let listener = Arc::new(RecordingListener::default());
        let runner = runner.with_listener(listener.clone());
        let future = run_to_end(&runner, &job, numbered_source(40)).await;
        assert!(future.is_successful(), "{:?}", future.errors());

        assert_eq!(*result_of::<RowCount>(&future, first.id()), RowCount(40));
        assert_eq!(*result_of::<RowCount>(&future, second.id()), RowCount(27));
        assert_eq!(*result_of::<RowCount>(&future, third.id()), RowCount(19));
        assert_eq!(future.results().unwrap().len(), 3);

        // every nested pipeline reports its own row processing
        assert!(listener.position("row_processing_success:root").is_some());
        assert!(listener.position("row_processing_success:root/first:kept").is_some());
        assert!(listener
            .position("row_processing_success:root/first:kept/second:kept")
            .is_some());
        assert_eq!(
            listener.events().iter().filter(|e| e.starts_with("job_success")).count(),
            1
        );
    }
}

fn three_level_chain() -> (Arc<Job>, [ComponentHandle; 3]) {
    let mut root = JobBuilder::new("root");
    root.add_source_column("value");
    let first = add_drop_third(&mut root, "first");
    let mut middle = root.stream_builder(&first, KEPT_STREAM).unwrap();
    let second = add_drop_third(&mut middle, "second");
    let mut leaf = middle.stream_builder(&second, KEPT_STREAM).unwrap();
    let third = add_drop_third(&mut leaf, "third");
    middle.attach_stream(&second, KEPT_STREAM, leaf).unwrap();
    root.attach_stream(&first, KEPT_STREAM, middle).unwrap();
    (root.build().unwrap(), [first, second, third])
}

#[tokio::test(flavor = "current_thread")]
async fn test_single_row_stream_buffer_on_one_runtime_thread() {
    let (job, [first, second, third]) = three_level_chain();
    let configs = [
        RunnerConfig::single_threaded().with_stream_buffer_rows(1),
        RunnerConfig::default().with_concurrency(2).with_stream_buffer_rows(1),
    ];
    for config in configs {
        let runner = AnalysisRunner::new(config);
        let future = run_to_end(&runner, &job, numbered_source(300)).await;
        assert!(future.is_successful(), "{:?}", future.errors());
        assert_eq!(*result_of::<RowCount>(&future, first.id()), RowCount(300));
        assert_eq!(*result_of::<RowCount>(&future, second.id()), RowCount(201));
        assert_eq!(*result_of::<RowCount>(&future, third.id()), RowCount(135));
    }
}

#[tokio::test]
async fn test_row_weights_carry_through_streams() {
    let registry = registry();
    let source = Arc::new(InMemoryRowSource::from_column(
        "weighted",
        "value",
        [Some("a"), None, Some("b"), None, None],
    ));

    let mut root = JobBuilder::new("root");
    let value = root.add_source_column("value");
    let triple = root
        .add_component(spec(&registry, "triple").with_input(&value))
        .unwrap();
    let mut tripled = root.stream_builder(&triple, TRIPLED_STREAM).unwrap();
    let tripled_value = tripled.source_column("value").unwrap().clone();
    let completeness = tripled
        .add_component(spec(&registry, "completeness").with_input(&tripled_value))
        .unwrap();
    let mut incomplete = tripled.stream_builder(&completeness, "incomplete").unwrap();
    let incomplete_columns = incomplete.source_columns().to_vec();
    let counted = incomplete
        .add_component(spec(&registry, "future_count").with_inputs(&incomplete_columns))
        .unwrap();
    tripled.attach_stream(&completeness, "incomplete", incomplete).unwrap();
    root.attach_stream(&triple, TRIPLED_STREAM, tripled).unwrap();
    let job = root.build().unwrap();

    for runner in [single_threaded(), multi_threaded(2)] {
        let future = run_to_end(&runner, &job, source.clone()).await;
        assert!(future.is_successful(), "{:?}", future.errors());

        assert_eq!(*result_of::<RowCount>(&future, triple.id()), RowCount(5));
        let counts = result_of::<CompletenessResult>(&future, completeness.id());
        assert_eq!(counts.valid_row_count, 6);
        assert_eq!(counts.invalid_row_count, 9);
        assert_eq!(*result_of::<RowCount>(&future, counted.id()), RowCount(9));
    }
}

#[tokio::test]
async fn test_unconsumed_stream_publishes_nothing() {
    let mut root = JobBuilder::new("root");
    root.add_source_column("value");
    let only = add_drop_third(&mut root, "only");
    let job = root.build().unwrap();

    let future = run_to_end(&single_threaded(), &job, numbered_source(40)).await;
    assert_eq!(*result_of::<RowCount>(&future, only.id()), RowCount(40));
    assert_eq!(future.results().unwrap().len(), 1);
}

#[tokio::test]
async fn test_incomplete_rows_feed_a_nested_job() {
    let registry = registry();
    let rows = vec![
        vec![Value::from("ada"), Value::from("ada@example.com")],
        vec![Value::from("bob"), Value::Null],
        vec![Value::Null, Value::from("carol@example.com")],
        vec![Value::from("dave"), Value::from("dave@example.com")],
        vec![Value::from(""), Value::from("eve@example.com")],
    ];
    let source = Arc::new(InMemoryRowSource::new("people", &["name", "email"], rows));

    let mut builder = JobBuilder::new("people");
    let columns = builder.add_source_columns(&["name", "email"]);
    let completeness = builder
        .add_component(spec(&registry, "completeness").with_inputs(&columns))
        .unwrap();
    let mut incomplete = builder.stream_builder(&completeness, "incomplete").unwrap();
    let nested_columns = incomplete.source_columns().to_vec();
    let sink = incomplete
        .add_component(spec(&registry, "collect").with_inputs(&nested_columns))
        .unwrap();
    builder.attach_stream(&completeness, "incomplete", incomplete).unwrap();
    let job = builder.build().unwrap();

    let future = run_to_end(&multi_threaded(2), &job, source).await;
    assert!(future.is_successful(), "{:?}", future.errors());

    let counts = result_of::<CompletenessResult>(&future, completeness.id());
    assert_eq!(counts.valid_row_count, 2);
    assert_eq!(counts.invalid_row_count, 3);

    let nested = result_of::<CollectedRows>(&future, sink.id());
    assert_eq!(nested.rows.len(), 3);
    let names: Vec<Value> = {
        let mut names: Vec<Value> = nested.rows.iter().map(|r| r.values[0].clone()).collect();
        names.sort_by_key(|v| v.to_key());
        names
    };
    assert_eq!(names, vec![Value::Null, Value::from(""), Value::from("bob")]);
}
