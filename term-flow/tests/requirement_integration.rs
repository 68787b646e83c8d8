//! Requirement inheritance and merging across filter branches.

mod common;

use std::sync::Arc;

use common::*;
use term_flow::job::{ComponentHandle, ComponentId};
use term_flow::prelude::*;

fn words() -> Arc<InMemoryRowSource> {
    Arc::new(InMemoryRowSource::from_column(
        "words",
        "word",
        ["foo", "bar", "baz", "hello", "world"],
    ))
}

/// `word` split into an EVEN branch and an ODD branch, each with its own
/// transformer.
struct Branches {
    builder: JobBuilder,
    word: InputColumn,
    even_odd: ComponentHandle,
    even: ComponentHandle,
    odd: ComponentHandle,
}

fn branched() -> Branches {
    let registry = registry();
    let mut builder = JobBuilder::new("branches");
    let word = builder.add_source_column("word");
    let even_odd = builder.add_component(spec(&registry, "even_odd").named("even_odd")).unwrap();
    let even = builder
        .add_component(
            spec(&registry, "mock_transformer")
                .named("even_branch")
                .with_input(&word)
                .requires(Requirement::Outcome(even_odd.outcome("EVEN"))),
        )
        .unwrap();
    let odd = builder
        .add_component(
            spec(&registry, "mock_transformer")
                .named("odd_branch")
                .with_input(&word)
                .requires(Requirement::Outcome(even_odd.outcome("ODD"))),
        )
        .unwrap();
    Branches {
        builder,
        word,
        even_odd,
        even,
        odd,
    }
}

fn add_sink(builder: &mut JobBuilder, inputs: &[&InputColumn], requirement: Requirement) -> ComponentId {
    let registry = registry();
    builder
        .add_component(
            spec(&registry, "collect")
                .named("sink")
                .with_inputs(inputs.iter().copied())
                .requires(requirement),
        )
        .unwrap()
        .id()
}

async fn collect(job: &Arc<Job>, runner: &AnalysisRunner, sink: ComponentId) -> Arc<CollectedRows> {
    let future = run_to_end(runner, job, words()).await;
    assert!(future.is_successful(), "{:?}", future.errors());
    result_of::<CollectedRows>(&future, sink)
}

#[tokio::test]
async fn test_compound_requirement_reaches_both_branches() {
    let Branches {
        mut builder,
        even_odd,
        even,
        odd,
        ..
    } = branched();
    let sink = add_sink(
        &mut builder,
        &[even.output(0).unwrap(), odd.output(0).unwrap()],
        Requirement::any_of([even_odd.outcome("EVEN"), even_odd.outcome("ODD")]),
    );
    let job = builder.build().unwrap();

    for runner in [single_threaded(), multi_threaded(4)] {
        let rows = collect(&job, &runner, sink).await;
        assert_eq!(rows.ids(), vec![1, 2, 3, 4, 5]);
        for row in &rows.rows {
            let present = row.values.iter().filter(|v| !v.is_null()).count();
            assert_eq!(present, 1, "row {} should carry exactly one branch value", row.id);
        }
        assert_eq!(rows.rows[0].values, vec![Value::Null, Value::from("mocked: foo")]);
        assert_eq!(rows.rows[1].values, vec![Value::from("mocked: bar"), Value::Null]);
    }
}

#[tokio::test]
async fn test_single_branch_requirement_is_inherited() {
    let Branches { mut builder, even, .. } = branched();
    let sink = add_sink(&mut builder, &[even.output(0).unwrap()], Requirement::None);
    let job = builder.build().unwrap();

    let rows = collect(&job, &single_threaded(), sink).await;
    assert_eq!(rows.ids(), vec![2, 4]);
    assert_eq!(rows.rows[0].values, vec![Value::from("mocked: bar")]);
    assert_eq!(rows.rows[1].values, vec![Value::from("mocked: hello")]);
}

#[tokio::test]
async fn test_inheritance_is_transitive_through_transformers() {
    let Branches { mut builder, even, .. } = branched();
    let registry = registry();
    let length = builder
        .add_component(
            spec(&registry, "string_length")
                .named("length")
                .with_input(even.output(0).unwrap()),
        )
        .unwrap();
    let sink = add_sink(&mut builder, &[length.output(0).unwrap()], Requirement::None);
    let job = builder.build().unwrap();

    let rows = collect(&job, &single_threaded(), sink).await;
    assert_eq!(rows.ids(), vec![2, 4]);
    assert_eq!(rows.rows[0].values, vec![Value::Integer("mocked: bar".len() as i64)]);
}

#[tokio::test]
async fn test_sources_without_own_requirement_merge_as_or() {
    let Branches {
        mut builder,
        even,
        odd,
        ..
    } = branched();
    let sink = add_sink(
        &mut builder,
        &[even.output(0).unwrap(), odd.output(0).unwrap()],
        Requirement::None,
    );
    let job = builder.build().unwrap();

    let rows = collect(&job, &single_threaded(), sink).await;
    assert_eq!(rows.ids(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_any_requirement_ignores_upstream_filtering() {
    let Branches { mut builder, even, .. } = branched();
    let sink = add_sink(&mut builder, &[even.output(0).unwrap()], Requirement::Any);
    let job = builder.build().unwrap();

    let rows = collect(&job, &single_threaded(), sink).await;
    assert_eq!(rows.ids(), vec![1, 2, 3, 4, 5]);
    let nulls = rows.rows.iter().filter(|r| r.values[0].is_null()).count();
    assert_eq!(nulls, 3);
}

#[tokio::test]
async fn test_own_requirement_replaces_inherited_one() {
    let Branches {
        mut builder,
        word,
        even,
        ..
    } = branched();
    let registry = registry();
    let not_null = builder
        .add_component(spec(&registry, "null_check").named("not_null").with_input(&word))
        .unwrap();
    let sink = add_sink(
        &mut builder,
        &[even.output(0).unwrap()],
        Requirement::Outcome(not_null.outcome("NOT_NULL")),
    );
    let job = builder.build().unwrap();

    // every word is present, so the sink sees odd rows too, without a branch value
    let rows = collect(&job, &single_threaded(), sink).await;
    assert_eq!(rows.ids(), vec![1, 2, 3, 4, 5]);
    assert_eq!(rows.rows[0].values, vec![Value::Null]);
    assert_eq!(rows.rows[1].values, vec![Value::from("mocked: bar")]);
}

#[tokio::test]
async fn test_unsatisfiable_own_requirement_blocks_every_row() {
    let Branches {
        mut builder,
        word,
        even,
        ..
    } = branched();
    let registry = registry();
    let not_null = builder
        .add_component(spec(&registry, "null_check").named("not_null").with_input(&word))
        .unwrap();
    let sink = add_sink(
        &mut builder,
        &[even.output(0).unwrap()],
        Requirement::Outcome(not_null.outcome("NULL")),
    );
    let job = builder.build().unwrap();

    let rows = collect(&job, &single_threaded(), sink).await;
    assert!(rows.rows.is_empty());
}
