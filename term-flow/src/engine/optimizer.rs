//! Folding bounded-window filters into the source query.
//!
//! A filter can be pushed into the query when it reads only physical columns,
//! has no requirement of its own, exactly one of its outcomes is referenced,
//! and every other component only ever runs under that outcome. The filter
//! is then dropped from the pipeline and its outcome treated as always met.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::consumer::RowProcessingConsumer;
use crate::job::{ComponentId, FilterOutcome, Requirement};
use crate::sources::RowQuery;

#[derive(Clone)]
pub(crate) struct OptimizedPlan {
    pub(crate) query: RowQuery,
    pub(crate) consumers: Vec<Arc<RowProcessingConsumer>>,
    pub(crate) always_satisfied: Vec<FilterOutcome>,
    pub(crate) eliminated: Vec<ComponentId>,
}

pub(crate) fn optimize(consumers: &[Arc<RowProcessingConsumer>], query: RowQuery) -> OptimizedPlan {
    let mut plan = OptimizedPlan {
        query,
        consumers: consumers.to_vec(),
        always_satisfied: Vec::new(),
        eliminated: Vec::new(),
    };

    let filters: Vec<Arc<RowProcessingConsumer>> = consumers
        .iter()
        .filter(|c| c.definition().is_filter())
        .cloned()
        .collect();

    for filter in filters {
        let Some(outcome) = pushdown_outcome(&filter, &plan.consumers) else {
            break;
        };
        let Some(narrowed) = filter.optimize_query(&plan.query, &outcome.category) else {
            break;
        };
        debug!(
            filter = %filter.definition(),
            first_row = narrowed.first_row,
            max_rows = ?narrowed.max_rows,
            "Pushed filter into source query"
        );
        plan.query = narrowed;
        plan.consumers.retain(|c| c.id() != filter.id());
        plan.eliminated.push(filter.id());
        plan.always_satisfied.push(outcome);
    }
    plan
}

/// The single outcome of `filter` every other active consumer depends on.
fn pushdown_outcome(
    filter: &RowProcessingConsumer,
    active: &[Arc<RowProcessingConsumer>],
) -> Option<FilterOutcome> {
    let definition = filter.definition();
    if !definition.descriptor().metadata().query_optimizable
        || !definition.requirement().is_none()
        || !definition.inputs().iter().all(|c| c.is_physical())
    {
        return None;
    }

    let mut referenced: Vec<&FilterOutcome> = active
        .iter()
        .flat_map(|c| c.definition().requirement().outcomes())
        .filter(|o| o.filter == filter.id())
        .collect();
    referenced.sort();
    referenced.dedup();
    let [outcome] = referenced.as_slice() else {
        return None;
    };

    let mut dependent: HashSet<ComponentId> = HashSet::new();
    for consumer in active.iter().filter(|c| c.id() != filter.id()) {
        let depends = match consumer.definition().requirement() {
            Requirement::None => {
                let sources = consumer.source_requirements();
                !sources.is_empty() && sources.iter().all(|r| depends_on(r, outcome, &dependent))
            }
            requirement => depends_on(requirement, outcome, &dependent),
        };
        if !depends {
            return None;
        }
        dependent.insert(consumer.id());
    }
    Some((*outcome).clone())
}

fn depends_on(requirement: &Requirement, outcome: &FilterOutcome, dependent: &HashSet<ComponentId>) -> bool {
    match requirement {
        Requirement::None | Requirement::Any => false,
        Requirement::Outcome(_) | Requirement::Compound(_) => requirement
            .outcomes()
            .iter()
            .all(|o| o == outcome || dependent.contains(&o.filter)),
    }
}
