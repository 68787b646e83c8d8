//! Requirements and their evaluation against a row's filter outcomes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::ComponentId;

/// One classification branch of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub filter: ComponentId,
    pub category: String,
}

impl FilterOutcome {
    pub fn new(filter: ComponentId, category: impl Into<String>) -> Self {
        Self {
            filter,
            category: category.into(),
        }
    }
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.filter, self.category)
    }
}

/// The condition under which a component processes a row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Requirement {
    /// No own condition. Conditions of the producers of its inputs still apply.
    #[default]
    None,
    /// The filter must have produced this category.
    Outcome(FilterOutcome),
    /// At least one of the outcomes must hold.
    Compound(Vec<FilterOutcome>),
    /// Every row, regardless of upstream filtering.
    Any,
}

impl Requirement {
    pub fn outcome(filter: ComponentId, category: impl Into<String>) -> Self {
        Requirement::Outcome(FilterOutcome::new(filter, category))
    }

    /// Builds an OR over the outcomes. A single outcome collapses to [`Requirement::Outcome`].
    pub fn any_of(outcomes: impl IntoIterator<Item = FilterOutcome>) -> Self {
        let mut outcomes: Vec<FilterOutcome> = outcomes.into_iter().collect();
        outcomes.dedup();
        match outcomes.len() {
            0 => Requirement::None,
            1 => Requirement::Outcome(outcomes.remove(0)),
            _ => Requirement::Compound(outcomes),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Requirement::None)
    }

    /// Evaluates the requirement against the outcomes computed so far for a row.
    pub fn is_satisfied(&self, outcomes: &FilterOutcomes) -> bool {
        match self {
            Requirement::None | Requirement::Any => true,
            Requirement::Outcome(outcome) => outcomes.contains(outcome),
            Requirement::Compound(list) => list.iter().any(|o| outcomes.contains(o)),
        }
    }

    /// The outcomes this requirement refers to.
    pub fn outcomes(&self) -> &[FilterOutcome] {
        match self {
            Requirement::Outcome(outcome) => std::slice::from_ref(outcome),
            Requirement::Compound(list) => list,
            Requirement::None | Requirement::Any => &[],
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::None => write!(f, "none"),
            Requirement::Any => write!(f, "any"),
            Requirement::Outcome(o) => write!(f, "{o}"),
            Requirement::Compound(list) => {
                let parts: Vec<String> = list.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" OR "))
            }
        }
    }
}

/// Filter categories produced for one row, plus outcomes that hold for every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcomes {
    categories: HashMap<ComponentId, String>,
    always: Vec<FilterOutcome>,
}

impl FilterOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes that hold for every row, e.g. filters folded into the source query.
    pub fn with_always_satisfied(always: Vec<FilterOutcome>) -> Self {
        Self {
            categories: HashMap::new(),
            always,
        }
    }

    pub fn add(&mut self, filter: ComponentId, category: impl Into<String>) {
        self.categories.insert(filter, category.into());
    }

    pub fn contains(&self, outcome: &FilterOutcome) -> bool {
        self.categories
            .get(&outcome.filter)
            .is_some_and(|c| *c == outcome.category)
            || self.always.contains(outcome)
    }

    /// The category a filter produced for this row.
    pub fn category(&self, filter: ComponentId) -> Option<&str> {
        self.categories.get(&filter).map(String::as_str).or_else(|| {
            self.always
                .iter()
                .find(|o| o.filter == filter)
                .map(|o| o.category.as_str())
        })
    }

    pub fn len(&self) -> usize {
        self.categories.len() + self.always.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
