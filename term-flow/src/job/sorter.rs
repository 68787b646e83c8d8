//! Dependency ordering of components.

use std::collections::{BTreeSet, HashMap};

use super::{ComponentId, Requirement};
use crate::error::{FlowError, Result};

/// Orders components so that every producer of an input column and every filter
/// referenced by a requirement precedes its dependents.
///
/// `components` yields `(id, dependencies)` pairs. Ties are broken by input
/// position, so the result is stable for a given job. A dependency cycle is a
/// configuration error.
pub fn sort_components(components: &[(ComponentId, Vec<ComponentId>)]) -> Result<Vec<ComponentId>> {
    let position: HashMap<ComponentId, usize> = components
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();

    let mut pending: Vec<usize> = vec![0; components.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
    for (i, (_, deps)) in components.iter().enumerate() {
        let mut seen = BTreeSet::new();
        for dep in deps {
            if let Some(&d) = position.get(dep) {
                if d != i && seen.insert(d) {
                    pending[i] += 1;
                    dependents[d].push(i);
                } else if d == i {
                    return Err(FlowError::configuration(format!(
                        "{} depends on itself",
                        components[i].0
                    )));
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..components.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(components.len());
    while let Some(next) = ready.pop_first() {
        order.push(components[next].0);
        for &d in &dependents[next] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() != components.len() {
        let stuck: Vec<String> = (0..components.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| components[i].0.to_string())
            .collect();
        return Err(FlowError::configuration(format!(
            "Cyclic dependency between components: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// Filters a requirement depends on.
pub(crate) fn requirement_dependencies(requirement: &Requirement) -> Vec<ComponentId> {
    requirement.outcomes().iter().map(|o| o.filter).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ComponentId {
        ComponentId::new(n)
    }

    #[test]
    fn test_producers_precede_consumers() {
        let order = sort_components(&[
            (id(3), vec![id(2)]),
            (id(2), vec![id(1)]),
            (id(1), vec![]),
        ])
        .unwrap();
        assert_eq!(order, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn test_stable_for_independent_components() {
        let order = sort_components(&[(id(5), vec![]), (id(4), vec![]), (id(6), vec![id(5)])])
            .unwrap();
        assert_eq!(order, vec![id(5), id(4), id(6)]);
    }

    #[test]
    fn test_cycle_is_configuration_error() {
        let err = sort_components(&[(id(1), vec![id(2)]), (id(2), vec![id(1)])]).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Cyclic"));
    }
}
