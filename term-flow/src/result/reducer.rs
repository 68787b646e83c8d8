//! Merging partial results of the same component computed on different row partitions.
//!
//! Reduction depends on the kind of each measure, not on the component that
//! produced it: counts sum, extrema pick the extremum, means are averaged with
//! each partial's own row count as weight.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{downcast_all, AnalyzerResult};
use crate::error::{FlowError, Result};

/// Merges a collection of partial results into one.
pub trait ResultReducer: Send + Sync {
    /// Reduces partial results of one component. Reducing a single partial
    /// returns a result equal to it.
    fn reduce(&self, partials: &[Arc<dyn AnalyzerResult>]) -> Result<Arc<dyn AnalyzerResult>>;
}

/// A reducer for one concrete result type.
///
/// Implementors only handle two or more partials of the right type; the
/// blanket [`ResultReducer`] impl takes care of type checks and of the
/// single-partial case.
pub trait TypedReducer: Send + Sync {
    type Output: AnalyzerResult;

    fn reduce_typed(&self, partials: &[Arc<Self::Output>]) -> Result<Self::Output>;
}

impl<T: TypedReducer> ResultReducer for T {
    fn reduce(&self, partials: &[Arc<dyn AnalyzerResult>]) -> Result<Arc<dyn AnalyzerResult>> {
        match partials {
            [] => Err(FlowError::reduction("No partial results to reduce")),
            [single] => {
                downcast_all::<T::Output>(std::slice::from_ref(single))?;
                Ok(Arc::clone(single))
            }
            _ => {
                let typed = downcast_all::<T::Output>(partials)?;
                Ok(Arc::new(self.reduce_typed(&typed)?))
            }
        }
    }
}

/// How a single measure combines across partials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureKind {
    Count,
    Sum,
    Minimum,
    Maximum,
    /// Averaged using the weight attached to each partial value.
    WeightedMean,
}

impl MeasureKind {
    /// Combines `(value, weight)` pairs. Missing values are skipped; weights
    /// only matter for [`MeasureKind::WeightedMean`].
    pub fn combine(&self, partials: &[(Option<f64>, u64)]) -> Option<f64> {
        let values = || partials.iter().filter_map(|(v, _)| *v);
        match self {
            MeasureKind::Count | MeasureKind::Sum => {
                let mut present = values().peekable();
                present.peek()?;
                Some(present.sum())
            }
            MeasureKind::Minimum => reduce_min(values()),
            MeasureKind::Maximum => reduce_max(values()),
            MeasureKind::WeightedMean => reduce_weighted_mean(partials.iter().copied()),
        }
    }
}

pub fn reduce_count(counts: impl IntoIterator<Item = u64>) -> u64 {
    counts.into_iter().sum()
}

pub fn reduce_min(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values.into_iter().reduce(f64::min)
}

pub fn reduce_max(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values.into_iter().reduce(f64::max)
}

/// Averages partial means weighted by the number of values behind each.
///
/// Partials without a mean or with zero weight do not contribute. Returns
/// `None` when no partial contributes.
pub fn reduce_weighted_mean(partials: impl IntoIterator<Item = (Option<f64>, u64)>) -> Option<f64> {
    let (sum, weight) = partials
        .into_iter()
        .filter_map(|(mean, weight)| mean.filter(|_| weight > 0).map(|m| (m, weight)))
        .fold((0.0, 0u64), |(sum, total), (mean, weight)| {
            (sum + mean * weight as f64, total + weight)
        });
    (weight > 0).then(|| sum / weight as f64)
}

/// Sums per-value counts across partial frequency maps.
pub fn merge_frequencies<'a>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, u64>>,
) -> BTreeMap<String, u64> {
    let mut merged = BTreeMap::new();
    for map in maps {
        for (value, count) in map {
            *merged.entry(value.clone()).or_insert(0) += count;
        }
    }
    merged
}
