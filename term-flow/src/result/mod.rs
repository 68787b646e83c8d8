//! Analyzer results, result futures and result reduction.

mod analysis;
mod future;
mod reducer;
mod summary;

pub use analysis::{AnalysisResultFuture, ComponentResult};
pub use future::{AnalyzerResultFuture, ResultListener, ResultPromise};
pub use reducer::{
    merge_frequencies, reduce_count, reduce_max, reduce_min, reduce_weighted_mean, MeasureKind,
    ResultReducer, TypedReducer,
};
pub use summary::AnalysisSummary;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// Represents the different kinds of values a result exposes as metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MetricValue {
    /// A floating-point metric value (e.g., mean, percentage).
    Double(f64),

    /// An integer metric value (e.g., count, size).
    Long(i64),

    /// A vector of values.
    Vector(Vec<f64>),

    /// A string metric value (e.g., most frequent value).
    String(String),

    /// A boolean metric value.
    Boolean(bool),

    /// Nested metrics, e.g. per-value counts.
    Map(BTreeMap<String, MetricValue>),
}

impl MetricValue {
    /// Checks if the metric value is numeric (Double or Long).
    pub fn is_numeric(&self) -> bool {
        matches!(self, MetricValue::Double(_) | MetricValue::Long(_))
    }

    /// Attempts to get the numeric value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Double(v) => Some(*v),
            MetricValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Attempts to get the value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Long(v) => Some(*v),
            MetricValue::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Double(v) if v.fract() == 0.0 => write!(f, "{v:.0}"),
            MetricValue::Double(v) => write!(f, "{v:.4}"),
            MetricValue::Long(v) => write!(f, "{v}"),
            MetricValue::String(s) => write!(f, "{s}"),
            MetricValue::Boolean(b) => write!(f, "{b}"),
            MetricValue::Vector(v) => write!(f, "Vector({} elements)", v.len()),
            MetricValue::Map(m) => write!(f, "Map({} entries)", m.len()),
        }
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Long(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

/// Upcasting support for result trait objects.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// The final, immutable output of one analyzer for one execution.
pub trait AnalyzerResult: AsAny + fmt::Debug {
    /// Named metrics describing the result.
    fn metrics(&self) -> BTreeMap<String, MetricValue>;
}

/// Downcasts a shared result to its concrete type.
pub fn downcast_result<T: AnalyzerResult>(result: &Arc<dyn AnalyzerResult>) -> Option<Arc<T>> {
    Arc::clone(result).into_any_arc().downcast::<T>().ok()
}

/// The result an analyzer hands back: either already computed or still pending.
#[derive(Debug, Clone)]
pub enum ResultHandle {
    Immediate(Arc<dyn AnalyzerResult>),
    Future(AnalyzerResultFuture),
}

impl ResultHandle {
    pub fn immediate<R: AnalyzerResult>(result: R) -> Self {
        ResultHandle::Immediate(Arc::new(result))
    }

    pub fn is_future(&self) -> bool {
        matches!(self, ResultHandle::Future(_))
    }

    /// True when the result can be read without waiting.
    pub fn is_ready(&self) -> bool {
        match self {
            ResultHandle::Immediate(_) => true,
            ResultHandle::Future(f) => f.is_ready(),
        }
    }

    /// The result, if it is available now.
    pub fn get(&self) -> Option<Arc<dyn AnalyzerResult>> {
        match self {
            ResultHandle::Immediate(r) => Some(Arc::clone(r)),
            ResultHandle::Future(f) => f.try_get().and_then(|r| r.ok()),
        }
    }

    /// The result as a concrete type, if it is available now and of that type.
    pub fn downcast<T: AnalyzerResult>(&self) -> Option<Arc<T>> {
        self.get().and_then(|r| downcast_result::<T>(&r))
    }

    /// Waits for the result.
    pub async fn resolve(&self) -> Result<Arc<dyn AnalyzerResult>> {
        match self {
            ResultHandle::Immediate(r) => Ok(Arc::clone(r)),
            ResultHandle::Future(f) => f.get().await,
        }
    }

    pub fn as_future(&self) -> Option<&AnalyzerResultFuture> {
        match self {
            ResultHandle::Future(f) => Some(f),
            ResultHandle::Immediate(_) => None,
        }
    }
}

/// Fails with a reduction error unless every partial has the same concrete type.
pub(crate) fn downcast_all<T: AnalyzerResult>(partials: &[Arc<dyn AnalyzerResult>]) -> Result<Vec<Arc<T>>> {
    partials
        .iter()
        .map(|p| {
            downcast_result::<T>(p).ok_or_else(|| {
                FlowError::reduction(format!(
                    "Expected partial results of type {}, found {:?}",
                    std::any::type_name::<T>(),
                    p
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct CountResult(u64);

    impl AnalyzerResult for CountResult {
        fn metrics(&self) -> BTreeMap<String, MetricValue> {
            BTreeMap::from([("count".to_string(), MetricValue::from(self.0))])
        }
    }

    #[derive(Debug)]
    struct OtherResult;

    impl AnalyzerResult for OtherResult {
        fn metrics(&self) -> BTreeMap<String, MetricValue> {
            BTreeMap::new()
        }
    }

    #[test]
    fn test_downcast_immediate_result() {
        let handle = ResultHandle::immediate(CountResult(3));
        assert!(handle.is_ready());
        assert_eq!(*handle.downcast::<CountResult>().unwrap(), CountResult(3));
        assert!(handle.downcast::<OtherResult>().is_none());
    }

    #[test]
    fn test_downcast_all_rejects_mixed_types() {
        let partials: Vec<Arc<dyn AnalyzerResult>> =
            vec![Arc::new(CountResult(1)), Arc::new(OtherResult)];
        let err = downcast_all::<CountResult>(&partials).unwrap_err();
        assert!(matches!(err, FlowError::Reduction(_)));
    }

    #[test]
    fn test_metric_value_display() {
        assert_eq!(MetricValue::Double(2.0).to_string(), "2");
        assert_eq!(MetricValue::Double(2.5).to_string(), "2.5000");
        assert_eq!(MetricValue::from(7u64).as_i64(), Some(7));
    }
}
