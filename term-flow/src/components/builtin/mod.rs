//! Builtin components registered in [`ComponentRegistry::builtin`](super::ComponentRegistry::builtin).
//!
//! | type id              | role        | configuration keys                                   |
//! |----------------------|-------------|------------------------------------------------------|
//! | `max_rows`           | filter      | `first_row` (1), `max_rows` (1000)                   |
//! | `null_check`         | filter      | `consider_empty_string_as_null` (false)              |
//! | `regex_match`        | filter      | `pattern` (required)                                 |
//! | `string_length`      | transformer | none                                                 |
//! | `convert_to_number`  | transformer | none                                                 |
//! | `number`             | analyzer    | none                                                 |
//! | `value_distribution` | analyzer    | `record_samples` (true)                              |
//! | `completeness`       | analyzer    | `evaluation_mode` (`ALL_FIELDS` or `ANY_FIELD`)      |

mod completeness;
mod filters;
mod number;
mod transformers;
mod value_distribution;

pub use completeness::{CompletenessAnalyzer, CompletenessReducer, CompletenessResult, EvaluationMode};
pub use filters::{MaxRowsFilter, NullCheckFilter, RegexMatchFilter};
pub use number::{NumberAnalyzer, NumberAnalyzerResult, NumberColumnResult, NumberReducer};
pub use transformers::{ConvertToNumberTransformer, StringLengthTransformer};
pub use value_distribution::{
    ValueDistributionAnalyzer, ValueDistributionReducer, ValueDistributionResult,
};

use super::{ComponentDescriptor, OutputArity};

pub(crate) fn descriptors() -> Vec<ComponentDescriptor> {
    vec![
        ComponentDescriptor::filter("max_rows", &["VALID", "INVALID"], MaxRowsFilter::from_config)
            .with_inputs(0, None)
            .query_optimizable(),
        ComponentDescriptor::filter("null_check", &["NOT_NULL", "NULL"], NullCheckFilter::from_config),
        ComponentDescriptor::filter(
            "regex_match",
            &["MATCHED", "UNMATCHED"],
            RegexMatchFilter::from_config,
        ),
        ComponentDescriptor::transformer(
            "string_length",
            OutputArity::Fixed(1),
            StringLengthTransformer::from_config,
        )
        .with_inputs(1, Some(1)),
        ComponentDescriptor::transformer(
            "convert_to_number",
            OutputArity::PerInput,
            ConvertToNumberTransformer::from_config,
        ),
        ComponentDescriptor::analyzer("number", NumberAnalyzer::from_config).with_reducer(NumberReducer),
        ComponentDescriptor::analyzer("value_distribution", ValueDistributionAnalyzer::from_config)
            .with_inputs(1, Some(1))
            .with_reducer(ValueDistributionReducer),
        ComponentDescriptor::analyzer("completeness", CompletenessAnalyzer::from_config)
            .with_output_streams(&[completeness::COMPLETE_STREAM, completeness::INCOMPLETE_STREAM])
            .with_reducer(CompletenessReducer),
    ]
}
