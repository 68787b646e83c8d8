use regex::Regex;

use crate::components::{ComponentConfig, ComponentContext, Filter};
use crate::engine::InputRow;
use crate::error::{FlowError, Result};
use crate::job::InputColumn;
use crate::sources::RowQuery;

pub const VALID: &str = "VALID";
pub const INVALID: &str = "INVALID";

/// Passes a bounded window of physical rows.
///
/// Requiring `VALID` of this filter is equivalent to reading only the window,
/// so the engine may push it into the source query instead of running it.
#[derive(Debug, Clone)]
pub struct MaxRowsFilter {
    window: RowQuery,
}

impl MaxRowsFilter {
    pub fn new(first_row: u64, max_rows: u64) -> Result<Self> {
        if first_row == 0 {
            return Err(FlowError::configuration("first_row must be at least 1"));
        }
        Ok(Self {
            window: RowQuery::window(first_row, Some(max_rows)),
        })
    }

    pub fn from_config(config: &ComponentConfig, _ctx: &ComponentContext) -> Result<Self> {
        Self::new(config.u64_or("first_row", 1)?, config.u64_or("max_rows", 1000)?)
    }

    pub fn window(&self) -> RowQuery {
        self.window
    }
}

impl Filter for MaxRowsFilter {
    fn categorize(&self, row: &InputRow) -> Result<String> {
        let category = if self.window.contains(row.id()) { VALID } else { INVALID };
        Ok(category.to_string())
    }

    fn optimize_query(&self, query: &RowQuery, category: &str) -> Option<RowQuery> {
        (category == VALID).then(|| query.intersect(&self.window))
    }
}

/// Categorizes rows as `NULL` when any input is null.
#[derive(Debug, Clone)]
pub struct NullCheckFilter {
    inputs: Vec<InputColumn>,
    empty_as_null: bool,
}

impl NullCheckFilter {
    pub fn from_config(config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        Ok(Self {
            inputs: ctx.inputs().to_vec(),
            empty_as_null: config.bool_or("consider_empty_string_as_null", false)?,
        })
    }
}

impl Filter for NullCheckFilter {
    fn categorize(&self, row: &InputRow) -> Result<String> {
        let is_null = self.inputs.iter().any(|c| {
            let value = row.get(c.id);
            if self.empty_as_null {
                value.is_blank()
            } else {
                value.is_null()
            }
        });
        Ok(if is_null { "NULL" } else { "NOT_NULL" }.to_string())
    }
}

/// Categorizes rows as `MATCHED` when every input matches a regular expression.
#[derive(Debug, Clone)]
pub struct RegexMatchFilter {
    inputs: Vec<InputColumn>,
    pattern: Regex,
}

impl RegexMatchFilter {
    pub fn from_config(config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        let pattern = config.required_str("pattern")?;
        let pattern = Regex::new(pattern).map_err(|e| {
            FlowError::configuration(format!("Invalid pattern '{pattern}' for {}: {e}", ctx.name()))
        })?;
        Ok(Self {
            inputs: ctx.inputs().to_vec(),
            pattern,
        })
    }
}

impl Filter for RegexMatchFilter {
    fn categorize(&self, row: &InputRow) -> Result<String> {
        let matched = self.inputs.iter().all(|c| match row.get(c.id).to_key() {
            Some(text) => self.pattern.is_match(&text),
            None => false,
        });
        Ok(if matched { "MATCHED" } else { "UNMATCHED" }.to_string())
    }
}
