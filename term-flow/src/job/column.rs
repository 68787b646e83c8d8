//! Column identities.
//!
//! Columns are addressed by [`ColumnId`], never by name: two components may
//! legally publish output columns with the same name.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ComponentId;

/// Identity of a physical or virtual column, unique across a job tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(u32);

impl ColumnId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col#{}", self.0)
    }
}

/// Where a column's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnOrigin {
    /// Read from the row source.
    Source,
    /// Computed per row by a transformer.
    Component(ComponentId),
}

/// A column as seen by a consuming component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputColumn {
    pub id: ColumnId,
    pub name: String,
    pub origin: ColumnOrigin,
}

impl InputColumn {
    pub fn physical(id: ColumnId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            origin: ColumnOrigin::Source,
        }
    }

    pub fn virtual_column(id: ColumnId, name: impl Into<String>, producer: ComponentId) -> Self {
        Self {
            id,
            name: name.into(),
            origin: ColumnOrigin::Component(producer),
        }
    }

    pub fn is_physical(&self) -> bool {
        matches!(self.origin, ColumnOrigin::Source)
    }

    /// The transformer producing this column, for virtual columns.
    pub fn producer(&self) -> Option<ComponentId> {
        match self.origin {
            ColumnOrigin::Source => None,
            ColumnOrigin::Component(id) => Some(id),
        }
    }
}
