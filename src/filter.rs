use std::collections::BTreeSet;
use tracing::trace;

use crate::domain::{ALL, DashError, FILTER_COLUMNS};
use crate::table::{Row, Table};

/// What the user picked in one dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Value(String),
}

impl Selection {
    pub fn label(&self) -> &str {
        match self {
            Selection::All => ALL,
            Selection::Value(v) => v,
        }
    }
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        if value == ALL {
            Selection::All
        } else {
            Selection::Value(value.to_string())
        }
    }
}

/// Equality constraints, one per filterable column, kept in selector order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    selections: Vec<(String, Selection)>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(&FILTER_COLUMNS)
    }
}

impl FilterState {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            selections: columns
                .iter()
                .map(|c| (c.to_string(), Selection::All))
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn with(mut self, column: &str, selection: impl Into<Selection>) -> Self {
        self.set(column, selection.into());
        self
    }

    pub fn set(&mut self, column: &str, selection: Selection) {
        if let Some(entry) = self.selections.iter_mut().find(|(c, _)| c == column) {
            entry.1 = selection;
        } else {
            self.selections.push((column.to_string(), selection));
        }
    }

    pub fn get(&self, column: &str) -> Option<&Selection> {
        self.selections
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, s)| s)
    }

    /// Moves the selection of `column` through `["all", options...]`,
    /// wrapping at both ends.
    pub fn cycle(&mut self, column: &str, options: &[String], forward: bool) {
        let current = self.get(column).cloned().unwrap_or(Selection::All);
        let position = match &current {
            Selection::All => 0,
            Selection::Value(v) => options.iter().position(|o| o == v).map_or(0, |p| p + 1),
        };
        let slots = options.len() + 1;
        let next = if forward {
            (position + 1) % slots
        } else {
            (position + slots - 1) % slots
        };
        let selection = match next {
            0 => Selection::All,
            n => Selection::Value(options[n - 1].clone()),
        };
        trace!("Filter {column}: {current:?} => {selection:?}");
        self.set(column, selection);
    }

    /// Resets selections whose value is no longer offered by `table`.
    pub fn retain_available(&mut self, table: &Table) {
        for (column, selection) in self.selections.iter_mut() {
            if let Selection::Value(v) = selection
                && !distinct_values(table, column).contains(v)
            {
                trace!("Selection {v} vanished from column {column}, resetting");
                *selection = Selection::All;
            }
        }
    }
}

/// Rows of `table` matching every non-"all" selection, in table order.
pub fn apply_filter<'a>(table: &'a Table, state: &FilterState) -> Result<Vec<&'a Row>, DashError> {
    let mut predicates = Vec::with_capacity(state.selections.len());
    for (column, selection) in state.selections.iter() {
        let idx = table
            .column_index(column)
            .ok_or_else(|| DashError::SchemaMismatch {
                column: column.clone(),
            })?;
        if let Selection::Value(wanted) = selection {
            predicates.push((idx, wanted.trim()));
        }
    }

    let rows: Vec<&Row> = table
        .rows()
        .iter()
        .filter(|row| {
            predicates
                .iter()
                .all(|(idx, wanted)| row.get(*idx).normalized() == *wanted)
        })
        .collect();
    trace!(
        "Filter kept {} of {} rows ({} active predicates)",
        rows.len(),
        table.len(),
        predicates.len()
    );
    Ok(rows)
}

/// Sorted unique normalized values of a column, skipping empty cells.
/// Unknown columns yield no options.
pub fn distinct_values(table: &Table, column: &str) -> Vec<String> {
    let Some(idx) = table.column_index(column) else {
        return Vec::new();
    };
    table
        .rows()
        .iter()
        .map(|r| r.get(idx).normalized())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}
