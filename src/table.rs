//! Tables: ordered sets of equal-length base columns.
//!
//! A table is assembled at ingest from finalized columns and is immutable
//! afterwards, so it can be shared read-only across request threads.
//! Joined and computed columns never live here; they belong to the
//! per-user table view.

use std::collections::HashMap;
use std::sync::Arc;

use crate::column::{BaseColumn, ColumnRef};
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<ColumnRef>,
    by_name: HashMap<String, usize>,
    len: usize,
    domains: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: Vec::new(),
            by_name: HashMap::new(),
            len: 0,
            domains: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Domains allowed to see this table; empty means public.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn set_domains(&mut self, domains: Vec<String>) {
        self.domains = domains;
    }

    /// Number of rows. Zero until the first column is added.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a finalized base column. Every column must match the table's
    /// row count, and names are unique within the table.
    pub fn add_column(&mut self, column: BaseColumn) -> Result<(), EngineError> {
        if self.columns.is_empty() {
            self.len = column.len();
        } else if column.len() != self.len {
            return Err(EngineError::Schema(format!(
                "column {:?} has {} rows, table {:?} has {}",
                column.name(),
                column.len(),
                self.name,
                self.len
            )));
        }
        let name = column.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(EngineError::Schema(format!(
                "duplicate column {:?} on table {:?}",
                name, self.name
            )));
        }
        self.by_name.insert(name, self.columns.len());
        self.columns.push(Arc::new(column));
        Ok(())
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnRef> {
        self.by_name.get(name).map(|&i| &self.columns[i])
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name())
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}
