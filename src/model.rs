//! Data model: the registry of tables, the entity-type index and the
//! auto-discovered join catalog.
//!
//! The model is assembled once at startup and immutable afterwards, so the
//! server shares it read-only across request threads.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::EngineError;
use crate::join::{join_key, Join};
use crate::table::Table;

/// Reference to one column of one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableColumnRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Default)]
pub struct DataModel {
    tables: Vec<Arc<Table>>,
    by_name: HashMap<String, usize>,
    columns_by_entity_type: HashMap<String, Vec<TableColumnRef>>,
    joins: HashMap<String, Arc<Join>>,
}

impl DataModel {
    pub fn new() -> Self {
        DataModel::default()
    }

    /// Register a table and discover joins against every previously known
    /// entity-typed column.
    ///
    /// For each pair of columns sharing an entity type, a join is created
    /// toward whichever side is a key; both directions when both sides are
    /// keys. Only dictionary-encoded string columns participate.
    pub fn add_table(&mut self, table: Table) -> Result<(), EngineError> {
        if self.by_name.contains_key(table.name()) {
            return Err(EngineError::Schema(format!("duplicate table {:?}", table.name())));
        }
        let table = Arc::new(table);

        for column in table.columns() {
            let Some(entity_type) = column.entity_type() else { continue };
            if column.dictionary().is_none() {
                debug!(
                    table = table.name(),
                    column = column.name(),
                    "entity type on non-string column ignored for join discovery"
                );
                continue;
            }
            let new_ref = TableColumnRef {
                table: table.name().to_string(),
                column: column.name().to_string(),
            };

            let known = self
                .columns_by_entity_type
                .get(entity_type)
                .cloned()
                .unwrap_or_default();
            for known_ref in &known {
                let known_table = &self.tables[self.by_name[&known_ref.table]];
                let known_col = known_table.get_column(&known_ref.column).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "entity index references missing column {known_ref:?}"
                    ))
                })?;

                if known_col.is_key() {
                    let join = Join::build(table.name(), column, known_table.name(), known_col)?;
                    debug!(key = join.key(), "join discovered");
                    self.joins.insert(join.key().to_string(), Arc::new(join));
                }
                if column.is_key() {
                    let join = Join::build(known_table.name(), known_col, table.name(), column)?;
                    debug!(key = join.key(), "join discovered");
                    self.joins.insert(join.key().to_string(), Arc::new(join));
                }
            }

            self.columns_by_entity_type
                .entry(entity_type.to_string())
                .or_default()
                .push(new_ref);
        }

        info!(table = table.name(), rows = table.len(), columns = table.column_count(), "table registered");
        self.by_name.insert(table.name().to_string(), self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    fn insert_join(&mut self, join: Join) {
        debug!(key = join.key(), "join discovered");
        self.joins.insert(join.key().to_string(), Arc::new(join));
    }

    pub fn get_table(&self, name: &str) -> Option<&Arc<Table>> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Tables in registration order.
    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    pub fn columns_by_entity_type(&self, entity_type: &str) -> &[TableColumnRef] {
        self.columns_by_entity_type
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn joins(&self) -> &HashMap<String, Arc<Join>> {
        &self.joins
    }

    pub fn get_join(&self, key: &str) -> Option<&Arc<Join>> {
        self.joins.get(key)
    }

    /// The join for `source_table.source_col -> target_table.target_col`.
    pub fn find_join(
        &self,
        source_table: &str,
        source_col: &str,
        target_table: &str,
        target_col: &str,
    ) -> Option<&Arc<Join>> {
        self.get_join(&join_key(source_table, source_col, target_table, target_col))
    }

    /// Joins whose source is a column of the given table, used by the
    /// sidebar join tree.
    pub fn joins_from(&self, table: &str) -> Vec<&Arc<Join>> {
        let mut out: Vec<&Arc<Join>> = self
            .joins
            .values()
            .filter(|j| j.source_table() == table)
            .collect();
        out.sort_by(|a, b| a.key().cmp(b.key()));
        out
    }
}
