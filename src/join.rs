//! Join engine: precomputed lookups from a source column's dictionary ids
//! to row indices in a target table.
//!
//! A join `(A.a) -> (B.b)` requires the two columns to share an entity type
//! and `B.b` to be a key. The lookup is a dense vector indexed by `A.a`'s
//! dictionary id; absent matches map to [`NO_MATCH`] and render empty.

use std::sync::Arc;

use crate::column::{BaseColumn, ColumnRef, PhysicalType};
use crate::error::EngineError;
use crate::value::Value;

/// Sentinel row index meaning "no row in the target table".
pub const NO_MATCH: u32 = u32::MAX;

/// Canonical reference to a column of the current view: either a base
/// column by name or a joined column by its 4-segment path
/// `fromCol.toTable.toCol.selectedCol`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnPath {
    Base(String),
    Joined {
        from_col: String,
        to_table: String,
        to_col: String,
        selected: String,
    },
}

impl ColumnPath {
    /// Parse a canonical reference. A reference with dots must have exactly
    /// four segments.
    pub fn parse(s: &str) -> Result<ColumnPath, EngineError> {
        if !s.contains('.') {
            return Ok(ColumnPath::Base(s.to_string()));
        }
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(EngineError::Schema(format!("invalid column reference: {s:?}")));
        }
        Ok(ColumnPath::Joined {
            from_col: parts[0].to_string(),
            to_table: parts[1].to_string(),
            to_col: parts[2].to_string(),
            selected: parts[3].to_string(),
        })
    }

    /// The canonical string form, the inverse of [`parse`].
    ///
    /// [`parse`]: ColumnPath::parse
    pub fn canonical(&self) -> String {
        match self {
            ColumnPath::Base(name) => name.clone(),
            ColumnPath::Joined { from_col, to_table, to_col, selected } => {
                format!("{from_col}.{to_table}.{to_col}.{selected}")
            }
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, ColumnPath::Joined { .. })
    }
}

impl std::fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// A directed, precomputed join between two entity-typed string columns.
#[derive(Debug)]
pub struct Join {
    key: String,
    source_table: String,
    source_column: String,
    target_table: String,
    target_column: String,
    /// Indexed by the source column's dictionary id.
    value_to_row: Vec<u32>,
}

impl Join {
    /// Build the lookup for `source -> target`. The target column must be a
    /// dictionary-encoded key; duplicate target values are a configuration
    /// error.
    pub fn build(
        source_table: &str,
        source: &BaseColumn,
        target_table: &str,
        target: &BaseColumn,
    ) -> Result<Join, EngineError> {
        let key = join_key(source_table, source.name(), target_table, target.name());
        if source.physical() != PhysicalType::Str || target.physical() != PhysicalType::Str {
            return Err(EngineError::Schema(format!(
                "join {key:?} requires string columns on both sides"
            )));
        }
        let target_dict = target
            .dictionary()
            .ok_or_else(|| EngineError::Internal(format!("join {key:?}: target has no dictionary")))?;

        // Row of each target value. The target being a key makes this map
        // total and injective; a duplicate id is an AmbiguousJoin.
        let mut id_to_row = vec![NO_MATCH; target_dict.len()];
        for row in 0..target.len() {
            let id = target
                .dict_id(row)
                .ok_or_else(|| EngineError::Internal(format!("join {key:?}: missing dict id")))?;
            if id_to_row[id as usize] != NO_MATCH {
                return Err(EngineError::AmbiguousJoin {
                    key,
                    value: target_dict.value(id).to_string(),
                });
            }
            id_to_row[id as usize] = row as u32;
        }

        let source_dict = source
            .dictionary()
            .ok_or_else(|| EngineError::Internal(format!("join {key:?}: source has no dictionary")))?;
        let mut value_to_row = vec![NO_MATCH; source_dict.len()];
        for id in 0..source_dict.len() as u32 {
            if let Some(target_id) = target_dict.id_of(source_dict.value(id)) {
                value_to_row[id as usize] = id_to_row[target_id as usize];
            }
        }

        Ok(Join {
            key,
            source_table: source_table.to_string(),
            source_column: source.name().to_string(),
            target_table: target_table.to_string(),
            target_column: target.name().to_string(),
            value_to_row,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    pub fn source_column(&self) -> &str {
        &self.source_column
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Target row for a source dictionary id, or `None` for no match.
    pub fn row_for(&self, source_dict_id: u32) -> Option<usize> {
        match self.value_to_row.get(source_dict_id as usize) {
            Some(&row) if row != NO_MATCH => Some(row as usize),
            _ => None,
        }
    }
}

/// Canonical join key `"A.a->B.b"`.
pub fn join_key(source_table: &str, source_col: &str, target_table: &str, target_col: &str) -> String {
    format!("{source_table}.{source_col}->{target_table}.{target_col}")
}

/// A column that borrows its values from a target table through a join.
#[derive(Debug, Clone)]
pub struct JoinedColumn {
    path: ColumnPath,
    source: ColumnRef,
    join: Arc<Join>,
    selected: ColumnRef,
}

impl JoinedColumn {
    pub fn new(path: ColumnPath, source: ColumnRef, join: Arc<Join>, selected: ColumnRef) -> Self {
        JoinedColumn { path, source, join, selected }
    }

    pub fn path(&self) -> &ColumnPath {
        &self.path
    }

    pub fn selected(&self) -> &ColumnRef {
        &self.selected
    }

    /// Header text: the selected target column's display name.
    pub fn display_name(&self) -> &str {
        &self.selected.def().display_name
    }

    fn target_row(&self, row: usize) -> Option<usize> {
        let id = self.source.dict_id(row)?;
        self.join.row_for(id)
    }

    /// Value at a local row, mapped through the join. No match yields Nil.
    pub fn value(&self, row: usize) -> Value {
        match self.target_row(row) {
            Some(target) => self.selected.value(target),
            None => Value::Nil,
        }
    }

    pub fn get_string(&self, row: usize) -> String {
        match self.target_row(row) {
            Some(target) => self.selected.get_string(target),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnBuilder, ColumnDef, PhysicalType};

    fn string_column(name: &str, entity: &str, values: &[&str]) -> BaseColumn {
        let def = ColumnDef::new(name, PhysicalType::Str).with_entity_type(entity);
        let mut b = ColumnBuilder::new(def);
        for v in values {
            b.append(Value::Str((*v).to_string())).unwrap();
        }
        b.finalize()
    }

    fn int_column(name: &str, values: &[i64]) -> BaseColumn {
        let mut b = ColumnBuilder::new(ColumnDef::new(name, PhysicalType::Int64));
        for &v in values {
            b.append(Value::Int(v)).unwrap();
        }
        b.finalize()
    }

    #[test]
    fn test_path_parse_roundtrip() {
        assert_eq!(ColumnPath::parse("amount").unwrap(), ColumnPath::Base("amount".into()));
        let joined = ColumnPath::parse("region.regions.region.population").unwrap();
        assert_eq!(joined.canonical(), "region.regions.region.population");
        assert!(joined.is_joined());
        assert!(ColumnPath::parse("a.b").is_err());
        assert!(ColumnPath::parse("a..b.c").is_err());
    }

    #[test]
    fn test_join_lookup() {
        let source = string_column("region", "demo.region", &["west", "east", "west", "south"]);
        let target = string_column("region", "demo.region", &["east", "west"]);
        let join = Join::build("orders", &source, "regions", &target).unwrap();

        assert_eq!(join.key(), "orders.region->regions.region");
        // west -> row 1, east -> row 0, south -> no match
        assert_eq!(join.row_for(source.dict_id(0).unwrap()), Some(1));
        assert_eq!(join.row_for(source.dict_id(1).unwrap()), Some(0));
        assert_eq!(join.row_for(source.dict_id(3).unwrap()), None);
    }

    #[test]
    fn test_ambiguous_target_rejected() {
        let source = string_column("region", "demo.region", &["west"]);
        let target = string_column("region", "demo.region", &["west", "west"]);
        let err = Join::build("orders", &source, "regions", &target).unwrap_err();
        assert!(matches!(err, EngineError::AmbiguousJoin { .. }));
    }

    #[test]
    fn test_joined_column_values() {
        let source = Arc::new(string_column("region", "demo.region", &["west", "east", "south"]));
        let target = Arc::new(string_column("region", "demo.region", &["east", "west"]));
        let population = Arc::new(int_column("population", &[400, 700]));

        let join = Arc::new(Join::build("orders", &source, "regions", &target).unwrap());
        let path = ColumnPath::parse("region.regions.region.population").unwrap();
        let jc = JoinedColumn::new(path, source, join, population);

        assert_eq!(jc.value(0), Value::Int(700));
        assert_eq!(jc.value(1), Value::Int(400));
        assert_eq!(jc.value(2), Value::Nil);
        assert_eq!(jc.get_string(2), "");
    }
}
