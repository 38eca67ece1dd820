//! # Column Store
//!
//! Typed columnar arrays with dictionary encoding for strings.
//!
//! A column starts life as a [`ColumnBuilder`] (append-only), and a one-time
//! [`ColumnBuilder::finalize`] seals it into a [`BaseColumn`]: at that point
//! key-uniqueness is detected and, for string columns, the sorted-rank table
//! is built. Finalized columns are immutable and shared via `Arc` across
//! tables, joins and views.

pub mod dictionary;

pub use dictionary::Dictionary;

use bitvec::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::EngineError;
use crate::value::{format_f64, Value};

/// Physical storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    Str,
    Datetime,
    Duration,
}

impl PhysicalType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PhysicalType::Int8
                | PhysicalType::Int16
                | PhysicalType::Int32
                | PhysicalType::Int64
                | PhysicalType::UInt8
                | PhysicalType::UInt16
                | PhysicalType::UInt32
                | PhysicalType::UInt64
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, PhysicalType::Float32 | PhysicalType::Float64)
    }

    pub fn name(self) -> &'static str {
        match self {
            PhysicalType::Int8 => "i8",
            PhysicalType::Int16 => "i16",
            PhysicalType::Int32 => "i32",
            PhysicalType::Int64 => "i64",
            PhysicalType::UInt8 => "u8",
            PhysicalType::UInt16 => "u16",
            PhysicalType::UInt32 => "u32",
            PhysicalType::UInt64 => "u64",
            PhysicalType::Float32 => "f32",
            PhysicalType::Float64 => "f64",
            PhysicalType::Bool => "bool",
            PhysicalType::Str => "string",
            PhysicalType::Datetime => "datetime",
            PhysicalType::Duration => "duration",
        }
    }
}

/// Immutable column definition: identity and annotation metadata.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub display_name: String,
    /// Label shared by columns that denote the same kind of entity;
    /// seeds join discovery.
    pub entity_type: Option<String>,
    /// Whether the grouping engine may sum this column.
    pub summable: bool,
    pub physical: PhysicalType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, physical: PhysicalType) -> Self {
        let name = name.into();
        let display_name = display_name_for(&name);
        ColumnDef {
            name,
            display_name,
            entity_type: None,
            summable: physical.is_numeric(),
            physical,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        let et = entity_type.into();
        self.entity_type = if et.is_empty() { None } else { Some(et) };
        self
    }

    pub fn with_summable(mut self, summable: bool) -> Self {
        self.summable = summable;
        self
    }
}

/// Default display name: `ship_time` becomes `Ship Time`.
fn display_name_for(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Typed value storage, one vector per physical type.
#[derive(Debug, Clone)]
enum ColumnValues {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(BitVec),
    Str { dict: Dictionary, ids: Vec<u32> },
    Datetime(Vec<i64>),
    Duration(Vec<i64>),
}

impl ColumnValues {
    fn for_type(physical: PhysicalType) -> Self {
        match physical {
            PhysicalType::Int8 => ColumnValues::Int8(Vec::new()),
            PhysicalType::Int16 => ColumnValues::Int16(Vec::new()),
            PhysicalType::Int32 => ColumnValues::Int32(Vec::new()),
            PhysicalType::Int64 => ColumnValues::Int64(Vec::new()),
            PhysicalType::UInt8 => ColumnValues::UInt8(Vec::new()),
            PhysicalType::UInt16 => ColumnValues::UInt16(Vec::new()),
            PhysicalType::UInt32 => ColumnValues::UInt32(Vec::new()),
            PhysicalType::UInt64 => ColumnValues::UInt64(Vec::new()),
            PhysicalType::Float32 => ColumnValues::Float32(Vec::new()),
            PhysicalType::Float64 => ColumnValues::Float64(Vec::new()),
            PhysicalType::Bool => ColumnValues::Bool(BitVec::new()),
            PhysicalType::Str => ColumnValues::Str { dict: Dictionary::new(), ids: Vec::new() },
            PhysicalType::Datetime => ColumnValues::Datetime(Vec::new()),
            PhysicalType::Duration => ColumnValues::Duration(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnValues::Int8(v) => v.len(),
            ColumnValues::Int16(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::UInt8(v) => v.len(),
            ColumnValues::UInt16(v) => v.len(),
            ColumnValues::UInt32(v) => v.len(),
            ColumnValues::UInt64(v) => v.len(),
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Str { ids, .. } => ids.len(),
            ColumnValues::Datetime(v) => v.len(),
            ColumnValues::Duration(v) => v.len(),
        }
    }
}

/// Append-only builder for a base column. Sealed by [`finalize`].
///
/// [`finalize`]: ColumnBuilder::finalize
#[derive(Debug)]
pub struct ColumnBuilder {
    def: ColumnDef,
    values: ColumnValues,
    /// Bit per row, true when the cell is absent.
    absent: BitVec,
    any_absent: bool,
}

impl ColumnBuilder {
    pub fn new(def: ColumnDef) -> Self {
        let values = ColumnValues::for_type(def.physical);
        ColumnBuilder { def, values, absent: BitVec::new(), any_absent: false }
    }

    pub fn def(&self) -> &ColumnDef {
        &self.def
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one value. `Value::Nil` records an absent cell; strings are
    /// dictionary-encoded on the way in. A value that does not fit the
    /// column's physical type is a schema error.
    pub fn append(&mut self, value: Value) -> Result<(), EngineError> {
        if value.is_nil() {
            self.push_default();
            self.absent.push(true);
            self.any_absent = true;
            return Ok(());
        }
        match (&mut self.values, value) {
            (ColumnValues::Int8(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::Int16(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::Int32(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::Int64(v), Value::Int(i)) => v.push(i),
            (ColumnValues::UInt8(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::UInt16(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::UInt32(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::UInt64(v), Value::Int(i)) => v.push(narrow(i, &self.def)?),
            (ColumnValues::Float32(v), Value::Float(f)) => v.push(f as f32),
            (ColumnValues::Float32(v), Value::Int(i)) => v.push(i as f32),
            (ColumnValues::Float64(v), Value::Float(f)) => v.push(f),
            (ColumnValues::Float64(v), Value::Int(i)) => v.push(i as f64),
            (ColumnValues::Bool(v), Value::Bool(b)) => v.push(b),
            (ColumnValues::Str { dict, ids }, Value::Str(s)) => {
                let id = dict.intern(&s);
                ids.push(id);
            }
            (ColumnValues::Datetime(v), Value::Datetime(ns)) => v.push(ns),
            (ColumnValues::Duration(v), Value::Duration(ns)) => v.push(ns),
            (_, other) => {
                return Err(EngineError::Schema(format!(
                    "column {:?} expects {}, got {}",
                    self.def.name,
                    self.def.physical.name(),
                    other.type_name()
                )))
            }
        }
        self.absent.push(false);
        Ok(())
    }

    fn push_default(&mut self) {
        match &mut self.values {
            ColumnValues::Int8(v) => v.push(0),
            ColumnValues::Int16(v) => v.push(0),
            ColumnValues::Int32(v) => v.push(0),
            ColumnValues::Int64(v) => v.push(0),
            ColumnValues::UInt8(v) => v.push(0),
            ColumnValues::UInt16(v) => v.push(0),
            ColumnValues::UInt32(v) => v.push(0),
            ColumnValues::UInt64(v) => v.push(0),
            ColumnValues::Float32(v) => v.push(0.0),
            ColumnValues::Float64(v) => v.push(0.0),
            ColumnValues::Bool(v) => v.push(false),
            ColumnValues::Str { dict, ids } => ids.push(dict.intern("")),
            ColumnValues::Datetime(v) => v.push(0),
            ColumnValues::Duration(v) => v.push(0),
        }
    }

    /// Seal the store: detect key-uniqueness, build the string rank table.
    pub fn finalize(self) -> BaseColumn {
        let len = self.values.len();
        let key = !self.any_absent && is_unique(&self.values);
        let ranks = match &self.values {
            ColumnValues::Str { dict, .. } => Some(dict.ranks()),
            _ => None,
        };
        BaseColumn {
            def: self.def,
            values: self.values,
            absent: if self.any_absent { Some(self.absent) } else { None },
            len,
            key,
            ranks,
        }
    }
}

fn narrow<T: TryFrom<i64>>(i: i64, def: &ColumnDef) -> Result<T, EngineError> {
    T::try_from(i).map_err(|_| {
        EngineError::Schema(format!(
            "value {i} out of range for column {:?} ({})",
            def.name,
            def.physical.name()
        ))
    })
}

fn is_unique(values: &ColumnValues) -> bool {
    fn distinct<T: std::hash::Hash + Eq + Copy>(v: &[T]) -> bool {
        let mut seen = HashSet::with_capacity(v.len());
        v.iter().all(|x| seen.insert(*x))
    }
    match values {
        ColumnValues::Int8(v) => distinct(v),
        ColumnValues::Int16(v) => distinct(v),
        ColumnValues::Int32(v) => distinct(v),
        ColumnValues::Int64(v) => distinct(v),
        ColumnValues::UInt8(v) => distinct(v),
        ColumnValues::UInt16(v) => distinct(v),
        ColumnValues::UInt32(v) => distinct(v),
        ColumnValues::UInt64(v) => distinct(v),
        ColumnValues::Float32(v) => {
            let mut seen = HashSet::with_capacity(v.len());
            v.iter().all(|x| seen.insert(x.to_bits()))
        }
        ColumnValues::Float64(v) => {
            let mut seen = HashSet::with_capacity(v.len());
            v.iter().all(|x| seen.insert(x.to_bits()))
        }
        ColumnValues::Bool(v) => v.len() <= 1 || (v.len() == 2 && v.count_ones() == 1),
        ColumnValues::Str { dict, ids } => dict.len() == ids.len(),
        ColumnValues::Datetime(v) => distinct(v),
        ColumnValues::Duration(v) => distinct(v),
    }
}

/// A finalized base column: immutable values plus the metadata computed at
/// finalize time.
#[derive(Debug, Clone)]
pub struct BaseColumn {
    def: ColumnDef,
    values: ColumnValues,
    absent: Option<BitVec>,
    len: usize,
    key: bool,
    ranks: Option<Vec<u32>>,
}

pub type ColumnRef = Arc<BaseColumn>;

impl BaseColumn {
    pub fn def(&self) -> &ColumnDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn physical(&self) -> PhysicalType {
        self.def.physical
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when all values were distinct at finalize time.
    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.def.entity_type.as_deref()
    }

    pub fn is_absent(&self, row: usize) -> bool {
        self.absent.as_ref().map(|a| a[row]).unwrap_or(false)
    }

    /// The cell as a runtime value; absent cells come back as `Nil`.
    pub fn value(&self, row: usize) -> Value {
        if self.is_absent(row) {
            return Value::Nil;
        }
        match &self.values {
            ColumnValues::Int8(v) => Value::Int(i64::from(v[row])),
            ColumnValues::Int16(v) => Value::Int(i64::from(v[row])),
            ColumnValues::Int32(v) => Value::Int(i64::from(v[row])),
            ColumnValues::Int64(v) => Value::Int(v[row]),
            ColumnValues::UInt8(v) => Value::Int(i64::from(v[row])),
            ColumnValues::UInt16(v) => Value::Int(i64::from(v[row])),
            ColumnValues::UInt32(v) => Value::Int(i64::from(v[row])),
            ColumnValues::UInt64(v) => {
                let x = v[row];
                if x <= i64::MAX as u64 {
                    Value::Int(x as i64)
                } else {
                    Value::Float(x as f64)
                }
            }
            ColumnValues::Float32(v) => Value::Float(f64::from(v[row])),
            ColumnValues::Float64(v) => Value::Float(v[row]),
            ColumnValues::Bool(v) => Value::Bool(v[row]),
            ColumnValues::Str { dict, ids } => Value::Str(dict.value(ids[row]).to_string()),
            ColumnValues::Datetime(v) => Value::Datetime(v[row]),
            ColumnValues::Duration(v) => Value::Duration(v[row]),
        }
    }

    /// Stable rendering of the cell, matching [`Value::render`]. Absent
    /// cells render empty.
    pub fn get_string(&self, row: usize) -> String {
        if self.is_absent(row) {
            return String::new();
        }
        match &self.values {
            // avoid the Value round-trip for the two hottest cases
            ColumnValues::Str { dict, ids } => dict.value(ids[row]).to_string(),
            ColumnValues::Float64(v) => format_f64(v[row]),
            _ => self.value(row).render(),
        }
    }

    pub fn get_i64(&self, row: usize) -> Option<i64> {
        match self.value(row) {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn get_f64(&self, row: usize) -> Option<f64> {
        self.value(row).as_f64()
    }

    pub fn get_bool(&self, row: usize) -> Option<bool> {
        match self.value(row) {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn get_datetime_ns(&self, row: usize) -> Option<i64> {
        match self.value(row) {
            Value::Datetime(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn get_duration_ns(&self, row: usize) -> Option<i64> {
        match self.value(row) {
            Value::Duration(ns) => Some(ns),
            _ => None,
        }
    }

    /// Dictionary id of a string cell.
    pub fn dict_id(&self, row: usize) -> Option<u32> {
        match &self.values {
            ColumnValues::Str { ids, .. } => Some(ids[row]),
            _ => None,
        }
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        match &self.values {
            ColumnValues::Str { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Sorted rank of a dictionary id (string columns only).
    pub fn rank_of_id(&self, id: u32) -> Option<u32> {
        self.ranks.as_ref().map(|r| r[id as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_column(name: &str, values: &[&str]) -> BaseColumn {
        let mut b = ColumnBuilder::new(ColumnDef::new(name, PhysicalType::Str));
        for v in values {
            b.append(Value::Str((*v).to_string())).unwrap();
        }
        b.finalize()
    }

    #[test]
    fn test_key_detection_strings() {
        let unique = string_column("region", &["west", "east", "north"]);
        assert!(unique.is_key());

        let dupes = string_column("status", &["a", "b", "a"]);
        assert!(!dupes.is_key());
    }

    #[test]
    fn test_key_detection_ints() {
        let mut b = ColumnBuilder::new(ColumnDef::new("id", PhysicalType::Int64));
        for i in 0..5 {
            b.append(Value::Int(i)).unwrap();
        }
        assert!(b.finalize().is_key());

        let mut b = ColumnBuilder::new(ColumnDef::new("n", PhysicalType::Int64));
        b.append(Value::Int(1)).unwrap();
        b.append(Value::Int(1)).unwrap();
        assert!(!b.finalize().is_key());
    }

    #[test]
    fn test_absent_rows_break_keys_and_render_empty() {
        let mut b = ColumnBuilder::new(ColumnDef::new("amount", PhysicalType::Float64));
        b.append(Value::Float(1.5)).unwrap();
        b.append(Value::Nil).unwrap();
        let col = b.finalize();
        assert!(!col.is_key());
        assert_eq!(col.value(1), Value::Nil);
        assert_eq!(col.get_string(1), "");
        assert_eq!(col.get_f64(1), None);
        assert_eq!(col.get_f64(0), Some(1.5));
    }

    #[test]
    fn test_dictionary_encoding() {
        let col = string_column("status", &["pending", "shipped", "pending"]);
        assert_eq!(col.dict_id(0), col.dict_id(2));
        assert_ne!(col.dict_id(0), col.dict_id(1));
        assert_eq!(col.dictionary().unwrap().len(), 2);
        assert_eq!(col.get_string(1), "shipped");
    }

    #[test]
    fn test_rank_lookup() {
        let col = string_column("s", &["cherry", "apple", "banana"]);
        let rank = |row: usize| col.rank_of_id(col.dict_id(row).unwrap()).unwrap();
        assert!(rank(1) < rank(2));
        assert!(rank(2) < rank(0));
    }

    #[test]
    fn test_narrow_overflow_is_schema_error() {
        let mut b = ColumnBuilder::new(ColumnDef::new("small", PhysicalType::Int8));
        assert!(b.append(Value::Int(127)).is_ok());
        assert!(b.append(Value::Int(128)).is_err());
    }

    #[test]
    fn test_display_name_default() {
        let def = ColumnDef::new("ship_time", PhysicalType::Duration);
        assert_eq!(def.display_name, "Ship Time");
    }
}
