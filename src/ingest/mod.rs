//! Ingest: the contract external loaders fulfill to produce tables.
//!
//! The engine only requires that a loader appends typed values per row and
//! finalizes every column before handing the table over. Column type
//! annotations arrive as a TOML document parsed into [`ImportOptions`].

pub mod csv;

pub use csv::load_csv_table;

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::column::PhysicalType;
use crate::error::EngineError;

/// Declared column type. `Auto` infers from the data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Auto,
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    Datetime,
    Duration,
}

impl ColumnType {
    pub fn physical(self) -> Option<PhysicalType> {
        match self {
            ColumnType::Auto => None,
            ColumnType::String => Some(PhysicalType::Str),
            ColumnType::Int8 => Some(PhysicalType::Int8),
            ColumnType::Int16 => Some(PhysicalType::Int16),
            ColumnType::Int32 => Some(PhysicalType::Int32),
            ColumnType::Int64 => Some(PhysicalType::Int64),
            ColumnType::Uint8 => Some(PhysicalType::UInt8),
            ColumnType::Uint16 => Some(PhysicalType::UInt16),
            ColumnType::Uint32 => Some(PhysicalType::UInt32),
            ColumnType::Uint64 => Some(PhysicalType::UInt64),
            ColumnType::Float32 => Some(PhysicalType::Float32),
            ColumnType::Float64 => Some(PhysicalType::Float64),
            ColumnType::Bool => Some(PhysicalType::Bool),
            ColumnType::Datetime => Some(PhysicalType::Datetime),
            ColumnType::Duration => Some(PhysicalType::Duration),
        }
    }
}

/// Per-column annotation from the schema document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnSource {
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub summable: Option<bool>,
}

/// Options driving an import: annotations keyed by CSV header.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSource>,
}

impl ImportOptions {
    /// Parse the TOML annotation document.
    pub fn from_toml(text: &str) -> Result<ImportOptions, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Schema(format!("invalid schema: {e}")))
    }

    pub fn source_for(&self, header: &str) -> ColumnSource {
        self.columns.get(header).cloned().unwrap_or_default()
    }
}
