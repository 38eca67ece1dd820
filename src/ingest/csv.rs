//! CSV loading.
//!
//! A quote-aware line splitter plus typed field parsing driven by
//! [`ImportOptions`]. Columns without an annotation infer their type from
//! the first non-empty field: int, float, bool, datetime, duration, then
//! string. Empty fields are absent cells.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use super::{ColumnSource, ImportOptions};
use crate::column::{ColumnBuilder, ColumnDef, PhysicalType};
use crate::error::EngineError;
use crate::table::Table;
use crate::value::{parse_datetime, parse_duration, Value};

/// Load a CSV file into a finalized table.
pub fn load_csv_table(
    name: &str,
    path: impl AsRef<Path>,
    options: &ImportOptions,
) -> Result<Table, EngineError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| EngineError::Schema(format!("cannot open {}: {e}", path.display())))?;
    let reader = BufReader::new(file);

    let mut lines = reader.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| EngineError::Schema(format!("{}: empty file", path.display())))?
        .map_err(|e| EngineError::Schema(format!("{}: {e}", path.display())))?;
    let headers = split_csv_line(&header_line);

    // collect all records up front so Auto columns can infer their type
    let mut records: Vec<Vec<String>> = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let line = line.map_err(|e| EngineError::Schema(format!("{}: {e}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(&line);
        if fields.len() != headers.len() {
            return Err(EngineError::Schema(format!(
                "{}: row {} has {} fields, header has {}",
                path.display(),
                line_no + 2,
                fields.len(),
                headers.len()
            )));
        }
        records.push(fields);
    }

    let mut table = Table::new(name);
    for (index, header) in headers.iter().enumerate() {
        let source = options.source_for(header);
        let physical = source
            .column_type
            .physical()
            .unwrap_or_else(|| infer_type(records.iter().map(|r| r[index].as_str())));

        let mut builder = ColumnBuilder::new(column_def(header, physical, &source));
        for (row, record) in records.iter().enumerate() {
            let value = parse_field(&record[index], physical).map_err(|message| {
                EngineError::Schema(format!(
                    "{}: row {}, column {header:?}: {message}",
                    path.display(),
                    row + 2
                ))
            })?;
            builder.append(value)?;
        }
        table.add_column(builder.finalize())?;
    }

    info!(table = name, rows = table.len(), columns = table.column_count(), path = %path.display(), "csv loaded");
    Ok(table)
}

fn column_def(header: &str, physical: PhysicalType, source: &ColumnSource) -> ColumnDef {
    let mut def = ColumnDef::new(header, physical);
    if let Some(display_name) = &source.display_name {
        def = def.with_display_name(display_name.clone());
    }
    if let Some(entity_type) = &source.entity_type {
        def = def.with_entity_type(entity_type.clone());
    }
    if let Some(summable) = source.summable {
        def = def.with_summable(summable);
    }
    def
}

/// Split one CSV line, honoring double quotes and doubled-quote escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields.iter().map(|f| f.trim().to_string()).collect()
}

/// Infer a physical type from the non-empty fields: the narrowest type
/// every value parses as, in the order int, float, bool, datetime,
/// duration, string.
fn infer_type<'a>(fields: impl Iterator<Item = &'a str>) -> PhysicalType {
    let mut any = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;
    let mut all_datetime = true;
    let mut all_duration = true;

    for field in fields.filter(|f| !f.is_empty()) {
        any = true;
        all_int &= field.parse::<i64>().is_ok();
        all_float &= field.parse::<f64>().is_ok();
        all_bool &= parse_bool(field).is_some();
        all_datetime &= parse_datetime(field).is_ok();
        all_duration &= parse_duration(field).is_ok();
        if !(all_int || all_float || all_bool || all_datetime || all_duration) {
            return PhysicalType::Str;
        }
    }

    if !any {
        PhysicalType::Str
    } else if all_int {
        PhysicalType::Int64
    } else if all_float {
        PhysicalType::Float64
    } else if all_bool {
        PhysicalType::Bool
    } else if all_datetime {
        PhysicalType::Datetime
    } else if all_duration {
        PhysicalType::Duration
    } else {
        PhysicalType::Str
    }
}

fn parse_bool(field: &str) -> Option<bool> {
    match field.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_field(field: &str, physical: PhysicalType) -> Result<Value, String> {
    if field.is_empty() {
        return Ok(Value::Nil);
    }
    match physical {
        PhysicalType::Str => Ok(Value::Str(field.to_string())),
        PhysicalType::Bool => parse_bool(field)
            .map(Value::Bool)
            .ok_or_else(|| format!("invalid bool {field:?}")),
        PhysicalType::Float32 | PhysicalType::Float64 => field
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("invalid float {field:?}")),
        PhysicalType::Datetime => parse_datetime(field)
            .map(Value::Datetime)
            .map_err(|e| e.to_string()),
        PhysicalType::Duration => parse_duration(field)
            .map(Value::Duration)
            .map_err(|e| e.to_string()),
        _ => field
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("invalid integer {field:?}")),
    }
}
