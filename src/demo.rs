//! Built-in demo dataset: the `orders` table joined to `regions`.
//!
//! Thirty orders with a status, a region, an amount, a creation date and a
//! shipping duration, plus a small region registry keyed by the shared
//! `demo.region` entity type. Loaded by `--demo` and reused by the
//! integration tests.

use crate::column::{ColumnBuilder, ColumnDef, PhysicalType};
use crate::error::EngineError;
use crate::model::DataModel;
use crate::table::Table;
use crate::value::{parse_datetime, parse_duration, Value};

const ORDERS: [(&str, &str, f64, &str, &str); 30] = [
    ("Delivered", "west", 120.0, "2024-01-01", "2d4h"),
    ("Pending", "east", 80.5, "2024-01-02", "0s"),
    ("Delivered", "east", 310.0, "2024-01-03", "1d2h30m"),
    ("Shipped", "north", 45.25, "2024-01-04", "6h"),
    ("Delivered", "west", 210.0, "2024-01-05", "3d"),
    ("Cancelled", "south", 99.99, "2024-01-06", "0s"),
    ("Pending", "west", 150.0, "2024-01-07", "0s"),
    ("Delivered", "north", 75.0, "2024-01-08", "12h"),
    ("Shipped", "east", 260.4, "2024-01-09", "1d"),
    ("Delivered", "south", 32.5, "2024-01-10", "2d"),
    ("Pending", "north", 410.0, "2024-01-11", "0s"),
    ("Delivered", "west", 55.0, "2024-01-12", "8h15m"),
    ("Cancelled", "east", 120.0, "2024-01-13", "0s"),
    ("Delivered", "east", 89.9, "2024-01-14", "1d6h"),
    ("Shipped", "west", 230.0, "2024-01-15", "20h"),
    ("Delivered", "south", 145.5, "2024-01-16", "2d12h"),
    ("Pending", "east", 62.0, "2024-01-17", "0s"),
    ("Delivered", "north", 305.0, "2024-01-18", "4d"),
    ("Shipped", "south", 18.75, "2024-01-19", "9h30m"),
    ("Delivered", "west", 500.0, "2024-01-20", "1d1h"),
    ("Cancelled", "north", 72.0, "2024-01-21", "0s"),
    ("Delivered", "east", 66.6, "2024-01-22", "16h"),
    ("Pending", "south", 240.0, "2024-01-23", "0s"),
    ("Delivered", "west", 130.0, "2024-01-24", "2d"),
    ("Shipped", "north", 95.0, "2024-01-25", "1d12h"),
    ("Delivered", "south", 280.0, "2024-01-26", "3d6h"),
    ("Pending", "west", 44.0, "2024-01-27", "0s"),
    ("Delivered", "north", 155.25, "2024-01-28", "22h"),
    ("Shipped", "east", 370.0, "2024-01-29", "2d2h"),
    ("Delivered", "south", 205.0, "2024-01-30", "1d18h"),
];

const REGIONS: [(&str, i64, &str); 4] = [
    ("east", 700_000, "Freedonia"),
    ("north", 150_000, "Freedonia"),
    ("south", 320_000, "Sylvania"),
    ("west", 400_000, "Sylvania"),
];

pub fn orders_table() -> Result<Table, EngineError> {
    let mut status = ColumnBuilder::new(ColumnDef::new("status", PhysicalType::Str));
    let mut region = ColumnBuilder::new(
        ColumnDef::new("region", PhysicalType::Str).with_entity_type("demo.region"),
    );
    let mut amount = ColumnBuilder::new(ColumnDef::new("amount", PhysicalType::Float64));
    let mut created = ColumnBuilder::new(ColumnDef::new("created", PhysicalType::Datetime));
    let mut ship_time = ColumnBuilder::new(ColumnDef::new("ship_time", PhysicalType::Duration));

    for (s, r, a, c, t) in ORDERS {
        status.append(Value::Str(s.to_string()))?;
        region.append(Value::Str(r.to_string()))?;
        amount.append(Value::Float(a))?;
        let ns = parse_datetime(c).map_err(|e| EngineError::Schema(e.to_string()))?;
        created.append(Value::Datetime(ns))?;
        let ns = parse_duration(t).map_err(|e| EngineError::Schema(e.to_string()))?;
        ship_time.append(Value::Duration(ns))?;
    }

    let mut table = Table::new("orders");
    table.add_column(status.finalize())?;
    table.add_column(region.finalize())?;
    table.add_column(amount.finalize())?;
    table.add_column(created.finalize())?;
    table.add_column(ship_time.finalize())?;
    Ok(table)
}

pub fn regions_table() -> Result<Table, EngineError> {
    let mut region = ColumnBuilder::new(
        ColumnDef::new("region", PhysicalType::Str).with_entity_type("demo.region"),
    );
    let mut population = ColumnBuilder::new(ColumnDef::new("population", PhysicalType::Int64));
    let mut country = ColumnBuilder::new(ColumnDef::new("country", PhysicalType::Str));

    for (r, p, c) in REGIONS {
        region.append(Value::Str(r.to_string()))?;
        population.append(Value::Int(p))?;
        country.append(Value::Str(c.to_string()))?;
    }

    let mut table = Table::new("regions");
    table.add_column(region.finalize())?;
    table.add_column(population.finalize())?;
    table.add_column(country.finalize())?;
    Ok(table)
}

/// The demo data model: orders plus regions, with the region join
/// discovered automatically.
pub fn demo_model() -> Result<DataModel, EngineError> {
    let mut model = DataModel::new();
    model.add_table(orders_table()?)?;
    model.add_table(regions_table()?)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_shape() {
        let model = demo_model().unwrap();
        let orders = model.get_table("orders").unwrap();
        assert_eq!(orders.len(), 30);
        assert_eq!(orders.column_count(), 5);
        let regions = model.get_table("regions").unwrap();
        assert_eq!(regions.len(), 4);
        assert!(regions.get_column("region").unwrap().is_key());
    }

    #[test]
    fn test_region_join_discovered() {
        let model = demo_model().unwrap();
        assert!(model.get_join("orders.region->regions.region").is_some());
    }
}
