//! View pipeline benchmarks over a synthetic table.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use taxinomia::column::{ColumnBuilder, ColumnDef, PhysicalType};
use taxinomia::model::DataModel;
use taxinomia::pipeline::Engine;
use taxinomia::query::Query;
use taxinomia::table::Table;
use taxinomia::value::Value;

const ROWS: usize = 100_000;

fn synthetic_engine() -> Engine {
    let statuses = ["Delivered", "Pending", "Shipped", "Cancelled"];
    let regions = ["west", "east", "north", "south", "central"];

    let mut status = ColumnBuilder::new(ColumnDef::new("status", PhysicalType::Str));
    let mut region = ColumnBuilder::new(ColumnDef::new("region", PhysicalType::Str));
    let mut amount = ColumnBuilder::new(ColumnDef::new("amount", PhysicalType::Float64));
    for i in 0..ROWS {
        status.append(Value::Str(statuses[i % statuses.len()].to_string())).unwrap();
        region.append(Value::Str(regions[(i / 7) % regions.len()].to_string())).unwrap();
        amount.append(Value::Float((i % 997) as f64 * 0.5)).unwrap();
    }

    let mut table = Table::new("orders");
    table.add_column(status.finalize()).unwrap();
    table.add_column(region.finalize()).unwrap();
    table.add_column(amount.finalize()).unwrap();

    let mut model = DataModel::new();
    model.add_table(table).unwrap();
    Engine::new(model)
}

fn bench_pipeline(c: &mut Criterion) {
    let engine = synthetic_engine();

    let projection = Query::parse("table=orders&columns=status,region,amount&limit=100").unwrap();
    c.bench_function("projection_100k", |b| {
        b.iter(|| black_box(engine.handle(&projection, 0, None).unwrap()))
    });

    let filtered = Query::parse(
        "table=orders&columns=status,amount&filter:amount=amount%20%3E%20400&limit=100",
    )
    .unwrap();
    c.bench_function("filtered_100k", |b| {
        b.iter(|| black_box(engine.handle(&filtered, 0, None).unwrap()))
    });

    let grouped =
        Query::parse("table=orders&columns=status,region,amount&group=status,region").unwrap();
    c.bench_function("grouped_100k", |b| {
        b.iter(|| black_box(engine.handle(&grouped, 0, None).unwrap()))
    });

    let sorted = Query::parse("table=orders&columns=amount&sort=-amount&limit=50").unwrap();
    c.bench_function("top_k_sort_100k", |b| {
        b.iter(|| black_box(engine.handle(&sorted, 0, None).unwrap()))
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
