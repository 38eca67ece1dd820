//! End-to-end pipeline tests over the demo dataset: URL in, view model out.

use taxinomia::demo::demo_model;
use taxinomia::pipeline::Engine;
use taxinomia::query::Query;
use taxinomia::viewmodel::TableViewModel;

fn engine() -> Engine {
    Engine::new(demo_model().unwrap())
}

fn run(engine: &Engine, query_string: &str) -> TableViewModel {
    let query = Query::parse(query_string).unwrap();
    engine.handle(&query, 0, None).unwrap()
}

#[test]
fn test_ungrouped_projection() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status,region,amount&limit=5");

    let labels: Vec<&str> = model.headers.iter().map(|h| h.label.as_str()).collect();
    assert_eq!(labels, vec!["Status", "Region", "Amount"]);
    assert_eq!(model.total_rows, 30);
    assert_eq!(model.displayed_rows, 5);
    assert!(model.has_more_rows);

    // first rows in insertion order
    assert_eq!(model.rows[0][0].text, "Delivered");
    assert_eq!(model.rows[0][1].text, "west");
    assert_eq!(model.rows[0][2].text, "120");
    assert_eq!(model.rows[1][0].text, "Pending");
    assert_eq!(model.rows[4][2].text, "210");
}

#[test]
fn test_single_filter() {
    let engine = engine();
    let model = run(
        &engine,
        "table=orders&columns=status,amount&filter:status=status%3D%3D%22Delivered%22&limit=100",
    );
    assert_eq!(model.total_rows, 15);
    assert_eq!(model.displayed_rows, 15);
    assert!(!model.has_more_rows);
    for row in &model.rows {
        assert_eq!(row[0].text, "Delivered");
    }
}

#[test]
fn test_group_and_aggregate() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status,region,amount&group=status,region&limit=100");

    // top level: the four distinct statuses, in value order
    let top_labels: Vec<&str> = model
        .rows
        .iter()
        .flat_map(|row| row.iter())
        .filter(|cell| cell.group_level == Some(1) && cell.rowspan > 0)
        .map(|cell| cell.text.as_str())
        .collect();
    assert_eq!(top_labels.len(), 4);
    assert!(top_labels[0].starts_with("Cancelled"));
    assert!(top_labels[1].starts_with("Delivered"));
    assert!(top_labels[2].starts_with("Pending"));
    assert!(top_labels[3].starts_with("Shipped"));

    // every amount cell shows [subtotal/total] with a shared total
    let amount_cells: Vec<&str> = model
        .rows
        .iter()
        .map(|row| row[2].text.as_str())
        .collect();
    assert!(!amount_cells.is_empty());
    let shared_total: Vec<&str> = amount_cells
        .iter()
        .map(|c| {
            assert!(c.starts_with('[') && c.ends_with(']'), "not a sum cell: {c}");
            c.trim_matches(['[', ']']).split('/').nth(1).unwrap()
        })
        .collect();
    assert!(shared_total.windows(2).all(|w| w[0] == w[1]));

    // subtotals over the whole tree add up to the shared total
    let sub_sum: f64 = amount_cells
        .iter()
        .map(|c| c.trim_matches(['[', ']']).split('/').next().unwrap().parse::<f64>().unwrap())
        .sum();
    let total: f64 = shared_total[0].parse().unwrap();
    assert!((sub_sum - total).abs() < 1e-6);

    // rowspans of top-level groups cover all leaf rows
    let span_sum: u32 = model
        .rows
        .iter()
        .flat_map(|row| row.iter())
        .filter(|cell| cell.group_level == Some(1))
        .map(|cell| cell.rowspan)
        .sum();
    assert_eq!(span_sum as usize, model.rows.len());
}

#[test]
fn test_computed_column_with_filter() {
    let engine = engine();
    let model = run(
        &engine,
        "table=orders&columns=region,amount,tax&compute:tax=amount%20*%200.1&filter:tax=tax%3E20",
    );
    assert!(model.errors.is_empty(), "unexpected errors: {:?}", model.errors);
    // exactly the rows with amount > 200 survive
    assert_eq!(model.total_rows, 11);
    for row in &model.rows {
        let amount: f64 = row[1].text.parse().unwrap();
        let tax: f64 = row[2].text.parse().unwrap();
        assert!(amount > 200.0);
        assert!((tax - amount * 0.1).abs() < 1e-9);
    }
}

#[test]
fn test_join_expansion() {
    let engine = engine();
    let model = run(
        &engine,
        "table=orders&columns=region,region.regions.region.population&limit=10",
    );
    assert_eq!(model.displayed_rows, 10);

    let expected = |region: &str| match region {
        "east" => "700000",
        "north" => "150000",
        "south" => "320000",
        "west" => "400000",
        other => panic!("unexpected region {other:?}"),
    };
    for row in &model.rows {
        assert_eq!(row[1].text, expected(&row[0].text));
    }
}

#[test]
fn test_linear_sort_descending() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=amount&sort=-amount&limit=3");
    let amounts: Vec<f64> = model.rows.iter().map(|r| r[0].text.parse().unwrap()).collect();
    assert_eq!(amounts, vec![500.0, 410.0, 370.0]);
}

#[test]
fn test_sort_by_string_uses_value_order() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status&sort=status&limit=100");
    let statuses: Vec<&str> = model.rows.iter().map(|r| r[0].text.as_str()).collect();
    let mut sorted = statuses.clone();
    sorted.sort();
    assert_eq!(statuses, sorted);
}

#[test]
fn test_determinism() {
    let engine = engine();
    let url = "table=orders&columns=status,region,amount&group=status&sort=-amount&limit=10";
    let a = run(&engine, url);
    let b = run(&engine, url);
    // identical output modulo timings
    assert_eq!(
        serde_json::to_value(&a.rows).unwrap(),
        serde_json::to_value(&b.rows).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&a.headers).unwrap(),
        serde_json::to_value(&b.headers).unwrap()
    );
    assert_eq!(a.query_string, b.query_string);
}

#[test]
fn test_filter_monotonicity() {
    let engine = engine();
    let unfiltered = run(&engine, "table=orders&columns=amount");
    let one = run(&engine, "table=orders&columns=amount&filter:amount=amount%3E100");
    let two = run(
        &engine,
        "table=orders&columns=amount&filter:amount=amount%3E100&filter:region=region%3D%3D%22west%22",
    );
    assert!(one.total_rows <= unfiltered.total_rows);
    assert!(two.total_rows <= one.total_rows);
}

#[test]
fn test_limit_semantics() {
    let engine = engine();
    for limit in [1, 5, 30, 100] {
        let model = run(&engine, &format!("table=orders&columns=status&limit={limit}"));
        assert!(model.displayed_rows <= limit);
        assert_eq!(model.has_more_rows, model.displayed_rows < model.total_rows);
    }
}

#[test]
fn test_unknown_table_is_engine_error() {
    let engine = engine();
    let query = Query::parse("table=nope").unwrap();
    let err = engine.handle(&query, 0, None).unwrap_err();
    assert!(matches!(err, taxinomia::EngineError::UnknownTable(_)));
}

#[test]
fn test_invalid_filter_degrades_to_pass_through() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status&filter:status=status%20%3D%3D");
    assert_eq!(model.errors.filter_errors.len(), 1);
    // the broken filter passes everything through
    assert_eq!(model.total_rows, 30);
}

#[test]
fn test_unknown_filter_column_reported() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status&filter:ghost=ghost%3E1");
    assert_eq!(model.errors.filter_errors.len(), 1);
    assert_eq!(model.errors.filter_errors[0].column, "ghost");
    assert_eq!(model.total_rows, 30);
}

#[test]
fn test_broken_computed_column_degrades() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status,bad&compute:bad=amount%20%2B");
    assert_eq!(model.errors.computed_errors.len(), 1);
    // the degraded column renders empty but the view still works
    assert_eq!(model.total_rows, 30);
    assert!(model.rows.iter().all(|r| r[1].text.is_empty()));
}

#[test]
fn test_filter_defined_buckets() {
    let engine = engine();
    // two alternatives on a grouped column become buckets plus a catch-all
    let model = run(
        &engine,
        "table=orders&columns=status,amount&group=status\
         &filter:status=status%3D%3D%22Delivered%22%3B%3Bstatus%3D%3D%22Pending%22",
    );
    // bucket filters do not mask rows away
    assert_eq!(model.total_rows, 30);
    let labels: Vec<&str> = model
        .rows
        .iter()
        .flat_map(|r| r.iter())
        .filter(|c| c.group_level == Some(1) && c.rowspan > 0)
        .map(|c| c.text.as_str())
        .collect();
    assert_eq!(labels.len(), 3);
    assert!(labels[0].contains("Delivered"));
    assert!(labels[1].contains("Pending"));
    assert!(labels[2].starts_with('\u{2026}'));
}

#[test]
fn test_per_user_views_are_isolated() {
    let engine = engine();
    run(&engine, "table=orders&columns=status&user=ada&compute:tax=amount%20*%200.1");
    run(&engine, "table=orders&columns=status&user=bob");
    assert_eq!(engine.view_count(), 2);
}

#[test]
fn test_concurrent_requests_same_user() {
    use std::sync::Arc;

    let engine = Arc::new(engine());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(std::thread::spawn(move || {
            for _ in 0..20 {
                let model = run(&engine, "table=orders&columns=status,amount&group=status&user=ada");
                assert_eq!(model.total_rows, 30);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(engine.view_count(), 1);
}

#[test]
fn test_timings_are_collected() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status,amount&group=status");
    // stage timers ran; exact values are environment-dependent
    let json = serde_json::to_value(model.timings).unwrap();
    assert!(json.get("filter_us").is_some());
    assert!(json.get("group_sort_us").is_some());
}

#[test]
fn test_sidebar_join_tree() {
    let engine = engine();
    let model = run(&engine, "table=orders&columns=status");
    let region = model
        .sidebar
        .iter()
        .find(|n| n.colref.as_deref() == Some("region"))
        .unwrap();
    // the region column offers the join edge to regions
    assert_eq!(region.children.len(), 1);
    let edge = &region.children[0];
    assert_eq!(edge.expand_key.as_deref(), Some("region.regions.region"));
    assert!(!edge.expanded);
    assert!(edge.children.is_empty());

    // expanding the edge exposes the target columns as addable refs
    let model = run(&engine, "table=orders&columns=status&expanded=region.regions.region");
    let region = model
        .sidebar
        .iter()
        .find(|n| n.colref.as_deref() == Some("region"))
        .unwrap();
    let edge = &region.children[0];
    assert!(edge.expanded);
    let refs: Vec<&str> = edge
        .children
        .iter()
        .filter_map(|n| n.colref.as_deref())
        .collect();
    assert!(refs.contains(&"region.regions.region.population"));
}

#[test]
fn test_cancelled_request_fails() {
    let engine = engine();
    let cancel = taxinomia::CancelHandle::new();
    cancel.cancel();
    let query = Query::parse("table=orders&columns=status&group=status").unwrap();
    let err = engine.handle(&query, 0, Some(&cancel)).unwrap_err();
    assert!(matches!(err, taxinomia::EngineError::Cancelled));
}
