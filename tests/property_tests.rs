//! Property tests: expression round-trips, duration formatting, top-K
//! agreement with a full sort, and filter monotonicity.

use proptest::prelude::*;

use taxinomia::demo::demo_model;
use taxinomia::expr::{compile, BinaryOp, Expr, UnaryOp};
use taxinomia::pipeline::Engine;
use taxinomia::query::Query;
use taxinomia::sort::top_k_rows;
use taxinomia::value::{format_duration_ns, parse_duration};

fn arb_ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,5}".prop_filter("keywords are reserved", |s| {
        s != "and" && s != "or" && s != "not"
    })
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0i64..1000).prop_map(Expr::IntLit),
        (0.0f64..1000.0).prop_map(Expr::FloatLit),
        "[a-zA-Z0-9 ,.!]{0,8}".prop_map(Expr::StringLit),
        arb_ident().prop_map(Expr::Ident),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        let op = prop_oneof![
            Just(BinaryOp::Or),
            Just(BinaryOp::And),
            Just(BinaryOp::Eq),
            Just(BinaryOp::Ne),
            Just(BinaryOp::Lt),
            Just(BinaryOp::Gt),
            Just(BinaryOp::Le),
            Just(BinaryOp::Ge),
            Just(BinaryOp::Add),
            Just(BinaryOp::Sub),
            Just(BinaryOp::Mul),
            Just(BinaryOp::Div),
            Just(BinaryOp::FloorDiv),
            Just(BinaryOp::Rem),
            Just(BinaryOp::Pow),
        ];
        prop_oneof![
            (op, inner.clone(), inner.clone()).prop_map(|(op, lhs, rhs)| Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }),
            inner.clone().prop_map(|e| Expr::Unary { op: UnaryOp::Neg, expr: Box::new(e) }),
            inner.clone().prop_map(|e| Expr::Unary { op: UnaryOp::Not, expr: Box::new(e) }),
            (arb_ident(), prop::collection::vec(inner.clone(), 0..3))
                .prop_map(|(name, args)| Expr::Call { name, args }),
            (inner.clone(), arb_ident(), prop::collection::vec(inner, 0..2)).prop_map(
                |(recv, name, args)| Expr::Method { recv: Box::new(recv), name, args }
            ),
        ]
    })
}

proptest! {
    /// Rendering an AST and reparsing it yields the same AST: precedence
    /// and parenthesization in Display are faithful.
    #[test]
    fn display_reparses_to_same_ast(expr in arb_expr()) {
        let rendered = expr.to_string();
        let reparsed = compile(&rendered)
            .unwrap_or_else(|e| panic!("failed to reparse {rendered:?}: {e}"));
        prop_assert_eq!(reparsed.ast(), &expr, "rendered as {}", rendered);
    }

    /// Compiling keeps the source byte-exact.
    #[test]
    fn compile_keeps_source(expr in arb_expr()) {
        let rendered = expr.to_string();
        let compiled = compile(&rendered).unwrap();
        prop_assert_eq!(compiled.source(), rendered.as_str());
    }

    /// The compact duration format parses back to the same value.
    #[test]
    fn duration_round_trip(ns in (i64::MIN + 1)..i64::MAX) {
        let text = format_duration_ns(ns);
        prop_assert_eq!(parse_duration(&text).unwrap(), ns);
    }

    /// Bounded insertion agrees with a full stable sort cut to k.
    #[test]
    fn top_k_matches_full_sort(values in prop::collection::vec(0u32..50, 0..200), k in 0usize..20) {
        let rows: Vec<u32> = (0..values.len() as u32).collect();
        let cmp = |a: u32, b: u32| values[a as usize].cmp(&values[b as usize]);
        let clipped = top_k_rows(rows.iter().copied(), k, cmp);

        let mut full: Vec<u32> = rows;
        full.sort_by_key(|&r| values[r as usize]);
        let take = if k == 0 { full.len() } else { k.min(full.len()) };
        prop_assert_eq!(clipped, full[..take].to_vec());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Adding an amount filter never increases the row count, whatever the
    /// threshold.
    #[test]
    fn filter_monotonicity(threshold in 0.0f64..600.0) {
        let engine = Engine::new(demo_model().unwrap());
        let base = engine
            .handle(&Query::parse("table=orders&columns=amount").unwrap(), 0, None)
            .unwrap();
        let query = format!("table=orders&columns=amount&filter:amount=amount%20%3E%20{threshold}");
        let filtered = engine.handle(&Query::parse(&query).unwrap(), 0, None).unwrap();
        prop_assert!(filtered.total_rows <= base.total_rows);
    }
}
