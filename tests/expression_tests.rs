//! Expression language tests: the documented semantics, end to end
//! through compile + eval.

use taxinomia::expr::eval::NoColumns;
use taxinomia::expr::{compile, ColumnGetter, EvalError};
use taxinomia::value::Value;

fn eval(source: &str) -> Value {
    compile(source).unwrap().eval(&NoColumns, 0).unwrap()
}

#[test]
fn test_documented_examples() {
    assert_eq!(
        eval("date_diff(\"2024-02-01\", \"2024-01-01\", \"days\")"),
        Value::Float(31.0)
    );
    assert_eq!(eval("\"hello\".upper()"), Value::Str("HELLO".into()));
    assert_eq!(eval("3 + 2.5"), Value::Float(5.5));
    assert_eq!(eval("7 // 2"), Value::Int(3));
}

#[test]
fn test_source_round_trip() {
    for source in [
        "amount * 0.1",
        "status == \"Delivered\"",
        "not (a and b) or c",
        "min(x, y, 3) ** 2",
        "\"a,b\".split(\",\").upper()",
        "date_diff(end, start, \"hours\") > 1.5",
    ] {
        let compiled = compile(source).unwrap();
        assert_eq!(compiled.source(), source);
    }
}

#[test]
fn test_display_reparses_to_same_ast() {
    for source in [
        "1 + 2 * 3 - 4",
        "2 ** 3 ** 2",
        "-x ** 2",
        "(1 + 2) * (3 - 4)",
        "a and b or not c",
        "len(concat(\"a\", \"b\")) == 2",
        "s.strip().startswith(\"x\")",
    ] {
        let first = compile(source).unwrap();
        let rendered = first.ast().to_string();
        let second = compile(&rendered).unwrap();
        assert_eq!(first.ast(), second.ast(), "{source} -> {rendered}");
    }
}

#[test]
fn test_truthiness_in_boolean_operators() {
    assert_eq!(eval("\"\" or \"fallback\""), Value::Str("fallback".into()));
    assert_eq!(eval("duration(\"0s\") or 7"), Value::Int(7));
    assert_eq!(eval("not duration(\"1h\")"), Value::Bool(false));
}

#[test]
fn test_column_bound_evaluation() {
    struct Row;
    impl ColumnGetter for Row {
        fn get(&self, name: &str, _row: usize) -> Result<Value, EvalError> {
            match name {
                "amount" => Ok(Value::Float(250.0)),
                "status" => Ok(Value::Str("Delivered".into())),
                "missing" => Ok(Value::Nil),
                other => Err(EvalError::UnknownColumn(other.to_string())),
            }
        }
    }

    let expr = compile("amount * 0.1 > 20 and status.startswith(\"D\")").unwrap();
    assert_eq!(expr.eval(&Row, 0).unwrap(), Value::Bool(true));

    // Nil absorbs arithmetic so absent cells stay empty
    let expr = compile("missing + 1").unwrap();
    assert_eq!(expr.eval(&Row, 0).unwrap(), Value::Nil);

    let expr = compile("ghost + 1").unwrap();
    assert!(matches!(expr.eval(&Row, 0), Err(EvalError::UnknownColumn(_))));
}

#[test]
fn test_duration_grammar_days_extension() {
    // `Nd` days accepted on top of the standard h/m/s grammar
    assert_eq!(eval("duration(\"2d\")"), eval("duration(48, \"h\")"));
    assert_eq!(eval("duration(\"1d12h\")"), eval("duration(36, \"h\")"));
}

#[test]
fn test_division_contracts() {
    assert_eq!(eval("7 / 2"), Value::Float(3.5));
    assert_eq!(eval("8 / 2"), Value::Float(4.0));
    assert_eq!(eval("7.5 // 2"), Value::Int(3));
    assert_eq!(eval("-7 // 2"), Value::Int(-4));
    assert_eq!(eval("7 % 3"), Value::Int(1));
    assert_eq!(eval("2 ** 10"), Value::Float(1024.0));
}

#[test]
fn test_lex_errors() {
    assert!(compile("\"unterminated").is_err());
    assert!(compile("1 $ 2").is_err());
}

#[test]
fn test_calendar_buckets_are_calendrical() {
    // January and February 2024 are consecutive calendar months even
    // though their lengths differ
    let jan = eval("months(\"2024-01-31\")");
    let feb = eval("months(\"2024-02-01\")");
    match (jan, feb) {
        (Value::Int(a), Value::Int(b)) => assert_eq!(b, a + 1),
        other => panic!("unexpected: {other:?}"),
    }
}
