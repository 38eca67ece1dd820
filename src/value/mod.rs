//! # Value Type System
//!
//! Runtime values flowing through the expression evaluator and the view
//! pipeline: Int, Float, Str, Bool, Duration (nanoseconds), Datetime
//! (nanoseconds since the Unix epoch) and Nil for absent cells.
//!
//! Rendering is deliberately stable: the same value always produces the
//! same string, so re-executing a view URL reproduces identical output.

pub mod datetime;
pub mod duration;

pub use datetime::{format_datetime_ns, parse_datetime};
pub use duration::{format_duration_ns, parse_duration, unit_nanos};

use std::cmp::Ordering;
use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// Signed duration in nanoseconds.
    Duration(i64),
    /// Nanoseconds since the Unix epoch, timezone-naive UTC.
    Datetime(i64),
    Nil,
}

impl Value {
    /// The name used in type errors and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Duration(_) => "duration",
            Value::Datetime(_) => "datetime",
            Value::Nil => "nil",
        }
    }

    /// Truthiness used by `and`/`or`/`not` and filter results.
    ///
    /// Non-zero numbers, non-empty strings and non-zero instants are true.
    /// Nil is always false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Duration(ns) => *ns != 0,
            Value::Datetime(ns) => *ns != 0,
            Value::Nil => false,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Numeric view as f64, used by aggregation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Duration(ns) => Some(*ns as f64),
            _ => None,
        }
    }

    /// Ordering used by sort keys and group ordering.
    ///
    /// Int and Float compare numerically against each other; otherwise only
    /// values of the same type are ordered. Nil sorts before everything so
    /// absent cells group at the front of an ascending view.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Nil, Value::Nil) => Ordering::Equal,
            (Value::Nil, _) => Ordering::Less,
            (_, Value::Nil) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => total_cmp_f64(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => total_cmp_f64(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => total_cmp_f64(*a, *b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (Value::Datetime(a), Value::Datetime(b)) => a.cmp(b),
            // Mixed incomparable types still order deterministically
            (a, b) => a.type_name().cmp(b.type_name()),
        }
    }

    /// Stable rendering contract shared with the column store.
    ///
    /// Integers in plain base 10, floats losslessly with integer-valued
    /// floats collapsed to integer form, booleans as `True`/`False`,
    /// datetimes in RFC 3339 UTC, durations in the compact `3d4h30m` form.
    pub fn render(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_f64(*f),
            Value::Str(s) => s.clone(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Duration(ns) => format_duration_ns(*ns),
            Value::Datetime(ns) => format_datetime_ns(*ns),
            Value::Nil => String::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn total_cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| {
        // NaN sorts after every real number
        if a.is_nan() && b.is_nan() {
            Ordering::Equal
        } else if a.is_nan() {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    })
}

/// Lossless float rendering. Rust's shortest round-trip formatting already
/// collapses integer-valued floats (`10.0` renders as `"10"`), which is the
/// contract the column store wants.
pub fn format_f64(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(1).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::Float(0.5).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::Nil.truthy());
        assert!(Value::Duration(1).truthy());
        assert!(!Value::Duration(0).truthy());
    }

    #[test]
    fn test_render_numbers() {
        assert_eq!(Value::Int(42).render(), "42");
        assert_eq!(Value::Int(-7).render(), "-7");
        assert_eq!(Value::Float(2.5).render(), "2.5");
        // integer-valued floats collapse to integer form
        assert_eq!(Value::Float(10.0).render(), "10");
        assert_eq!(Value::Float(-3.0).render(), "-3");
    }

    #[test]
    fn test_render_bool_and_nil() {
        assert_eq!(Value::Bool(true).render(), "True");
        assert_eq!(Value::Bool(false).render(), "False");
        assert_eq!(Value::Nil.render(), "");
    }

    #[test]
    fn test_compare_numeric_promotion() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.0)), Ordering::Equal);
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.5).compare(&Value::Int(3)), Ordering::Greater);
    }

    #[test]
    fn test_nil_sorts_first() {
        assert_eq!(Value::Nil.compare(&Value::Int(i64::MIN)), Ordering::Less);
        assert_eq!(Value::Str("a".into()).compare(&Value::Nil), Ordering::Greater);
    }
}
