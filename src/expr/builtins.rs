//! Built-in functions and string methods.
//!
//! Casts and string helpers follow the conventions the rest of the engine
//! renders with: `str()` uses the stable cell rendering, `int()`/`float()`
//! parse what the column store would emit. Datetime arguments accept either
//! a datetime value or a parseable string.

use super::EvalError;
use crate::value::datetime::{months_since_epoch, quarters_since_epoch, years_since_epoch};
use crate::value::duration::{
    parse_duration, unit_nanos, NANOS_PER_DAY, NANOS_PER_HOUR, NANOS_PER_MICRO, NANOS_PER_MILLI,
    NANOS_PER_MINUTE, NANOS_PER_SECOND, NANOS_PER_WEEK,
};
use crate::value::{format_duration_ns, parse_datetime, Value};

fn arity(func: &str, expected: &str, got: usize) -> EvalError {
    EvalError::WrongArity { func: func.to_string(), expected: expected.to_string(), got }
}

fn bad_cast(value: &Value, to: &'static str) -> EvalError {
    EvalError::BadCast { value: value.render(), to }
}

fn want_string(func: &str, v: &Value) -> Result<String, EvalError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvalError::InvalidArgument {
            func: func.to_string(),
            message: format!("expected string, got {}", other.type_name()),
        }),
    }
}

fn want_int(func: &str, v: &Value) -> Result<i64, EvalError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::InvalidArgument {
            func: func.to_string(),
            message: format!("expected int, got {}", other.type_name()),
        }),
    }
}

/// A datetime operand: a datetime value or a parseable string.
fn want_datetime(func: &str, v: &Value) -> Result<i64, EvalError> {
    match v {
        Value::Datetime(ns) => Ok(*ns),
        Value::Str(s) => parse_datetime(s).map_err(|_| bad_cast(v, "datetime")),
        other => Err(EvalError::InvalidArgument {
            func: func.to_string(),
            message: format!("expected datetime, got {}", other.type_name()),
        }),
    }
}

/// A duration operand: a duration value or a parseable string.
fn want_duration(func: &str, v: &Value) -> Result<i64, EvalError> {
    match v {
        Value::Duration(ns) => Ok(*ns),
        Value::Str(s) => parse_duration(s).map_err(|_| bad_cast(v, "duration")),
        other => Err(EvalError::InvalidArgument {
            func: func.to_string(),
            message: format!("expected duration, got {}", other.type_name()),
        }),
    }
}

pub fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "len" => {
            let [v] = one(name, args)?;
            let s = want_string(name, &v)?;
            Ok(Value::Int(s.chars().count() as i64))
        }
        "str" => {
            let [v] = one(name, args)?;
            Ok(Value::Str(v.render()))
        }
        "int" => {
            let [v] = one(name, args)?;
            match &v {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(*f as i64)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| bad_cast(&v, "int")),
                _ => Err(bad_cast(&v, "int")),
            }
        }
        "float" => {
            let [v] = one(name, args)?;
            match &v {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| bad_cast(&v, "float")),
                _ => Err(bad_cast(&v, "float")),
            }
        }
        "bool" => {
            let [v] = one(name, args)?;
            Ok(Value::Bool(v.truthy()))
        }
        "abs" => {
            let [v] = one(name, args)?;
            match v {
                Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Duration(ns) => Ok(Value::Duration(ns.wrapping_abs())),
                Value::Nil => Ok(Value::Nil),
                other => Err(bad_cast(&other, "number")),
            }
        }
        "round" => {
            if args.is_empty() || args.len() > 2 {
                return Err(arity(name, "1 or 2", args.len()));
            }
            let digits = if args.len() == 2 { want_int(name, &args[1])? } else { 0 };
            let x = match &args[0] {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                Value::Nil => return Ok(Value::Nil),
                other => return Err(bad_cast(other, "number")),
            };
            let scale = 10f64.powi(digits as i32);
            // always Float, even for digits == 0
            Ok(Value::Float((x * scale).round() / scale))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(arity(name, "at least 1", 0));
            }
            let mut best = args[0].clone();
            for v in &args[1..] {
                let keep_new = if name == "min" {
                    v.compare(&best) == std::cmp::Ordering::Less
                } else {
                    v.compare(&best) == std::cmp::Ordering::Greater
                };
                if keep_new {
                    best = v.clone();
                }
            }
            Ok(best)
        }
        "concat" => {
            let mut out = String::new();
            for v in &args {
                out.push_str(&v.render());
            }
            Ok(Value::Str(out))
        }
        "upper" | "lower" | "strip" => {
            let [v] = one(name, args)?;
            if v.is_nil() {
                return Ok(Value::Nil);
            }
            let s = want_string(name, &v)?;
            Ok(Value::Str(match name {
                "upper" => s.to_uppercase(),
                "lower" => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }
        "replace" => {
            let [v, from, to] = three(name, args)?;
            let s = want_string(name, &v)?;
            let from = want_string(name, &from)?;
            let to = want_string(name, &to)?;
            Ok(Value::Str(s.replace(&from, &to)))
        }
        "substr" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(arity(name, "2 or 3", args.len()));
            }
            let s = want_string(name, &args[0])?;
            let start = want_int(name, &args[1])?;
            let end = match args.get(2) {
                Some(v) => Some(want_int(name, v)?),
                None => None,
            };
            Ok(Value::Str(slice_chars(&s, start, end)))
        }
        "split" => {
            let [v, sep] = two(name, args)?;
            let s = want_string(name, &v)?;
            let sep = want_string(name, &sep)?;
            Ok(Value::Str(split_first(&s, &sep)))
        }
        "duration" => match args.len() {
            1 => {
                let ns = want_duration(name, &args[0])?;
                Ok(Value::Duration(ns))
            }
            2 => {
                let per = unit_nanos(&want_string(name, &args[1])?)
                    .map_err(|e| EvalError::InvalidArgument { func: name.to_string(), message: e.to_string() })?;
                let ns = match &args[0] {
                    Value::Int(i) => i.checked_mul(per).ok_or(EvalError::DurationOverflow)?,
                    Value::Float(f) => {
                        let total = f * per as f64;
                        if !total.is_finite() || total.abs() >= i64::MAX as f64 {
                            return Err(EvalError::DurationOverflow);
                        }
                        // fractional nanoseconds truncate
                        total as i64
                    }
                    other => return Err(bad_cast(other, "duration")),
                };
                Ok(Value::Duration(ns))
            }
            n => Err(arity(name, "1 or 2", n)),
        },
        "date_diff" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(arity(name, "2 or 3", args.len()));
            }
            let end = want_datetime(name, &args[0])?;
            let start = want_datetime(name, &args[1])?;
            let per = match args.get(2) {
                Some(v) => unit_nanos(&want_string(name, v)?)
                    .map_err(|e| EvalError::InvalidArgument { func: name.to_string(), message: e.to_string() })?,
                None => NANOS_PER_DAY,
            };
            Ok(Value::Float((end - start) as f64 / per as f64))
        }
        "date_add" | "date_sub" => {
            let [dt, dur] = two(name, args)?;
            let base = want_datetime(name, &dt)?;
            let delta = want_duration(name, &dur)?;
            let ns = if name == "date_add" {
                base.checked_add(delta)
            } else {
                base.checked_sub(delta)
            };
            ns.map(Value::Datetime).ok_or(EvalError::DurationOverflow)
        }
        "seconds" | "minutes" | "hours" | "days" | "weeks" => {
            let [v] = one(name, args)?;
            let ns = want_datetime(name, &v)?;
            let per = match name {
                "seconds" => NANOS_PER_SECOND,
                "minutes" => NANOS_PER_MINUTE,
                "hours" => NANOS_PER_HOUR,
                "days" => NANOS_PER_DAY,
                _ => NANOS_PER_WEEK,
            };
            Ok(Value::Int(ns.div_euclid(per)))
        }
        "months" | "quarters" | "years" => {
            let [v] = one(name, args)?;
            let ns = want_datetime(name, &v)?;
            Ok(Value::Int(match name {
                "months" => months_since_epoch(ns),
                "quarters" => quarters_since_epoch(ns),
                _ => years_since_epoch(ns),
            }))
        }
        "as_nanoseconds" | "as_microseconds" | "as_milliseconds" => {
            let [v] = one(name, args)?;
            let ns = want_duration(name, &v)?;
            Ok(Value::Int(match name {
                "as_nanoseconds" => ns,
                "as_microseconds" => ns / NANOS_PER_MICRO,
                _ => ns / NANOS_PER_MILLI,
            }))
        }
        "as_seconds" | "as_minutes" | "as_hours" | "as_days" => {
            let [v] = one(name, args)?;
            let ns = want_duration(name, &v)?;
            let per = match name {
                "as_seconds" => NANOS_PER_SECOND,
                "as_minutes" => NANOS_PER_MINUTE,
                "as_hours" => NANOS_PER_HOUR,
                _ => NANOS_PER_DAY,
            };
            Ok(Value::Float(ns as f64 / per as f64))
        }
        "format_duration" => {
            let [v] = one(name, args)?;
            let ns = match &v {
                Value::Duration(ns) => *ns,
                Value::Int(ns) => *ns,
                other => return Err(bad_cast(other, "duration")),
            };
            Ok(Value::Str(format_duration_ns(ns)))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

/// Postfix string methods. A Nil receiver stays Nil so absent cells flow
/// through method chains unchanged.
pub fn method(recv: Value, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    if recv.is_nil() {
        return Ok(Value::Nil);
    }
    let s = match recv {
        Value::Str(s) => s,
        other => {
            return Err(EvalError::TypeMismatch {
                op: format!(".{name}()"),
                lhs: other.type_name(),
                rhs: "",
            })
        }
    };

    match name {
        "upper" => no_args(name, args).map(|()| Value::Str(s.to_uppercase())),
        "lower" => no_args(name, args).map(|()| Value::Str(s.to_lowercase())),
        "strip" => no_args(name, args).map(|()| Value::Str(s.trim().to_string())),
        "lstrip" => no_args(name, args).map(|()| Value::Str(s.trim_start().to_string())),
        "rstrip" => no_args(name, args).map(|()| Value::Str(s.trim_end().to_string())),
        "capitalize" => no_args(name, args).map(|()| Value::Str(capitalize(&s))),
        "title" => no_args(name, args).map(|()| Value::Str(title_case(&s))),
        "startswith" => {
            let [p] = one(name, args)?;
            Ok(Value::Bool(s.starts_with(&want_string(name, &p)?)))
        }
        "endswith" => {
            let [p] = one(name, args)?;
            Ok(Value::Bool(s.ends_with(&want_string(name, &p)?)))
        }
        "contains" => {
            let [p] = one(name, args)?;
            Ok(Value::Bool(s.contains(&want_string(name, &p)?)))
        }
        "replace" => {
            let [from, to] = two(name, args)?;
            Ok(Value::Str(s.replace(&want_string(name, &from)?, &want_string(name, &to)?)))
        }
        "split" => {
            let [sep] = one(name, args)?;
            Ok(Value::Str(split_first(&s, &want_string(name, &sep)?)))
        }
        "count" => {
            let [p] = one(name, args)?;
            let p = want_string(name, &p)?;
            if p.is_empty() {
                return Ok(Value::Int(s.chars().count() as i64 + 1));
            }
            Ok(Value::Int(s.matches(&p).count() as i64))
        }
        "find" | "rfind" => {
            let [p] = one(name, args)?;
            let p = want_string(name, &p)?;
            let byte_pos = if name == "find" { s.find(&p) } else { s.rfind(&p) };
            let index = match byte_pos {
                Some(b) => s[..b].chars().count() as i64,
                None => -1,
            };
            Ok(Value::Int(index))
        }
        "isdigit" => no_args(name, args)
            .map(|()| Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isalpha" => no_args(name, args)
            .map(|()| Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => no_args(name, args)
            .map(|()| Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        "isupper" => no_args(name, args).map(|()| {
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            Value::Bool(!cased.is_empty() && cased.iter().all(|c| c.is_uppercase()))
        }),
        "islower" => no_args(name, args).map(|()| {
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            Value::Bool(!cased.is_empty() && cased.iter().all(|c| c.is_lowercase()))
        }),
        _ => Err(EvalError::UnknownMethod(name.to_string())),
    }
}

/// Both the function and method form of `split` return the first part.
fn split_first(s: &str, sep: &str) -> String {
    if sep.is_empty() {
        return s.to_string();
    }
    s.split(sep).next().unwrap_or("").to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Character slice with Python semantics: negative indices count from the
/// end, out-of-range indices clamp.
fn slice_chars(s: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { i + len } else { i };
        i.clamp(0, len) as usize
    };
    let from = clamp(start);
    let to = clamp(end.unwrap_or(len));
    if from >= to {
        return String::new();
    }
    chars[from..to].iter().collect()
}

fn no_args(func: &str, args: Vec<Value>) -> Result<(), EvalError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(arity(func, "0", args.len()))
    }
}

fn one(func: &str, args: Vec<Value>) -> Result<[Value; 1], EvalError> {
    <[Value; 1]>::try_from(args).map_err(|v| arity(func, "1", v.len()))
}

fn two(func: &str, args: Vec<Value>) -> Result<[Value; 2], EvalError> {
    <[Value; 2]>::try_from(args).map_err(|v| arity(func, "2", v.len()))
}

fn three(func: &str, args: Vec<Value>) -> Result<[Value; 3], EvalError> {
    <[Value; 3]>::try_from(args).map_err(|v| arity(func, "3", v.len()))
}
