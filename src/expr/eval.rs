//! Tree-walking evaluator.
//!
//! Bound to a [`ColumnGetter`] that resolves identifiers at a row. Runtime
//! failures (division by zero, bad casts, unknown columns) come back as
//! structured [`EvalError`]s; the evaluator never panics on well-typed
//! input. Nil is absorbing for arithmetic so absent cells stay absent
//! instead of poisoning the whole column.

use super::builtins;
use super::{BinaryOp, EvalError, Expr, UnaryOp};
use crate::value::Value;

/// Resolves column names at a row for the evaluator.
pub trait ColumnGetter {
    fn get(&self, name: &str, row: usize) -> Result<Value, EvalError>;
}

/// A getter over no columns: literals-only evaluation.
pub struct NoColumns;

impl ColumnGetter for NoColumns {
    fn get(&self, name: &str, _row: usize) -> Result<Value, EvalError> {
        Err(EvalError::UnknownColumn(name.to_string()))
    }
}

pub fn eval(expr: &Expr, getter: &dyn ColumnGetter, row: usize) -> Result<Value, EvalError> {
    match expr {
        Expr::IntLit(i) => Ok(Value::Int(*i)),
        Expr::FloatLit(f) => Ok(Value::Float(*f)),
        Expr::StringLit(s) => Ok(Value::Str(s.clone())),
        Expr::Ident(name) => getter.get(name, row),
        Expr::Unary { op: UnaryOp::Not, expr } => {
            let v = eval(expr, getter, row)?;
            Ok(Value::Bool(!v.truthy()))
        }
        Expr::Unary { op: UnaryOp::Neg, expr } => match eval(expr, getter, row)? {
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Duration(ns) => Ok(Value::Duration(ns.wrapping_neg())),
            Value::Nil => Ok(Value::Nil),
            other => Err(EvalError::TypeMismatch {
                op: "-".to_string(),
                lhs: other.type_name(),
                rhs: "",
            }),
        },
        Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
            let l = eval(lhs, getter, row)?;
            if !l.truthy() {
                return Ok(l);
            }
            eval(rhs, getter, row)
        }
        Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
            let l = eval(lhs, getter, row)?;
            if l.truthy() {
                return Ok(l);
            }
            eval(rhs, getter, row)
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, getter, row)?;
            let r = eval(rhs, getter, row)?;
            binary(*op, l, r)
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, getter, row)?);
            }
            builtins::call(name, values)
        }
        Expr::Method { recv, name, args } => {
            let receiver = eval(recv, getter, row)?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, getter, row)?);
            }
            builtins::method(receiver, name, values)
        }
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn mismatch(op: BinaryOp, l: &Value, r: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol().to_string(),
        lhs: l.type_name(),
        rhs: r.type_name(),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;
    match op {
        Eq => Ok(Value::Bool(values_equal(&l, &r))),
        Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        Lt | Gt | Le | Ge => order(op, &l, &r),
        Add => add(l, r),
        Sub => sub(l, r),
        Mul => mul(l, r),
        Div => div(l, r),
        FloorDiv => floor_div(l, r),
        Rem => rem(l, r),
        Pow => pow(l, r),
        And | Or => Err(EvalError::InvalidArgument {
            func: op.symbol().to_string(),
            message: "short-circuit operator reached binary dispatch".to_string(),
        }),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::Nil, Value::Nil) => true,
        (a, b) if a.type_name() == b.type_name() => a == b,
        _ => false,
    }
}

fn order(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;
    // absent operands never satisfy an ordering
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Bool(false));
    }
    let comparable = l.type_name() == r.type_name()
        || (as_num(l).is_some() && as_num(r).is_some());
    if !comparable {
        return Err(mismatch(op, l, r));
    }
    let ord = l.compare(r);
    let result = match op {
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => unreachable!("order() only handles ordering operators"),
    };
    Ok(Value::Bool(result))
}

fn add(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    // string + anything renders and concatenates
    if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
        return Ok(Value::Str(format!("{}{}", l.render(), r.render())));
    }
    match (&l, &r) {
        (Value::Datetime(a), Value::Duration(b)) | (Value::Duration(b), Value::Datetime(a)) => {
            a.checked_add(*b).map(Value::Datetime).ok_or(EvalError::DurationOverflow)
        }
        (Value::Duration(a), Value::Duration(b)) => {
            a.checked_add(*b).map(Value::Duration).ok_or(EvalError::DurationOverflow)
        }
        _ => match (as_num(&l), as_num(&r)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(Value::Int(a.wrapping_add(b))),
            (Some(a), Some(b)) => Ok(Value::Float(to_f64(a) + to_f64(b))),
            _ => Err(mismatch(BinaryOp::Add, &l, &r)),
        },
    }
}

fn sub(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    match (&l, &r) {
        (Value::Datetime(a), Value::Datetime(b)) => {
            a.checked_sub(*b).map(Value::Duration).ok_or(EvalError::DurationOverflow)
        }
        (Value::Datetime(a), Value::Duration(b)) => {
            a.checked_sub(*b).map(Value::Datetime).ok_or(EvalError::DurationOverflow)
        }
        (Value::Duration(a), Value::Duration(b)) => {
            a.checked_sub(*b).map(Value::Duration).ok_or(EvalError::DurationOverflow)
        }
        _ => match (as_num(&l), as_num(&r)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(Value::Int(a.wrapping_sub(b))),
            (Some(a), Some(b)) => Ok(Value::Float(to_f64(a) - to_f64(b))),
            _ => Err(mismatch(BinaryOp::Sub, &l, &r)),
        },
    }
}

fn mul(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    match (as_num(&l), as_num(&r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(Value::Int(a.wrapping_mul(b))),
        (Some(a), Some(b)) => Ok(Value::Float(to_f64(a) * to_f64(b))),
        _ => Err(mismatch(BinaryOp::Mul, &l, &r)),
    }
}

fn div(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    match (as_num(&l), as_num(&r)) {
        (Some(a), Some(b)) => {
            let divisor = to_f64(b);
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Float(to_f64(a) / divisor))
        }
        _ => Err(mismatch(BinaryOp::Div, &l, &r)),
    }
}

fn floor_div(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    match (as_num(&l), as_num(&r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Int(a.div_euclid(b)))
        }
        (Some(a), Some(b)) => {
            let divisor = to_f64(b);
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Int((to_f64(a) / divisor).floor() as i64))
        }
        _ => Err(mismatch(BinaryOp::FloorDiv, &l, &r)),
    }
}

fn rem(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    match (as_num(&l), as_num(&r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Int(a.rem_euclid(b)))
        }
        (Some(a), Some(b)) => {
            let divisor = to_f64(b);
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let x = to_f64(a);
            // floored modulo, consistent with //
            Ok(Value::Float(x - divisor * (x / divisor).floor()))
        }
        _ => Err(mismatch(BinaryOp::Rem, &l, &r)),
    }
}

fn pow(l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_nil() || r.is_nil() {
        return Ok(Value::Nil);
    }
    match (as_num(&l), as_num(&r)) {
        (Some(a), Some(b)) => Ok(Value::Float(to_f64(a).powf(to_f64(b)))),
        _ => Err(mismatch(BinaryOp::Pow, &l, &r)),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}
