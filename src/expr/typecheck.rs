//! Static type checking for expressions.
//!
//! A conservative pass: columns the getter cannot resolve stay `Unknown`
//! and never block compilation; real conflicts between known types are
//! reported before any row is evaluated.

use super::{BinaryOp, Expr, ExprError, UnaryOp};

/// Static types of the expression value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Int,
    Float,
    Str,
    Bool,
    Duration,
    Datetime,
    Nil,
    Unknown,
}

impl ExprType {
    pub fn name(self) -> &'static str {
        match self {
            ExprType::Int => "int",
            ExprType::Float => "float",
            ExprType::Str => "string",
            ExprType::Bool => "bool",
            ExprType::Duration => "duration",
            ExprType::Datetime => "datetime",
            ExprType::Nil => "nil",
            ExprType::Unknown => "unknown",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, ExprType::Int | ExprType::Float | ExprType::Unknown)
    }
}

/// Resolves column names to static types. Unresolved names return
/// [`ExprType::Unknown`].
pub trait ColumnTypeGetter {
    fn column_type(&self, name: &str) -> ExprType;
}

/// Check an expression, producing its result type.
pub fn check(expr: &Expr, columns: &dyn ColumnTypeGetter) -> Result<ExprType, ExprError> {
    match expr {
        Expr::IntLit(_) => Ok(ExprType::Int),
        Expr::FloatLit(_) => Ok(ExprType::Float),
        Expr::StringLit(_) => Ok(ExprType::Str),
        Expr::Ident(name) => Ok(columns.column_type(name)),
        Expr::Unary { op: UnaryOp::Not, expr } => {
            check(expr, columns)?;
            Ok(ExprType::Bool)
        }
        Expr::Unary { op: UnaryOp::Neg, expr } => {
            let inner = check(expr, columns)?;
            match inner {
                ExprType::Int | ExprType::Float | ExprType::Duration | ExprType::Unknown => Ok(inner),
                other => Err(type_error(format!("cannot negate {}", other.name()), expr)),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lt = check(lhs, columns)?;
            let rt = check(rhs, columns)?;
            check_binary(*op, lt, rt, expr)
        }
        Expr::Call { name, args } => {
            let arg_types = args
                .iter()
                .map(|a| check(a, columns))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(call_result_type(name, &arg_types))
        }
        Expr::Method { recv, name, args } => {
            let rt = check(recv, columns)?;
            if !matches!(rt, ExprType::Str | ExprType::Unknown | ExprType::Nil) {
                return Err(type_error(
                    format!("method .{name}() requires a string receiver, got {}", rt.name()),
                    expr,
                ));
            }
            for a in args {
                check(a, columns)?;
            }
            Ok(method_result_type(name))
        }
    }
}

fn type_error(message: String, subterm: &Expr) -> ExprError {
    ExprError::Type { message: format!("{message} in {subterm}") }
}

fn check_binary(op: BinaryOp, lt: ExprType, rt: ExprType, expr: &Expr) -> Result<ExprType, ExprError> {
    use ExprType::*;
    match op {
        BinaryOp::Or | BinaryOp::And => Ok(if lt == rt { lt } else { Unknown }),
        BinaryOp::Eq | BinaryOp::Ne => Ok(Bool),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let comparable = lt == rt
                || lt == Unknown
                || rt == Unknown
                || lt == Nil
                || rt == Nil
                || (lt.is_numeric() && rt.is_numeric());
            if comparable {
                Ok(Bool)
            } else {
                Err(type_error(format!("cannot order {} and {}", lt.name(), rt.name()), expr))
            }
        }
        BinaryOp::Add => {
            if lt == Str || rt == Str {
                return Ok(Str);
            }
            match (lt, rt) {
                (Datetime, Duration) | (Duration, Datetime) => Ok(Datetime),
                (Duration, Duration) => Ok(Duration),
                (Int, Int) => Ok(Int),
                (a, b) if a.is_numeric() && b.is_numeric() => {
                    Ok(if a == Unknown || b == Unknown { Unknown } else { Float })
                }
                (Nil, _) | (_, Nil) => Ok(Nil),
                _ => Err(type_error(format!("cannot add {} and {}", lt.name(), rt.name()), expr)),
            }
        }
        BinaryOp::Sub => match (lt, rt) {
            (Datetime, Datetime) => Ok(Duration),
            (Datetime, Duration) => Ok(Datetime),
            (Duration, Duration) => Ok(Duration),
            (Int, Int) => Ok(Int),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Ok(if a == Unknown || b == Unknown { Unknown } else { Float })
            }
            (Nil, _) | (_, Nil) => Ok(Nil),
            _ => Err(type_error(
                format!("cannot subtract {} from {}", rt.name(), lt.name()),
                expr,
            )),
        },
        BinaryOp::Mul => match (lt, rt) {
            (Int, Int) => Ok(Int),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Ok(if a == Unknown || b == Unknown { Unknown } else { Float })
            }
            (Nil, _) | (_, Nil) => Ok(Nil),
            _ => Err(type_error(
                format!("cannot multiply {} and {}", lt.name(), rt.name()),
                expr,
            )),
        },
        BinaryOp::Div => require_numeric(op, lt, rt, expr).map(|_| Float),
        BinaryOp::FloorDiv => require_numeric(op, lt, rt, expr).map(|_| Int),
        BinaryOp::Rem => {
            require_numeric(op, lt, rt, expr)?;
            Ok(if lt == Int && rt == Int { Int } else { Float })
        }
        BinaryOp::Pow => require_numeric(op, lt, rt, expr).map(|_| Float),
    }
}

fn require_numeric(op: BinaryOp, lt: ExprType, rt: ExprType, expr: &Expr) -> Result<(), ExprError> {
    if (lt.is_numeric() || lt == ExprType::Nil) && (rt.is_numeric() || rt == ExprType::Nil) {
        Ok(())
    } else {
        Err(type_error(
            format!("operator {} requires numbers, got {} and {}", op.symbol(), lt.name(), rt.name()),
            expr,
        ))
    }
}

/// Result types of built-in functions. Unrecognized names stay `Unknown`;
/// the evaluator reports them per-row.
fn call_result_type(name: &str, args: &[ExprType]) -> ExprType {
    use ExprType::*;
    match name {
        "len" | "int" | "count" | "find" | "rfind" => Int,
        "seconds" | "minutes" | "hours" | "days" | "weeks" | "months" | "quarters" | "years" => Int,
        "as_nanoseconds" | "as_microseconds" | "as_milliseconds" => Int,
        "float" | "round" | "date_diff" => Float,
        "as_seconds" | "as_minutes" | "as_hours" | "as_days" => Float,
        "str" | "concat" | "upper" | "lower" | "strip" | "replace" | "substr" | "split"
        | "format_duration" => Str,
        "bool" => Bool,
        "duration" => Duration,
        "date_add" | "date_sub" => Datetime,
        "abs" => args.first().copied().unwrap_or(Unknown),
        "min" | "max" => {
            let first = args.first().copied().unwrap_or(Unknown);
            if args.iter().all(|&a| a == first) {
                first
            } else {
                Unknown
            }
        }
        _ => Unknown,
    }
}

fn method_result_type(name: &str) -> ExprType {
    use ExprType::*;
    match name {
        "startswith" | "endswith" | "contains" | "isdigit" | "isalpha" | "isalnum" | "isupper"
        | "islower" => Bool,
        "count" | "find" | "rfind" => Int,
        "upper" | "lower" | "strip" | "lstrip" | "rstrip" | "replace" | "split" | "capitalize"
        | "title" => Str,
        _ => Unknown,
    }
}
