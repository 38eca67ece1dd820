//! # Expression Engine
//!
//! Lexer, recursive-descent parser, static type checker and tree-walking
//! evaluator for the small expression language used by computed columns,
//! filters and group expressions.
//!
//! A [`CompiledExpr`] keeps the original source text, so serializing a view
//! back into a URL reproduces the expression byte-exactly.

pub mod builtins;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod typecheck;

pub use eval::{eval, ColumnGetter};
pub use typecheck::{check, ColumnTypeGetter, ExprType};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::value::Value;

/// Compile-time expression errors, split by stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("lex error at offset {pos}: {message}")]
    Lex { pos: usize, message: String },
    #[error("parse error at offset {pos}: {message}")]
    Parse { pos: usize, message: String },
    #[error("type error: {message}")]
    Type { message: String },
}

/// Per-row evaluation errors. These never abort a request; the owning
/// column records them and the cell renders empty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown column: {0:?}")]
    UnknownColumn(String),
    #[error("unknown function: {0:?}")]
    UnknownFunction(String),
    #[error("unknown method: {0:?}")]
    UnknownMethod(String),
    #[error("{func}() expects {expected} arguments, got {got}")]
    WrongArity { func: String, expected: String, got: usize },
    #[error("cannot cast {value:?} to {to}")]
    BadCast { value: String, to: &'static str },
    #[error("unsupported operand types for {op}: {lhs} and {rhs}")]
    TypeMismatch { op: String, lhs: &'static str, rhs: &'static str },
    #[error("duration overflow")]
    DurationOverflow,
    #[error("{func}(): {message}")]
    InvalidArgument { func: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Rem => 6,
            BinaryOp::Pow => 7,
        }
    }
}

/// Expression AST. Method calls get a dedicated node rather than the
/// `__method__` encoding; the two are semantically equivalent.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Ident(String),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Method { recv: Box<Expr>, name: String, args: Vec<Expr> },
}

impl Expr {
    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        match self {
            Expr::IntLit(i) => write!(f, "{i}"),
            Expr::FloatLit(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Expr::StringLit(s) => write!(f, "{s:?}"),
            Expr::Ident(name) => f.write_str(name),
            Expr::Unary { op, expr } => {
                let own = match op {
                    UnaryOp::Not => 3,
                    UnaryOp::Neg => 8,
                };
                if own < parent {
                    f.write_str("(")?;
                }
                match op {
                    UnaryOp::Not => f.write_str("not ")?,
                    UnaryOp::Neg => f.write_str("-")?,
                }
                expr.fmt_prec(f, own)?;
                if own < parent {
                    f.write_str(")")?;
                }
                Ok(())
            }
            Expr::Binary { op, lhs, rhs } => {
                let own = op.precedence();
                if own < parent {
                    f.write_str("(")?;
                }
                // `**` is right-associative, everything else left
                let (lp, rp) = if *op == BinaryOp::Pow { (own + 1, own) } else { (own, own + 1) };
                lhs.fmt_prec(f, lp)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_prec(f, rp)?;
                if own < parent {
                    f.write_str(")")?;
                }
                Ok(())
            }
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt_prec(f, 0)?;
                }
                f.write_str(")")
            }
            Expr::Method { recv, name, args } => {
                recv.fmt_prec(f, 9)?;
                write!(f, ".{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt_prec(f, 0)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

/// A parsed expression plus its original source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
}

impl CompiledExpr {
    /// The source text exactly as given to [`compile`].
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate at one row against a column getter.
    pub fn eval(&self, getter: &dyn ColumnGetter, row: usize) -> Result<Value, EvalError> {
        eval::eval(&self.ast, getter, row)
    }
}

/// Compile source text into an AST.
pub fn compile(source: &str) -> Result<CompiledExpr, ExprError> {
    let tokens = lexer::lex(source)?;
    let ast = parser::parse(&tokens)?;
    Ok(CompiledExpr { source: source.to_string(), ast })
}

/// Hit/miss counters for the expression cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Process-wide cache of compiled expressions keyed by source text.
///
/// Equality-by-source makes reuse sound: the same text always compiles to
/// the same AST. Compile failures are not cached; they are rare and cheap.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: Mutex<HashMap<String, Arc<CompiledExpr>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExpressionCache {
    pub fn new() -> Self {
        ExpressionCache::default()
    }

    pub fn compile(&self, source: &str) -> Result<Arc<CompiledExpr>, ExprError> {
        if let Some(found) = self.entries.lock().get(source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(found));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(compile(source)?);
        self.entries
            .lock()
            .insert(source.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_keeps_source() {
        let src = "amount * 0.1";
        let compiled = compile(src).unwrap();
        assert_eq!(compiled.source(), src);
    }

    #[test]
    fn test_display_precedence() {
        let e = compile("(1 + 2) * 3").unwrap();
        assert_eq!(e.ast().to_string(), "(1 + 2) * 3");
        let e = compile("1 + 2 * 3").unwrap();
        assert_eq!(e.ast().to_string(), "1 + 2 * 3");
    }

    #[test]
    fn test_display_method_chain() {
        let e = compile("name.strip().upper()").unwrap();
        assert_eq!(e.ast().to_string(), "name.strip().upper()");
    }

    #[test]
    fn test_cache_reuses_by_source() {
        let cache = ExpressionCache::new();
        let a = cache.compile("x + 1").unwrap();
        let b = cache.compile("x + 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let cache = ExpressionCache::new();
        assert!(cache.compile("1 +").is_err());
        assert_eq!(cache.stats().entries, 0);
    }
}
