//! Recursive-descent parser for the expression grammar.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparisons, `+ -`,
//! `* / // %`, `**` (right-associative), unary `-`, postfix call and
//! method access.

use super::lexer::{Spanned, Token};
use super::{BinaryOp, Expr, ExprError, UnaryOp};

pub fn parse(tokens: &[Spanned]) -> Result<Expr, ExprError> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::Parse {
            pos: extra.pos,
            message: format!("unexpected token {:?}", extra.token.describe()),
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        if self.eat(expected) {
            return Ok(());
        }
        Err(self.error_here(&format!("expected {:?}", expected.describe())))
    }

    fn error_here(&self, message: &str) -> ExprError {
        match self.peek() {
            Some(s) => ExprError::Parse {
                pos: s.pos,
                message: format!("{message}, found {:?}", s.token.describe()),
            },
            None => ExprError::Parse {
                pos: self.tokens.last().map(|s| s.pos + 1).unwrap_or(0),
                message: format!("{message}, found end of input"),
            },
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.not_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.not_expr()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            let expr = self.not_expr()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr) });
        }
        self.cmp_expr()
    }

    fn cmp_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.add_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.mul_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.pow_expr()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::SlashSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.pow_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn pow_expr(&mut self) -> Result<Expr, ExprError> {
        let base = self.unary()?;
        if self.eat(&Token::StarStar) {
            // right-associative
            let exponent = self.pow_expr()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            let expr = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr) });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Some(Spanned { token: Token::Ident(name), .. }) => name.clone(),
                    _ => {
                        self.pos -= 1;
                        return Err(self.error_here("expected method name after '.'"));
                    }
                };
                self.expect(&Token::LParen)?;
                let args = self.args()?;
                expr = Expr::Method { recv: Box::new(expr), name, args };
            } else if self.peek().map(|s| &s.token) == Some(&Token::LParen) {
                // only identifiers are callable
                if let Expr::Ident(name) = expr {
                    self.pos += 1;
                    let args = self.args()?;
                    expr = Expr::Call { name, args };
                } else {
                    return Err(self.error_here("only named functions can be called"));
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Comma-separated arguments up to the closing paren.
    fn args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen)?;
            return Ok(args);
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Spanned { token: Token::Int(i), .. }) => Ok(Expr::IntLit(*i)),
            Some(Spanned { token: Token::Float(v), .. }) => Ok(Expr::FloatLit(*v)),
            Some(Spanned { token: Token::Str(s), .. }) => Ok(Expr::StringLit(s.clone())),
            Some(Spanned { token: Token::Ident(name), .. }) => Ok(Expr::Ident(name.clone())),
            Some(Spanned { token: Token::LParen, .. }) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            _ => {
                if self.pos > 0 {
                    self.pos -= 1;
                }
                Err(self.error_here("expected expression"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::lex;

    fn parse_src(source: &str) -> Result<Expr, ExprError> {
        parse(&lex(source).unwrap())
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let e = parse_src("1 + 2 * 3").unwrap();
        match e {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_pow_right_associative() {
        let e = parse_src("2 ** 3 ** 2").unwrap();
        match e {
            Expr::Binary { op: BinaryOp::Pow, lhs, rhs } => {
                assert_eq!(*lhs, Expr::IntLit(2));
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_cmp_left_associative() {
        let e = parse_src("1 < 2 < 3").unwrap();
        match e {
            Expr::Binary { op: BinaryOp::Lt, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Lt, .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_unary_chain() {
        assert!(parse_src("--3").is_ok());
        assert!(parse_src("not not x").is_ok());
    }

    #[test]
    fn test_call_and_method() {
        let e = parse_src("min(a, b)").unwrap();
        assert!(matches!(e, Expr::Call { ref name, ref args } if name == "min" && args.len() == 2));

        let e = parse_src("\"hello\".upper()").unwrap();
        match e {
            Expr::Method { recv, name, args } => {
                assert_eq!(*recv, Expr::StringLit("hello".into()));
                assert_eq!(name, "upper");
                assert!(args.is_empty());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_method_chain() {
        let e = parse_src("s.strip().split(\",\")").unwrap();
        assert!(matches!(e, Expr::Method { ref name, .. } if name == "split"));
    }

    #[test]
    fn test_errors() {
        assert!(parse_src("1 +").is_err());
        assert!(parse_src("(1 + 2").is_err());
        assert!(parse_src("1 2").is_err());
        assert!(parse_src("f(1,)").is_err());
        assert!(parse_src("x.()").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_src("").is_err());
    }
}
