//! Expression lexer.
//!
//! Integer literals are digit runs without a dot; a dot anywhere (including
//! a leading one) makes a float. Strings take single or double quotes with
//! the usual backslash escapes. `and`, `or` and `not` are reserved words.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
}

impl Token {
    /// Token text used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) => format!("{s:?}"),
            Token::Ident(name) => name.clone(),
            Token::And => "and".into(),
            Token::Or => "or".into(),
            Token::Not => "not".into(),
            Token::Eq => "==".into(),
            Token::Ne => "!=".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Le => "<=".into(),
            Token::Ge => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::StarStar => "**".into(),
            Token::Slash => "/".into(),
            Token::SlashSlash => "//".into(),
            Token::Percent => "%".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
        }
    }
}

/// A token plus its byte offset in the source, for error positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn lex(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit()) {
            let mut end = i;
            let mut seen_dot = false;
            while end < bytes.len() {
                let b = bytes[end] as char;
                if b.is_ascii_digit() {
                    end += 1;
                } else if b == '.' && !seen_dot {
                    // `1.foo()` is a method call on the int literal, not a float
                    if end + 1 < bytes.len() && (bytes[end + 1] as char).is_ascii_alphabetic() {
                        break;
                    }
                    seen_dot = true;
                    end += 1;
                } else {
                    break;
                }
            }
            let text = &source[i..end];
            let token = if seen_dot {
                Token::Float(text.parse().map_err(|_| ExprError::Lex {
                    pos: start,
                    message: format!("invalid float literal {text:?}"),
                })?)
            } else {
                Token::Int(text.parse().map_err(|_| ExprError::Lex {
                    pos: start,
                    message: format!("invalid integer literal {text:?}"),
                })?)
            };
            tokens.push(Spanned { token, pos: start });
            i = end;
            continue;
        }

        if c == '"' || c == '\'' {
            let (s, next) = lex_string(source, i, c)?;
            tokens.push(Spanned { token: Token::Str(s), pos: start });
            i = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = i;
            while end < bytes.len() {
                let b = bytes[end] as char;
                if b.is_ascii_alphanumeric() || b == '_' {
                    end += 1;
                } else {
                    break;
                }
            }
            let word = &source[i..end];
            let token = match word {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push(Spanned { token, pos: start });
            i = end;
            continue;
        }

        let two = if i + 1 < bytes.len() { &source[i..i + 2] } else { "" };
        let token = match two {
            "==" => Some((Token::Eq, 2)),
            "!=" => Some((Token::Ne, 2)),
            "<=" => Some((Token::Le, 2)),
            ">=" => Some((Token::Ge, 2)),
            "**" => Some((Token::StarStar, 2)),
            "//" => Some((Token::SlashSlash, 2)),
            _ => None,
        };
        let (token, width) = match token {
            Some(t) => t,
            None => match c {
                '<' => (Token::Lt, 1),
                '>' => (Token::Gt, 1),
                '+' => (Token::Plus, 1),
                '-' => (Token::Minus, 1),
                '*' => (Token::Star, 1),
                '/' => (Token::Slash, 1),
                '%' => (Token::Percent, 1),
                '(' => (Token::LParen, 1),
                ')' => (Token::RParen, 1),
                ',' => (Token::Comma, 1),
                '.' => (Token::Dot, 1),
                other => {
                    return Err(ExprError::Lex {
                        pos: start,
                        message: format!("unexpected character {other:?}"),
                    })
                }
            },
        };
        tokens.push(Spanned { token, pos: start });
        i += width;
    }

    Ok(tokens)
}

fn lex_string(source: &str, start: usize, quote: char) -> Result<(String, usize), ExprError> {
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices();

    while let Some((off, c)) = chars.next() {
        if c == quote {
            return Ok((out, start + 1 + off + c.len_utf8()));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\'')) => out.push('\''),
                Some((_, other)) => {
                    return Err(ExprError::Lex {
                        pos: start,
                        message: format!("unknown escape sequence \\{other}"),
                    })
                }
                None => break,
            }
        } else {
            out.push(c);
        }
    }

    Err(ExprError::Lex { pos: start, message: "unterminated string literal".to_string() })
}
