//! Guard expression evaluator for Condition/Loop `Expression` attributes
//! and `iif` conditions.
//!
//! Operates on already-substituted text, so the operands are plain numbers,
//! quoted strings, or bare words. Malformed input is an error for the
//! caller to log and treat as false; it never aborts a render.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("expected a boolean, got {0:?}")]
    NotBoolean(String),
    #[error("expected a number, got {0:?}")]
    NotNumber(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Val {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Val {
    fn truthy(&self) -> Result<bool, ExprError> {
        match self {
            Val::Bool(b) => Ok(*b),
            Val::Num(n) => Ok(*n != 0.0),
            Val::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" | "" => Ok(false),
                _ => Err(ExprError::NotBoolean(s.clone())),
            },
        }
    }

    fn number(&self) -> Result<f64, ExprError> {
        match self {
            Val::Num(n) => Ok(*n),
            Val::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Val::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| ExprError::NotNumber(s.clone())),
        }
    }

    fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            Val::Str(s) => s.trim().parse().ok(),
            Val::Bool(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Word(String),
    Str(String),
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn lex(input: &str) -> Result<Vec<Tok>, ExprError> {
    let mut toks = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            '+' => {
                chars.next();
                toks.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                toks.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                toks.push(Tok::Star);
            }
            '/' => {
                chars.next();
                toks.push(Tok::Slash);
            }
            '%' => {
                chars.next();
                toks.push(Tok::Percent);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                toks.push(Tok::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ne);
                } else {
                    toks.push(Tok::Not);
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        toks.push(Tok::Le);
                    }
                    Some('>') => {
                        chars.next();
                        toks.push(Tok::Ne);
                    }
                    _ => toks.push(Tok::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ge);
                } else {
                    toks.push(Tok::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                toks.push(Tok::And);
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                toks.push(Tok::Or);
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                }
                toks.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = s.parse().map_err(|_| ExprError::NotNumber(s.clone()))?;
                toks.push(Tok::Num(n));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match s.to_ascii_lowercase().as_str() {
                    "and" => toks.push(Tok::And),
                    "or" => toks.push(Tok::Or),
                    "not" => toks.push(Tok::Not),
                    "true" => toks.push(Tok::Word("true".to_string())),
                    "false" => toks.push(Tok::Word("false".to_string())),
                    _ => toks.push(Tok::Word(s)),
                }
            }
            other => return Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(toks)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn consume(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<Val, ExprError> {
        let mut lhs = self.parse_and()?;
        while let Some(Tok::Or) = self.peek() {
            self.consume();
            let rhs = self.parse_and()?;
            lhs = Val::Bool(lhs.truthy()? || rhs.truthy()?);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Val, ExprError> {
        let mut lhs = self.parse_cmp()?;
        while let Some(Tok::And) = self.peek() {
            self.consume();
            let rhs = self.parse_cmp()?;
            lhs = Val::Bool(lhs.truthy()? && rhs.truthy()?);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Val, ExprError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Tok::Eq | Tok::Ne | Tok::Le | Tok::Ge | Tok::Lt | Tok::Gt) => {
                self.consume().unwrap()
            }
            _ => return Ok(lhs),
        };
        let rhs = self.parse_add()?;
        Ok(Val::Bool(compare(&lhs, &rhs, &op)))
    }

    fn parse_add(&mut self) -> Result<Val, ExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let negate = match self.peek() {
                Some(Tok::Plus) => false,
                Some(Tok::Minus) => true,
                _ => break,
            };
            self.consume();
            let rhs = self.parse_mul()?;
            let r = rhs.number()?;
            lhs = Val::Num(lhs.number()? + if negate { -r } else { r });
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Val, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(t @ (Tok::Star | Tok::Slash | Tok::Percent)) => t.clone(),
                _ => break,
            };
            self.consume();
            let rhs = self.parse_unary()?;
            let (l, r) = (lhs.number()?, rhs.number()?);
            lhs = Val::Num(match op {
                Tok::Star => l * r,
                Tok::Slash => l / r,
                _ => l % r,
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Val, ExprError> {
        match self.peek() {
            Some(Tok::Not) => {
                self.consume();
                let v = self.parse_unary()?;
                Ok(Val::Bool(!v.truthy()?))
            }
            Some(Tok::Minus) => {
                self.consume();
                let v = self.parse_unary()?;
                Ok(Val::Num(-v.number()?))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Val, ExprError> {
        match self.consume() {
            Some(Tok::Num(n)) => Ok(Val::Num(n)),
            Some(Tok::Str(s)) => Ok(Val::Str(s)),
            Some(Tok::Word(w)) => match w.as_str() {
                "true" => Ok(Val::Bool(true)),
                "false" => Ok(Val::Bool(false)),
                _ => Ok(Val::Str(w)),
            },
            Some(Tok::LParen) => {
                let v = self.parse_or()?;
                match self.consume() {
                    Some(Tok::RParen) => Ok(v),
                    Some(t) => Err(ExprError::UnexpectedToken(format!("{t:?}"))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(t) => Err(ExprError::UnexpectedToken(format!("{t:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Numeric comparison when both sides parse as numbers, otherwise
/// case-insensitive string comparison.
fn compare(lhs: &Val, rhs: &Val, op: &Tok) -> bool {
    if let (Some(l), Some(r)) = (lhs.as_num(), rhs.as_num()) {
        return match op {
            Tok::Eq => l == r,
            Tok::Ne => l != r,
            Tok::Le => l <= r,
            Tok::Ge => l >= r,
            Tok::Lt => l < r,
            Tok::Gt => l > r,
            _ => false,
        };
    }
    let l = val_text(lhs).to_ascii_lowercase();
    let r = val_text(rhs).to_ascii_lowercase();
    match op {
        Tok::Eq => l == r,
        Tok::Ne => l != r,
        Tok::Le => l <= r,
        Tok::Ge => l >= r,
        Tok::Lt => l < r,
        Tok::Gt => l > r,
        _ => false,
    }
}

fn val_text(v: &Val) -> String {
    match v {
        Val::Num(n) => n.to_string(),
        Val::Str(s) => s.clone(),
        Val::Bool(b) => b.to_string(),
    }
}

/// Evaluate a guard expression to a boolean.
pub fn evaluate(input: &str) -> Result<bool, ExprError> {
    let toks = lex(input)?;
    if toks.is_empty() {
        return Err(ExprError::UnexpectedEnd);
    }
    let mut parser = Parser { toks, pos: 0 };
    let v = parser.parse_or()?;
    if let Some(t) = parser.peek() {
        return Err(ExprError::UnexpectedToken(format!("{t:?}")));
    }
    v.truthy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comparisons() {
        assert_eq!(evaluate("1 = 1"), Ok(true));
        assert_eq!(evaluate("2 > 10"), Ok(false));
        assert_eq!(evaluate("2 < 10"), Ok(true));
        assert_eq!(evaluate("3 >= 3"), Ok(true));
        assert_eq!(evaluate("3 != 3"), Ok(false));
        assert_eq!(evaluate("3 <> 4"), Ok(true));
    }

    #[test]
    fn string_comparison_is_case_insensitive() {
        assert_eq!(evaluate("Widget = widget"), Ok(true));
        assert_eq!(evaluate("'a b' = 'A B'"), Ok(true));
        assert_eq!(evaluate("abc != def"), Ok(true));
    }

    #[test]
    fn boolean_connectives() {
        assert_eq!(evaluate("1 = 1 & 2 = 2"), Ok(true));
        assert_eq!(evaluate("1 = 2 | 2 = 2"), Ok(true));
        assert_eq!(evaluate("1 = 1 and 1 = 2"), Ok(false));
        assert_eq!(evaluate("not (1 = 2)"), Ok(true));
        assert_eq!(evaluate("!false"), Ok(true));
    }

    #[test]
    fn arithmetic_feeds_comparison() {
        assert_eq!(evaluate("1 + 2 = 3"), Ok(true));
        assert_eq!(evaluate("2 * 3 > 5"), Ok(true));
        assert_eq!(evaluate("10 / 4 = 2.5"), Ok(true));
        assert_eq!(evaluate("-1 < 0"), Ok(true));
    }

    #[test]
    fn bare_truthy_words() {
        assert_eq!(evaluate("true"), Ok(true));
        assert_eq!(evaluate("0"), Ok(false));
        assert_eq!(evaluate("yes"), Ok(true));
    }

    #[test]
    fn malformed_is_an_error_not_a_panic() {
        assert!(evaluate("").is_err());
        assert!(evaluate("1 +").is_err());
        assert!(evaluate("( 1 = 1").is_err());
        assert!(evaluate("widget").is_err()); // not a boolean word
        assert!(evaluate("# nope").is_err());
    }
}
