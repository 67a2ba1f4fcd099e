//! Restricted arithmetic for hourly rates.
//!
//! Accepts decimal literals, `+ - * /`, unary sign and parentheses, e.g.
//! `"1000/1.5"` or `"(2000+500)/2"`. Thousands separators are stripped
//! before parsing, so `"1,250"` is `1250`.

use thiserror::Error;

const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateError {
    #[error("Rate is empty")]
    Empty,
    #[error("Unsupported character '{ch}' at position {position}")]
    UnsupportedCharacter { ch: char, position: usize },
    #[error("Malformed number '{0}'")]
    MalformedNumber(String),
    #[error("Unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Expression is nested too deeply")]
    TooDeep,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid numeric result")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// Evaluate a rate expression to a finite number.
pub fn parse_rate(expr: &str) -> Result<f64, RateError> {
    let cleaned: String = expr.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.trim().is_empty() {
        return Err(RateError::Empty);
    }

    let tokens = tokenize(&cleaned)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some((token, position)) = parser.peek_with_pos() {
        return Err(RateError::UnexpectedToken {
            found: token.describe(),
            position,
        });
    }
    if !value.is_finite() {
        return Err(RateError::NonFinite);
    }
    Ok(value)
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, RateError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let token = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push((Token::Number(parse_literal(&literal)?), start));
                continue;
            }
            other => {
                return Err(RateError::UnsupportedCharacter {
                    ch: other,
                    position: i,
                });
            }
        };
        tokens.push((token, i));
        i += 1;
    }

    Ok(tokens)
}

fn parse_literal(literal: &str) -> Result<f64, RateError> {
    let malformed = || RateError::MalformedNumber(literal.to_string());
    if literal.matches('.').count() > 1 || !literal.chars().any(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    let value: f64 = literal.parse().map_err(|_| malformed())?;
    if !value.is_finite() {
        return Err(RateError::NonFinite);
    }
    Ok(value)
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn peek_with_pos(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn expr(&mut self) -> Result<f64, RateError> {
        let mut acc = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == Token::Plus { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, RateError> {
        let mut acc = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            acc = if op == Token::Star {
                acc * rhs
            } else {
                if rhs == 0.0 {
                    return Err(RateError::DivisionByZero);
                }
                acc / rhs
            };
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, RateError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(|p| p.unary())
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.nested(|p| p.unary()).map(|v| -v)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, RateError> {
        match self.next() {
            Some((Token::Number(n), _)) => Ok(n),
            Some((Token::LParen, _)) => {
                let value = self.nested(|p| p.expr())?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(value),
                    Some((token, position)) => Err(RateError::UnexpectedToken {
                        found: token.describe(),
                        position,
                    }),
                    None => Err(RateError::UnexpectedEnd),
                }
            }
            Some((token, position)) => Err(RateError::UnexpectedToken {
                found: token.describe(),
                position,
            }),
            None => Err(RateError::UnexpectedEnd),
        }
    }

    fn nested<F>(&mut self, f: F) -> Result<f64, RateError>
    where
        F: FnOnce(&mut Self) -> Result<f64, RateError>,
    {
        if self.depth >= MAX_NESTING {
            return Err(RateError::TooDeep);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_rate("450").unwrap(), 450.0);
        assert_eq!(parse_rate(" 12.5 ").unwrap(), 12.5);
        assert_eq!(parse_rate(".5").unwrap(), 0.5);
        assert_eq!(parse_rate("1,250").unwrap(), 1250.0);
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(parse_rate("2+3*4").unwrap(), 14.0);
        assert_eq!(parse_rate("(2+3)*4").unwrap(), 20.0);
        assert_eq!(parse_rate("10-4-3").unwrap(), 3.0);
        assert_eq!(parse_rate("(2000+500)/2").unwrap(), 1250.0);
        assert!((parse_rate("1000/1.5").unwrap() - 666.666_666_666_666_6).abs() < 1e-9);
    }

    #[test]
    fn test_unary_signs() {
        assert_eq!(parse_rate("-5").unwrap(), -5.0);
        assert_eq!(parse_rate("+5").unwrap(), 5.0);
        assert_eq!(parse_rate("--5").unwrap(), 5.0);
        assert_eq!(parse_rate("3*-2").unwrap(), -6.0);
        assert_eq!(parse_rate("-(1+2)").unwrap(), -3.0);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_rate(""), Err(RateError::Empty));
        assert_eq!(parse_rate("   "), Err(RateError::Empty));
        assert_eq!(parse_rate(",,"), Err(RateError::Empty));
    }

    #[test]
    fn test_disallowed_tokens() {
        for input in ["2x3", "abs(3)", "2**3", "1e3", "2^3", "3 % 2", "x", "0x10", "1_000"] {
            assert!(parse_rate(input).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_malformed_structure() {
        assert!(matches!(parse_rate("(1+2"), Err(RateError::UnexpectedEnd)));
        assert!(matches!(parse_rate("1+"), Err(RateError::UnexpectedEnd)));
        assert!(matches!(
            parse_rate("(1)(2)"),
            Err(RateError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_rate("1.2.3"),
            Err(RateError::MalformedNumber(_))
        ));
        assert!(matches!(parse_rate("."), Err(RateError::MalformedNumber(_))));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(parse_rate("1/0"), Err(RateError::DivisionByZero));
        assert_eq!(parse_rate("5/(2-2)"), Err(RateError::DivisionByZero));
    }

    #[test]
    fn test_non_finite_literal() {
        let huge = "9".repeat(400);
        assert_eq!(parse_rate(&huge), Err(RateError::NonFinite));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse_rate(&deep), Err(RateError::TooDeep));
        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse_rate(&shallow).unwrap(), 1.0);
    }
}
