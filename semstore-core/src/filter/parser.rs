//! Recursive-descent parser for predicate strings.
//!
//! ```text
//! expr       := or
//! or         := and ( OR and )*
//! and        := unary ( AND unary )*
//! unary      := NOT unary | primary
//! primary    := '(' expr ')' | TRUE | FALSE | comparison
//! comparison := field ( op literal
//!                     | [NOT] IN '(' literal ( ',' literal )* ')'
//!                     | [NOT] LIKE string
//!                     | IS [NOT] NULL )
//! field      := id | text | metadata | metadata.<key> | metadata '[' string ']'
//! ```
//!
//! Parsed trees are bounded: at most [`MAX_NESTING`] levels of `NOT` and
//! parentheses and at most [`MAX_CONDITIONS`] leaf conditions, so parsing
//! and evaluation never recurse deeper than their sum.

use crate::error::{Error, Result};
use crate::filter::{Field, FilterCondition};
use crate::metadata::MetadataValue;

/// Deepest allowed nesting of `NOT` and parentheses.
pub const MAX_NESTING: usize = 64;

/// Most leaf conditions one predicate may contain.
pub const MAX_CONDITIONS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Ne);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(Error::InvalidFilter(
                                "unterminated string literal".into(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || matches!(chars[i], '.' | 'e' | 'E')
                        || (matches!(chars[i], '+' | '-') && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if let Ok(v) = text.parse::<i64>() {
                    tokens.push(Token::Int(v));
                } else if let Ok(v) = text.parse::<f64>() {
                    tokens.push(Token::Float(v));
                } else {
                    return Err(Error::InvalidFilter(format!("invalid number '{}'", text)));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::InvalidFilter(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    conditions: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            conditions: 0,
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(Error::InvalidFilter(format!(
                "predicate nested too deeply (limit {})",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn leaf(&mut self) -> Result<()> {
        self.conditions += 1;
        if self.conditions > MAX_CONDITIONS {
            return Err(Error::InvalidFilter(format!(
                "predicate has too many conditions (limit {})",
                MAX_CONDITIONS
            )));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(Error::InvalidFilter(format!(
                "expected {}, found {:?}",
                what, tok
            ))),
            None => Err(Error::InvalidFilter(format!(
                "expected {}, found end of input",
                what
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<FilterCondition> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = FilterCondition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterCondition> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("AND") {
            let right = self.parse_unary()?;
            left = FilterCondition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FilterCondition> {
        if self.eat_keyword("NOT") {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(FilterCondition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterCondition> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.nested(Self::parse_or)?;
            self.expect(Token::RParen, "')'")?;
            return Ok(inner);
        }
        self.leaf()?;
        if self.eat_keyword("TRUE") {
            return Ok(FilterCondition::True);
        }
        if self.eat_keyword("FALSE") {
            return Ok(FilterCondition::Not(Box::new(FilterCondition::True)));
        }
        self.parse_comparison()
    }

    fn parse_field(&mut self) -> Result<Field> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(tok) => {
                return Err(Error::InvalidFilter(format!(
                    "expected column name, found {:?}",
                    tok
                )))
            }
            None => return Err(Error::InvalidFilter("expected column name".into())),
        };

        match name.as_str() {
            "id" => Ok(Field::Id),
            "text" => Ok(Field::Text),
            "metadata" => {
                if self.peek() == Some(&Token::LBracket) {
                    self.pos += 1;
                    let key = match self.next() {
                        Some(Token::Str(key)) => key,
                        _ => {
                            return Err(Error::InvalidFilter(
                                "expected quoted key inside metadata[...]".into(),
                            ))
                        }
                    };
                    self.expect(Token::RBracket, "']'")?;
                    Ok(Field::Key(key))
                } else {
                    Ok(Field::Metadata)
                }
            }
            "vector" => Err(Error::InvalidFilter(
                "the vector column cannot be used in a predicate".into(),
            )),
            other => match other.strip_prefix("metadata.") {
                Some(key) if !key.is_empty() => Ok(Field::Key(key.to_string())),
                _ => Err(Error::InvalidFilter(format!(
                    "unknown column '{}': expected id, text, metadata or metadata.<key>",
                    other
                ))),
            },
        }
    }

    fn parse_literal(&mut self) -> Result<MetadataValue> {
        match self.next() {
            Some(Token::Str(s)) => Ok(MetadataValue::String(s)),
            Some(Token::Int(i)) => Ok(MetadataValue::Int(i)),
            Some(Token::Float(f)) => Ok(MetadataValue::Float(f)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => {
                Ok(MetadataValue::Bool(true))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => {
                Ok(MetadataValue::Bool(false))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("null") => {
                Ok(MetadataValue::Null)
            }
            Some(tok) => Err(Error::InvalidFilter(format!(
                "expected literal, found {:?}",
                tok
            ))),
            None => Err(Error::InvalidFilter(
                "expected literal, found end of input".into(),
            )),
        }
    }

    fn parse_comparison(&mut self) -> Result<FilterCondition> {
        let field = self.parse_field()?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if !self.eat_keyword("NULL") {
                return Err(Error::InvalidFilter("expected NULL after IS".into()));
            }
            let cond = FilterCondition::IsNull(field);
            return Ok(if negated {
                FilterCondition::Not(Box::new(cond))
            } else {
                cond
            });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(Token::LParen, "'(' after IN")?;
            let mut values = vec![self.parse_literal()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.parse_literal()?);
            }
            self.expect(Token::RParen, "')'")?;
            let cond = FilterCondition::In(field, values);
            return Ok(wrap_not(cond, negated));
        }
        if self.eat_keyword("LIKE") {
            let pattern = match self.next() {
                Some(Token::Str(s)) => s,
                _ => return Err(Error::InvalidFilter("LIKE expects a string pattern".into())),
            };
            return Ok(wrap_not(FilterCondition::Like(field, pattern), negated));
        }
        if negated {
            return Err(Error::InvalidFilter("expected IN or LIKE after NOT".into()));
        }

        let op = self.next();
        let value = self.parse_literal()?;
        match op {
            Some(Token::Eq) => Ok(FilterCondition::Eq(field, value)),
            Some(Token::Ne) => Ok(FilterCondition::Ne(field, value)),
            Some(Token::Lt) => Ok(FilterCondition::Lt(field, value)),
            Some(Token::Le) => Ok(FilterCondition::Lte(field, value)),
            Some(Token::Gt) => Ok(FilterCondition::Gt(field, value)),
            Some(Token::Ge) => Ok(FilterCondition::Gte(field, value)),
            Some(tok) => Err(Error::InvalidFilter(format!(
                "expected comparison operator, found {:?}",
                tok
            ))),
            None => Err(Error::InvalidFilter(
                "expected comparison operator, found end of input".into(),
            )),
        }
    }
}

fn wrap_not(cond: FilterCondition, negated: bool) -> FilterCondition {
    if negated {
        FilterCondition::Not(Box::new(cond))
    } else {
        cond
    }
}

/// Parses a predicate string into a condition tree.
pub(crate) fn parse(input: &str) -> Result<FilterCondition> {
    if input.trim().is_empty() {
        return Err(Error::InvalidFilter("predicate must not be empty".into()));
    }

    let tokens = lex(input)?;
    let mut parser = Parser::new(tokens);
    let condition = parser.parse_or()?;

    if let Some(tok) = parser.peek() {
        return Err(Error::InvalidFilter(format!(
            "unexpected trailing token {:?}",
            tok
        )));
    }
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_eq() {
        let cond = parse("id = 'X'").unwrap();
        assert_eq!(
            cond,
            FilterCondition::Eq(Field::Id, MetadataValue::String("X".into()))
        );
    }

    #[test]
    fn test_parse_metadata_key_forms() {
        let dotted = parse("metadata.symbol = 'AAPL'").unwrap();
        let bracket = parse("metadata['symbol'] = 'AAPL'").unwrap();
        assert_eq!(dotted, bracket);
    }

    #[test]
    fn test_parse_precedence() {
        // AND binds tighter than OR
        let cond = parse("id = 'a' OR id = 'b' AND text = 'c'").unwrap();
        match cond {
            FilterCondition::Or(_, right) => {
                assert!(matches!(*right, FilterCondition::And(_, _)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_in_like_null() {
        assert!(matches!(
            parse("metadata.kind NOT IN ('a', 'b')").unwrap(),
            FilterCondition::Not(_)
        ));
        assert!(matches!(
            parse("text like '%apple%'").unwrap(),
            FilterCondition::Like(Field::Text, _)
        ));
        assert!(matches!(
            parse("metadata.x IS NOT NULL").unwrap(),
            FilterCondition::Not(_)
        ));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(
            parse("metadata.year >= -2").unwrap(),
            FilterCondition::Gte(Field::Key("year".into()), MetadataValue::Int(-2))
        );
        assert_eq!(
            parse("metadata.score < 1.5e2").unwrap(),
            FilterCondition::Lt(Field::Key("score".into()), MetadataValue::Float(150.0))
        );
    }

    #[test]
    fn test_parse_quote_escape() {
        assert_eq!(
            parse("text = 'it''s'").unwrap(),
            FilterCondition::Eq(Field::Text, MetadataValue::String("it's".into()))
        );
    }

    #[test]
    fn test_parse_true_literal() {
        assert_eq!(parse("TRUE").unwrap(), FilterCondition::True);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("vector = 1").is_err());
        assert!(parse("price > 3").is_err());
        assert!(parse("id = ").is_err());
        assert!(parse("id = 'open").is_err());
        assert!(parse("(id = 'a'").is_err());
        assert!(parse("id = 'a' extra").is_err());
        assert!(parse("id ~ 'a'").is_err());
    }

    #[test]
    fn test_deep_not_chain_is_rejected() {
        let predicate = format!("{}TRUE", "NOT ".repeat(200_000));
        let err = parse(&predicate).unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_deep_parentheses_are_rejected() {
        let predicate = format!("{}id = 'a'{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&predicate).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_nesting_at_limit_is_accepted() {
        let predicate = format!("{}TRUE", "NOT ".repeat(MAX_NESTING));
        let cond = parse(&predicate).unwrap();
        let mut depth = 0;
        let mut node = &cond;
        while let FilterCondition::Not(inner) = node {
            depth += 1;
            node = &**inner;
        }
        assert_eq!(depth, MAX_NESTING);
        assert_eq!(*node, FilterCondition::True);
    }

    #[test]
    fn test_long_and_chain_is_rejected() {
        let terms = vec!["id = 'a'"; 50_000].join(" AND ");
        let err = parse(&terms).unwrap_err();
        assert!(err.to_string().contains("too many conditions"));

        let within = vec!["id = 'a'"; MAX_CONDITIONS].join(" OR ");
        assert!(parse(&within).is_ok());
    }
}
