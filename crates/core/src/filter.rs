//! Listing filter expressions.
//!
//! The query language is deliberately tiny: equality on `id`, `scope`,
//! `key`, and `owner`, a prefix match on `key` via a trailing `*`, `and`,
//! `or`, and parentheses. Values are bare words or double-quoted strings.
//! Anything else — unknown fields in particular — is a caller error, never
//! a crash.
//!
//! ```text
//! scope == "ui" and (key = theme* or owner = "b53cfeb2-...")
//! ```

use std::fmt;
use std::iter::Peekable;

/// A queryable entry field. This is the whole allow-list; field names are
/// the only caller-controlled text ever interpolated into SQL, and they are
/// rendered from this enum, never from the input string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Id,
    Scope,
    Key,
    Owner,
}

impl Field {
    /// Resolve a field name against the allow-list.
    pub fn parse(name: &str) -> crate::Result<Self> {
        match name {
            "id" => Ok(Self::Id),
            "scope" => Ok(Self::Scope),
            "key" => Ok(Self::Key),
            "owner" => Ok(Self::Owner),
            _ => Err(crate::Error::InvalidFilter(format!(
                "unknown field '{name}'"
            ))),
        }
    }

    /// The column name this field compiles to.
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Scope => "scope",
            Self::Key => "key",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// How a comparison matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOp {
    Exact,
    /// Prefix match; only valid on `key`.
    Prefix,
}

/// A single field comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub field: Field,
    pub op: MatchOp,
    pub value: String,
}

/// A parsed filter expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Cmp(Comparison),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    /// Parse a filter expression. `and` binds tighter than `or`.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let tokens = lex(input)?;
        let mut tokens = tokens.into_iter().peekable();
        let filter = parse_or(&mut tokens)?;
        match tokens.next() {
            None => Ok(filter),
            Some(tok) => Err(crate::Error::InvalidFilter(format!(
                "unexpected '{tok}' after expression"
            ))),
        }
    }
}

/// Requested result ordering: `<field>` or `<field>.asc` / `<field>.desc`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: Field,
    pub descending: bool,
}

impl OrderSpec {
    /// Parse an `order_by` parameter.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (name, descending) = match s.rsplit_once('.') {
            Some((name, "asc")) => (name, false),
            Some((name, "desc")) => (name, true),
            _ => (s, false),
        };
        Ok(Self {
            field: Field::parse(name)?,
            descending,
        })
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    Equals,
    And,
    Or,
    Word(String),
    Quoted(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Equals => write!(f, "="),
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
            Self::Word(w) => write!(f, "{w}"),
            Self::Quoted(q) => write!(f, "\"{q}\""),
        }
    }
}

fn lex(input: &str) -> crate::Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                // '=' and '==' are the same exact-match operator.
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Equals);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\')) => value.push(esc),
                            Some(other) => {
                                return Err(crate::Error::InvalidFilter(format!(
                                    "unsupported escape '\\{other}'"
                                )));
                            }
                            None => {
                                return Err(crate::Error::InvalidFilter(
                                    "unterminated string".into(),
                                ));
                            }
                        },
                        Some(other) => value.push(other),
                        None => {
                            return Err(crate::Error::InvalidFilter("unterminated string".into()));
                        }
                    }
                }
                // A trailing '*' inside quotes still requests a prefix match;
                // record it as part of the raw value and let the parser decide.
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

type Tokens = Peekable<std::vec::IntoIter<Token>>;

fn parse_or(tokens: &mut Tokens) -> crate::Result<Filter> {
    let mut left = parse_and(tokens)?;
    while tokens.peek() == Some(&Token::Or) {
        tokens.next();
        let right = parse_and(tokens)?;
        left = Filter::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(tokens: &mut Tokens) -> crate::Result<Filter> {
    let mut left = parse_primary(tokens)?;
    while tokens.peek() == Some(&Token::And) {
        tokens.next();
        let right = parse_primary(tokens)?;
        left = Filter::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_primary(tokens: &mut Tokens) -> crate::Result<Filter> {
    match tokens.next() {
        Some(Token::LParen) => {
            let inner = parse_or(tokens)?;
            match tokens.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(crate::Error::InvalidFilter("missing ')'".into())),
            }
        }
        Some(Token::Word(name)) => {
            let field = Field::parse(&name)?;
            match tokens.next() {
                Some(Token::Equals) => {}
                _ => {
                    return Err(crate::Error::InvalidFilter(format!(
                        "expected '=' after '{name}'"
                    )));
                }
            }
            let raw = match tokens.next() {
                Some(Token::Word(v)) => v,
                Some(Token::Quoted(v)) => v,
                _ => {
                    return Err(crate::Error::InvalidFilter(format!(
                        "expected a value after '{name} ='"
                    )));
                }
            };
            comparison(field, raw)
        }
        Some(tok) => Err(crate::Error::InvalidFilter(format!("unexpected '{tok}'"))),
        None => Err(crate::Error::InvalidFilter("empty expression".into())),
    }
}

fn comparison(field: Field, raw: String) -> crate::Result<Filter> {
    let (op, value) = match raw.strip_suffix('*') {
        Some(prefix) => (MatchOp::Prefix, prefix.to_string()),
        None => (MatchOp::Exact, raw),
    };
    if op == MatchOp::Prefix && field != Field::Key {
        return Err(crate::Error::InvalidFilter(format!(
            "prefix match is only supported on 'key', not '{field}'"
        )));
    }
    if value.contains('*') {
        return Err(crate::Error::InvalidFilter(
            "'*' is only supported as a trailing wildcard".into(),
        ));
    }
    Ok(Filter::Cmp(Comparison { field, op, value }))
}
