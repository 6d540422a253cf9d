//! Structured filters over the non-vector columns of a collection.
//!
//! Filters can be built programmatically or parsed from a small SQL-like
//! predicate language:
//!
//! ```text
//! id = 'X'
//! metadata.symbol = 'AAPL' AND metadata.year >= 2020
//! text LIKE '%electronics%' OR metadata['data type'] IN ('profile', 'news')
//! metadata.sector IS NOT NULL
//! ```
//!
//! Evaluation uses two-valued logic: comparing against a missing metadata key
//! is false, except for `!=` / `<>` which is true, so `NOT (a = b)` and
//! `a != b` agree.

mod parser;

use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metadata::{Metadata, MetadataValue};

pub use parser::{MAX_CONDITIONS, MAX_NESTING};

/// A filter expression that can be evaluated against a row.
///
/// Parsed filters are bounded by [`MAX_NESTING`] and [`MAX_CONDITIONS`].
/// Trees composed with the builder methods carry no such bound; evaluation
/// recurses once per level, so callers assembling filters programmatically
/// keep them shallow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub(crate) condition: FilterCondition,
}

impl Filter {
    /// Parses a predicate string.
    ///
    /// # Example
    ///
    /// ```
    /// use semstore_core::Filter;
    ///
    /// let filter = Filter::parse("metadata.symbol = 'AAPL' AND metadata.year > 2020").unwrap();
    /// assert!(Filter::parse("vector = 1").is_err());
    /// ```
    pub fn parse(predicate: &str) -> Result<Self> {
        parser::parse(predicate).map(Self::from_condition)
    }

    /// A filter that matches every row.
    pub fn always() -> Self {
        Self::from_condition(FilterCondition::True)
    }

    /// Creates a filter for a column or metadata key.
    ///
    /// `id`, `text` and `metadata` address stored columns; `metadata.<key>`
    /// and any other name address a metadata key.
    ///
    /// ```
    /// use semstore_core::Filter;
    ///
    /// let filter = Filter::field("metadata.data_type").eq("profile");
    /// ```
    pub fn field(name: &str) -> FieldFilter {
        let field = match name {
            "id" => Field::Id,
            "text" => Field::Text,
            "metadata" => Field::Metadata,
            other => Field::Key(other.strip_prefix("metadata.").unwrap_or(other).to_string()),
        };
        FieldFilter { field }
    }

    /// Creates a filter from a condition.
    pub fn from_condition(condition: FilterCondition) -> Self {
        Self { condition }
    }

    /// Returns the underlying condition.
    pub fn condition(&self) -> &FilterCondition {
        &self.condition
    }

    /// Combines this filter with another using AND.
    pub fn and(self, other: Filter) -> Self {
        Self {
            condition: FilterCondition::And(Box::new(self.condition), Box::new(other.condition)),
        }
    }

    /// Combines this filter with another using OR.
    pub fn or(self, other: Filter) -> Self {
        Self {
            condition: FilterCondition::Or(Box::new(self.condition), Box::new(other.condition)),
        }
    }

    /// Negates this filter.
    #[allow(clippy::should_implement_trait)]
    pub fn negate(self) -> Self {
        Self {
            condition: FilterCondition::Not(Box::new(self.condition)),
        }
    }

    /// Evaluates the filter against a row.
    pub fn matches(&self, row: &RowView<'_>) -> bool {
        self.condition.matches(row)
    }

    /// True if the filter only ever inspects the `id`, `text` or raw
    /// `metadata` columns, so rows need not have their metadata decoded.
    pub fn needs_decoded_metadata(&self) -> bool {
        self.condition.references_key()
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

/// A column or metadata key a condition reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Id,
    Text,
    /// The raw serialized metadata string.
    Metadata,
    /// A key inside the decoded metadata.
    Key(String),
}

/// Builder for field-specific filter conditions.
#[derive(Debug)]
pub struct FieldFilter {
    field: Field,
}

impl FieldFilter {
    /// Field equals value.
    pub fn eq<V: Into<MetadataValue>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Eq(self.field, value.into()))
    }

    /// Field not equals value.
    pub fn ne<V: Into<MetadataValue>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Ne(self.field, value.into()))
    }

    /// Field greater than value.
    pub fn gt<V: Into<MetadataValue>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Gt(self.field, value.into()))
    }

    /// Field greater than or equal to value.
    pub fn gte<V: Into<MetadataValue>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Gte(self.field, value.into()))
    }

    /// Field less than value.
    pub fn lt<V: Into<MetadataValue>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Lt(self.field, value.into()))
    }

    /// Field less than or equal to value.
    pub fn lte<V: Into<MetadataValue>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Lte(self.field, value.into()))
    }

    /// Field value is in the given list.
    pub fn contained_in<V: Into<MetadataValue>>(self, values: Vec<V>) -> Filter {
        let values = values.into_iter().map(Into::into).collect();
        Filter::from_condition(FilterCondition::In(self.field, values))
    }

    /// Field matches a LIKE pattern (`%` any run, `_` any single char).
    pub fn like(self, pattern: &str) -> Filter {
        Filter::from_condition(FilterCondition::Like(self.field, pattern.to_string()))
    }

    /// Field (as string) contains the given substring.
    pub fn contains(self, substring: &str) -> Filter {
        let escaped = substring.replace('%', "\\%").replace('_', "\\_");
        self.like(&format!("%{}%", escaped))
    }

    /// Field is missing or null.
    pub fn is_null(self) -> Filter {
        Filter::from_condition(FilterCondition::IsNull(self.field))
    }

    /// Field exists and is not null.
    pub fn exists(self) -> Filter {
        self.is_null().negate()
    }
}

/// The filter condition variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Matches every row.
    True,
    Eq(Field, MetadataValue),
    Ne(Field, MetadataValue),
    Gt(Field, MetadataValue),
    Gte(Field, MetadataValue),
    Lt(Field, MetadataValue),
    Lte(Field, MetadataValue),
    In(Field, Vec<MetadataValue>),
    Like(Field, String),
    IsNull(Field),
    And(Box<FilterCondition>, Box<FilterCondition>),
    Or(Box<FilterCondition>, Box<FilterCondition>),
    Not(Box<FilterCondition>),
}

/// The non-vector columns of one row, as seen by a filter.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub raw_metadata: &'a str,
    pub metadata: &'a Metadata,
}

impl<'a> RowView<'a> {
    fn resolve(&self, field: &Field) -> Option<Cow<'a, MetadataValue>> {
        match field {
            Field::Id => Some(Cow::Owned(MetadataValue::String(self.id.to_string()))),
            Field::Text => Some(Cow::Owned(MetadataValue::String(self.text.to_string()))),
            Field::Metadata => Some(Cow::Owned(MetadataValue::String(
                self.raw_metadata.to_string(),
            ))),
            Field::Key(key) => self.metadata.get(key).map(Cow::Borrowed),
        }
    }

    fn resolve_str(&self, field: &Field) -> Option<&'a str> {
        match field {
            Field::Id => Some(self.id),
            Field::Text => Some(self.text),
            Field::Metadata => Some(self.raw_metadata),
            Field::Key(key) => self.metadata.get_str(key),
        }
    }
}

impl FilterCondition {
    /// Evaluates this condition against a row.
    pub fn matches(&self, row: &RowView<'_>) -> bool {
        match self {
            FilterCondition::True => true,
            FilterCondition::Eq(field, value) => match field {
                Field::Key(_) => row
                    .resolve(field)
                    .map(|v| values_equal(&v, value))
                    .unwrap_or(false),
                _ => value
                    .as_str()
                    .map(|s| row.resolve_str(field) == Some(s))
                    .unwrap_or(false),
            },
            FilterCondition::Ne(field, value) => !FilterCondition::Eq(field.clone(), value.clone())
                .matches(row),
            FilterCondition::Gt(field, value) => {
                compare(row.resolve(field).as_deref(), value, |o| o.is_gt())
            }
            FilterCondition::Gte(field, value) => {
                compare(row.resolve(field).as_deref(), value, |o| o.is_ge())
            }
            FilterCondition::Lt(field, value) => {
                compare(row.resolve(field).as_deref(), value, |o| o.is_lt())
            }
            FilterCondition::Lte(field, value) => {
                compare(row.resolve(field).as_deref(), value, |o| o.is_le())
            }
            FilterCondition::In(field, values) => row
                .resolve(field)
                .map(|v| values.iter().any(|candidate| values_equal(&v, candidate)))
                .unwrap_or(false),
            FilterCondition::Like(field, pattern) => row
                .resolve_str(field)
                .map(|s| like_match(s, pattern))
                .unwrap_or(false),
            FilterCondition::IsNull(field) => row
                .resolve(field)
                .map(|v| v.is_null())
                .unwrap_or(true),
            FilterCondition::And(a, b) => a.matches(row) && b.matches(row),
            FilterCondition::Or(a, b) => a.matches(row) || b.matches(row),
            FilterCondition::Not(c) => !c.matches(row),
        }
    }

    fn references_key(&self) -> bool {
        match self {
            FilterCondition::True => false,
            FilterCondition::Eq(f, _)
            | FilterCondition::Ne(f, _)
            | FilterCondition::Gt(f, _)
            | FilterCondition::Gte(f, _)
            | FilterCondition::Lt(f, _)
            | FilterCondition::Lte(f, _)
            | FilterCondition::In(f, _)
            | FilterCondition::Like(f, _)
            | FilterCondition::IsNull(f) => matches!(f, Field::Key(_)),
            FilterCondition::And(a, b) | FilterCondition::Or(a, b) => {
                a.references_key() || b.references_key()
            }
            FilterCondition::Not(c) => c.references_key(),
        }
    }
}

/// Numbers compare numerically across int/float; everything else structurally.
fn values_equal(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Orders numbers numerically and strings lexicographically. Mixed or
/// non-orderable operands never match.
fn compare<F>(field_value: Option<&MetadataValue>, target: &MetadataValue, accept: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let Some(field_value) = field_value else {
        return false;
    };
    if let (Some(a), Some(b)) = (field_value.as_f64(), target.as_f64()) {
        return a.partial_cmp(&b).map(accept).unwrap_or(false);
    }
    match (field_value, target) {
        (MetadataValue::String(a), MetadataValue::String(b)) => accept(a.as_str().cmp(b.as_str())),
        _ => false,
    }
}

/// SQL LIKE matching. `\` escapes a literal `%` or `_`.
fn like_match(text: &str, pattern: &str) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Tok {
        Any,
        One,
        Lit(char),
    }

    let mut toks = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => toks.push(Tok::Any),
            '_' => toks.push(Tok::One),
            '\\' => match chars.next() {
                Some(next) => toks.push(Tok::Lit(next)),
                None => toks.push(Tok::Lit('\\')),
            },
            other => toks.push(Tok::Lit(other)),
        }
    }

    let text: Vec<char> = text.chars().collect();
    // Greedy matcher with single backtrack point for the last '%'.
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match toks.get(p) {
            Some(Tok::One) => {
                t += 1;
                p += 1;
            }
            Some(Tok::Lit(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            Some(Tok::Any) => {
                star = Some((p, t));
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    toks[p..].iter().all(|tok| *tok == Tok::Any)
}
