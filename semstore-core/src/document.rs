//! Document and row types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metadata::Metadata;

/// Internal, monotonically increasing row sequence number within a
/// collection. Indexes refer to rows by this id; it is not a queryable column.
pub type RowId = u64;

/// A document submitted for insertion.
///
/// # Example
///
/// ```
/// use semstore_core::{Metadata, NewDocument};
///
/// let doc = NewDocument::new("Apple Inc designs consumer electronics")
///     .with_metadata(Metadata::new().with_field("symbol", "AAPL"));
/// assert!(doc.id.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    /// Caller-chosen id; a UUIDv4 is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Source text for the embedding.
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Precomputed embedding. Bypasses the embedding provider.
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

impl NewDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Sets an explicit id. Chainable.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the metadata. Chainable.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Supplies a precomputed embedding. Chainable.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Checks the document before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidInput("document text must not be empty".into()));
        }
        if let Some(id) = &self.id {
            if id.is_empty() {
                return Err(Error::InvalidInput("document id must not be empty".into()));
            }
        }
        if let Some(vector) = &self.vector {
            if vector.is_empty() {
                return Err(Error::InvalidInput("document vector must not be empty".into()));
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidInput(
                    "document vector contains non-finite values".into(),
                ));
            }
        }
        if let Some(metadata) = &self.metadata {
            metadata.validate()?;
        }
        Ok(())
    }
}

/// A persisted row: the four stored columns plus the internal row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    /// Serialized metadata, exactly as stored.
    pub metadata: String,
}

/// A queryable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Id,
    Text,
    Vector,
    Metadata,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Text => "text",
            Column::Vector => "vector",
            Column::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(Column::Id),
            "text" => Ok(Column::Text),
            "vector" => Ok(Column::Vector),
            "metadata" => Ok(Column::Metadata),
            other => Err(Error::InvalidInput(format!("unknown column '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_text() {
        assert!(NewDocument::new("   ").validate().is_err());
        assert!(NewDocument::new("ok").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_vector() {
        let doc = NewDocument::new("x").with_vector(vec![1.0, f32::NAN]);
        assert!(doc.validate().is_err());
        let doc = NewDocument::new("x").with_vector(Vec::new());
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        assert!(NewDocument::new("x").with_id("").validate().is_err());
    }

    #[test]
    fn test_column_parse() {
        assert_eq!("metadata".parse::<Column>().unwrap(), Column::Metadata);
        assert!("score".parse::<Column>().is_err());
    }
}
