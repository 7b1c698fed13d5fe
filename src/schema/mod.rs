//! # Schema Catalog Module
//!
//! Static description of the forensics database: which tables exist, which
//! columns they carry, and which column joins them. The descriptor is built
//! once at startup, validated, and then shared read-only.
//!
//! ## Tables
//!
//! ```text
//! investigation(Latitude, Longitude, Date, Location, "Drug Type")
//! frequency("Drug Type", "2022 Q1" .. "2024 Q4")
//! timeline("Drug Type", "2022 Q1" .. "2024 Q4")
//! ```

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use catalog::SchemaCatalog;

/// Semantic type of a column, used for grounding the completion prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Latitude,
    Longitude,
    /// Calendar date
    Date,
    /// Free text (place names, descriptions)
    Text,
    /// Categorical label, e.g. a drug type
    Category,
    /// Non-negative count for a period
    Count,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Latitude => write!(f, "latitude"),
            SemanticType::Longitude => write!(f, "longitude"),
            SemanticType::Date => write!(f, "date"),
            SemanticType::Text => write!(f, "text"),
            SemanticType::Category => write!(f, "category"),
            SemanticType::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        ColumnDescriptor {
            name: name.into(),
            semantic_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        TableDescriptor {
            name: name.into(),
            columns,
        }
    }

    /// Case-insensitive column lookup (SQLite identifiers are case-insensitive)
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Render as `name(col1, "col 2", ...)`, quoting names that need it
    pub fn signature(&self) -> String {
        let cols: Vec<String> = self.columns.iter().map(|c| quote_ident(&c.name)).collect();
        format!("{}({})", self.name, cols.join(", "))
    }
}

/// Full description of the queryable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Bumped whenever tables or columns change
    pub version: String,
    pub tables: Vec<TableDescriptor>,
    /// Columns shared by every table, flagged for joins
    pub join_keys: Vec<String>,
}

/// Quote an identifier for SQLite when it is not a plain word
pub fn quote_ident(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
