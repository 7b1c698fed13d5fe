use crate::value::Scalar;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A validated, parameterized, read-only statement ready for execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    /// The question as the user asked it
    pub raw_question: String,
    /// Single read-only statement; string literals replaced by `:pN`
    pub generated_statement: String,
    /// Placeholder name (with its `:` prefix) to bound value
    pub bound_parameters: BTreeMap<String, Scalar>,
    /// Catalog tables the statement reads, lowercased
    pub referenced_tables: BTreeSet<String>,
}

impl QueryPlan {
    /// Build a plan by hand. The executor re-checks the statement, so a plan
    /// that skipped the translator is still never run unchecked.
    pub fn new(raw_question: impl Into<String>, generated_statement: impl Into<String>) -> Self {
        QueryPlan {
            raw_question: raw_question.into(),
            generated_statement: generated_statement.into(),
            bound_parameters: BTreeMap::new(),
            referenced_tables: BTreeSet::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Scalar) -> Self {
        self.bound_parameters.insert(name.into(), value);
        self
    }

    pub fn references(&self, table: &str) -> bool {
        self.referenced_tables.contains(&table.to_ascii_lowercase())
    }
}
