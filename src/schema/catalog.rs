//! # Schema Catalog
//!
//! Validated, immutable lookup over a [`SchemaDescriptor`], plus the data
//! dictionary text that grounds every translation.

use super::{quote_ident, ColumnDescriptor, SchemaDescriptor, SemanticType, TableDescriptor};
use crate::error::GatewayError;
use std::collections::HashSet;

/// Version of the built-in forensics descriptor
pub const FORENSICS_SCHEMA_VERSION: &str = "2024.4";

const QUARTER_YEARS: [u16; 3] = [2022, 2023, 2024];

/// Example questions included in the grounding context
const EXAMPLE_QUESTIONS: [&str; 3] = [
    "Show me all drug types and their coordinates from the investigation table.",
    "Which quarter has the highest frequency for a specific drug type?",
    "How does the frequency change over the timeline for a particular drug type?",
];

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    descriptor: SchemaDescriptor,
}

impl SchemaCatalog {
    /// Validate and wrap a descriptor.
    ///
    /// Fails with `GatewayError::Config` on duplicate table or column names,
    /// or when a join key is missing from any table.
    pub fn new(descriptor: SchemaDescriptor) -> Result<Self, GatewayError> {
        if descriptor.tables.is_empty() {
            return Err(GatewayError::Config("schema declares no tables".to_string()));
        }

        let mut table_names = HashSet::new();
        for table in &descriptor.tables {
            if !table_names.insert(table.name.to_ascii_lowercase()) {
                return Err(GatewayError::Config(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }
            let mut column_names = HashSet::new();
            for column in &table.columns {
                if !column_names.insert(column.name.to_ascii_lowercase()) {
                    return Err(GatewayError::Config(format!(
                        "duplicate column '{}' in table '{}'",
                        column.name, table.name
                    )));
                }
            }
        }

        for key in &descriptor.join_keys {
            if let Some(table) = descriptor.tables.iter().find(|t| t.column(key).is_none()) {
                return Err(GatewayError::Config(format!(
                    "join key '{key}' is missing from table '{}'",
                    table.name
                )));
            }
        }

        Ok(SchemaCatalog { descriptor })
    }

    /// The fixed three-table forensics schema.
    pub fn forensics() -> Result<Self, GatewayError> {
        let drug_type = || ColumnDescriptor::new("Drug Type", SemanticType::Category);
        let quarterly = || {
            let mut columns = vec![drug_type()];
            for year in QUARTER_YEARS {
                for quarter in 1..=4 {
                    columns.push(ColumnDescriptor::new(
                        format!("{year} Q{quarter}"),
                        SemanticType::Count,
                    ));
                }
            }
            columns
        };

        SchemaCatalog::new(SchemaDescriptor {
            version: FORENSICS_SCHEMA_VERSION.to_string(),
            tables: vec![
                TableDescriptor::new(
                    "investigation",
                    vec![
                        ColumnDescriptor::new("Latitude", SemanticType::Latitude),
                        ColumnDescriptor::new("Longitude", SemanticType::Longitude),
                        ColumnDescriptor::new("Date", SemanticType::Date),
                        ColumnDescriptor::new("Location", SemanticType::Text),
                        drug_type(),
                    ],
                ),
                TableDescriptor::new("frequency", quarterly()),
                TableDescriptor::new("timeline", quarterly()),
            ],
            join_keys: vec!["Drug Type".to_string()],
        })
    }

    pub fn describe(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.descriptor
            .tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// True if any table carries a column with this name
    pub fn has_column(&self, name: &str) -> bool {
        self.descriptor
            .tables
            .iter()
            .any(|t| t.column(name).is_some())
    }

    /// Grounding text for the completion prompt
    pub fn data_dictionary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "### Database structure (schema version {})\n\n",
            self.descriptor.version
        ));
        out.push_str(&format!(
            "The database contains {} tables:\n\n",
            self.descriptor.tables.len()
        ));
        for (i, table) in self.descriptor.tables.iter().enumerate() {
            out.push_str(&format!("{}. **{}**\n", i + 1, table.name));
            for column in &table.columns {
                out.push_str(&format!(
                    "    - {} ({})\n",
                    quote_ident(&column.name),
                    column.semantic_type
                ));
            }
            out.push('\n');
        }
        for key in &self.descriptor.join_keys {
            out.push_str(&format!(
                "There is a common column **{}** that can be used to join or compare \
                 data among these tables.\n",
                quote_ident(key)
            ));
        }
        out.push_str("\n### Example questions\n");
        for example in EXAMPLE_QUESTIONS {
            out.push_str(&format!("- \"{example}\"\n"));
        }
        out
    }
}
