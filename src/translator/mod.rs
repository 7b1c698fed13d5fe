//! Query Translator
//!
//! Turns a natural-language question into a validated [`QueryPlan`]:
//!
//! ```text
//! question + data dictionary
//!     ↓
//! [Completion client]   → free text (untrusted)
//!     ↓
//! [extract]             → candidate statement
//!     ↓
//! [validator]           → single read-only query over catalog tables
//!     ↓
//! QueryPlan (parameterized)
//! ```
//!
//! Exactly one completion call is made per translation. Retry policy lives
//! in the gateway.

mod extract;
mod plan;
mod scope;
pub mod validator;

pub use extract::extract_statement;
pub use plan::QueryPlan;
pub use validator::{parse_single_query, validate, ValidatedStatement};

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::error::GatewayError;
use crate::schema::SchemaCatalog;
use std::sync::Arc;
use std::time::Duration;

const INSTRUCTIONS: &str = "\
You translate questions about a forensics database into SQLite SQL.
Rules:
- Reply with exactly one read-only SELECT statement (a WITH clause is allowed).
- Never modify data or schema: no INSERT, UPDATE, DELETE, DROP, ALTER, CREATE, PRAGMA or ATTACH.
- Use only the tables and columns listed below. Quote column names containing spaces with double quotes, e.g. \"Drug Type\" or \"2023 Q4\".
- Write text values as single-quoted literals.
- Return only the SQL, without explanation.";

pub struct Translator {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl Translator {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// System context plus question for the completion service
    pub fn build_request(&self, question: &str, schema: &SchemaCatalog) -> CompletionRequest {
        CompletionRequest {
            system: format!("{INSTRUCTIONS}\n\n{}", schema.data_dictionary()),
            user: question.trim().to_string(),
        }
    }

    /// Translate with the configured completion timeout
    pub async fn translate(
        &self,
        question: &str,
        schema: &SchemaCatalog,
    ) -> Result<QueryPlan, GatewayError> {
        self.translate_within(question, schema, self.timeout).await
    }

    /// Translate with the completion call bounded by `min(timeout, configured)`
    pub async fn translate_within(
        &self,
        question: &str,
        schema: &SchemaCatalog,
        timeout: Duration,
    ) -> Result<QueryPlan, GatewayError> {
        let bound = timeout.min(self.timeout);
        let request = self.build_request(question, schema);

        let output = match tokio::time::timeout(bound, self.client.complete(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(CompletionError::Timeout(bound).into()),
        };

        let candidate = extract_statement(&output).ok_or_else(|| {
            GatewayError::Translation("completion contained no statement".to_string())
        })?;
        tracing::debug!(client = self.client.name(), statement = %candidate, "translation_candidate");

        let validated = validate(&candidate, schema)?;

        Ok(QueryPlan {
            raw_question: question.to_string(),
            generated_statement: validated.sql,
            bound_parameters: validated.parameters,
            referenced_tables: validated.referenced_tables,
        })
    }
}
