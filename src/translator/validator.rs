//! # Statement Validation
//!
//! Model output is adversarial input. It is parsed into an AST and inspected
//! structurally:
//! - exactly one statement, and it must be a query
//! - every relation is a catalog table or a CTE declared in the statement
//! - every column reference resolves to a catalog column or a column the
//!   statement itself declares (see [`scope`](super::scope))
//! - no side-effecting SQLite functions
//!
//! Accepted statements are then parameterized: string literals become named
//! placeholders so values are bound, never spliced.

use super::scope::resolve_columns;
use crate::error::GatewayError;
use crate::schema::SchemaCatalog;
use crate::value::Scalar;
use regex::Regex;
use sqlparser::ast::{
    visit_expressions_mut, Expr, ObjectName, Query, Statement, Value, Visit, Visitor,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::LazyLock;

/// SQLite functions that touch the filesystem or process state
const DENIED_FUNCTIONS: [&str; 6] = [
    "load_extension",
    "readfile",
    "writefile",
    "edit",
    "fts3_tokenizer",
    "sqlite_compileoption_get",
];

/// A mutating verb opening one `;`-separated piece of statement text
static MUTATING_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|;)\s*(insert|update|delete|drop|alter|create|replace|truncate|attach|detach|pragma|vacuum|reindex|grant|revoke)\b",
    )
    .expect("valid mutating-verb regex")
});

static QUOTED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid string-literal regex"));

/// A statement that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedStatement {
    /// Parameterized statement text
    pub sql: String,
    pub parameters: BTreeMap<String, Scalar>,
    /// Catalog tables read, lowercased
    pub referenced_tables: BTreeSet<String>,
}

/// Parse `sql` and require exactly one read-only query.
///
/// Mutating statements are reported as unsafe even when they sit next to a
/// valid query. Text that does not parse is a translation error unless one
/// of its statements opens with a mutating verb.
pub fn parse_single_query(sql: &str) -> Result<Statement, GatewayError> {
    let statements = match Parser::parse_sql(&SQLiteDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            let unquoted = QUOTED_STRING.replace_all(sql, "''");
            if let Some(verb) = MUTATING_VERB.captures(&unquoted).and_then(|c| c.get(1)) {
                return Err(GatewayError::unsafe_query(
                    format!("unparseable statement uses '{}'", verb.as_str().to_uppercase()),
                    sql,
                ));
            }
            return Err(GatewayError::Translation(format!(
                "could not parse statement: {e}"
            )));
        }
    };

    if let Some(statement) = statements
        .iter()
        .find(|s| !matches!(s, Statement::Query(_)))
    {
        return Err(GatewayError::unsafe_query(
            format!("non-query statement: {}", statement_verb(statement)),
            sql,
        ));
    }

    let mut statements = statements.into_iter();
    match (statements.next(), statements.next()) {
        (Some(statement), None) => Ok(statement),
        (None, _) => Err(GatewayError::Translation("no statement found".to_string())),
        (Some(_), Some(_)) => Err(GatewayError::Translation(
            "expected exactly one statement".to_string(),
        )),
    }
}

/// Full structural validation against the catalog, then parameterization.
pub fn validate(sql: &str, catalog: &SchemaCatalog) -> Result<ValidatedStatement, GatewayError> {
    let mut statement = parse_single_query(sql)?;

    let mut refs = References::default();
    if let ControlFlow::Break(never) = Visit::visit(&statement, &mut refs) {
        match never {}
    }

    if refs.has_placeholders {
        return Err(GatewayError::Translation(
            "statement contains unbound placeholders".to_string(),
        ));
    }

    if let Some(function) = refs
        .functions
        .iter()
        .find(|f| DENIED_FUNCTIONS.contains(&f.as_str()))
    {
        return Err(GatewayError::unsafe_query(
            format!("call to restricted function '{function}'"),
            sql,
        ));
    }

    let mut referenced_tables = BTreeSet::new();
    for relation in &refs.relations {
        if catalog.has_table(relation) {
            referenced_tables.insert(relation.clone());
        } else if !refs.ctes.contains(relation) {
            return Err(GatewayError::unsafe_query(
                format!("unknown table '{relation}'"),
                sql,
            ));
        }
    }

    resolve_columns(&mut statement, catalog, sql)?;

    let parameters = parameterize(&mut statement);

    Ok(ValidatedStatement {
        sql: statement.to_string(),
        parameters,
        referenced_tables,
    })
}

/// Replace every single-quoted string literal with `:pN`, returning the
/// bound values.
fn parameterize(statement: &mut Statement) -> BTreeMap<String, Scalar> {
    let mut parameters = BTreeMap::new();
    let mut counter = 0usize;
    let flow = visit_expressions_mut(statement, |expr| {
        if let Expr::Value(Value::SingleQuotedString(literal)) = expr {
            counter += 1;
            let name = format!(":p{counter}");
            parameters.insert(name.clone(), Scalar::Text(std::mem::take(literal)));
            *expr = Expr::Value(Value::Placeholder(name));
        }
        ControlFlow::<Infallible>::Continue(())
    });
    if let ControlFlow::Break(never) = flow {
        match never {}
    }
    parameters
}

fn statement_verb(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}

fn last_part(name: &ObjectName) -> Option<String> {
    name.0.last().map(|ident| ident.value.to_ascii_lowercase())
}

/// Relations, CTE names and function calls anywhere in a statement, lowercased
#[derive(Debug, Default)]
struct References {
    relations: BTreeSet<String>,
    ctes: HashSet<String>,
    functions: BTreeSet<String>,
    has_placeholders: bool,
}

impl Visitor for References {
    type Break = Infallible;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_ascii_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if let Some(name) = last_part(relation) {
            self.relations.insert(name);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Function(function) => {
                if let Some(name) = last_part(&function.name) {
                    self.functions.insert(name);
                }
            }
            Expr::Value(Value::Placeholder(_)) => {
                self.has_placeholders = true;
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::forensics().unwrap()
    }

    fn assert_unsafe(sql: &str) {
        match validate(sql, &catalog()) {
            Err(GatewayError::UnsafeQuery { .. }) => {}
            other => panic!("expected UnsafeQuery for {sql:?}, got {other:?}"),
        }
    }

    fn assert_translation(sql: &str) {
        match validate(sql, &catalog()) {
            Err(GatewayError::Translation(_)) => {}
            other => panic!("expected Translation for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_select_accepted() {
        let v = validate("SELECT Location, Date FROM investigation", &catalog()).unwrap();
        assert_eq!(v.referenced_tables.len(), 1);
        assert!(v.referenced_tables.contains("investigation"));
        assert!(v.parameters.is_empty());
    }

    #[test]
    fn test_quarterly_columns_accepted() {
        let v = validate(
            "SELECT \"Drug Type\", \"2022 Q1\" + \"2022 Q2\" AS h1 FROM frequency ORDER BY h1 DESC",
            &catalog(),
        )
        .unwrap();
        assert_eq!(
            v.referenced_tables.iter().collect::<Vec<_>>(),
            vec!["frequency"]
        );
    }

    #[test]
    fn test_drop_table_rejected() {
        assert_unsafe("DROP TABLE investigation");
    }

    #[test]
    fn test_drop_behind_select_rejected() {
        assert_unsafe("SELECT 1; DROP TABLE investigation");
    }

    #[test]
    fn test_mutations_rejected() {
        assert_unsafe("DELETE FROM frequency");
        assert_unsafe("UPDATE timeline SET \"2022 Q1\" = 0");
        assert_unsafe("INSERT INTO investigation (Location) VALUES ('x')");
        assert_unsafe("ALTER TABLE frequency ADD COLUMN x INTEGER");
        assert_unsafe("CREATE TABLE x (a INTEGER)");
    }

    #[test]
    fn test_unparseable_mutation_is_unsafe() {
        assert_unsafe("DROP TABLE investigation CASCADE PURGE WHATEVER (");
    }

    #[test]
    fn test_unparseable_prose_is_translation_error() {
        assert_translation("I am not sure what you mean");
        assert_translation(
            "With pleasure! Here is the query you can use to update your view:\n\
             SELECT Location FROM investigation",
        );
        assert_translation("Select the rows, then drop the duplicates");
    }

    #[test]
    fn test_unparseable_stacked_mutation_is_unsafe() {
        assert_unsafe("SELECT 1; DELETE FROM investigation WHERE (((");
    }

    #[test]
    fn test_alias_cannot_reach_unlisted_column() {
        assert_unsafe(
            "SELECT Location AS Informant, investigation.Informant AS leaked FROM investigation",
        );
        assert_unsafe("SELECT Location AS Informant FROM investigation WHERE Informant = 'x'");
    }

    #[test]
    fn test_mutating_word_inside_string_is_not_a_verb() {
        assert_translation("SELEC * FROM frequency WHERE x = 'drop'");
    }

    #[test]
    fn test_two_queries_is_translation_error() {
        assert_translation("SELECT 1; SELECT 2");
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert_unsafe("SELECT * FROM sqlite_master");
        assert_unsafe("SELECT name FROM users");
    }

    #[test]
    fn test_unknown_column_rejected() {
        assert_unsafe("SELECT password FROM investigation");
    }

    #[test]
    fn test_unknown_qualifier_rejected() {
        assert_unsafe("SELECT x.Location FROM investigation");
    }

    #[test]
    fn test_table_alias_and_join_key() {
        let v = validate(
            "SELECT i.Location, f.\"2024 Q4\" FROM investigation i \
             JOIN frequency f ON i.\"Drug Type\" = f.\"Drug Type\"",
            &catalog(),
        )
        .unwrap();
        assert!(v.referenced_tables.contains("investigation"));
        assert!(v.referenced_tables.contains("frequency"));
    }

    #[test]
    fn test_cte_names_and_aliases_allowed() {
        let v = validate(
            "WITH totals AS (SELECT \"Drug Type\" AS drug, \"2023 Q1\" AS n FROM timeline) \
             SELECT drug, n FROM totals WHERE n > 3",
            &catalog(),
        )
        .unwrap();
        assert_eq!(
            v.referenced_tables.iter().collect::<Vec<_>>(),
            vec!["timeline"]
        );
    }

    #[test]
    fn test_restricted_function_rejected() {
        assert_unsafe("SELECT load_extension('evil.so')");
        assert_unsafe("SELECT writefile('/tmp/x', Location) FROM investigation");
    }

    #[test]
    fn test_string_literals_are_parameterized() {
        let v = validate(
            "SELECT Location FROM investigation WHERE \"Drug Type\" = 'Cocaine' AND Location LIKE 'North%'",
            &catalog(),
        )
        .unwrap();
        assert!(!v.sql.contains("Cocaine"));
        assert!(v.sql.contains(":p1"));
        assert!(v.sql.contains(":p2"));
        assert_eq!(v.parameters.get(":p1"), Some(&Scalar::text("Cocaine")));
        assert_eq!(v.parameters.get(":p2"), Some(&Scalar::text("North%")));
    }

    #[test]
    fn test_model_placeholders_rejected() {
        assert_translation("SELECT Location FROM investigation WHERE \"Drug Type\" = ?");
    }

    #[test]
    fn test_parse_single_query_accepts_our_placeholders() {
        let statement =
            parse_single_query("SELECT Location FROM investigation WHERE \"Drug Type\" = :p1")
                .unwrap();
        assert!(matches!(statement, Statement::Query(_)));
    }
}
