//! Translation and validation against the forensics catalog.

mod common;

use common::peak_quarter_statement;
use forensic_assistant::translator::{validate, Translator};
use forensic_assistant::{GatewayError, Scalar, SchemaCatalog, ScriptedCompletion};
use std::sync::Arc;
use std::time::Duration;

fn catalog() -> SchemaCatalog {
    SchemaCatalog::forensics().unwrap()
}

async fn translate(output: &str, question: &str) -> Result<forensic_assistant::QueryPlan, GatewayError> {
    let client = Arc::new(ScriptedCompletion::always(output));
    Translator::new(client, Duration::from_secs(5))
        .translate(question, &catalog())
        .await
}

#[tokio::test]
async fn test_cocaine_quarter_question_reads_frequency_only() {
    let plan = translate(
        "SELECT \"2023 Q4\" FROM frequency WHERE \"Drug Type\" = 'Cocaine'",
        "What was the frequency of Cocaine in 2023 Q4?",
    )
    .await
    .unwrap();

    assert_eq!(
        plan.referenced_tables.iter().collect::<Vec<_>>(),
        ["frequency"]
    );
    assert_eq!(plan.bound_parameters.len(), 1);
    assert_eq!(plan.bound_parameters[":p1"], Scalar::text("Cocaine"));
    assert!(!plan.generated_statement.contains("Cocaine"));
    assert!(plan.generated_statement.contains(":p1"));
}

#[tokio::test]
async fn test_peak_quarter_question_unions_quarterly_columns() {
    let plan = translate(
        &format!("```sql\n{};\n```", peak_quarter_statement("Cocaine")),
        "Which quarter has the highest frequency for Cocaine?",
    )
    .await
    .unwrap();

    assert_eq!(
        plan.referenced_tables.iter().collect::<Vec<_>>(),
        ["frequency"]
    );
    // One quarter label and one drug name per branch
    assert_eq!(plan.bound_parameters.len(), 24);
    assert_eq!(plan.bound_parameters[":p1"], Scalar::text("2022 Q1"));
    assert_eq!(plan.bound_parameters[":p2"], Scalar::text("Cocaine"));
    assert!(!plan.generated_statement.contains("Cocaine"));
}

#[tokio::test]
async fn test_join_across_tables_on_drug_type() {
    let plan = translate(
        "SELECT f.\"Drug Type\", f.\"2022 Q1\", t.\"2022 Q1\" \
         FROM frequency AS f JOIN timeline AS t ON f.\"Drug Type\" = t.\"Drug Type\"",
        "Compare Q1 2022 across frequency and timeline",
    )
    .await
    .unwrap();
    assert!(plan.references("frequency"));
    assert!(plan.references("timeline"));
    assert!(!plan.references("investigation"));
}

#[tokio::test]
async fn test_cte_and_aliases_accepted() {
    let plan = translate(
        "WITH totals AS (SELECT \"Drug Type\" AS drug, \"2024 Q1\" + \"2024 Q2\" AS h1 FROM timeline) \
         SELECT drug, h1 FROM totals ORDER BY h1 DESC LIMIT 3",
        "Top three drugs in the first half of 2024",
    )
    .await
    .unwrap();
    assert_eq!(plan.referenced_tables.len(), 1);
    assert!(plan.references("timeline"));
}

#[tokio::test]
async fn test_injection_inside_literal_stays_a_value() {
    let plan = translate(
        "SELECT Location FROM investigation WHERE Location = 'x''; DROP TABLE investigation; --'",
        "tricky",
    )
    .await
    .unwrap();
    assert_eq!(
        plan.bound_parameters[":p1"],
        Scalar::text("x'; DROP TABLE investigation; --")
    );
    assert!(!plan.generated_statement.to_uppercase().contains("DROP"));
}

#[test]
fn test_mutations_and_side_effects_rejected() {
    let catalog = catalog();
    for sql in [
        "DROP TABLE investigation",
        "DELETE FROM investigation",
        "UPDATE frequency SET \"2022 Q1\" = 0",
        "INSERT INTO timeline (\"Drug Type\") VALUES ('x')",
        "ALTER TABLE investigation ADD COLUMN note TEXT",
        "CREATE TABLE notes (x INTEGER)",
        "ATTACH DATABASE 'other.db' AS other",
        "PRAGMA writable_schema = 1",
        "SELECT load_extension('evil.so')",
        "SELECT writefile('out.txt', Location) FROM investigation",
        "SELECT * FROM sqlite_master",
        "SELECT password FROM investigation",
        "SELECT nope.Location FROM investigation",
    ] {
        let err = validate(sql, &catalog).unwrap_err();
        assert!(
            matches!(err, GatewayError::UnsafeQuery { .. }),
            "{sql} gave {err:?}"
        );
    }
}

#[test]
fn test_unparseable_or_multiple_statements() {
    let catalog = catalog();
    for sql in ["SELEC Location FROM investigation", "SELECT 1; SELECT 2", ""] {
        let err = validate(sql, &catalog).unwrap_err();
        assert!(
            matches!(err, GatewayError::Translation(_)),
            "{sql} gave {err:?}"
        );
    }
}
