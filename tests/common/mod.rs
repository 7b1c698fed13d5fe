//! Shared fixtures: a scratch forensics database and configs pointing at it.

#![allow(dead_code)]

use forensic_assistant::{CompletionClient, Config, Handler, ScriptedCompletion};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const DRUGS: [&str; 4] = ["Cocaine", "Heroin", "Cannabis", "Methamphetamine"];

/// Quarterly columns, `"2022 Q1"` .. `"2024 Q4"`
pub fn quarter_columns() -> Vec<String> {
    let mut columns = Vec::new();
    for year in [2022, 2023, 2024] {
        for q in 1..=4 {
            columns.push(format!("{year} Q{q}"));
        }
    }
    columns
}

/// Build `forensics.db` inside `dir` with `investigation_rows` seizures.
///
/// `frequency` holds `(drug_index + 1) * (quarter_index + 1)` per cell and
/// `timeline` holds twice that, so expected answers are easy to compute.
pub fn forensics_db(dir: &Path, investigation_rows: usize) -> PathBuf {
    let path = dir.join("forensics.db");
    let conn = Connection::open(&path).unwrap();

    conn.execute_batch(
        "CREATE TABLE investigation (
            Latitude REAL, Longitude REAL, Date TEXT, Location TEXT, \"Drug Type\" TEXT
        );",
    )
    .unwrap();

    let quarter_defs: Vec<String> = quarter_columns()
        .iter()
        .map(|c| format!("\"{c}\" INTEGER"))
        .collect();
    for table in ["frequency", "timeline"] {
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (\"Drug Type\" TEXT, {});",
            quarter_defs.join(", ")
        ))
        .unwrap();
    }

    let tx = conn.unchecked_transaction().unwrap();
    {
        let mut insert = tx
            .prepare("INSERT INTO investigation VALUES (?1, ?2, ?3, ?4, ?5)")
            .unwrap();
        for i in 0..investigation_rows {
            insert
                .execute(params![
                    51.0 + (i % 100) as f64 / 100.0,
                    -0.5 + (i % 50) as f64 / 100.0,
                    format!("2023-{:02}-{:02}", i % 12 + 1, i % 28 + 1),
                    format!("Site {i}"),
                    DRUGS[i % DRUGS.len()],
                ])
                .unwrap();
        }
    }
    for (table, factor) in [("frequency", 1i64), ("timeline", 2i64)] {
        for (d, drug) in DRUGS.iter().enumerate() {
            let values: Vec<String> = (0..12)
                .map(|q| ((d as i64 + 1) * (q + 1) * factor).to_string())
                .collect();
            tx.execute(
                &format!("INSERT INTO {table} VALUES (?1, {})", values.join(", ")),
                params![drug],
            )
            .unwrap();
        }
    }
    tx.commit().unwrap();
    path
}

/// Default config over `db`, with a dummy credential
pub fn test_config(db: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = db.to_path_buf();
    config.database.pool_size = 4;
    config.completion.api_key = "test-key".to_string();
    config
}

pub fn handler(config: &Config, client: Arc<ScriptedCompletion>) -> Arc<Handler> {
    let client: Arc<dyn CompletionClient> = client;
    Arc::new(Handler::with_client(config, client).unwrap())
}

/// Scratch dir + database + handler answering every request with `response`
pub fn setup(response: &str, investigation_rows: usize) -> (Arc<Handler>, Arc<ScriptedCompletion>, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = forensics_db(dir.path(), investigation_rows);
    let client = Arc::new(ScriptedCompletion::always(response));
    let handler = handler(&test_config(&db), Arc::clone(&client));
    (handler, client, dir)
}

pub fn count_rows(db: &Path, table: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

/// Add a column the catalog does not list and fill it with `value`
pub fn add_unlisted_column(db: &Path, table: &str, column: &str, value: &str) {
    let conn = Connection::open(db).unwrap();
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN \"{column}\" TEXT;"))
        .unwrap();
    conn.execute(&format!("UPDATE {table} SET \"{column}\" = ?1"), params![value])
        .unwrap();
}

/// Which quarter had the most Cocaine seizures, one branch per quarterly column
pub fn peak_quarter_statement(drug: &str) -> String {
    let branches: Vec<String> = quarter_columns()
        .iter()
        .map(|q| {
            format!(
                "SELECT '{q}' AS quarter_name, \"{q}\" AS freq FROM frequency \
                 WHERE \"Drug Type\" = '{drug}'"
            )
        })
        .collect();
    format!(
        "SELECT quarter_name, freq FROM ({}) ORDER BY freq DESC LIMIT 1",
        branches.join(" UNION ALL ")
    )
}
