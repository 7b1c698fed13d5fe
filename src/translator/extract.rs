//! Pull one SQL statement out of free-form model output.
//!
//! Models wrap statements in markdown fences or lead with prose. Extraction
//! only trims that packaging. Prose lines that happen to open with a SQL
//! keyword ("With pleasure!", "Select the rows...") are skipped by starting
//! at the first keyword line from which the rest of the text parses.
//! Everything after that line is kept, so a mutation stacked behind the
//! query still reaches the validator.

use regex::Regex;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:sqlite|sql)?[ \t]*\r?\n?(.*?)```").expect("valid fenced-block regex")
});

static STATEMENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(select|with|insert|update|delete|drop|alter|create|replace|pragma|attach|detach|vacuum|reindex|explain|begin|commit|values)\b",
    )
    .expect("valid statement-start regex")
});

/// Extract the candidate statement, or `None` if nothing is left.
pub fn extract_statement(output: &str) -> Option<String> {
    let body = FENCED_BLOCK
        .captures(output)
        .and_then(|c| c.get(1))
        .map_or(output, |m| m.as_str());

    let starts: Vec<usize> = STATEMENT_START.find_iter(body).map(|m| m.start()).collect();
    let body = starts
        .iter()
        .map(|&start| &body[start..])
        .find(|candidate| parses(candidate))
        .or_else(|| starts.first().map(|&start| &body[start..]))
        .unwrap_or(body);

    let statement = trim_statement(body);
    if statement.is_empty() {
        None
    } else {
        Some(statement.to_string())
    }
}

fn trim_statement(text: &str) -> &str {
    text.trim().trim_end_matches(';').trim()
}

fn parses(candidate: &str) -> bool {
    let statement = trim_statement(candidate);
    !statement.is_empty()
        && Parser::parse_sql(&SQLiteDialect {}, statement).is_ok_and(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_statement() {
        assert_eq!(
            extract_statement("SELECT * FROM frequency;").as_deref(),
            Some("SELECT * FROM frequency")
        );
    }

    #[test]
    fn test_sql_fence() {
        let output = "Here you go:\n```sql\nSELECT Location FROM investigation\n```\nEnjoy.";
        assert_eq!(
            extract_statement(output).as_deref(),
            Some("SELECT Location FROM investigation")
        );
    }

    #[test]
    fn test_bare_fence() {
        let output = "```\nSELECT 1;\n```";
        assert_eq!(extract_statement(output).as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_leading_prose_dropped() {
        let output = "The query you need is:\nSELECT \"Drug Type\" FROM timeline";
        assert_eq!(
            extract_statement(output).as_deref(),
            Some("SELECT \"Drug Type\" FROM timeline")
        );
    }

    #[test]
    fn test_mutation_is_kept_for_validator() {
        let output = "Sure.\nDROP TABLE investigation;\nSELECT 1";
        let extracted = extract_statement(output).unwrap();
        assert!(extracted.starts_with("DROP TABLE investigation"));
        assert!(extracted.ends_with("SELECT 1"));
    }

    #[test]
    fn test_prose_opening_with_keyword_skipped() {
        let output = "With pleasure! Here is the query you can use to update your view:\n\
                      SELECT Location FROM investigation";
        assert_eq!(
            extract_statement(output).as_deref(),
            Some("SELECT Location FROM investigation")
        );

        let output = "Select the Cocaine row and read the last quarter.\n\
                      SELECT \"2024 Q4\" FROM frequency WHERE \"Drug Type\" = 'Cocaine';";
        assert_eq!(
            extract_statement(output).as_deref(),
            Some("SELECT \"2024 Q4\" FROM frequency WHERE \"Drug Type\" = 'Cocaine'")
        );
    }

    #[test]
    fn test_multiline_statement_kept_whole() {
        let output = "WITH totals AS (\n  SELECT \"Drug Type\" AS drug FROM timeline\n)\nSELECT drug FROM totals";
        assert_eq!(
            extract_statement(output).as_deref(),
            Some(output)
        );
    }

    #[test]
    fn test_unparseable_output_kept_from_first_keyword() {
        let output = "Okay.\nSelect whatever you like\nfrom wherever";
        assert_eq!(
            extract_statement(output).as_deref(),
            Some("Select whatever you like\nfrom wherever")
        );
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(extract_statement("   "), None);
        assert_eq!(extract_statement("```sql\n```"), None);
        assert_eq!(extract_statement(";"), None);
    }
}
