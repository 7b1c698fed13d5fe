//! Answer rendering. Pure: the same result always renders the same text.

use crate::executor::QueryResult;
use crate::value::Scalar;

pub const NO_ROWS: &str = "No matching records were found.";

/// Render a result as the answer shown to the user.
///
/// A single cell becomes `column: value`, anything larger a markdown table.
/// Truncated results end with a notice naming the row cap.
pub fn format_answer(result: &QueryResult) -> String {
    let mut answer = if result.rows.is_empty() {
        NO_ROWS.to_string()
    } else if result.columns.len() == 1 && result.rows.len() == 1 {
        format!("{}: {}", result.columns[0], cell(&result.rows[0][0]))
    } else {
        table(result)
    };

    if result.truncated {
        answer.push_str(&format!(
            "\n\nOnly the first {} rows are shown; the full result was larger.",
            result.row_count
        ));
    }
    answer
}

fn table(result: &QueryResult) -> String {
    let mut out = String::new();
    out.push_str(&row_line(result.columns.iter().map(|c| escape(c))));
    out.push_str(&row_line(result.columns.iter().map(|_| "---".to_string())));
    for row in &result.rows {
        out.push_str(&row_line(row.iter().map(cell)));
    }
    // Drop the final newline
    out.pop();
    out
}

fn row_line(cells: impl Iterator<Item = String>) -> String {
    let cells: Vec<String> = cells.collect();
    format!("| {} |\n", cells.join(" | "))
}

fn cell(value: &Scalar) -> String {
    match value {
        Scalar::Null => String::new(),
        other => escape(&other.to_string()),
    }
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Vec<Vec<Scalar>>, truncated: bool) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            row_count: rows.len(),
            rows,
            truncated,
        }
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(format_answer(&result(&["x"], vec![], false)), NO_ROWS);
    }

    #[test]
    fn test_single_value() {
        let r = result(&["total"], vec![vec![Scalar::Integer(42)]], false);
        assert_eq!(format_answer(&r), "total: 42");
    }

    #[test]
    fn test_table() {
        let r = result(
            &["Drug Type", "2023 Q4"],
            vec![
                vec![Scalar::text("Cocaine"), Scalar::Integer(12)],
                vec![Scalar::text("Heroin"), Scalar::Null],
            ],
            false,
        );
        assert_eq!(
            format_answer(&r),
            "| Drug Type | 2023 Q4 |\n| --- | --- |\n| Cocaine | 12 |\n| Heroin |  |"
        );
    }

    #[test]
    fn test_pipes_escaped() {
        let r = result(
            &["a", "b"],
            vec![vec![Scalar::text("x|y"), Scalar::text("line\nbreak")]],
            false,
        );
        assert!(format_answer(&r).contains("| x\\|y | line break |"));
    }

    #[test]
    fn test_truncation_notice() {
        let rows = (0..3).map(|i| vec![Scalar::Integer(i)]).collect();
        let answer = format_answer(&result(&["n"], rows, true));
        assert!(answer.ends_with("Only the first 3 rows are shown; the full result was larger."));
    }

    #[test]
    fn test_deterministic() {
        let r = result(&["n"], vec![vec![Scalar::Real(1.5)], vec![Scalar::Real(2.0)]], false);
        assert_eq!(format_answer(&r), format_answer(&r));
    }
}
