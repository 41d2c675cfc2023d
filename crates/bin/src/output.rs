//! Output formatting helpers for human-readable and JSON output.

use serde::Serialize;
use serde_json::Value;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Print a table with aligned columns in human-readable format.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_line.join("  "));

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .take(col_count)
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", line.join("  "));
    }
}

/// Flatten a JSON value into `(dotted.path, value)` rows.
///
/// Arrays are summarized by their length rather than expanded.
pub fn field_rows(value: &Value) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    flatten("", value, &mut rows);
    rows
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<Vec<String>>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, rows);
            }
        }
        Value::Array(items) => {
            rows.push(vec![prefix.to_string(), format!("[{} items]", items.len())])
        }
        Value::String(s) => rows.push(vec![prefix.to_string(), s.clone()]),
        Value::Null => rows.push(vec![prefix.to_string(), "-".to_string()]),
        other => rows.push(vec![prefix.to_string(), other.to_string()]),
    }
}

/// Print `value` as a FIELD/VALUE table or as one line of JSON.
pub fn print_value<T: Serialize>(
    value: &T,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_value(value)?;
    match format {
        OutputFormat::Human => print_table(&["FIELD", "VALUE"], &field_rows(&json)),
        OutputFormat::Json => println!("{}", serde_json::to_string(&json)?),
    }
    Ok(())
}
