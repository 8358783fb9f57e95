pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The payload of an envelope, or the value itself when it has none.
pub(crate) fn payload(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value)
}

pub(crate) const ROW_KEYS: [&str; 2] = ["items", "cycles"];

/// The row set of a result: a listing (timeline, invoices) or the
/// reconciled items of a calculation report.
pub(crate) fn rows(value: &Value) -> Option<&[Value]> {
    match payload(value) {
        Value::Array(rows) => Some(rows),
        Value::Object(map) => ROW_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(|v| v.as_slice()),
        _ => None,
    }
}

/// Column names of a row set, in the order of the first row.
pub(crate) fn headers(rows: &[Value]) -> Vec<String> {
    match rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// One cell. Nested term references print as `item/term`.
pub(crate) fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr.iter().map(cell).collect::<Vec<_>>().join(", "),
        Value::Object(map) => match (map.get("item"), map.get("term")) {
            (Some(item), Some(term)) => format!("{}/{}", cell(item), cell(term)),
            _ => serde_json::to_string(value).unwrap_or_default(),
        },
    }
}
