use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{cell, headers, payload, rows, ROW_KEYS};

/// Rows as a table, then the scalar fields of the result, then the
/// warnings of the envelope.
pub fn print_table(value: &Value) {
    match rows(value) {
        Some([]) => println!("(no rows)"),
        Some(rows) => print_rows(rows),
        None => {}
    }

    if let Value::Object(map) = payload(value) {
        let scalars: Vec<(&String, &Value)> = map
            .iter()
            .filter(|(k, _)| !ROW_KEYS.contains(&k.as_str()))
            .collect();
        if !scalars.is_empty() {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (key, val) in scalars {
                builder.push_record([key.clone(), cell(val)]);
            }
            println!("{}", Table::from(builder));
        }
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}

fn print_rows(rows: &[Value]) {
    let headers = headers(rows);
    if headers.is_empty() {
        for row in rows {
            println!("{}", cell(row));
        }
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(headers.iter().cloned());
    for row in rows {
        builder.push_record(
            headers
                .iter()
                .map(|h| row.get(h.as_str()).map(cell).unwrap_or_default()),
        );
    }
    println!("{}", Table::from(builder));
}
