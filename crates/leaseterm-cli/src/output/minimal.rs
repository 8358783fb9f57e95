use rust_decimal::Decimal;
use serde_json::Value;

use super::{cell, payload, rows};

/// Print just the key answer.
///
/// Amount-bearing results print their total; listings print the number of
/// rows; anything else prints its first field.
pub fn print_minimal(value: &Value) {
    let result = payload(value);

    for key in ["net_amount", "indexed_value", "termination_date"] {
        if let Some(val) = result.get(key).filter(|v| !v.is_null()) {
            println!("{}", cell(val));
            return;
        }
    }

    if let Some(rows) = rows(value) {
        let amounts: Vec<Decimal> = rows
            .iter()
            .filter_map(|r| r.get("net_amount"))
            .filter_map(|v| cell(v).parse().ok())
            .collect();
        if amounts.is_empty() {
            println!("{}", rows.len());
        } else {
            println!("{}", amounts.iter().sum::<Decimal>());
        }
        return;
    }

    match result {
        Value::Object(map) => {
            if let Some((key, val)) = map.iter().next() {
                println!("{key}: {}", cell(val));
            }
        }
        other => println!("{}", cell(other)),
    }
}
