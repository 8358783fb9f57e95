use serde_json::Value;
use std::io;

use super::{cell, headers, payload, rows};

/// Write the row set of the output as CSV, or `field,value` pairs when
/// the result has no rows.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    if let Some(rows) = rows(value) {
        let headers = headers(rows);
        let _ = wtr.write_record(&headers);
        for row in rows {
            let record: Vec<String> = headers
                .iter()
                .map(|h| row.get(h.as_str()).map(cell).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&record);
        }
    } else if let Value::Object(map) = payload(value) {
        let _ = wtr.write_record(["field", "value"]);
        for (key, val) in map {
            let _ = wtr.write_record([key.clone(), cell(val)]);
        }
    } else {
        let _ = wtr.write_record([cell(value)]);
    }

    let _ = wtr.flush();
}
