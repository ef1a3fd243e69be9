// SPDX-License-Identifier: MIT

//! Plain-text rendering of daemon responses.

use serde_json::Value;

/// Render a value either raw (--json) or as friendly text.
pub fn render(data: Option<&Value>, json: bool) {
    let Some(data) = data else {
        if !json {
            println!("ok");
        } else {
            println!("null");
        }
        return;
    };
    if json {
        println!("{}", serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()));
        return;
    }
    match data {
        Value::Array(rows) => {
            for row in rows {
                println!("{}", summarize(row));
            }
            if rows.is_empty() {
                println!("(none)");
            }
        }
        other => println!("{}", summarize(other)),
    }
}

/// One line per object: the interesting fields, in a stable order.
fn summarize(value: &Value) -> String {
    let Value::Object(map) = value else {
        return value.to_string();
    };
    const LEADING: [&str; 8] =
        ["server", "id", "state", "kind", "status", "level", "message", "priority"];
    let mut parts: Vec<String> = Vec::new();
    for key in LEADING {
        if let Some(v) = map.get(key) {
            parts.push(format!("{key}={}", flat(v)));
        }
    }
    for (key, v) in map {
        if LEADING.contains(&key.as_str()) || v.is_null() {
            continue;
        }
        parts.push(format!("{key}={}", flat(v)));
    }
    parts.join("  ")
}

fn flat(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
