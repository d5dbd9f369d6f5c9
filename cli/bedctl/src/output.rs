//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

const CLI_SCHEMA_VERSION: &str = "smartbed.cli.v1";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Print rows as a table, or the serializable value as JSON.
pub fn print_output<R: Tabled, J: Serialize + ?Sized>(rows: &[R], json: &J, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => println!("{}", format_json(json)),
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize + ?Sized>(data: &T) {
    println!("{}", format_json(data));
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// Render `-` for absent values in tables.
pub fn display_option<T: std::fmt::Display>(opt: &Option<T>) -> String {
    opt.as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_json<T: Serialize + ?Sized>(data: &T) -> String {
    let value = serde_json::to_value(data).unwrap_or_else(|_| serde_json::json!({}));
    let wrapped = serde_json::json!({
        "schemaVersion": CLI_SCHEMA_VERSION,
        "data": value
    });
    let sorted = sort_json_value(wrapped);
    serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| "{}".to_string())
}

/// Stable key order so JSON output diffs cleanly.
fn sort_json_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(sort_json_value).collect())
        }
        serde_json::Value::Object(entries) => {
            let mut pairs: Vec<_> = entries.into_iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            let mut mapped = serde_json::Map::new();
            for (key, value) in pairs {
                mapped.insert(key, sort_json_value(value));
            }
            serde_json::Value::Object(mapped)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_is_wrapped_with_schema() {
        let out = format_json(&serde_json::json!({ "id": "B-1" }));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["schemaVersion"], CLI_SCHEMA_VERSION);
        assert_eq!(value["data"]["id"], "B-1");
    }

    #[test]
    fn test_nested_keys_are_sorted() {
        let sorted = sort_json_value(serde_json::json!({
            "b": { "z": 1, "a": 2 },
            "a": [{ "y": 1, "x": 2 }]
        }));
        let out = serde_json::to_string(&sorted).unwrap();
        assert_eq!(out, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_display_option() {
        assert_eq!(display_option(&Some(3)), "3");
        assert_eq!(display_option::<String>(&None), "-");
    }
}
