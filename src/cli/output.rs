//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{OutputFormat, PhalanxArgs};
use crate::error::Result;

/// Print `result` in the requested format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &PhalanxArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &PhalanxArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }
    for line in human_lines(&serde_json::to_value(result)?, 0) {
        println!("{line}");
    }
    Ok(())
}

fn output_json<T: Serialize>(result: &T, args: &PhalanxArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Indented `key: value` lines; nested objects and arrays of objects are
/// expanded below their key.
fn human_lines(value: &serde_json::Value, depth: usize) -> Vec<String> {
    let indent = "  ".repeat(depth);
    let mut lines = Vec::new();
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                if is_nested(val) {
                    lines.push(format!("{indent}{key}:"));
                    lines.extend(human_lines(val, depth + 1));
                } else {
                    lines.push(format!("{indent}{key}: {}", format_value(val)));
                }
            }
        }
        serde_json::Value::Array(items) if items.iter().any(is_nested) => {
            for (i, item) in items.iter().enumerate() {
                lines.push(format!("{indent}[{}]", i + 1));
                lines.extend(human_lines(item, depth + 1));
            }
        }
        other => lines.push(format!("{indent}{}", format_value(other))),
    }
    lines
}

fn is_nested(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(_) => true,
        serde_json::Value::Array(items) => items.iter().any(is_nested),
        _ => false,
    }
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
