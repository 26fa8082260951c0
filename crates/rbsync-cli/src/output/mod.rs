//! Output formatting for rbsync commands.
//!
//! JSON for machines, and a concise one-line-per-record text form for build logs.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Machine-readable JSON
    Json,
    /// Concise text, one record per line
    #[default]
    Text,
}

/// Renders command output in the selected format.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub const fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Format data according to the configured output format
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
            OutputFormat::Text => Ok(render_text(&serde_json::to_value(data)?)),
        }
    }

    /// Format and print data to stdout
    pub fn print<T: Serialize>(&self, data: &T) -> Result<()> {
        let output = self.format(data)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{output}")?;
        Ok(())
    }

    /// Print a list, or `empty_message` when there is nothing to show.
    ///
    /// JSON output wraps the list as `{ <collection_name>: [...], count }`.
    pub fn print_list<T: Serialize>(
        &self,
        data: &[T],
        empty_message: &str,
        collection_name: &str,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::to_string_pretty(&list_envelope(data, collection_name)?)?;
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{output}")?;
                Ok(())
            }
            OutputFormat::Text => {
                if data.is_empty() {
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{empty_message}")?;
                    Ok(())
                } else {
                    self.print(&data)
                }
            }
        }
    }
}

fn list_envelope<T: Serialize>(data: &[T], collection_name: &str) -> Result<Value> {
    let mut envelope = serde_json::Map::new();
    envelope.insert(collection_name.to_string(), serde_json::to_value(data)?);
    envelope.insert("count".to_string(), serde_json::json!(data.len()));
    Ok(Value::Object(envelope))
}

/// Fields printed first and without a label.
const LEAD_KEYS: [&str; 3] = ["build", "key", "name"];

/// Render a JSON value as concise text
fn render_text(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut parts = Vec::new();

            for key in &LEAD_KEYS {
                if let Some(val) = map.get(*key).filter(|v| !v.is_null()) {
                    parts.push(render_field_value(val));
                }
            }

            for (key, val) in map {
                if LEAD_KEYS.contains(&key.as_str()) {
                    continue;
                }
                match val {
                    Value::Array(arr) if arr.is_empty() => {}
                    Value::Null => {}
                    _ => parts.push(format!("{key}:{}", render_field_value(val))),
                }
            }
            parts.join("  ")
        }
        Value::Array(arr) => arr.iter().map(render_text).collect::<Vec<_>>().join("\n"),
        _ => render_field_value(value),
    }
}

/// Render a single field value as concise text
fn render_field_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if s.contains(' ') || s.contains('\n') {
                format!("\"{}\"", s.replace('\n', "\\n"))
            } else {
                s.clone()
            }
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(render_field_value).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| format!("{k}:{}", render_field_value(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Outcome {
        review_id: u64,
        key: String,
        author: String,
        description: String,
        change_number: Option<u64>,
        warnings: Vec<String>,
    }

    fn sample() -> Outcome {
        Outcome {
            review_id: 42,
            key: "ABC-1".to_string(),
            author: "alice".to_string(),
            description: "Fix the\nfrobnicator".to_string(),
            change_number: None,
            warnings: vec![],
        }
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
        assert_eq!(Formatter::default().output_format(), OutputFormat::Text);
    }

    #[test]
    fn test_json_output() {
        let output = Formatter::new(OutputFormat::Json).format(&sample()).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["review_id"], 42);
        assert_eq!(parsed["key"], "ABC-1");
        assert!(parsed["change_number"].is_null());
    }

    #[test]
    fn test_text_output_leads_with_key() {
        let output = Formatter::new(OutputFormat::Text).format(&sample()).unwrap();
        assert!(output.starts_with("ABC-1"));
        assert!(output.contains("review_id:42"));
        assert!(output.contains("author:alice"));
        assert!(output.contains("\"Fix the\\nfrobnicator\""));
        assert!(!output.contains("change_number"));
        assert!(!output.contains("warnings"));
    }

    #[test]
    fn test_text_array_one_line_per_item() {
        let output = Formatter::new(OutputFormat::Text)
            .format(&vec![sample(), sample()])
            .unwrap();
        assert_eq!(output.lines().count(), 2);
    }

    #[test]
    fn test_nested_object_inline() {
        let value = serde_json::json!({
            "key": "ABC-1",
            "disposition": {"status": "created", "review_id": 42}
        });
        assert_eq!(
            render_text(&value),
            "ABC-1  disposition:{review_id:42,status:created}"
        );
    }

    #[test]
    fn test_list_envelope() {
        let envelope = list_envelope(&["alice", "bob"], "users").unwrap();
        assert_eq!(envelope["count"], 2);
        assert_eq!(envelope["users"][1], "bob");
    }
}
