//! Message formatting shared by every sink.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

// == Render Values ==
/// Joins log arguments with single spaces.
///
/// Strings are used verbatim; every other value is JSON-stringified.
pub fn render_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// == Format Message ==
/// Prefixes a rendered message with timestamp, channel and optional name:
/// `[2024-01-01T00:00:00.000Z] [INFO] [name] message`.
pub fn format_message(channel: &str, name: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let channel = channel.to_uppercase();
    match name {
        Some(name) => format!("[{timestamp}] [{channel}] [{name}] {message}"),
        None => format!("[{timestamp}] [{channel}] {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_values_stringifies_non_strings() {
        let rendered = render_values(&[json!("user"), json!(42), json!({"id": 1}), json!(null)]);
        assert_eq!(rendered, r#"user 42 {"id":1} null"#);
    }

    #[test]
    fn test_format_message_with_name() {
        let line = format_message("warn", Some("billing"), "slow response");
        assert!(line.starts_with('['));
        assert!(line.ends_with("[WARN] [billing] slow response"));
    }

    #[test]
    fn test_format_message_without_name() {
        let line = format_message("info", None, "ready");
        assert!(line.ends_with("] [INFO] ready"));
        assert!(!line.contains("[]"));
    }
}
