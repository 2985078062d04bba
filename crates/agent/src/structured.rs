//! Recovery of a single JSON object from free-form model output.

use proto::GatewayError;
use serde_json::{Map, Value};

/// Extracts a JSON object from `raw`.
///
/// Code fences (with or without a language tag) are stripped first. If the
/// remainder does not parse, the span from the first `{` to the last `}` is
/// tried. The error carries the untouched input.
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, GatewayError> {
    let text = strip_fences(raw);

    let direct_err = match parse_object(text) {
        Ok(object) => return Ok(object),
        Err(reason) => reason,
    };

    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(parse_error(direct_err, raw)),
    };
    parse_object(span).map_err(|reason| parse_error(reason, raw))
}

/// Reads a string field, treating non-strings as absent.
pub fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Language tag, if any, runs up to the first non-identifier char.
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_error(reason: String, raw: &str) -> GatewayError {
    GatewayError::StructuredParse {
        reason,
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn clean_json_parses_unchanged() {
        let expected = object(json!({
            "answer": "4",
            "keywords": ["math", "addition"],
            "nested": {"n": 1.5, "flag": true, "none": null}
        }));
        let raw = serde_json::to_string(&expected).expect("serialize");
        assert_eq!(parse_json_object(&raw).expect("parse"), expected);
    }

    #[test]
    fn fenced_block_with_language_tag() {
        let raw = "```json\n{\"answer\": \"4\"}\n```";
        assert_eq!(parse_json_object(raw).expect("parse"), object(json!({"answer": "4"})));
    }

    #[test]
    fn fenced_block_without_tag() {
        let raw = "  ```\n{\"final_answer\": \"done\", \"tool_call\": null}\n```  ";
        let parsed = parse_json_object(raw).expect("parse");
        assert_eq!(str_field(&parsed, "final_answer"), Some("done"));
        assert_eq!(parsed.get("tool_call"), Some(&Value::Null));
    }

    #[test]
    fn leading_and_trailing_prose() {
        let raw = "Sure! Here is the JSON you asked for:\n{\"answer\": \"Paris\"}\nHope that helps.";
        assert_eq!(
            parse_json_object(raw).expect("parse"),
            object(json!({"answer": "Paris"}))
        );
    }

    #[test]
    fn text_without_braces_fails_with_raw_attached() {
        let raw = "I cannot answer that.";
        let err = parse_json_object(raw).expect_err("must fail");
        assert!(err.to_string().starts_with("Failed to parse structured JSON response:"));
        assert_eq!(err.raw_response(), Some(raw));
    }

    #[test]
    fn broken_span_fails() {
        let err = parse_json_object("prefix {\"answer\": } suffix").expect_err("must fail");
        assert!(matches!(err, GatewayError::StructuredParse { .. }));
    }

    #[test]
    fn top_level_array_is_rejected() {
        let err = parse_json_object("[1, 2]").expect_err("must fail");
        let GatewayError::StructuredParse { reason, .. } = err else {
            panic!("unexpected error variant");
        };
        assert!(reason.contains("array"));
    }

    #[test]
    fn str_field_ignores_non_strings() {
        let map = object(json!({"a": "x", "b": 2}));
        assert_eq!(str_field(&map, "a"), Some("x"));
        assert_eq!(str_field(&map, "b"), None);
    }
}
