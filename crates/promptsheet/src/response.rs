//! Turning a model response into a cell value.
//!
//! The classification endpoint answers `{"isEngineer": bool, "reasoning": str}`.
//! Anything else that is still valid JSON is shown as its compact JSON text,
//! cut to [`FALLBACK_MAX_CHARS`] characters.

use serde_json::Value;

/// Field carrying the classification.
pub const CLASSIFICATION_FIELD: &str = "isEngineer";
/// Optional field carrying the model's explanation.
pub const REASONING_FIELD: &str = "reasoning";
/// Maximum length of a cell value built from an unrecognised response.
pub const FALLBACK_MAX_CHARS: usize = 50;

/// A cell value extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellResult {
    pub value: String,
    pub note: Option<String>,
}

/// Extract the cell value from a parsed JSON response.
pub fn interpret(response: &Value) -> CellResult {
    let note = response
        .get(REASONING_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);

    let value = match response.get(CLASSIFICATION_FIELD).and_then(Value::as_bool) {
        Some(true) => "Yes".to_string(),
        Some(false) => "No".to_string(),
        None => truncate_chars(&response.to_string(), FALLBACK_MAX_CHARS),
    };

    CellResult { value, note }
}

/// Parse a raw response body. Returns `Err` when the body is not JSON.
pub fn interpret_body(body: &str) -> Result<CellResult, serde_json::Error> {
    let value: Value = serde_json::from_str(body)?;
    Ok(interpret(&value))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boolean_classification_maps_to_yes_no() {
        let r = interpret(&json!({"isEngineer": true, "reasoning": "CS"}));
        assert_eq!(r.value, "Yes");
        assert_eq!(r.note.as_deref(), Some("CS"));

        let r = interpret(&json!({"isEngineer": false}));
        assert_eq!(r.value, "No");
        assert!(r.note.is_none());
    }

    #[test]
    fn unknown_shape_falls_back_to_truncated_json() {
        let long = "x".repeat(80);
        let r = interpret(&json!({ "answer": long }));
        assert_eq!(r.value.chars().count(), FALLBACK_MAX_CHARS);
        assert!(r.value.starts_with(r#"{"answer":"xxx"#));
    }

    #[test]
    fn non_boolean_field_is_not_a_classification() {
        let r = interpret(&json!({"isEngineer": "maybe"}));
        assert_eq!(r.value, r#"{"isEngineer":"maybe"}"#);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let r = interpret(&json!("é".repeat(60)));
        assert_eq!(r.value.chars().count(), FALLBACK_MAX_CHARS);
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(interpret_body("<html>502 Bad Gateway</html>").is_err());
        assert_eq!(
            interpret_body(r#"{"isEngineer":true}"#).unwrap().value,
            "Yes"
        );
    }
}
