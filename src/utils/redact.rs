use crate::error::AppResult;
use serde_json::Value as JsonValue;

/// Masks student-identifying text in a JSON payload before it is logged.
pub fn redact_sensitive_data(data: &JsonValue) -> AppResult<JsonValue> {
    Ok(redact_value(data))
}

fn redact_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let redacted_map = map
                .iter()
                .map(|(key, val)| {
                    let redacted_val = if is_sensitive_field(key) {
                        redact_string_value(val)
                    } else {
                        redact_value(val)
                    };
                    (key.clone(), redacted_val)
                })
                .collect();
            JsonValue::Object(redacted_map)
        }
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(redact_value).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    matches!(
        lower.as_str(),
        "studentname"
            | "student_name"
            | "name"
            | "note"
            | "notes"
            | "reflection"
            | "studentreflection"
            | "student_reflection"
            | "feedback"
            | "strengths"
            | "improvements"
            | "description"
    )
}

fn redact_string_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) if !s.is_empty() => JsonValue::String("[REDACTED]".to_string()),
        _ => value.clone(),
    }
}
