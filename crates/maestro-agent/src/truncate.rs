//! Tool-result truncation before feeding results back to a model.
//!
//! Oversized envelopes first have their recognized large fields clipped,
//! then the whole serialization is hard-capped.

use serde_json::Value;

use maestro_core::config::{FIELD_TRUNCATE_LENGTH, MAX_RESULT_LENGTH};

/// Fields that routinely carry bulk output.
const LARGE_FIELDS: &[&str] = &[
    "stdout", "stderr", "content", "diff", "output", "body", "html", "text", "log", "logs",
];

/// Serialize a tool result, clipping it to [`MAX_RESULT_LENGTH`].
pub fn truncate_result(value: &Value) -> String {
    let serialized = render(value);
    if serialized.chars().count() <= MAX_RESULT_LENGTH {
        return serialized;
    }

    // Clip recognized large fields first, then re-serialize.
    let mut clipped = value.clone();
    clip_large_fields(&mut clipped);
    let serialized = render(&clipped);
    if serialized.chars().count() <= MAX_RESULT_LENGTH {
        return serialized;
    }

    hard_truncate(&serialized, MAX_RESULT_LENGTH)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clip_large_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if LARGE_FIELDS.contains(&key.as_str()) {
                    if let Value::String(s) = v {
                        *s = clip_string(s);
                        continue;
                    }
                }
                clip_large_fields(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                clip_large_fields(item);
            }
        }
        _ => {}
    }
}

fn clip_string(s: &str) -> String {
    let total = s.chars().count();
    if total <= FIELD_TRUNCATE_LENGTH {
        return s.to_string();
    }
    let kept: String = s.chars().take(FIELD_TRUNCATE_LENGTH).collect();
    format!("{kept} [truncated {} chars]", total - FIELD_TRUNCATE_LENGTH)
}

fn hard_truncate(s: &str, limit: usize) -> String {
    let note = "... [truncated]";
    let kept: String = s.chars().take(limit.saturating_sub(note.len())).collect();
    format!("{kept}{note}")
}
