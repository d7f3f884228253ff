use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message body — plain text, or a structured tool-result envelope.
///
/// Envelopes are fed back to models verbatim and are never annotated with
/// wall-clock markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Envelope(serde_json::Value),
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Envelope(_) => None,
        }
    }

    /// Flat string rendering for prompts and summaries.
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Envelope(v) => v.to_string(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// One entry in a chat's ordered message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default)]
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_envelope_deserialize_untagged() {
        let m: Message =
            serde_json::from_str(r#"{"role":"user","content":"hi","timestamp_ms":1}"#).unwrap();
        assert_eq!(m.content.as_text(), Some("hi"));

        let m: Message = serde_json::from_str(
            r#"{"role":"assistant","content":{"tool":"shell","stdout":"ok"},"timestamp_ms":2}"#,
        )
        .unwrap();
        assert!(m.content.as_text().is_none());
    }

    #[test]
    fn missing_timestamp_defaults_to_zero() {
        // Older conversation files predate the timestamp field.
        let m: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(m.timestamp_ms, 0);
    }
}
