//! Wire events of the grounded chat stream.
//!
//! Each event travels as one `data:` line of a server-sent event stream:
//! `{"text": "..."}` for an answer chunk, `{"error": "..."}` for a failure,
//! and the literal `[DONE]` sentinel at the end.

use serde::{Deserialize, Serialize};

/// End-of-stream marker.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Text(String),
    Error(String),
    Done,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Payload {
    Text { text: String },
    Error { error: String },
}

impl ChatEvent {
    /// Render the `data:` payload of this event (without the `data: ` prefix).
    pub fn to_data(&self) -> String {
        let payload = match self {
            Self::Text(text) => Payload::Text { text: text.clone() },
            Self::Error(error) => Payload::Error { error: error.clone() },
            Self::Done => return DONE_SENTINEL.to_string(),
        };
        // Serializing two string fields cannot fail.
        serde_json::to_string(&payload).unwrap_or_default()
    }

    /// Render a full SSE frame: `data: <payload>\n\n`.
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", self.to_data())
    }

    /// Parse one line of the stream. Lines that are not `data:` lines,
    /// or whose payload is unrecognized, yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let data = line.strip_prefix("data:")?.trim();
        Self::parse_data(data)
    }

    /// Parse the payload of a `data:` line.
    pub fn parse_data(data: &str) -> Option<Self> {
        if data == DONE_SENTINEL {
            return Some(Self::Done);
        }
        match serde_json::from_str::<Payload>(data).ok()? {
            Payload::Text { text } => Some(Self::Text(text)),
            Payload::Error { error } => Some(Self::Error(error)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_wire_format() {
        assert_eq!(ChatEvent::Text("Hi \"there\"".into()).to_frame(), "data: {\"text\":\"Hi \\\"there\\\"\"}\n\n");
        assert_eq!(ChatEvent::Error("boom".into()).to_data(), "{\"error\":\"boom\"}");
        assert_eq!(ChatEvent::Done.to_frame(), "data: [DONE]\n\n");
    }

    #[test]
    fn parses_each_line_kind() {
        assert_eq!(ChatEvent::parse_line("data: {\"text\": \"a\"}"), Some(ChatEvent::Text("a".into())));
        assert_eq!(ChatEvent::parse_line("data: {\"error\": \"x\"}"), Some(ChatEvent::Error("x".into())));
        assert_eq!(ChatEvent::parse_line("data: [DONE]"), Some(ChatEvent::Done));
        assert_eq!(ChatEvent::parse_line(": keep-alive"), None);
        assert_eq!(ChatEvent::parse_line("data: {\"other\": 1}"), None);
    }
}
