use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// One step of an auto-generation run: the cumulative prompt text after
    /// appending `word` at `step`.
    Snapshot {
        step: usize,
        word: String,
        text: String,
    },
    Complete {
        reason: String,
        text: String,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn snapshot(step: usize, word: String, text: String) -> Self {
        Self::Snapshot { step, word, text }
    }

    pub fn complete(reason: String, text: String) -> Self {
        Self::Complete { reason, text }
    }

    pub fn error(message: String) -> Self {
        Self::Error { message }
    }

    pub fn event_type(&self) -> String {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
        .to_string()
    }

    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        let snap = StreamEvent::snapshot(0, "fox".into(), "the quick brown fox".into());
        assert_eq!(snap.event_type(), "snapshot");
        assert_eq!(
            StreamEvent::complete("limit".into(), "done".into()).event_type(),
            "complete"
        );
        assert_eq!(StreamEvent::error("boom".into()).event_type(), "error");
    }

    #[test]
    fn test_sse_data_is_json() {
        let snap = StreamEvent::snapshot(2, "fox".into(), "the fox".into());
        let json: serde_json::Value =
            serde_json::from_str(&snap.to_sse_data()).expect("valid json");
        assert_eq!(json["Snapshot"]["step"], 2);
        assert_eq!(json["Snapshot"]["word"], "fox");
    }
}
