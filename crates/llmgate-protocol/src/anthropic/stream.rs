use serde::{Deserialize, Serialize};

use super::response::{BetaMessage, BetaStopReason, BetaUsage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String },
    Thinking { thinking: String },
    RedactedThinking { data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamContentBlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetaStreamMessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<BetaStopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BetaStreamDeltaUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaErrorPayload {
    pub r#type: String,
    pub message: String,
}

/// The Anthropic SSE event sequence, exactly as emitted on the wire. Each
/// variant carries an `event: <tag>` line alongside its `data:` payload;
/// [`crate::anthropic::event_name`] returns that tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BetaStreamEvent {
    MessageStart {
        message: BetaMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: BetaStreamContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BetaStreamContentBlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: BetaStreamMessageDelta,
        usage: BetaStreamDeltaUsage,
    },
    MessageStop,
    Ping,
    Error {
        error: BetaErrorPayload,
    },
}

impl BetaStreamEvent {
    /// The `event:` line that precedes this event's `data:` line on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            BetaStreamEvent::MessageStart { .. } => "message_start",
            BetaStreamEvent::ContentBlockStart { .. } => "content_block_start",
            BetaStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            BetaStreamEvent::ContentBlockStop { .. } => "content_block_stop",
            BetaStreamEvent::MessageDelta { .. } => "message_delta",
            BetaStreamEvent::MessageStop => "message_stop",
            BetaStreamEvent::Ping => "ping",
            BetaStreamEvent::Error { .. } => "error",
        }
    }

    /// Renders as the two SSE lines (`event:` + `data:`) plus the trailing
    /// blank line that separates events on the wire.
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_default();
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_matches_serialized_tag() {
        let ev = BetaStreamEvent::ContentBlockStop { index: 2 };
        assert_eq!(ev.event_name(), "content_block_stop");
        let sse = ev.to_sse();
        assert!(sse.starts_with("event: content_block_stop\ndata: "));
        assert!(sse.ends_with("\n\n"));
    }
}
