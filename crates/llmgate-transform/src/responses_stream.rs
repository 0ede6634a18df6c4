//! Anthropic SSE events → OpenAI Responses API SSE events. Sits downstream
//! of either [`crate::stream::OpenAiToAnthropicStream`] (upstream is
//! OpenAI-dialect) or a direct parse of the upstream's own Anthropic SSE
//! (upstream is Anthropic-dialect) — either way, by the time events reach
//! this adapter they are [`BetaStreamEvent`]s.

use std::collections::HashMap;

use llmgate_protocol::anthropic::{BetaStreamContentBlock, BetaStreamContentBlockDelta, BetaStreamEvent};
use llmgate_protocol::openai::{
    FunctionToolCall, OutputItem, OutputMessage, OutputMessageContent, OutputMessageRole,
    OutputTextContent, Response, ResponseObjectType, ResponseStatus, ResponseStreamEvent,
};

struct ToolCallState {
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// One instance per `/v1/responses` stream.
pub struct AnthropicStreamToResponses {
    model: String,
    response_id: String,
    created_at: i64,
    text: String,
    text_item_id: Option<String>,
    tool_calls: HashMap<u32, ToolCallState>,
    next_item_ordinal: u32,
}

impl AnthropicStreamToResponses {
    pub fn new(model: impl Into<String>, response_id: impl Into<String>, created_at: i64) -> Self {
        Self {
            model: model.into(),
            response_id: response_id.into(),
            created_at,
            text: String::new(),
            text_item_id: None,
            tool_calls: HashMap::new(),
            next_item_ordinal: 0,
        }
    }

    fn next_item_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.next_item_ordinal);
        self.next_item_ordinal += 1;
        id
    }

    fn in_progress_response(&self) -> Response {
        Response {
            id: self.response_id.clone(),
            object: ResponseObjectType::Response,
            created_at: self.created_at,
            status: Some(ResponseStatus::InProgress),
            model: self.model.clone(),
            output: Vec::new(),
            usage: None,
        }
    }

    pub fn translate(&mut self, event: &BetaStreamEvent) -> Vec<ResponseStreamEvent> {
        match event {
            BetaStreamEvent::MessageStart { .. } => {
                vec![ResponseStreamEvent::ResponseCreated { response: self.in_progress_response() }]
            }
            BetaStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                BetaStreamContentBlock::Text { .. } => {
                    let item_id = self.next_item_id("msg");
                    self.text_item_id = Some(item_id);
                    Vec::new()
                }
                BetaStreamContentBlock::ToolUse { id, name } => {
                    let item_id = self.next_item_id("fc");
                    self.tool_calls.insert(
                        *index,
                        ToolCallState {
                            item_id,
                            call_id: id.clone(),
                            name: name.clone(),
                            arguments: String::new(),
                        },
                    );
                    Vec::new()
                }
                BetaStreamContentBlock::Thinking { .. } | BetaStreamContentBlock::RedactedThinking { .. } => {
                    Vec::new()
                }
            },
            BetaStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BetaStreamContentBlockDelta::TextDelta { text } => {
                    self.text.push_str(text);
                    let item_id = self.text_item_id.clone().unwrap_or_else(|| "msg_0".to_string());
                    vec![ResponseStreamEvent::OutputTextDelta { item_id, delta: text.clone() }]
                }
                BetaStreamContentBlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(state) = self.tool_calls.get_mut(index) {
                        state.arguments.push_str(partial_json);
                        vec![ResponseStreamEvent::FunctionCallArgumentsDelta {
                            item_id: state.item_id.clone(),
                            delta: partial_json.clone(),
                        }]
                    } else {
                        Vec::new()
                    }
                }
                BetaStreamContentBlockDelta::ThinkingDelta { .. }
                | BetaStreamContentBlockDelta::SignatureDelta { .. } => Vec::new(),
            },
            BetaStreamEvent::ContentBlockStop { index } => {
                if let Some(state) = self.tool_calls.remove(index) {
                    vec![ResponseStreamEvent::OutputItemDone {
                        item: OutputItem::FunctionCall(FunctionToolCall {
                            id: state.item_id,
                            call_id: state.call_id,
                            name: state.name,
                            arguments: state.arguments,
                        }),
                    }]
                } else {
                    Vec::new()
                }
            }
            BetaStreamEvent::MessageDelta { .. } => Vec::new(),
            BetaStreamEvent::MessageStop => {
                let mut output = Vec::new();
                if !self.text.is_empty() {
                    output.push(OutputItem::Message(OutputMessage {
                        id: self.text_item_id.clone().unwrap_or_else(|| "msg_0".to_string()),
                        role: OutputMessageRole::Assistant,
                        content: vec![OutputMessageContent::OutputText(OutputTextContent {
                            text: self.text.clone(),
                        })],
                    }));
                }
                vec![ResponseStreamEvent::ResponseCompleted {
                    response: Response {
                        id: self.response_id.clone(),
                        object: ResponseObjectType::Response,
                        created_at: self.created_at,
                        status: Some(ResponseStatus::Completed),
                        model: self.model.clone(),
                        output,
                        usage: None,
                    },
                }]
            }
            BetaStreamEvent::Ping | BetaStreamEvent::Error { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_protocol::anthropic::{BetaMessage, BetaMessageRole, BetaMessageType, BetaUsage, Model};

    fn message_start() -> BetaStreamEvent {
        BetaStreamEvent::MessageStart {
            message: BetaMessage {
                id: "m1".into(),
                r#type: BetaMessageType::Message,
                role: BetaMessageRole::Assistant,
                model: Model::from("claude-3-5-sonnet"),
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: BetaUsage {
                    input_tokens: 5,
                    output_tokens: 0,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            },
        }
    }

    #[test]
    fn text_stream_translates_to_output_text_deltas() {
        let mut translator = AnthropicStreamToResponses::new("claude-3-5-sonnet", "resp_1", 0);
        let mut out = Vec::new();
        out.extend(translator.translate(&message_start()));
        out.extend(translator.translate(&BetaStreamEvent::ContentBlockStart {
            index: 0,
            content_block: BetaStreamContentBlock::Text { text: String::new() },
        }));
        out.extend(translator.translate(&BetaStreamEvent::ContentBlockDelta {
            index: 0,
            delta: BetaStreamContentBlockDelta::TextDelta { text: "hi".into() },
        }));
        out.extend(translator.translate(&BetaStreamEvent::ContentBlockStop { index: 0 }));
        out.extend(translator.translate(&BetaStreamEvent::MessageStop));

        assert!(matches!(out[0], ResponseStreamEvent::ResponseCreated { .. }));
        assert!(matches!(out[1], ResponseStreamEvent::OutputTextDelta { .. }));
        match out.last().unwrap() {
            ResponseStreamEvent::ResponseCompleted { response } => {
                assert_eq!(response.status, Some(ResponseStatus::Completed));
                match &response.output[0] {
                    OutputItem::Message(m) => match &m.content[0] {
                        OutputMessageContent::OutputText(t) => assert_eq!(t.text, "hi"),
                        other => panic!("unexpected content {other:?}"),
                    },
                    other => panic!("unexpected item {other:?}"),
                }
            }
            other => panic!("unexpected final event {other:?}"),
        }
    }

    #[test]
    fn tool_use_stream_translates_to_function_call_done() {
        let mut translator = AnthropicStreamToResponses::new("claude-3-5-sonnet", "resp_1", 0);
        translator.translate(&message_start());
        translator.translate(&BetaStreamEvent::ContentBlockStart {
            index: 0,
            content_block: BetaStreamContentBlock::ToolUse { id: "t1".into(), name: "get_weather".into() },
        });
        translator.translate(&BetaStreamEvent::ContentBlockDelta {
            index: 0,
            delta: BetaStreamContentBlockDelta::InputJsonDelta { partial_json: "{}".into() },
        });
        let done = translator.translate(&BetaStreamEvent::ContentBlockStop { index: 0 });
        match &done[0] {
            ResponseStreamEvent::OutputItemDone { item: OutputItem::FunctionCall(call) } => {
                assert_eq!(call.call_id, "t1");
                assert_eq!(call.name, "get_weather");
                assert_eq!(call.arguments, "{}");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
