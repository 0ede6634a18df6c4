//! OpenAI SSE chat-completion chunks → Anthropic SSE message events, and the
//! mirror translator for the other direction.
//!
//! [`OpenAiToAnthropicStream`] runs a state machine: `INIT → STREAMING →
//! TERMINATED`, with `TERMINATED` reachable from any state via the
//! `[DONE]` sentinel, an upstream error, or the caller simply dropping the
//! translator. Every `content_block_delta{i}` is bracketed by exactly one
//! `content_block_start{i}` before it and one `content_block_stop{i}` after
//! — callers that assert on ordering should hold that invariant against
//! [`OpenAiToAnthropicStream::feed`]'s output.

use std::collections::HashMap;

use llmgate_protocol::anthropic::{
    BetaContentBlock, BetaErrorPayload, BetaMessage, BetaMessageRole as AnthropicRole,
    BetaMessageType, BetaStopReason, BetaStreamContentBlock, BetaStreamContentBlockDelta,
    BetaStreamDeltaUsage, BetaStreamEvent, BetaStreamMessageDelta, Model, BetaUsage,
};
use llmgate_protocol::openai::{
    ChatCompletionChunkObjectType, ChatCompletionMessageToolCallChunk,
    ChatCompletionMessageToolCallChunkFunction, ChatCompletionStreamChoice,
    ChatCompletionStreamResponseDelta, CompletionUsage, CreateChatCompletionStreamResponse,
};

use crate::response::{map_finish_reason, map_stop_reason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Init,
    Streaming,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

struct OpenBlock {
    index: u32,
    kind: BlockKind,
}

/// Per-stream translator. One instance per in-flight request; not `Send`
/// across concurrent streams by design (the dispatcher owns exactly one
/// per SSE connection).
pub struct OpenAiToAnthropicStream {
    state: StreamState,
    model: String,
    input_tokens: i64,
    next_index: u32,
    text_block: Option<u32>,
    thinking_block: Option<u32>,
    tool_blocks_by_openai_index: HashMap<i64, u32>,
    open_order: Vec<OpenBlock>,
    cumulative_output_tokens: i64,
    message_id: Option<String>,
}

impl OpenAiToAnthropicStream {
    pub fn new(model: impl Into<String>, initial_input_tokens: i64) -> Self {
        Self {
            state: StreamState::Init,
            model: model.into(),
            input_tokens: initial_input_tokens,
            next_index: 0,
            text_block: None,
            thinking_block: None,
            tool_blocks_by_openai_index: HashMap::new(),
            open_order: Vec::new(),
            cumulative_output_tokens: 0,
            message_id: None,
        }
    }

    fn alloc_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn ensure_started(&mut self, message_id: &str, out: &mut Vec<BetaStreamEvent>) {
        if self.state != StreamState::Init {
            return;
        }
        self.message_id = Some(message_id.to_string());
        out.push(BetaStreamEvent::MessageStart {
            message: BetaMessage {
                id: message_id.to_string(),
                r#type: BetaMessageType::Message,
                role: AnthropicRole::Assistant,
                model: Model::from(self.model.clone()),
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: BetaUsage {
                    input_tokens: self.input_tokens,
                    output_tokens: 0,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            },
        });
        self.state = StreamState::Streaming;
    }

    fn ensure_text_block(&mut self, out: &mut Vec<BetaStreamEvent>) -> u32 {
        if let Some(index) = self.text_block {
            return index;
        }
        let index = self.alloc_index();
        out.push(BetaStreamEvent::ContentBlockStart {
            index,
            content_block: BetaStreamContentBlock::Text { text: String::new() },
        });
        self.text_block = Some(index);
        self.open_order.push(OpenBlock { index, kind: BlockKind::Text });
        index
    }

    fn ensure_thinking_block(&mut self, out: &mut Vec<BetaStreamEvent>) -> u32 {
        if let Some(index) = self.thinking_block {
            return index;
        }
        let index = self.alloc_index();
        out.push(BetaStreamEvent::ContentBlockStart {
            index,
            content_block: BetaStreamContentBlock::Thinking { thinking: String::new() },
        });
        self.thinking_block = Some(index);
        self.open_order.push(OpenBlock { index, kind: BlockKind::Thinking });
        index
    }

    fn ensure_tool_block(
        &mut self,
        openai_index: i64,
        id: Option<&str>,
        name: Option<&str>,
        out: &mut Vec<BetaStreamEvent>,
    ) -> u32 {
        if let Some(index) = self.tool_blocks_by_openai_index.get(&openai_index) {
            return *index;
        }
        let index = self.alloc_index();
        out.push(BetaStreamEvent::ContentBlockStart {
            index,
            content_block: BetaStreamContentBlock::ToolUse {
                id: id.unwrap_or_default().to_string(),
                name: name.unwrap_or_default().to_string(),
            },
        });
        self.tool_blocks_by_openai_index.insert(openai_index, index);
        self.open_order.push(OpenBlock { index, kind: BlockKind::ToolUse });
        index
    }

    fn close_all_blocks(&mut self, out: &mut Vec<BetaStreamEvent>) {
        for block in self.open_order.drain(..).rev() {
            out.push(BetaStreamEvent::ContentBlockStop { index: block.index });
        }
        self.text_block = None;
        self.thinking_block = None;
        self.tool_blocks_by_openai_index.clear();
    }

    /// Feeds one OpenAI `data:` payload (already stripped of the `data: `
    /// prefix) through the state machine. Returns zero or more Anthropic
    /// events to emit, in order.
    pub fn feed(&mut self, raw_json: &str) -> Vec<BetaStreamEvent> {
        if self.state == StreamState::Terminated {
            return Vec::new();
        }
        let chunk: CreateChatCompletionStreamResponse = match serde_json::from_str(raw_json) {
            Ok(chunk) => chunk,
            Err(_) => return Vec::new(),
        };
        let mut out = Vec::new();
        self.ensure_started(&chunk.id, &mut out);

        if let Some(model_usage) = chunk.usage {
            self.cumulative_output_tokens = model_usage.completion_tokens;
        }

        let Some(choice) = chunk.choices.first() else {
            return out;
        };

        if let Some(text) = &choice.delta.content {
            if !text.is_empty() {
                let index = self.ensure_text_block(&mut out);
                out.push(BetaStreamEvent::ContentBlockDelta {
                    index,
                    delta: BetaStreamContentBlockDelta::TextDelta { text: text.clone() },
                });
                self.cumulative_output_tokens += 1;
            }
        }

        if let Some(thinking) = &choice.delta.reasoning_content {
            if !thinking.is_empty() {
                let index = self.ensure_thinking_block(&mut out);
                out.push(BetaStreamEvent::ContentBlockDelta {
                    index,
                    delta: BetaStreamContentBlockDelta::ThinkingDelta { thinking: thinking.clone() },
                });
                self.cumulative_output_tokens += 1;
            }
        }

        if let Some(tool_calls) = &choice.delta.tool_calls {
            for call in tool_calls {
                let name = call.function.as_ref().and_then(|f| f.name.as_deref());
                let index = self.ensure_tool_block(call.index, call.id.as_deref(), name, &mut out);
                if let Some(function) = &call.function {
                    if let Some(arguments) = &function.arguments {
                        if !arguments.is_empty() {
                            out.push(BetaStreamEvent::ContentBlockDelta {
                                index,
                                delta: BetaStreamContentBlockDelta::InputJsonDelta {
                                    partial_json: arguments.clone(),
                                },
                            });
                            self.cumulative_output_tokens += 1;
                        }
                    }
                }
            }
        }

        if let Some(finish_reason) = choice.finish_reason {
            self.close_all_blocks(&mut out);
            out.push(BetaStreamEvent::MessageDelta {
                delta: BetaStreamMessageDelta {
                    stop_reason: Some(map_finish_reason(finish_reason)),
                    stop_sequence: None,
                },
                usage: BetaStreamDeltaUsage {
                    output_tokens: Some(self.cumulative_output_tokens),
                },
            });
            out.push(BetaStreamEvent::MessageStop);
            self.state = StreamState::Terminated;
        }

        out
    }

    /// Handles the `[DONE]` sentinel. If a `finish_reason` already closed
    /// the stream, this is a no-op; otherwise it synthesizes the closing
    /// sequence with `stop_reason: end_turn`.
    pub fn done(&mut self) -> Vec<BetaStreamEvent> {
        if self.state == StreamState::Terminated {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.ensure_started(self.message_id.clone().unwrap_or_default().as_str(), &mut out);
        self.close_all_blocks(&mut out);
        out.push(BetaStreamEvent::MessageDelta {
            delta: BetaStreamMessageDelta {
                stop_reason: Some(BetaStopReason::EndTurn),
                stop_sequence: None,
            },
            usage: BetaStreamDeltaUsage {
                output_tokens: Some(self.cumulative_output_tokens),
            },
        });
        out.push(BetaStreamEvent::MessageStop);
        self.state = StreamState::Terminated;
        out
    }

    /// Upstream error mid-stream: emit an Anthropic `error` event and
    /// terminate without a `message_stop` (per the specification, the
    /// connection is simply closed after the error event).
    pub fn error(&mut self, message: impl Into<String>) -> Vec<BetaStreamEvent> {
        if self.state == StreamState::Terminated {
            return Vec::new();
        }
        self.state = StreamState::Terminated;
        vec![BetaStreamEvent::Error {
            error: BetaErrorPayload {
                r#type: "api_error".to_string(),
                message: message.into(),
            },
        }]
    }

    pub fn is_terminated(&self) -> bool {
        self.state == StreamState::Terminated
    }
}

/// Per-stream translator for the mirror path: a native Anthropic SSE stream
/// served back out as OpenAI chat-completion chunks. Mirrors
/// [`OpenAiToAnthropicStream`]'s state machine but Anthropic's
/// `content_block_start`/`content_block_stop` bracketing has no OpenAI
/// analogue, so only `ContentBlockStart` for a tool-use block produces a
/// chunk (announcing `id`/`function.name`); text and thinking blocks start
/// silently and simply wait for their first delta.
pub struct AnthropicToOpenAiStream {
    state: StreamState,
    id: Option<String>,
    model: String,
    input_tokens: i64,
    cumulative_output_tokens: i64,
    role_announced: bool,
    next_tool_index: i64,
    tool_index_by_block: HashMap<u32, i64>,
}

impl AnthropicToOpenAiStream {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            state: StreamState::Init,
            id: None,
            model: model.into(),
            input_tokens: 0,
            cumulative_output_tokens: 0,
            role_announced: false,
            next_tool_index: 0,
            tool_index_by_block: HashMap::new(),
        }
    }

    fn empty_chunk(&self, delta: ChatCompletionStreamResponseDelta, finish_reason: Option<llmgate_protocol::openai::ChatCompletionFinishReason>) -> CreateChatCompletionStreamResponse {
        CreateChatCompletionStreamResponse {
            id: self.id.clone().unwrap_or_default(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created: 0,
            model: self.model.clone(),
            choices: vec![ChatCompletionStreamChoice { index: 0, delta, finish_reason }],
            usage: None,
        }
    }

    /// Feeds one Anthropic stream event through the state machine. Returns
    /// zero or more OpenAI chunks to emit, in order. `message_stop` produces
    /// no chunk of its own — callers write the literal `[DONE]` sentinel
    /// after it, the same way the upstream-facing direction's `[DONE]` never
    /// becomes an Anthropic event either.
    pub fn feed(&mut self, event: &BetaStreamEvent) -> Vec<CreateChatCompletionStreamResponse> {
        if self.state == StreamState::Terminated {
            return Vec::new();
        }
        let mut out = Vec::new();
        match event {
            BetaStreamEvent::MessageStart { message } => {
                self.id = Some(message.id.clone());
                self.input_tokens = message.usage.input_tokens;
                self.state = StreamState::Streaming;
                if !self.role_announced {
                    self.role_announced = true;
                    out.push(self.empty_chunk(
                        ChatCompletionStreamResponseDelta { role: Some("assistant".to_string()), ..Default::default() },
                        None,
                    ));
                }
            }
            BetaStreamEvent::ContentBlockStart { index, content_block } => {
                if let BetaStreamContentBlock::ToolUse { id, name } = content_block {
                    let openai_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_index_by_block.insert(*index, openai_index);
                    out.push(self.empty_chunk(
                        ChatCompletionStreamResponseDelta {
                            tool_calls: Some(vec![ChatCompletionMessageToolCallChunk {
                                index: openai_index,
                                id: Some(id.clone()),
                                function: Some(ChatCompletionMessageToolCallChunkFunction {
                                    name: Some(name.clone()),
                                    arguments: Some(String::new()),
                                }),
                            }]),
                            ..Default::default()
                        },
                        None,
                    ));
                }
            }
            BetaStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BetaStreamContentBlockDelta::TextDelta { text } => {
                    self.cumulative_output_tokens += 1;
                    out.push(self.empty_chunk(
                        ChatCompletionStreamResponseDelta { content: Some(text.clone()), ..Default::default() },
                        None,
                    ));
                }
                BetaStreamContentBlockDelta::ThinkingDelta { thinking } => {
                    self.cumulative_output_tokens += 1;
                    out.push(self.empty_chunk(
                        ChatCompletionStreamResponseDelta { reasoning_content: Some(thinking.clone()), ..Default::default() },
                        None,
                    ));
                }
                BetaStreamContentBlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(openai_index) = self.tool_index_by_block.get(index) {
                        self.cumulative_output_tokens += 1;
                        out.push(self.empty_chunk(
                            ChatCompletionStreamResponseDelta {
                                tool_calls: Some(vec![ChatCompletionMessageToolCallChunk {
                                    index: *openai_index,
                                    id: None,
                                    function: Some(ChatCompletionMessageToolCallChunkFunction {
                                        name: None,
                                        arguments: Some(partial_json.clone()),
                                    }),
                                }]),
                                ..Default::default()
                            },
                            None,
                        ));
                    }
                }
                BetaStreamContentBlockDelta::SignatureDelta { .. } => {}
            },
            BetaStreamEvent::ContentBlockStop { .. } => {}
            BetaStreamEvent::MessageDelta { delta, usage } => {
                if let Some(output_tokens) = usage.output_tokens {
                    self.cumulative_output_tokens = output_tokens;
                }
                out.push(self.empty_chunk(
                    ChatCompletionStreamResponseDelta::default(),
                    Some(map_stop_reason(delta.stop_reason)),
                ));
                let mut final_chunk = out.pop().unwrap();
                final_chunk.usage = Some(CompletionUsage {
                    prompt_tokens: self.input_tokens,
                    completion_tokens: self.cumulative_output_tokens,
                    total_tokens: self.input_tokens + self.cumulative_output_tokens,
                    prompt_tokens_details: None,
                });
                out.push(final_chunk);
            }
            BetaStreamEvent::MessageStop => {
                self.state = StreamState::Terminated;
            }
            BetaStreamEvent::Ping => {}
            BetaStreamEvent::Error { .. } => {
                self.state = StreamState::Terminated;
            }
        }
        out
    }

    /// Upstream transport error with no corresponding Anthropic `error`
    /// event (a dropped connection, a timeout): builds the OpenAI-dialect
    /// error envelope directly since `CreateChatCompletionStreamResponse`
    /// has no error variant to carry it.
    pub fn error(&mut self, message: impl Into<String>) -> serde_json::Value {
        self.state = StreamState::Terminated;
        serde_json::json!({
            "error": {
                "type": "api_error",
                "message": message.into(),
            }
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.state == StreamState::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(id: &str, body: serde_json::Value) -> String {
        let mut value = json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": 0,
            "model": "claude-3-5-sonnet",
        });
        for (k, v) in body.as_object().unwrap() {
            value[k] = v.clone();
        }
        value.to_string()
    }

    #[test]
    fn plain_text_stream_emits_full_sequence() {
        let mut translator = OpenAiToAnthropicStream::new("claude-3-5-sonnet", 8);
        let mut events = Vec::new();
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"content": "hel"}, "finish_reason": null}]}),
        )));
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": null}]}),
        )));
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
        )));
        events.extend(translator.done());

        let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn tool_call_arguments_concatenate_across_chunks() {
        let mut translator = OpenAiToAnthropicStream::new("claude-3-5-sonnet", 5);
        let mut events = Vec::new();
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "id": "t1", "function": {"name": "get_weather", "arguments": ""}}]}, "finish_reason": null}]}),
        )));
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"city\":"}}]}, "finish_reason": null}]}),
        )));
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"Paris\"}"}}]}, "finish_reason": "tool_calls"}]}),
        )));

        let mut partial_json = String::new();
        for event in &events {
            if let BetaStreamEvent::ContentBlockDelta {
                delta: BetaStreamContentBlockDelta::InputJsonDelta { partial_json: chunk },
                ..
            } = event
            {
                partial_json.push_str(chunk);
            }
        }
        assert_eq!(partial_json, "{\"city\":\"Paris\"}");

        match events.first().unwrap() {
            BetaStreamEvent::MessageStart { .. } => {}
            other => panic!("expected message_start first, got {other:?}"),
        }
        match events.last().unwrap() {
            BetaStreamEvent::MessageStop => {}
            other => panic!("expected message_stop last, got {other:?}"),
        }
        let stop_reason = events.iter().find_map(|e| match e {
            BetaStreamEvent::MessageDelta { delta, .. } => delta.stop_reason,
            _ => None,
        });
        assert_eq!(stop_reason, Some(BetaStopReason::ToolUse));
    }

    #[test]
    fn done_without_finish_reason_synthesizes_end_turn() {
        let mut translator = OpenAiToAnthropicStream::new("claude-3-5-sonnet", 3);
        translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": null}]}),
        ));
        let events = translator.done();
        let stop_reason = events.iter().find_map(|e| match e {
            BetaStreamEvent::MessageDelta { delta, .. } => delta.stop_reason,
            _ => None,
        });
        assert_eq!(stop_reason, Some(BetaStopReason::EndTurn));
        assert!(translator.is_terminated());
    }

    #[test]
    fn every_block_start_has_exactly_one_matching_stop() {
        let mut translator = OpenAiToAnthropicStream::new("claude-3-5-sonnet", 3);
        let mut events = Vec::new();
        events.extend(translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"content": "hi", "tool_calls": [{"index": 0, "id": "t1", "function": {"name": "f", "arguments": "{}"}}]}, "finish_reason": "tool_calls"}]}),
        )));

        let mut starts = std::collections::HashSet::new();
        let mut stops = std::collections::HashSet::new();
        for event in &events {
            match event {
                BetaStreamEvent::ContentBlockStart { index, .. } => {
                    assert!(starts.insert(*index), "duplicate start for {index}");
                }
                BetaStreamEvent::ContentBlockStop { index } => {
                    assert!(stops.insert(*index), "duplicate stop for {index}");
                }
                _ => {}
            }
        }
        assert_eq!(starts, stops);
    }

    #[test]
    fn error_mid_stream_terminates_without_message_stop() {
        let mut translator = OpenAiToAnthropicStream::new("claude-3-5-sonnet", 3);
        translator.feed(&chunk(
            "c1",
            json!({"choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": null}]}),
        ));
        let events = translator.error("upstream disconnected");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name(), "error");
        assert!(translator.is_terminated());
        assert!(translator.feed(&chunk("c1", json!({"choices": []}))).is_empty());
    }

    fn anthropic_message_for_stream(id: &str, model: &str, input_tokens: i64) -> BetaMessage {
        BetaMessage {
            id: id.to_string(),
            r#type: BetaMessageType::Message,
            role: AnthropicRole::Assistant,
            model: Model::from(model),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: BetaUsage {
                input_tokens,
                output_tokens: 0,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        }
    }

    #[test]
    fn anthropic_text_stream_emits_role_then_content_then_finish() {
        let mut translator = AnthropicToOpenAiStream::new("claude-3-5-sonnet");
        let mut chunks = Vec::new();
        chunks.extend(translator.feed(&BetaStreamEvent::MessageStart {
            message: anthropic_message_for_stream("msg_1", "claude-3-5-sonnet", 8),
        }));
        chunks.extend(translator.feed(&BetaStreamEvent::ContentBlockStart {
            index: 0,
            content_block: BetaStreamContentBlock::Text { text: String::new() },
        }));
        chunks.extend(translator.feed(&BetaStreamEvent::ContentBlockDelta {
            index: 0,
            delta: BetaStreamContentBlockDelta::TextDelta { text: "hi".into() },
        }));
        chunks.extend(translator.feed(&BetaStreamEvent::ContentBlockStop { index: 0 }));
        chunks.extend(translator.feed(&BetaStreamEvent::MessageDelta {
            delta: BetaStreamMessageDelta { stop_reason: Some(BetaStopReason::EndTurn), stop_sequence: None },
            usage: BetaStreamDeltaUsage { output_tokens: Some(1) },
        }));
        chunks.extend(translator.feed(&BetaStreamEvent::MessageStop));

        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("hi"));
        let last = chunks.last().unwrap();
        assert_eq!(last.choices[0].finish_reason, Some(llmgate_protocol::openai::ChatCompletionFinishReason::Stop));
        assert_eq!(last.usage.as_ref().unwrap().prompt_tokens, 8);
        assert_eq!(last.usage.as_ref().unwrap().completion_tokens, 1);
        assert!(translator.is_terminated());
    }

    #[test]
    fn anthropic_tool_use_stream_emits_incremental_tool_call_chunks() {
        let mut translator = AnthropicToOpenAiStream::new("claude-3-5-sonnet");
        translator.feed(&BetaStreamEvent::MessageStart {
            message: anthropic_message_for_stream("msg_1", "claude-3-5-sonnet", 5),
        });
        let start_chunks = translator.feed(&BetaStreamEvent::ContentBlockStart {
            index: 0,
            content_block: BetaStreamContentBlock::ToolUse { id: "t1".into(), name: "get_weather".into() },
        });
        let delta_chunks = translator.feed(&BetaStreamEvent::ContentBlockDelta {
            index: 0,
            delta: BetaStreamContentBlockDelta::InputJsonDelta { partial_json: "{\"city\":\"Paris\"}".into() },
        });
        translator.feed(&BetaStreamEvent::ContentBlockStop { index: 0 });
        let finish_chunks = translator.feed(&BetaStreamEvent::MessageDelta {
            delta: BetaStreamMessageDelta { stop_reason: Some(BetaStopReason::ToolUse), stop_sequence: None },
            usage: BetaStreamDeltaUsage { output_tokens: Some(4) },
        });

        let start_call = &start_chunks[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(start_call.id.as_deref(), Some("t1"));
        assert_eq!(start_call.function.as_ref().unwrap().name.as_deref(), Some("get_weather"));

        let delta_call = &delta_chunks[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(delta_call.index, start_call.index);
        assert!(delta_call.id.is_none());
        assert_eq!(delta_call.function.as_ref().unwrap().arguments.as_deref(), Some("{\"city\":\"Paris\"}"));

        assert_eq!(
            finish_chunks[0].choices[0].finish_reason,
            Some(llmgate_protocol::openai::ChatCompletionFinishReason::ToolCalls)
        );
    }

    #[test]
    fn anthropic_error_event_terminates_stream() {
        let mut translator = AnthropicToOpenAiStream::new("claude-3-5-sonnet");
        translator.feed(&BetaStreamEvent::MessageStart {
            message: anthropic_message_for_stream("msg_1", "claude-3-5-sonnet", 3),
        });
        translator.feed(&BetaStreamEvent::Error {
            error: BetaErrorPayload { r#type: "overloaded_error".into(), message: "busy".into() },
        });
        assert!(translator.is_terminated());
        assert!(translator
            .feed(&BetaStreamEvent::ContentBlockDelta {
                index: 0,
                delta: BetaStreamContentBlockDelta::TextDelta { text: "late".into() },
            })
            .is_empty());
    }
}
