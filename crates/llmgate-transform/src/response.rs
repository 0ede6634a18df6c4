//! Non-streaming response translation between the Anthropic and OpenAI
//! chat-completion shapes, in both directions.

use llmgate_protocol::anthropic::{
    BetaContentBlock, BetaMessage, BetaMessageRole as AnthropicRole, BetaMessageType, Model,
    BetaStopReason, BetaTextBlock, BetaToolUseBlock, BetaUsage,
};
use llmgate_protocol::openai::{
    ChatCompletionChoice, ChatCompletionFinishReason, ChatCompletionMessageToolCall,
    ChatCompletionObjectType, ChatCompletionResponseMessage, CompletionUsage,
    CreateChatCompletionResponse, FunctionCall, PromptTokensDetails,
};

use crate::usage::normalize_prompt_tokens;

pub fn openai_response_to_anthropic(resp: &CreateChatCompletionResponse) -> BetaMessage {
    let choice = resp.choices.first();
    let message = choice.map(|c| &c.message);

    let mut content = Vec::new();
    if let Some(message) = message {
        if let Some(text) = &message.content {
            if !text.is_empty() {
                content.push(BetaContentBlock::Text(BetaTextBlock { text: text.clone() }));
            }
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                let llmgate_protocol::openai::ChatCompletionMessageToolCall::Function { id, function } = call;
                let input = serde_json::from_str(&function.arguments).unwrap_or_default();
                content.push(BetaContentBlock::ToolUse(BetaToolUseBlock {
                    id: id.clone(),
                    name: function.name.clone(),
                    input,
                }));
            }
        }
    }

    let stop_reason = choice.map(|c| map_finish_reason(c.finish_reason));

    let usage = resp
        .usage
        .map(|u| {
            let cached = u.prompt_tokens_details.and_then(|d| d.cached_tokens);
            let (input_tokens, cache_read_input_tokens) =
                normalize_prompt_tokens(u.prompt_tokens, cached);
            BetaUsage {
                input_tokens,
                output_tokens: u.completion_tokens,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: if cache_read_input_tokens > 0 {
                    Some(cache_read_input_tokens)
                } else {
                    None
                },
            }
        })
        .unwrap_or_default();

    BetaMessage {
        id: resp.id.clone(),
        r#type: BetaMessageType::Message,
        role: AnthropicRole::Assistant,
        model: Model::from(resp.model.clone()),
        content,
        stop_reason,
        stop_sequence: None,
        usage,
    }
}

/// `stop`→`end_turn`, `length`→`max_tokens`, `tool_calls`→`tool_use`,
/// `content_filter`→`end_turn`, `function_call`→`tool_use` (legacy alias).
pub fn map_finish_reason(reason: ChatCompletionFinishReason) -> BetaStopReason {
    match reason {
        ChatCompletionFinishReason::Stop => BetaStopReason::EndTurn,
        ChatCompletionFinishReason::Length => BetaStopReason::MaxTokens,
        ChatCompletionFinishReason::ToolCalls => BetaStopReason::ToolUse,
        ChatCompletionFinishReason::ContentFilter => BetaStopReason::EndTurn,
        ChatCompletionFinishReason::FunctionCall => BetaStopReason::ToolUse,
    }
}

/// Anthropic message → OpenAI chat-completion response, for the mirror path:
/// `/v1/chat/completions` served by an Anthropic-dialect upstream. `id`/
/// `created` are supplied by the caller, matching
/// [`crate::responses::anthropic_message_to_response`]'s convention of
/// letting the core own wall-clock and id concerns.
pub fn anthropic_message_to_chat_completion(
    message: &BetaMessage,
    id: impl Into<String>,
    created: i64,
) -> CreateChatCompletionResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in &message.content {
        match block {
            BetaContentBlock::Text(text) => text_parts.push(text.text.clone()),
            BetaContentBlock::ToolUse(tool_use) => {
                tool_calls.push(ChatCompletionMessageToolCall::Function {
                    id: tool_use.id.clone(),
                    function: FunctionCall {
                        name: tool_use.name.clone(),
                        arguments: serde_json::to_string(&tool_use.input).unwrap_or_else(|_| "{}".into()),
                    },
                });
            }
            BetaContentBlock::Thinking(_) | BetaContentBlock::RedactedThinking(_) => {}
        }
    }

    let message_out = ChatCompletionResponseMessage {
        content: if text_parts.is_empty() { None } else { Some(text_parts.join("\n")) },
        refusal: None,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
    };

    let usage = message.usage;
    let cached = usage.cache_read_input_tokens.unwrap_or(0);
    CreateChatCompletionResponse {
        id: id.into(),
        object: ChatCompletionObjectType::ChatCompletion,
        created,
        model: message.model.as_str().to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: message_out,
            finish_reason: map_stop_reason(message.stop_reason),
        }],
        usage: Some(CompletionUsage {
            prompt_tokens: usage.input_tokens + cached,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + cached + usage.output_tokens,
            prompt_tokens_details: usage
                .cache_read_input_tokens
                .map(|cached_tokens| PromptTokensDetails { cached_tokens: Some(cached_tokens) }),
        }),
    }
}

/// `end_turn`/`pause_turn`/`stop_sequence`→`stop`, `max_tokens`→`length`,
/// `tool_use`→`tool_calls`, `refusal`→`content_filter`. The absence of a stop
/// reason (stream cut off before `message_delta`) is treated as `stop`.
pub fn map_stop_reason(reason: Option<BetaStopReason>) -> ChatCompletionFinishReason {
    match reason {
        Some(BetaStopReason::MaxTokens) => ChatCompletionFinishReason::Length,
        Some(BetaStopReason::ToolUse) => ChatCompletionFinishReason::ToolCalls,
        Some(BetaStopReason::Refusal) => ChatCompletionFinishReason::ContentFilter,
        Some(BetaStopReason::EndTurn)
        | Some(BetaStopReason::PauseTurn)
        | Some(BetaStopReason::StopSequence)
        | None => ChatCompletionFinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_protocol::anthropic::JsonObject;
    use llmgate_protocol::openai::*;

    fn response_with(message: ChatCompletionResponseMessage, finish: ChatCompletionFinishReason) -> CreateChatCompletionResponse {
        CreateChatCompletionResponse {
            id: "resp-1".into(),
            object: ChatCompletionObjectType::ChatCompletion,
            created: 0,
            model: "claude-3-5-sonnet".into(),
            choices: vec![ChatCompletionChoice { index: 0, message, finish_reason: finish }],
            usage: Some(CompletionUsage {
                prompt_tokens: 8,
                completion_tokens: 2,
                total_tokens: 10,
                prompt_tokens_details: None,
            }),
        }
    }

    #[test]
    fn text_response_translates_content_and_usage() {
        let resp = response_with(
            ChatCompletionResponseMessage { content: Some("hello".into()), refusal: None, tool_calls: None },
            ChatCompletionFinishReason::Stop,
        );
        let message = openai_response_to_anthropic(&resp);
        assert_eq!(message.model.as_str(), "claude-3-5-sonnet");
        assert_eq!(message.stop_reason, Some(BetaStopReason::EndTurn));
        assert_eq!(message.usage.input_tokens, 8);
        assert_eq!(message.usage.output_tokens, 2);
        match &message.content[0] {
            BetaContentBlock::Text(t) => assert_eq!(t.text, "hello"),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn tool_calls_translate_to_tool_use_blocks() {
        let resp = response_with(
            ChatCompletionResponseMessage {
                content: None,
                refusal: None,
                tool_calls: Some(vec![ChatCompletionMessageToolCall::Function {
                    id: "t1".into(),
                    function: FunctionCall { name: "get_weather".into(), arguments: "{\"city\":\"Paris\"}".into() },
                }]),
            },
            ChatCompletionFinishReason::ToolCalls,
        );
        let message = openai_response_to_anthropic(&resp);
        assert_eq!(message.stop_reason, Some(BetaStopReason::ToolUse));
        match &message.content[0] {
            BetaContentBlock::ToolUse(t) => {
                assert_eq!(t.name, "get_weather");
                assert_eq!(t.input["city"], "Paris");
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn cached_tokens_reduce_reported_input_tokens() {
        let mut resp = response_with(
            ChatCompletionResponseMessage { content: Some("hi".into()), refusal: None, tool_calls: None },
            ChatCompletionFinishReason::Stop,
        );
        resp.usage = Some(CompletionUsage {
            prompt_tokens: 100,
            completion_tokens: 5,
            total_tokens: 105,
            prompt_tokens_details: Some(PromptTokensDetails { cached_tokens: Some(20) }),
        });
        let message = openai_response_to_anthropic(&resp);
        assert_eq!(message.usage.input_tokens, 80);
        assert_eq!(message.usage.cache_read_input_tokens, Some(20));
    }

    fn anthropic_message(content: Vec<BetaContentBlock>, stop_reason: Option<BetaStopReason>) -> BetaMessage {
        BetaMessage {
            id: "msg_1".into(),
            r#type: BetaMessageType::Message,
            role: AnthropicRole::Assistant,
            model: Model::from("claude-3-5-sonnet"),
            content,
            stop_reason,
            stop_sequence: None,
            usage: BetaUsage { input_tokens: 8, output_tokens: 3, cache_creation_input_tokens: None, cache_read_input_tokens: None },
        }
    }

    #[test]
    fn anthropic_text_message_translates_to_chat_completion() {
        let message = anthropic_message(
            vec![BetaContentBlock::Text(BetaTextBlock { text: "hi back".into() })],
            Some(BetaStopReason::EndTurn),
        );
        let resp = anthropic_message_to_chat_completion(&message, "chatcmpl-1", 0);
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("hi back"));
        assert_eq!(resp.choices[0].finish_reason, ChatCompletionFinishReason::Stop);
        assert_eq!(resp.usage.unwrap().prompt_tokens, 8);
    }

    #[test]
    fn anthropic_tool_use_translates_to_tool_calls_with_stringified_arguments() {
        let message = anthropic_message(
            vec![BetaContentBlock::ToolUse(BetaToolUseBlock {
                id: "t1".into(),
                name: "get_weather".into(),
                input: {
                    let mut m = JsonObject::new();
                    m.insert("city".into(), serde_json::json!("Paris"));
                    m
                },
            })],
            Some(BetaStopReason::ToolUse),
        );
        let resp = anthropic_message_to_chat_completion(&message, "chatcmpl-1", 0);
        assert_eq!(resp.choices[0].finish_reason, ChatCompletionFinishReason::ToolCalls);
        match &resp.choices[0].message.tool_calls.as_ref().unwrap()[0] {
            ChatCompletionMessageToolCall::Function { id, function } => {
                assert_eq!(id, "t1");
                assert_eq!(function.name, "get_weather");
            }
        }
    }

    #[test]
    fn map_stop_reason_covers_every_anthropic_variant() {
        assert_eq!(map_stop_reason(Some(BetaStopReason::MaxTokens)), ChatCompletionFinishReason::Length);
        assert_eq!(map_stop_reason(Some(BetaStopReason::ToolUse)), ChatCompletionFinishReason::ToolCalls);
        assert_eq!(map_stop_reason(Some(BetaStopReason::Refusal)), ChatCompletionFinishReason::ContentFilter);
        assert_eq!(map_stop_reason(Some(BetaStopReason::EndTurn)), ChatCompletionFinishReason::Stop);
        assert_eq!(map_stop_reason(None), ChatCompletionFinishReason::Stop);
    }
}
