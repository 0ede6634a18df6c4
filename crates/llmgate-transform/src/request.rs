//! Request body translation between the Anthropic and OpenAI chat-completion
//! shapes, in both directions: `anthropic_request_to_openai` for an
//! OpenAI-dialect upstream behind an Anthropic-facing route, and
//! `openai_chat_request_to_anthropic` for the mirror image (an
//! Anthropic-dialect upstream behind `/v1/chat/completions`).

use llmgate_protocol::anthropic::{
    BetaContentBlockParam, BetaImageBlockParam, BetaImageMediaType, BetaImageSource,
    BetaMessageContent, BetaMessageParam, BetaMessageRole, BetaSystemParam, BetaTextBlockParam,
    BetaTool, BetaToolChoice, BetaToolResultBlockParam, BetaToolResultContent,
    BetaToolUseBlockParam, CreateMessageRequestBody, JsonObject, Model,
};
use llmgate_protocol::openai::{
    ChatCompletionImageUrl, ChatCompletionMessageToolCall, ChatCompletionNamedFunction,
    ChatCompletionNamedToolChoice, ChatCompletionRequestMessage, ChatCompletionToolChoiceMode,
    ChatCompletionToolChoiceOption, ChatCompletionToolDefinition, ChatCompletionUserContent,
    ChatCompletionUserContentPart, CreateChatCompletionRequestBody, FunctionCall, FunctionObject,
    StopConfiguration,
};

pub fn anthropic_request_to_openai(req: &CreateMessageRequestBody) -> CreateChatCompletionRequestBody {
    let mut messages = Vec::new();

    if let Some(system) = &req.system {
        messages.push(ChatCompletionRequestMessage::System {
            content: flatten_system(system),
            name: None,
        });
    }

    for message in &req.messages {
        translate_message(message, &mut messages);
    }

    CreateChatCompletionRequestBody {
        model: req.model.as_str().to_string(),
        messages,
        max_tokens: Some(req.max_tokens as i64),
        temperature: req.temperature,
        top_p: req.top_p,
        stop: req
            .stop_sequences
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| StopConfiguration::Many(s.clone())),
        stream: req.stream,
        tools: req.tools.as_ref().map(|tools| tools.iter().map(translate_tool).collect()),
        tool_choice: req.tool_choice.as_ref().map(translate_tool_choice),
        parallel_tool_calls: None,
    }
}

fn flatten_system(system: &BetaSystemParam) -> String {
    match system {
        BetaSystemParam::Text(text) => text.clone(),
        BetaSystemParam::Blocks(blocks) => blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn translate_message(message: &BetaMessageParam, out: &mut Vec<ChatCompletionRequestMessage>) {
    match message.role {
        BetaMessageRole::User => translate_user_message(&message.content, out),
        BetaMessageRole::Assistant => translate_assistant_message(&message.content, out),
    }
}

fn translate_user_message(content: &BetaMessageContent, out: &mut Vec<ChatCompletionRequestMessage>) {
    let text = match content {
        BetaMessageContent::Text(text) => text.clone(),
        BetaMessageContent::Blocks(blocks) => {
            let mut parts: Vec<ChatCompletionUserContentPart> = Vec::new();
            for block in blocks {
                match block {
                    BetaContentBlockParam::Text(t) => {
                        parts.push(ChatCompletionUserContentPart::Text { text: t.text.clone() })
                    }
                    BetaContentBlockParam::Image(image) => {
                        parts.push(ChatCompletionUserContentPart::ImageUrl {
                            image_url: translate_image_source(&image.source),
                        })
                    }
                    BetaContentBlockParam::ToolResult(tool_result) => {
                        if !parts.is_empty() {
                            out.push(ChatCompletionRequestMessage::User {
                                content: ChatCompletionUserContent::Parts(std::mem::take(&mut parts)),
                                name: None,
                            });
                        }
                        out.push(ChatCompletionRequestMessage::Tool {
                            content: tool_result_text(tool_result.content.as_ref()),
                            tool_call_id: tool_result.tool_use_id.clone(),
                        });
                    }
                    // Thinking/redacted-thinking/tool-use blocks do not occur on the
                    // user side of the wire protocol; ignored if present.
                    BetaContentBlockParam::Thinking(_)
                    | BetaContentBlockParam::RedactedThinking(_)
                    | BetaContentBlockParam::ToolUse(_) => {}
                }
            }
            if !parts.is_empty() {
                out.push(ChatCompletionRequestMessage::User {
                    content: ChatCompletionUserContent::Parts(parts),
                    name: None,
                });
            }
            return;
        }
    };
    out.push(ChatCompletionRequestMessage::User {
        content: ChatCompletionUserContent::Text(text),
        name: None,
    });
}

fn translate_assistant_message(
    content: &BetaMessageContent,
    out: &mut Vec<ChatCompletionRequestMessage>,
) {
    match content {
        BetaMessageContent::Text(text) => {
            out.push(ChatCompletionRequestMessage::Assistant {
                content: Some(text.clone()),
                refusal: None,
                tool_calls: None,
            });
        }
        BetaMessageContent::Blocks(blocks) => {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for block in blocks {
                match block {
                    BetaContentBlockParam::Text(t) => {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(&t.text);
                    }
                    BetaContentBlockParam::ToolUse(tool_use) => {
                        tool_calls.push(ChatCompletionMessageToolCall::Function {
                            id: tool_use.id.clone(),
                            function: FunctionCall {
                                name: tool_use.name.clone(),
                                arguments: serde_json::to_string(&tool_use.input)
                                    .unwrap_or_else(|_| "{}".to_string()),
                            },
                        });
                    }
                    // Dropped: extended-thinking signatures are only valid from
                    // the originating API and are never forwarded cross-dialect.
                    BetaContentBlockParam::Thinking(_) | BetaContentBlockParam::RedactedThinking(_) => {}
                    BetaContentBlockParam::Image(_) | BetaContentBlockParam::ToolResult(_) => {}
                }
            }
            out.push(ChatCompletionRequestMessage::Assistant {
                content: if text.is_empty() { None } else { Some(text) },
                refusal: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            });
        }
    }
}

fn translate_image_source(source: &BetaImageSource) -> ChatCompletionImageUrl {
    match source {
        BetaImageSource::Base64 { data, media_type } => {
            let mime = media_type_mime(*media_type);
            ChatCompletionImageUrl {
                url: format!("data:{mime};base64,{data}"),
                detail: None,
            }
        }
        BetaImageSource::Url { url } => ChatCompletionImageUrl {
            url: url.clone(),
            detail: None,
        },
    }
}

fn media_type_mime(media_type: llmgate_protocol::anthropic::BetaImageMediaType) -> &'static str {
    use llmgate_protocol::anthropic::BetaImageMediaType::*;
    match media_type {
        Jpeg => "image/jpeg",
        Png => "image/png",
        Gif => "image/gif",
        Webp => "image/webp",
    }
}

fn tool_result_text(content: Option<&BetaToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(BetaToolResultContent::Text(text)) => text.clone(),
        Some(BetaToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|block| match block {
                BetaContentBlockParam::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn translate_tool(tool: &BetaTool) -> ChatCompletionToolDefinition {
    ChatCompletionToolDefinition::Function {
        function: FunctionObject {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: Some(tool.input_schema.clone()),
            strict: None,
        },
    }
}

fn translate_tool_choice(choice: &BetaToolChoice) -> ChatCompletionToolChoiceOption {
    match choice {
        BetaToolChoice::Auto { .. } => {
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Auto)
        }
        BetaToolChoice::Any { .. } => {
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Required)
        }
        BetaToolChoice::Tool { name, .. } => {
            ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice::Function {
                function: ChatCompletionNamedFunction { name: name.clone() },
            })
        }
        BetaToolChoice::None => {
            ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::None)
        }
    }
}

/// OpenAI chat-completion request → Anthropic request, for the mirror path:
/// `/v1/chat/completions` served by an Anthropic-dialect upstream.
pub fn openai_chat_request_to_anthropic(req: &CreateChatCompletionRequestBody) -> CreateMessageRequestBody {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();

    for message in &req.messages {
        match message {
            ChatCompletionRequestMessage::System { content, .. } => system_parts.push(content.clone()),
            ChatCompletionRequestMessage::User { content, .. } => {
                messages.push(BetaMessageParam {
                    role: BetaMessageRole::User,
                    content: translate_openai_user_content(content),
                });
            }
            ChatCompletionRequestMessage::Assistant { content, tool_calls, .. } => {
                messages.push(translate_openai_assistant_message(content.as_deref(), tool_calls.as_deref()));
            }
            ChatCompletionRequestMessage::Tool { content, tool_call_id } => {
                messages.push(BetaMessageParam {
                    role: BetaMessageRole::User,
                    content: BetaMessageContent::Blocks(vec![BetaContentBlockParam::ToolResult(
                        BetaToolResultBlockParam {
                            tool_use_id: tool_call_id.clone(),
                            content: Some(BetaToolResultContent::Text(content.clone())),
                            is_error: None,
                            cache_control: None,
                        },
                    )]),
                });
            }
        }
    }

    CreateMessageRequestBody {
        model: Model::from(req.model.clone()),
        messages,
        max_tokens: req.max_tokens.map(|n| n.max(1) as u32).unwrap_or(4096),
        system: if system_parts.is_empty() {
            None
        } else {
            Some(BetaSystemParam::Text(system_parts.join("\n")))
        },
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        stop_sequences: req.stop.as_ref().map(|stop| match stop {
            StopConfiguration::Single(s) => vec![s.clone()],
            StopConfiguration::Many(s) => s.clone(),
        }),
        stream: req.stream,
        tools: req.tools.as_ref().map(|tools| tools.iter().map(translate_openai_tool).collect()),
        tool_choice: req.tool_choice.as_ref().map(translate_openai_tool_choice),
    }
}

fn translate_openai_user_content(content: &ChatCompletionUserContent) -> BetaMessageContent {
    match content {
        ChatCompletionUserContent::Text(text) => BetaMessageContent::Text(text.clone()),
        ChatCompletionUserContent::Parts(parts) => {
            let blocks = parts
                .iter()
                .map(|part| match part {
                    ChatCompletionUserContentPart::Text { text } => {
                        BetaContentBlockParam::Text(BetaTextBlockParam { text: text.clone(), cache_control: None })
                    }
                    ChatCompletionUserContentPart::ImageUrl { image_url } => {
                        BetaContentBlockParam::Image(BetaImageBlockParam {
                            source: translate_openai_image_url(image_url),
                            cache_control: None,
                        })
                    }
                })
                .collect();
            BetaMessageContent::Blocks(blocks)
        }
    }
}

/// A `data:<mime>;base64,<data>` URL becomes a base64 image source;
/// anything else passes through as a plain URL source.
fn translate_openai_image_url(image_url: &ChatCompletionImageUrl) -> BetaImageSource {
    if let Some(rest) = image_url.url.strip_prefix("data:") {
        if let Some((mime, data)) = rest.split_once(";base64,") {
            if let Some(media_type) = media_type_from_mime(mime) {
                return BetaImageSource::Base64 { data: data.to_string(), media_type };
            }
        }
    }
    BetaImageSource::Url { url: image_url.url.clone() }
}

fn media_type_from_mime(mime: &str) -> Option<BetaImageMediaType> {
    match mime {
        "image/jpeg" => Some(BetaImageMediaType::Jpeg),
        "image/png" => Some(BetaImageMediaType::Png),
        "image/gif" => Some(BetaImageMediaType::Gif),
        "image/webp" => Some(BetaImageMediaType::Webp),
        _ => None,
    }
}

fn translate_openai_assistant_message(
    content: Option<&str>,
    tool_calls: Option<&[ChatCompletionMessageToolCall]>,
) -> BetaMessageParam {
    let mut blocks = Vec::new();
    if let Some(text) = content {
        if !text.is_empty() {
            blocks.push(BetaContentBlockParam::Text(BetaTextBlockParam {
                text: text.to_string(),
                cache_control: None,
            }));
        }
    }
    if let Some(tool_calls) = tool_calls {
        for call in tool_calls {
            let ChatCompletionMessageToolCall::Function { id, function } = call;
            let input: JsonObject = serde_json::from_str(&function.arguments).unwrap_or_default();
            blocks.push(BetaContentBlockParam::ToolUse(BetaToolUseBlockParam {
                id: id.clone(),
                input,
                name: function.name.clone(),
                cache_control: None,
            }));
        }
    }
    BetaMessageParam { role: BetaMessageRole::Assistant, content: BetaMessageContent::Blocks(blocks) }
}

fn translate_openai_tool(tool: &ChatCompletionToolDefinition) -> BetaTool {
    let ChatCompletionToolDefinition::Function { function } = tool;
    BetaTool {
        name: function.name.clone(),
        description: function.description.clone(),
        input_schema: function.parameters.clone().unwrap_or_else(|| serde_json::json!({"type": "object"})),
        cache_control: None,
    }
}

fn translate_openai_tool_choice(choice: &ChatCompletionToolChoiceOption) -> BetaToolChoice {
    match choice {
        ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Auto) => {
            BetaToolChoice::Auto { disable_parallel_tool_use: None }
        }
        ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Required) => {
            BetaToolChoice::Any { disable_parallel_tool_use: None }
        }
        ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::None) => BetaToolChoice::None,
        ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice::Function { function }) => {
            BetaToolChoice::Tool { name: function.name.clone(), disable_parallel_tool_use: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_protocol::anthropic::*;

    fn simple_request(content: BetaMessageContent) -> CreateMessageRequestBody {
        CreateMessageRequestBody {
            model: Model::from("claude-3-5-sonnet"),
            messages: vec![BetaMessageParam {
                role: BetaMessageRole::User,
                content,
            }],
            max_tokens: 10,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
        }
    }

    #[test]
    fn plain_text_message_round_trips() {
        let req = simple_request(BetaMessageContent::Text("hi".into()));
        let openai = anthropic_request_to_openai(&req);
        assert_eq!(openai.model, "claude-3-5-sonnet");
        assert_eq!(openai.max_tokens, Some(10));
        match &openai.messages[0] {
            ChatCompletionRequestMessage::User { content, .. } => {
                assert_eq!(*content, ChatCompletionUserContent::Text("hi".into()));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn system_array_is_concatenated() {
        let mut req = simple_request(BetaMessageContent::Text("hi".into()));
        req.system = Some(BetaSystemParam::Blocks(vec![
            BetaTextBlockParam { text: "a".into(), cache_control: None },
            BetaTextBlockParam { text: "b".into(), cache_control: None },
        ]));
        let openai = anthropic_request_to_openai(&req);
        match &openai.messages[0] {
            ChatCompletionRequestMessage::System { content, .. } => assert_eq!(content, "a\nb"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn tool_use_becomes_tool_call_with_json_stringified_input() {
        let mut input = JsonObject::new();
        input.insert("city".into(), serde_json::json!("Paris"));
        let req = CreateMessageRequestBody {
            messages: vec![BetaMessageParam {
                role: BetaMessageRole::Assistant,
                content: BetaMessageContent::Blocks(vec![BetaContentBlockParam::ToolUse(
                    BetaToolUseBlockParam {
                        id: "t1".into(),
                        input,
                        name: "get_weather".into(),
                        cache_control: None,
                    },
                )]),
            }],
            ..simple_request(BetaMessageContent::Text("unused".into()))
        };
        let openai = anthropic_request_to_openai(&req);
        match &openai.messages[0] {
            ChatCompletionRequestMessage::Assistant { tool_calls, .. } => {
                let calls = tool_calls.as_ref().unwrap();
                match &calls[0] {
                    ChatCompletionMessageToolCall::Function { id, function } => {
                        assert_eq!(id, "t1");
                        assert_eq!(function.name, "get_weather");
                        let parsed: serde_json::Value = serde_json::from_str(&function.arguments).unwrap();
                        assert_eq!(parsed["city"], "Paris");
                    }
                }
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn tool_result_becomes_tool_message_and_splits_surrounding_text() {
        let req = CreateMessageRequestBody {
            messages: vec![BetaMessageParam {
                role: BetaMessageRole::User,
                content: BetaMessageContent::Blocks(vec![
                    BetaContentBlockParam::Text(BetaTextBlockParam { text: "before".into(), cache_control: None }),
                    BetaContentBlockParam::ToolResult(BetaToolResultBlockParam {
                        tool_use_id: "t1".into(),
                        content: Some(BetaToolResultContent::Text("42".into())),
                        is_error: None,
                        cache_control: None,
                    }),
                    BetaContentBlockParam::Text(BetaTextBlockParam { text: "after".into(), cache_control: None }),
                ]),
            }],
            ..simple_request(BetaMessageContent::Text("unused".into()))
        };
        let openai = anthropic_request_to_openai(&req);
        assert_eq!(openai.messages.len(), 3);
        matches!(openai.messages[0], ChatCompletionRequestMessage::User { .. });
        match &openai.messages[1] {
            ChatCompletionRequestMessage::Tool { content, tool_call_id } => {
                assert_eq!(content, "42");
                assert_eq!(tool_call_id, "t1");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn thinking_blocks_are_dropped_from_assistant_history() {
        let req = CreateMessageRequestBody {
            messages: vec![BetaMessageParam {
                role: BetaMessageRole::Assistant,
                content: BetaMessageContent::Blocks(vec![
                    BetaContentBlockParam::Thinking(BetaThinkingBlockParam {
                        signature: "sig".into(),
                        thinking: "reasoning".into(),
                    }),
                    BetaContentBlockParam::Text(BetaTextBlockParam { text: "answer".into(), cache_control: None }),
                ]),
            }],
            ..simple_request(BetaMessageContent::Text("unused".into()))
        };
        let openai = anthropic_request_to_openai(&req);
        match &openai.messages[0] {
            ChatCompletionRequestMessage::Assistant { content, .. } => {
                assert_eq!(content.as_deref(), Some("answer"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn tool_choice_mapping() {
        let mut req = simple_request(BetaMessageContent::Text("hi".into()));
        req.tool_choice = Some(BetaToolChoice::Any { disable_parallel_tool_use: None });
        let openai = anthropic_request_to_openai(&req);
        assert_eq!(
            openai.tool_choice,
            Some(ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Required))
        );
    }

    fn openai_req(messages: Vec<ChatCompletionRequestMessage>) -> CreateChatCompletionRequestBody {
        CreateChatCompletionRequestBody {
            model: "claude-3-5-sonnet".into(),
            messages,
            max_tokens: Some(10),
            temperature: None,
            top_p: None,
            stop: None,
            stream: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
        }
    }

    #[test]
    fn openai_system_message_becomes_anthropic_system_field() {
        let req = openai_req(vec![
            ChatCompletionRequestMessage::System { content: "be terse".into(), name: None },
            ChatCompletionRequestMessage::User {
                content: ChatCompletionUserContent::Text("hi".into()),
                name: None,
            },
        ]);
        let anthropic = openai_chat_request_to_anthropic(&req);
        assert_eq!(anthropic.system, Some(BetaSystemParam::Text("be terse".into())));
        assert_eq!(anthropic.messages.len(), 1);
    }

    #[test]
    fn openai_tool_message_becomes_anthropic_tool_result() {
        let req = openai_req(vec![ChatCompletionRequestMessage::Tool {
            content: "42".into(),
            tool_call_id: "t1".into(),
        }]);
        let anthropic = openai_chat_request_to_anthropic(&req);
        match &anthropic.messages[0].content {
            BetaMessageContent::Blocks(blocks) => match &blocks[0] {
                BetaContentBlockParam::ToolResult(tr) => {
                    assert_eq!(tr.tool_use_id, "t1");
                    assert_eq!(tr.content, Some(BetaToolResultContent::Text("42".into())));
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn openai_tool_call_becomes_anthropic_tool_use() {
        let req = openai_req(vec![ChatCompletionRequestMessage::Assistant {
            content: None,
            refusal: None,
            tool_calls: Some(vec![ChatCompletionMessageToolCall::Function {
                id: "t1".into(),
                function: FunctionCall { name: "get_weather".into(), arguments: "{\"city\":\"Paris\"}".into() },
            }]),
        }]);
        let anthropic = openai_chat_request_to_anthropic(&req);
        match &anthropic.messages[0].content {
            BetaMessageContent::Blocks(blocks) => match &blocks[0] {
                BetaContentBlockParam::ToolUse(tool_use) => {
                    assert_eq!(tool_use.name, "get_weather");
                    assert_eq!(tool_use.input.get("city").unwrap(), "Paris");
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn openai_data_url_image_becomes_base64_source() {
        let req = openai_req(vec![ChatCompletionRequestMessage::User {
            content: ChatCompletionUserContent::Parts(vec![ChatCompletionUserContentPart::ImageUrl {
                image_url: ChatCompletionImageUrl {
                    url: "data:image/png;base64,abcd".into(),
                    detail: None,
                },
            }]),
            name: None,
        }]);
        let anthropic = openai_chat_request_to_anthropic(&req);
        match &anthropic.messages[0].content {
            BetaMessageContent::Blocks(blocks) => match &blocks[0] {
                BetaContentBlockParam::Image(image) => {
                    assert_eq!(
                        image.source,
                        BetaImageSource::Base64 { data: "abcd".into(), media_type: BetaImageMediaType::Png }
                    );
                }
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }
}
