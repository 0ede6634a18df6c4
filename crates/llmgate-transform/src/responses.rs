//! OpenAI Responses API (`/v1/responses`) ↔ Anthropic, routed through the
//! same canonical Anthropic shapes the chat-completions path uses. This
//! keeps the translation surface to one pair of directions instead of a
//! second bespoke Responses↔OpenAI-chat mapping.

use llmgate_protocol::anthropic::{
    BetaContentBlock, BetaContentBlockParam, BetaMessage, BetaMessageContent, BetaMessageParam,
    BetaMessageRole, BetaStopReason, BetaSystemParam, BetaTextBlockParam, BetaTool, BetaToolChoice,
    BetaToolUseBlockParam, CreateMessageRequestBody, Model,
};
use llmgate_protocol::openai::{
    FunctionToolCall, OutputItem, OutputMessage, OutputMessageContent, OutputMessageRole,
    OutputTextContent, Response, ResponseInputContentPart, ResponseInputItem,
    ResponseInputMessageContent, ResponseInputParam, ResponseInputRole, ResponseObjectType,
    ResponseStatus, ResponseTool, ResponseToolChoiceMode, ResponseToolChoiceParam,
    CreateResponseRequestBody,
};

pub fn responses_request_to_anthropic(req: &CreateResponseRequestBody) -> CreateMessageRequestBody {
    let mut messages = Vec::new();
    if let Some(input) = &req.input {
        translate_input(input, &mut messages);
    }

    CreateMessageRequestBody {
        model: Model::from(req.model.clone()),
        messages,
        max_tokens: req.max_output_tokens.unwrap_or(4096) as u32,
        system: req.instructions.clone().map(BetaSystemParam::Text),
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        stop_sequences: None,
        stream: req.stream,
        tools: req
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(translate_tool).collect()),
        tool_choice: req.tool_choice.as_ref().map(translate_tool_choice),
    }
}

fn translate_input(input: &ResponseInputParam, out: &mut Vec<BetaMessageParam>) {
    match input {
        ResponseInputParam::Text(text) => out.push(BetaMessageParam {
            role: BetaMessageRole::User,
            content: BetaMessageContent::Text(text.clone()),
        }),
        ResponseInputParam::Items(items) => {
            for item in items {
                match item {
                    ResponseInputItem::Message(message) => {
                        let role = match message.role {
                            ResponseInputRole::User | ResponseInputRole::System => {
                                BetaMessageRole::User
                            }
                            ResponseInputRole::Assistant => BetaMessageRole::Assistant,
                        };
                        out.push(BetaMessageParam {
                            role,
                            content: translate_input_content(&message.content),
                        });
                    }
                    ResponseInputItem::FunctionCallOutput(call_output) => {
                        out.push(BetaMessageParam {
                            role: BetaMessageRole::User,
                            content: BetaMessageContent::Blocks(vec![
                                BetaContentBlockParam::ToolResult(
                                    llmgate_protocol::anthropic::BetaToolResultBlockParam {
                                        tool_use_id: call_output.call_id.clone(),
                                        content: Some(
                                            llmgate_protocol::anthropic::BetaToolResultContent::Text(
                                                call_output.output.clone(),
                                            ),
                                        ),
                                        is_error: None,
                                        cache_control: None,
                                    },
                                ),
                            ]),
                        });
                    }
                }
            }
        }
    }
}

fn translate_input_content(content: &ResponseInputMessageContent) -> BetaMessageContent {
    match content {
        ResponseInputMessageContent::Text(text) => BetaMessageContent::Text(text.clone()),
        ResponseInputMessageContent::Parts(parts) => {
            let blocks = parts
                .iter()
                .map(|part| match part {
                    ResponseInputContentPart::InputText { text } => {
                        BetaContentBlockParam::Text(BetaTextBlockParam {
                            text: text.clone(),
                            cache_control: None,
                        })
                    }
                    ResponseInputContentPart::InputImage { image_url } => {
                        BetaContentBlockParam::Image(llmgate_protocol::anthropic::BetaImageBlockParam {
                            source: llmgate_protocol::anthropic::BetaImageSource::Url {
                                url: image_url.clone(),
                            },
                            cache_control: None,
                        })
                    }
                })
                .collect();
            BetaMessageContent::Blocks(blocks)
        }
    }
}

fn translate_tool(tool: &ResponseTool) -> BetaTool {
    let ResponseTool::Function(function) = tool;
    BetaTool {
        name: function.name.clone(),
        description: function.description.clone(),
        input_schema: function
            .parameters
            .clone()
            .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        cache_control: None,
    }
}

fn translate_tool_choice(choice: &ResponseToolChoiceParam) -> BetaToolChoice {
    let ResponseToolChoiceParam::Mode(mode) = choice;
    match mode {
        ResponseToolChoiceMode::Auto => BetaToolChoice::Auto { disable_parallel_tool_use: None },
        ResponseToolChoiceMode::Required => BetaToolChoice::Any { disable_parallel_tool_use: None },
        ResponseToolChoiceMode::None => BetaToolChoice::None,
    }
}

/// Translates a completed Anthropic message into a terminal `Response`.
/// `id`/`created_at` are supplied by the caller since `BetaMessage` carries
/// its own id but the Responses API expects a `resp_`-style identifier and
/// a creation timestamp the core, not this pure function, owns.
pub fn anthropic_message_to_response(message: &BetaMessage, created_at: i64) -> Response {
    let mut output = Vec::new();
    let mut text_parts = Vec::new();
    for block in &message.content {
        match block {
            BetaContentBlock::Text(text) => text_parts.push(text.text.clone()),
            BetaContentBlock::ToolUse(tool_use) => {
                output.push(OutputItem::FunctionCall(FunctionToolCall {
                    id: tool_use.id.clone(),
                    call_id: tool_use.id.clone(),
                    name: tool_use.name.clone(),
                    arguments: serde_json::to_string(&tool_use.input).unwrap_or_else(|_| "{}".into()),
                }));
            }
            BetaContentBlock::Thinking(_) | BetaContentBlock::RedactedThinking(_) => {}
        }
    }
    if !text_parts.is_empty() {
        output.insert(
            0,
            OutputItem::Message(OutputMessage {
                id: format!("msg_{}", message.id),
                role: OutputMessageRole::Assistant,
                content: vec![OutputMessageContent::OutputText(OutputTextContent {
                    text: text_parts.join("\n"),
                })],
            }),
        );
    }

    Response {
        id: format!("resp_{}", message.id),
        object: ResponseObjectType::Response,
        created_at,
        status: Some(status_for_stop_reason(message.stop_reason)),
        model: message.model.as_str().to_string(),
        output,
        usage: Some(llmgate_protocol::openai::CompletionUsage {
            prompt_tokens: message.usage.input_tokens,
            completion_tokens: message.usage.output_tokens,
            total_tokens: message.usage.input_tokens + message.usage.output_tokens,
            prompt_tokens_details: None,
        }),
    }
}

fn status_for_stop_reason(stop_reason: Option<BetaStopReason>) -> ResponseStatus {
    match stop_reason {
        Some(BetaStopReason::MaxTokens) => ResponseStatus::Incomplete,
        Some(BetaStopReason::Refusal) => ResponseStatus::Failed,
        _ => ResponseStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_input_becomes_user_message() {
        let req = CreateResponseRequestBody {
            model: "claude-3-5-sonnet".into(),
            input: Some(ResponseInputParam::Text("hello".into())),
            instructions: Some("be terse".into()),
            stream: None,
            max_output_tokens: Some(100),
            temperature: None,
            top_p: None,
            tools: None,
            tool_choice: None,
        };
        let anthropic = responses_request_to_anthropic(&req);
        assert_eq!(anthropic.max_tokens, 100);
        assert_eq!(anthropic.system, Some(BetaSystemParam::Text("be terse".into())));
        assert_eq!(anthropic.messages[0].content, BetaMessageContent::Text("hello".into()));
    }

    #[test]
    fn function_call_output_becomes_tool_result() {
        let req = CreateResponseRequestBody {
            model: "claude-3-5-sonnet".into(),
            input: Some(ResponseInputParam::Items(vec![ResponseInputItem::FunctionCallOutput(
                llmgate_protocol::openai::ResponseFunctionCallOutput {
                    call_id: "t1".into(),
                    output: "42".into(),
                },
            )])),
            instructions: None,
            stream: None,
            max_output_tokens: None,
            temperature: None,
            top_p: None,
            tools: None,
            tool_choice: None,
        };
        let anthropic = responses_request_to_anthropic(&req);
        match &anthropic.messages[0].content {
            BetaMessageContent::Blocks(blocks) => match &blocks[0] {
                BetaContentBlockParam::ToolResult(tr) => assert_eq!(tr.tool_use_id, "t1"),
                other => panic!("unexpected block {other:?}"),
            },
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn anthropic_message_translates_to_response_with_text_output() {
        let message = BetaMessage {
            id: "m1".into(),
            r#type: llmgate_protocol::anthropic::BetaMessageType::Message,
            role: llmgate_protocol::anthropic::BetaMessageRole::Assistant,
            model: Model::from("claude-3-5-sonnet"),
            content: vec![BetaContentBlock::Text(llmgate_protocol::anthropic::BetaTextBlock {
                text: "hi".into(),
            })],
            stop_reason: Some(BetaStopReason::EndTurn),
            stop_sequence: None,
            usage: llmgate_protocol::anthropic::BetaUsage {
                input_tokens: 5,
                output_tokens: 2,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        };
        let response = anthropic_message_to_response(&message, 0);
        assert_eq!(response.status, Some(ResponseStatus::Completed));
        match &response.output[0] {
            OutputItem::Message(m) => match &m.content[0] {
                OutputMessageContent::OutputText(t) => assert_eq!(t.text, "hi"),
                other => panic!("unexpected content {other:?}"),
            },
            other => panic!("unexpected item {other:?}"),
        }
    }
}
