//! Anthropic ↔ OpenAI wire-format translation: request bodies, non-streaming
//! responses, SSE streams, passthrough usage accounting, and request
//! sanitization for Anthropic-dialect upstreams.

pub mod passthrough;
pub mod request;
pub mod response;
pub mod responses;
pub mod responses_stream;
pub mod sanitize;
pub mod stream;
pub mod usage;

pub use passthrough::{UsageTotals, UsageWatcher};
pub use request::{anthropic_request_to_openai, openai_chat_request_to_anthropic};
pub use response::{anthropic_message_to_chat_completion, map_finish_reason, map_stop_reason, openai_response_to_anthropic};
pub use responses::{anthropic_message_to_response, responses_request_to_anthropic};
pub use responses_stream::AnthropicStreamToResponses;
pub use sanitize::{needs_sanitization, sanitize};
pub use stream::{AnthropicToOpenAiStream, OpenAiToAnthropicStream};
pub use usage::normalize_prompt_tokens;

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_protocol::anthropic::{
        BetaContentBlock, BetaMessageContent, BetaMessageParam, BetaMessageRole, CreateMessageRequestBody,
        Model,
    };
    use llmgate_protocol::openai::{
        ChatCompletionChoice, ChatCompletionFinishReason, ChatCompletionObjectType,
        ChatCompletionRequestMessage, ChatCompletionResponseMessage, ChatCompletionUserContent,
        CompletionUsage, CreateChatCompletionResponse,
    };

    /// A plain-text Anthropic request, translated to OpenAI and back to
    /// Anthropic after a synthetic upstream reply, keeps the same text.
    #[test]
    fn anthropic_to_openai_to_anthropic_round_trips_plain_text() {
        let request = CreateMessageRequestBody {
            model: Model::from("claude-3-5-sonnet"),
            messages: vec![BetaMessageParam {
                role: BetaMessageRole::User,
                content: BetaMessageContent::Text("hello there".into()),
            }],
            max_tokens: 16,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
        };
        let openai_request = anthropic_request_to_openai(&request);
        match &openai_request.messages[0] {
            ChatCompletionRequestMessage::User { content, .. } => {
                assert_eq!(*content, ChatCompletionUserContent::Text("hello there".into()));
            }
            other => panic!("unexpected message {other:?}"),
        }

        let upstream_reply = CreateChatCompletionResponse {
            id: "chatcmpl-1".into(),
            object: ChatCompletionObjectType::ChatCompletion,
            created: 0,
            model: openai_request.model.clone(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatCompletionResponseMessage {
                    content: Some("hi back".into()),
                    refusal: None,
                    tool_calls: None,
                },
                finish_reason: ChatCompletionFinishReason::Stop,
            }],
            usage: Some(CompletionUsage {
                prompt_tokens: 4,
                completion_tokens: 2,
                total_tokens: 6,
                prompt_tokens_details: None,
            }),
        };
        let anthropic_reply = openai_response_to_anthropic(&upstream_reply);
        match &anthropic_reply.content[0] {
            BetaContentBlock::Text(t) => assert_eq!(t.text, "hi back"),
            other => panic!("unexpected block {other:?}"),
        }
        assert_eq!(anthropic_reply.usage.input_tokens, 4);
        assert_eq!(anthropic_reply.usage.output_tokens, 2);
    }
}
