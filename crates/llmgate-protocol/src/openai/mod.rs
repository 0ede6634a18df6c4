pub mod request;
pub mod response;
pub mod responses_api;
pub mod stream;

pub use request::{
    ChatCompletionImageUrl, ChatCompletionMessageToolCall, ChatCompletionNamedFunction,
    ChatCompletionNamedToolChoice, ChatCompletionRequestMessage, ChatCompletionToolChoiceMode,
    ChatCompletionToolChoiceOption, ChatCompletionToolDefinition, ChatCompletionUserContent,
    ChatCompletionUserContentPart, CreateChatCompletionRequestBody, FunctionCall, FunctionObject,
    StopConfiguration,
};
pub use response::{
    ChatCompletionChoice, ChatCompletionFinishReason, ChatCompletionObjectType,
    ChatCompletionResponseMessage, CompletionUsage, CreateChatCompletionResponse,
    PromptTokensDetails,
};
pub use responses_api::{
    CreateResponseRequestBody, FunctionToolCall, OutputItem, OutputMessage, OutputMessageContent,
    Response, ResponseInputItem, ResponseInputMessage, ResponseInputParam, ResponseStatus,
    ResponseStreamEvent, ResponseTool, ResponseToolChoiceParam,
};
pub use stream::{
    ChatCompletionChunkObjectType, ChatCompletionMessageToolCallChunk,
    ChatCompletionMessageToolCallChunkFunction, ChatCompletionStreamChoice,
    ChatCompletionStreamResponseDelta, CreateChatCompletionStreamResponse,
};
