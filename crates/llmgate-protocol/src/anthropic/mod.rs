pub mod model;
pub mod request;
pub mod response;
pub mod stream;

pub use model::Model;
pub use request::{
    BetaCacheControl, BetaCacheControlTtl, BetaContentBlockParam, BetaImageBlockParam,
    BetaImageMediaType, BetaImageSource, BetaMessageContent, BetaMessageParam, BetaMessageRole,
    BetaRedactedThinkingBlockParam, BetaSystemParam, BetaTextBlockParam, BetaThinkingBlockParam,
    BetaTool, BetaToolChoice, BetaToolResultBlockParam, BetaToolResultContent,
    BetaToolUseBlockParam, CreateMessageRequestBody, JsonObject,
};
pub use response::{
    BetaContentBlock, BetaMessage, BetaRedactedThinkingBlock, BetaStopReason, BetaTextBlock,
    BetaThinkingBlock, BetaToolUseBlock, BetaUsage,
};
pub use stream::{
    BetaErrorPayload, BetaStreamContentBlock, BetaStreamContentBlockDelta, BetaStreamDeltaUsage,
    BetaStreamEvent, BetaStreamMessageDelta,
};
