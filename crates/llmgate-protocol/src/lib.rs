pub mod anthropic;
pub mod openai;
pub mod sse;

pub use sse::{SseEvent, SseParser};

#[cfg(test)]
mod tests {
    use super::anthropic::*;
    use super::openai::*;

    #[test]
    fn anthropic_tool_use_block_round_trips() {
        let block = BetaContentBlockParam::ToolUse(BetaToolUseBlockParam {
            id: "t1".into(),
            input: Default::default(),
            name: "get_weather".into(),
            cache_control: None,
        });
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
        let back: BetaContentBlockParam = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn openai_tool_choice_mode_is_untagged_string() {
        let choice = ChatCompletionToolChoiceOption::Mode(ChatCompletionToolChoiceMode::Required);
        let json = serde_json::to_value(&choice).unwrap();
        assert_eq!(json, serde_json::json!("required"));
    }

    #[test]
    fn anthropic_stop_configuration_accepts_single_or_many() {
        let single: StopConfiguration = serde_json::from_value(serde_json::json!("stop")).unwrap();
        assert_eq!(single, StopConfiguration::Single("stop".into()));
        let many: StopConfiguration =
            serde_json::from_value(serde_json::json!(["a", "b"])).unwrap();
        assert_eq!(many, StopConfiguration::Many(vec!["a".into(), "b".into()]));
    }
}
