//! Usage-counter extraction for Anthropic-dialect requests forwarded
//! byte-for-byte to an Anthropic-dialect upstream. The body itself is never
//! translated, but the proxy still needs `usage` for billing, so this
//! module picks the counters out of the `message_start` and `message_delta`
//! events as they pass through.

use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_input_tokens: i64,
    pub cache_read_input_tokens: i64,
}

/// Accumulates usage across a passthrough stream by inspecting each SSE
/// event's `data:` payload. Not every event carries usage; irrelevant
/// events (`ping`, `content_block_delta`, ...) are ignored cheaply via a
/// byte-prefix check before any JSON parsing happens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageWatcher {
    totals: UsageTotals,
}

impl UsageWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> UsageTotals {
        self.totals
    }

    /// Feeds one `data:` payload. Returns `true` if it updated the running
    /// totals.
    pub fn observe(&mut self, raw_json: &str) -> bool {
        if !raw_json.as_bytes().windows(5).any(|w| w == b"usage") {
            return false;
        }
        let Ok(value) = serde_json::from_str::<Value>(raw_json) else {
            return false;
        };
        match value.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                let Some(usage) = value.get("message").and_then(|m| m.get("usage")) else {
                    return false;
                };
                self.apply_message_start_usage(usage);
                true
            }
            Some("message_delta") => {
                let Some(usage) = value.get("usage") else {
                    return false;
                };
                if let Some(output_tokens) = usage.get("output_tokens").and_then(Value::as_i64) {
                    // Anthropic reports a cumulative total here; the latest
                    // value observed is authoritative.
                    self.totals.output_tokens = output_tokens;
                }
                true
            }
            _ => false,
        }
    }

    fn apply_message_start_usage(&mut self, usage: &Value) {
        if let Some(v) = usage.get("input_tokens").and_then(Value::as_i64) {
            self.totals.input_tokens = v;
        }
        if let Some(v) = usage.get("output_tokens").and_then(Value::as_i64) {
            self.totals.output_tokens = v;
        }
        if let Some(v) = usage.get("cache_creation_input_tokens").and_then(Value::as_i64) {
            self.totals.cache_creation_input_tokens = v;
        }
        if let Some(v) = usage.get("cache_read_input_tokens").and_then(Value::as_i64) {
            self.totals.cache_read_input_tokens = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_seeds_initial_usage() {
        let mut watcher = UsageWatcher::new();
        let updated = watcher.observe(
            r#"{"type":"message_start","message":{"id":"m1","usage":{"input_tokens":12,"output_tokens":0,"cache_creation_input_tokens":3,"cache_read_input_tokens":5}}}"#,
        );
        assert!(updated);
        let totals = watcher.totals();
        assert_eq!(totals.input_tokens, 12);
        assert_eq!(totals.cache_creation_input_tokens, 3);
        assert_eq!(totals.cache_read_input_tokens, 5);
    }

    #[test]
    fn message_delta_overwrites_output_tokens_with_latest_value() {
        let mut watcher = UsageWatcher::new();
        watcher.observe(r#"{"type":"message_start","message":{"usage":{"input_tokens":12,"output_tokens":0}}}"#);
        watcher.observe(r#"{"type":"message_delta","delta":{"stop_reason":null},"usage":{"output_tokens":4}}"#);
        watcher.observe(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":9}}"#);
        assert_eq!(watcher.totals().output_tokens, 9);
    }

    #[test]
    fn irrelevant_events_are_ignored_without_parsing() {
        let mut watcher = UsageWatcher::new();
        let updated = watcher.observe(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#);
        assert!(!updated);
        assert_eq!(watcher.totals(), UsageTotals::default());
    }

    #[test]
    fn ping_events_never_reach_json_parsing() {
        let mut watcher = UsageWatcher::new();
        assert!(!watcher.observe(r#"{"type":"ping"}"#));
    }
}
