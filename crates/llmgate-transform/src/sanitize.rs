//! Request body sanitization applied before forwarding to an
//! Anthropic-dialect upstream. Each transform is gated on a cheap
//! byte-level substring check so the body is parsed into a [`Value`] only
//! when its marker is actually present.

use serde_json::Value;

/// Cheap pre-check: does the raw body contain any marker this module cares
/// about? If not, the dispatcher can skip parsing entirely.
pub fn needs_sanitization(raw: &[u8]) -> bool {
    contains(raw, b"cache_control") || contains(raw, b"\"text\"") || contains(raw, b"thinking")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Runs all three sanitization passes over a parsed request body in place.
/// Idempotent: running it twice in a row is a no-op the second time.
pub fn sanitize(body: &mut Value) {
    strip_cache_control_scope(body);
    strip_empty_text_blocks(body);
    strip_assistant_thinking_blocks(body);
}

/// Recursively deletes the `scope` key from any object that also has a
/// `type` field under a key named `cache_control`.
fn strip_cache_control_scope(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(cache_control)) = map.get_mut("cache_control") {
                cache_control.remove("scope");
            }
            for (key, child) in map.iter_mut() {
                if key != "cache_control" {
                    strip_cache_control_scope(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_cache_control_scope(item);
            }
        }
        _ => {}
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Removes `{type: "text", text: ""}` (or whitespace-only) blocks from
/// every `messages[i].content` array. Anthropic rejects these with a
/// validation error.
fn strip_empty_text_blocks(body: &mut Value) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };
    for message in messages {
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        content.retain(|block| {
            let is_empty_text = block.get("type").and_then(Value::as_str) == Some("text")
                && block
                    .get("text")
                    .and_then(Value::as_str)
                    .map(is_blank)
                    .unwrap_or(false);
            !is_empty_text
        });
    }
}

/// Removes `thinking` / `redacted_thinking` blocks from assistant messages.
/// Such blocks carry signatures valid only from the issuing API; blocks
/// synthesized from another dialect have no valid signature and would be
/// rejected outright. Safe to drop: the upstream re-derives thinking from
/// context on the next turn.
fn strip_assistant_thinking_blocks(body: &mut Value) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };
    for message in messages {
        if message.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        content.retain(|block| {
            !matches!(
                block.get("type").and_then(Value::as_str),
                Some("thinking") | Some("redacted_thinking")
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_cache_control_scope_recursively() {
        let mut body = json!({
            "system": [{"type": "text", "text": "sys", "cache_control": {"type": "ephemeral", "scope": "session"}}]
        });
        sanitize(&mut body);
        assert_eq!(body["system"][0]["cache_control"], json!({"type": "ephemeral"}));
    }

    #[test]
    fn strips_empty_and_whitespace_only_text_blocks() {
        let mut body = json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "  "},
                    {"type": "text", "text": "real"}
                ]
            }]
        });
        sanitize(&mut body);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["text"], "real");
    }

    #[test]
    fn strips_thinking_blocks_only_from_assistant_messages() {
        let mut body = json!({
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "hi"}]},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "...", "signature": "sig"},
                    {"type": "redacted_thinking", "data": "opaque"},
                    {"type": "text", "text": "answer"}
                ]}
            ]
        });
        sanitize(&mut body);
        let assistant_content = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(assistant_content.len(), 1);
        assert_eq!(assistant_content[0]["type"], "text");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut body = json!({
            "system": [{"type": "text", "text": "sys", "cache_control": {"type": "ephemeral", "scope": "session"}}],
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": ""}, {"type": "text", "text": "hi"}]},
                {"role": "assistant", "content": [{"type": "thinking", "thinking": "x", "signature": "s"}, {"type": "text", "text": "ok"}]}
            ]
        });
        sanitize(&mut body);
        let once = body.clone();
        sanitize(&mut body);
        assert_eq!(once, body);
    }

    #[test]
    fn needs_sanitization_is_a_cheap_prefilter() {
        assert!(!needs_sanitization(b"{\"messages\":[]}"));
        assert!(needs_sanitization(b"{\"cache_control\":{}}"));
    }
}
