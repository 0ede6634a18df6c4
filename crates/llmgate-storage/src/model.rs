use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Anthropic,
    OpenAi,
}

/// A configured upstream LLM provider endpoint. Immutable for the lifetime
/// of any in-flight request it backs; management mutations create a new
/// value rather than mutating one a request already holds a reference to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    /// Plaintext in memory; encrypted at rest is the store's concern.
    pub api_key: String,
    pub dialect: Dialect,
    pub priority: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub provider: String,
    pub upstream_id: Option<i64>,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub active: bool,
}

/// The resolver's cached value: everything the dispatcher needs to route
/// and bill a request for `model_name`, without a further store round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedModel {
    pub model_name: String,
    pub upstream_id: i64,
    pub upstream_base_url: String,
    pub upstream_api_key: String,
    pub upstream_dialect: Dialect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmKey {
    pub id: i64,
    /// SHA-256 of the plaintext key; the plaintext itself is never stored.
    pub hash: String,
    /// First ~8 chars of the plaintext, kept only for display purposes.
    pub prefix: String,
    pub name: String,
    pub active: bool,
    pub rate_limit_rps: Option<f64>,
    pub last_used_at: Option<OffsetDateTime>,
}

/// Append-only per-request telemetry record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub key_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub method: String,
    pub path: String,
    pub model: Option<String>,
    pub input_dialect: Dialect,
    pub upstream_id: Option<i64>,
    pub status: u16,
    pub latency_ms: u64,
    pub overhead_us: u64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    pub cost: f64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

/// A model→price snapshot, refreshed periodically by the pricing tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
}
