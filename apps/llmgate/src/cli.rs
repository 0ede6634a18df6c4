use clap::Parser;

use llmgate_common::GlobalConfigPatch;

/// Protocol-translating reverse proxy for Anthropic/OpenAI-dialect LLM APIs.
#[derive(Parser)]
#[command(name = "llmgate")]
pub(crate) struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    pub(crate) host: String,
    #[arg(long, default_value_t = 8787)]
    pub(crate) port: u16,
    /// JSON file seeding upstreams/models/keys into the in-memory store at
    /// boot. A database-backed store is an external-interface concern this
    /// binary doesn't implement; this is the local/dev on-ramp instead.
    #[arg(long)]
    pub(crate) seed_file: Option<String>,
    #[arg(long)]
    pub(crate) resolver_cache_ttl_ms: Option<u64>,
    #[arg(long)]
    pub(crate) auth_cache_ttl_ms: Option<u64>,
    #[arg(long)]
    pub(crate) rate_limiter_default_rps: Option<f64>,
}

impl Cli {
    pub(crate) fn into_patch(self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: Some(self.host),
            port: Some(self.port),
            resolver_cache_ttl_ms: self.resolver_cache_ttl_ms,
            auth_cache_ttl_ms: self.auth_cache_ttl_ms,
            rate_limiter_default_rps: self.rate_limiter_default_rps,
            ..Default::default()
        }
    }
}
