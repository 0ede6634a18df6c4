//! Loads upstreams/models/keys into the in-memory store at boot from a JSON
//! file. Stands in for the database-backed management plane this binary
//! doesn't ship (see [`crate::cli::Cli::seed_file`]).

use std::sync::Arc;

use llmgate_storage::{Dialect, InMemoryStore, LlmKey, ModelRecord, Upstream};
use serde::Deserialize;

#[derive(Deserialize)]
struct SeedUpstream {
    id: i64,
    name: String,
    base_url: String,
    api_key: String,
    dialect: Dialect,
    #[serde(default)]
    priority: i32,
}

#[derive(Deserialize)]
struct SeedModel {
    id: i64,
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    provider: String,
    upstream_id: i64,
    #[serde(default)]
    input_price_per_million: f64,
    #[serde(default)]
    output_price_per_million: f64,
}

#[derive(Deserialize)]
struct SeedKey {
    id: i64,
    /// The plaintext key; hashed on load, never retained as-is.
    plaintext: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    rate_limit_rps: Option<f64>,
}

#[derive(Deserialize, Default)]
struct SeedFile {
    #[serde(default)]
    upstreams: Vec<SeedUpstream>,
    #[serde(default)]
    models: Vec<SeedModel>,
    #[serde(default)]
    keys: Vec<SeedKey>,
}

pub(crate) fn load(store: &Arc<InMemoryStore>, path: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let seed: SeedFile = serde_json::from_str(&raw)?;

    for upstream in seed.upstreams {
        store.insert_upstream(Upstream {
            id: upstream.id,
            name: upstream.name,
            base_url: upstream.base_url,
            api_key: upstream.api_key,
            dialect: upstream.dialect,
            priority: upstream.priority,
            active: true,
        });
    }
    for model in seed.models {
        store.insert_model(ModelRecord {
            id: model.id,
            name: model.name,
            display_name: model.display_name,
            provider: model.provider,
            upstream_id: Some(model.upstream_id),
            input_price_per_million: model.input_price_per_million,
            output_price_per_million: model.output_price_per_million,
            active: true,
        });
    }
    for key in seed.keys {
        store.insert_llm_key(LlmKey {
            id: key.id,
            hash: llmgate_core::hash_key(&key.plaintext),
            prefix: key.plaintext.chars().take(8).collect(),
            name: key.name,
            active: true,
            rate_limit_rps: key.rate_limit_rps,
            last_used_at: None,
        });
    }
    Ok(())
}
