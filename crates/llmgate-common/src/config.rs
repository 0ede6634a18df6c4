use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged global configuration used by the running process.
///
/// Merge order (after the store is reachable): CLI > ENV > store, then
/// persisted back to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Whether to redact sensitive fields in emitted events.
    pub event_redact_sensitive: bool,

    /// TTL for the model/upstream resolver cache, in milliseconds.
    pub resolver_cache_ttl_ms: u64,
    /// TTL for the auth/key cache, in milliseconds.
    pub auth_cache_ttl_ms: u64,

    /// Consecutive failures before the circuit breaker opens.
    pub breaker_threshold: u32,
    /// Time the breaker stays open before allowing a trial request, in milliseconds.
    pub breaker_timeout_ms: u64,
    /// Concurrent trial requests admitted while half-open.
    pub breaker_half_open_max: u32,

    /// Maximum total attempts for the retry envelope (including the first).
    pub retry_max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Ceiling for any single backoff delay, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Whether to jitter backoff delays by ±25%.
    pub retry_jitter: bool,

    /// Default requests-per-second for a key with no explicit override.
    pub rate_limiter_default_rps: f64,
    /// Bucket capacity multiplier applied to `rps` when no explicit burst is set.
    pub rate_limiter_burst_multiplier: f64,
    /// Idle duration after which a bucket is evicted, in milliseconds.
    pub rate_limiter_idle_evict_ms: u64,
    /// Sweep cadence for idle-bucket eviction, in milliseconds.
    pub rate_limiter_sweep_interval_ms: u64,

    /// Capacity of the async telemetry queue.
    pub log_queue_capacity: usize,
    /// Flush trigger: buffer reaches this many entries.
    pub log_batch_size: usize,
    /// Flush trigger: this many milliseconds elapse since the last flush.
    pub log_flush_interval_ms: u64,
    /// Timeout for a single batch flush, in milliseconds.
    pub log_flush_timeout_ms: u64,

    /// Cadence for refreshing the in-memory pricing snapshot, in milliseconds.
    pub pricing_refresh_interval_ms: u64,
    /// Cadence for pruning log entries older than the retention window, in milliseconds.
    pub log_retention_sweep_interval_ms: u64,
    /// Log entries older than this are eligible for pruning, in hours.
    pub log_retention_hours: u64,
}

impl GlobalConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8787;
}

/// Optional layer used for merging global config from CLI, ENV, and the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub event_redact_sensitive: Option<bool>,

    pub resolver_cache_ttl_ms: Option<u64>,
    pub auth_cache_ttl_ms: Option<u64>,

    pub breaker_threshold: Option<u32>,
    pub breaker_timeout_ms: Option<u64>,
    pub breaker_half_open_max: Option<u32>,

    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub retry_jitter: Option<bool>,

    pub rate_limiter_default_rps: Option<f64>,
    pub rate_limiter_burst_multiplier: Option<f64>,
    pub rate_limiter_idle_evict_ms: Option<u64>,
    pub rate_limiter_sweep_interval_ms: Option<u64>,

    pub log_queue_capacity: Option<usize>,
    pub log_batch_size: Option<usize>,
    pub log_flush_interval_ms: Option<u64>,
    pub log_flush_timeout_ms: Option<u64>,

    pub pricing_refresh_interval_ms: Option<u64>,
    pub log_retention_sweep_interval_ms: Option<u64>,
    pub log_retention_hours: Option<u64>,
}

macro_rules! overlay_field {
    ($self:ident, $other:ident, $field:ident) => {
        if $other.$field.is_some() {
            $self.$field = $other.$field;
        }
    };
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        overlay_field!(self, other, host);
        overlay_field!(self, other, port);
        overlay_field!(self, other, event_redact_sensitive);
        overlay_field!(self, other, resolver_cache_ttl_ms);
        overlay_field!(self, other, auth_cache_ttl_ms);
        overlay_field!(self, other, breaker_threshold);
        overlay_field!(self, other, breaker_timeout_ms);
        overlay_field!(self, other, breaker_half_open_max);
        overlay_field!(self, other, retry_max_attempts);
        overlay_field!(self, other, retry_base_delay_ms);
        overlay_field!(self, other, retry_max_delay_ms);
        overlay_field!(self, other, retry_jitter);
        overlay_field!(self, other, rate_limiter_default_rps);
        overlay_field!(self, other, rate_limiter_burst_multiplier);
        overlay_field!(self, other, rate_limiter_idle_evict_ms);
        overlay_field!(self, other, rate_limiter_sweep_interval_ms);
        overlay_field!(self, other, log_queue_capacity);
        overlay_field!(self, other, log_batch_size);
        overlay_field!(self, other, log_flush_interval_ms);
        overlay_field!(self, other, log_flush_timeout_ms);
        overlay_field!(self, other, pricing_refresh_interval_ms);
        overlay_field!(self, other, log_retention_sweep_interval_ms);
        overlay_field!(self, other, log_retention_hours);
    }

    /// Fills every field not already set with the built-in default, then
    /// produces a fully-resolved `GlobalConfig`. Only `host`/`port` have no
    /// meaningful failure mode; every other field is defaulted rather than
    /// required, since this layer is meant to work with an empty store.
    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| GlobalConfig::DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(GlobalConfig::DEFAULT_PORT),
            event_redact_sensitive: self.event_redact_sensitive.unwrap_or(true),

            resolver_cache_ttl_ms: self.resolver_cache_ttl_ms.unwrap_or(60_000),
            auth_cache_ttl_ms: self.auth_cache_ttl_ms.unwrap_or(60_000),

            breaker_threshold: self.breaker_threshold.unwrap_or(5),
            breaker_timeout_ms: self.breaker_timeout_ms.unwrap_or(30_000),
            breaker_half_open_max: self.breaker_half_open_max.unwrap_or(1),

            retry_max_attempts: self.retry_max_attempts.unwrap_or(3),
            retry_base_delay_ms: self.retry_base_delay_ms.unwrap_or(100),
            retry_max_delay_ms: self.retry_max_delay_ms.unwrap_or(5_000),
            retry_jitter: self.retry_jitter.unwrap_or(true),

            rate_limiter_default_rps: self.rate_limiter_default_rps.unwrap_or(5.0),
            rate_limiter_burst_multiplier: self.rate_limiter_burst_multiplier.unwrap_or(2.0),
            rate_limiter_idle_evict_ms: self.rate_limiter_idle_evict_ms.unwrap_or(5 * 60_000),
            rate_limiter_sweep_interval_ms: self.rate_limiter_sweep_interval_ms.unwrap_or(60_000),

            log_queue_capacity: self.log_queue_capacity.unwrap_or(10_000),
            log_batch_size: self.log_batch_size.unwrap_or(100),
            log_flush_interval_ms: self.log_flush_interval_ms.unwrap_or(500),
            log_flush_timeout_ms: self.log_flush_timeout_ms.unwrap_or(10_000),

            pricing_refresh_interval_ms: self.pricing_refresh_interval_ms.unwrap_or(5 * 60_000),
            log_retention_sweep_interval_ms: self
                .log_retention_sweep_interval_ms
                .unwrap_or(60 * 60_000),
            log_retention_hours: self.log_retention_hours.unwrap_or(24 * 30),
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            event_redact_sensitive: Some(value.event_redact_sensitive),
            resolver_cache_ttl_ms: Some(value.resolver_cache_ttl_ms),
            auth_cache_ttl_ms: Some(value.auth_cache_ttl_ms),
            breaker_threshold: Some(value.breaker_threshold),
            breaker_timeout_ms: Some(value.breaker_timeout_ms),
            breaker_half_open_max: Some(value.breaker_half_open_max),
            retry_max_attempts: Some(value.retry_max_attempts),
            retry_base_delay_ms: Some(value.retry_base_delay_ms),
            retry_max_delay_ms: Some(value.retry_max_delay_ms),
            retry_jitter: Some(value.retry_jitter),
            rate_limiter_default_rps: Some(value.rate_limiter_default_rps),
            rate_limiter_burst_multiplier: Some(value.rate_limiter_burst_multiplier),
            rate_limiter_idle_evict_ms: Some(value.rate_limiter_idle_evict_ms),
            rate_limiter_sweep_interval_ms: Some(value.rate_limiter_sweep_interval_ms),
            log_queue_capacity: Some(value.log_queue_capacity),
            log_batch_size: Some(value.log_batch_size),
            log_flush_interval_ms: Some(value.log_flush_interval_ms),
            log_flush_timeout_ms: Some(value.log_flush_timeout_ms),
            pricing_refresh_interval_ms: Some(value.pricing_refresh_interval_ms),
            log_retention_sweep_interval_ms: Some(value.log_retention_sweep_interval_ms),
            log_retention_hours: Some(value.log_retention_hours),
        }
    }
}
