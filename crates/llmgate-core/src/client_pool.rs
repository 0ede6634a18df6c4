//! One reusable HTTP client per upstream id, each wrapped with its own
//! circuit breaker and retry policy. Grounded in the family's existing
//! `wreq`-backed upstream client: a client cache keyed by a backing value
//! (there, a proxy string; here, the upstream id), built once and reused
//! for every subsequent call to that upstream.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::sync::mpsc;
use wreq::Client;

use llmgate_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryError, Retryable};
use llmgate_storage::{Dialect, ResolvedModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientPoolError {
    #[error("upstream transport error ({kind:?}): {message}")]
    Transport { kind: TransportErrorKind, message: String },
    #[error("circuit open for upstream {0}")]
    CircuitOpen(i64),
}

impl Retryable for ClientPoolError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientPoolError::Transport {
                kind: TransportErrorKind::Timeout | TransportErrorKind::ReadTimeout,
                ..
            }
        )
    }
}

pub enum UpstreamBody {
    Buffered(Bytes),
    Streaming(mpsc::Receiver<Bytes>),
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone, Copy)]
pub struct ClientPoolConfig {
    pub connect_timeout: Duration,
    /// No ceiling on the full response: streaming replies can run for as
    /// long as the model keeps generating.
    pub stream_idle_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(60),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

struct PoolEntry {
    client: Client,
    breaker: CircuitBreaker,
}

/// Keyed by `upstream_id`. Created on demand; never removed (upstream
/// records are few and long-lived relative to a process's uptime).
pub struct ClientPool {
    config: ClientPoolConfig,
    entries: Mutex<HashMap<i64, Arc<PoolEntry>>>,
}

impl ClientPool {
    pub fn new(config: ClientPoolConfig) -> Self {
        Self { config, entries: Mutex::new(HashMap::new()) }
    }

    fn entry_for(&self, upstream_id: i64) -> Result<Arc<PoolEntry>, ClientPoolError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(&upstream_id) {
            return Ok(entry.clone());
        }
        let client = Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .read_timeout(self.config.stream_idle_timeout)
            .build()
            .map_err(|err| ClientPoolError::Transport {
                kind: TransportErrorKind::Other,
                message: err.to_string(),
            })?;
        let entry = Arc::new(PoolEntry {
            client,
            breaker: CircuitBreaker::new(self.config.breaker),
        });
        entries.insert(upstream_id, entry.clone());
        Ok(entry)
    }

    /// Issues `POST <upstream.upstream_base_url><path>` with dialect-
    /// appropriate auth headers, through the circuit breaker and retry
    /// envelope for that upstream. `canceled` aborts an in-progress retry
    /// sleep (request cancellation propagation).
    pub async fn post(
        &self,
        upstream: &ResolvedModel,
        path: &str,
        body: Bytes,
        want_stream: bool,
        canceled: impl Future<Output = ()> + Unpin,
    ) -> Result<UpstreamResponse, ClientPoolError> {
        let entry = self.entry_for(upstream.upstream_id)?;
        let url = format!("{}{}", upstream.upstream_base_url.trim_end_matches('/'), path);
        let headers = auth_headers(upstream);

        llmgate_resilience::retry::run(&self.config.retry, canceled, |_attempt| {
            let entry = entry.clone();
            let url = url.clone();
            let headers = headers.clone();
            let body = body.clone();
            async move {
                let trial = entry
                    .breaker
                    .allow()
                    .map_err(|_| ClientPoolError::CircuitOpen(upstream.upstream_id))?;

                let mut builder = entry.client.post(&url).body(body);
                for (name, value) in headers.iter() {
                    builder = builder.header(name, value);
                }
                match builder.send().await {
                    Ok(resp) => {
                        let result = convert_response(resp, want_stream, self.config.stream_idle_timeout).await;
                        match &result {
                            Ok(r) if r.status.as_u16() < 500 => trial.success(),
                            _ => trial.failure(),
                        }
                        result
                    }
                    Err(err) => {
                        trial.failure();
                        Err(map_wreq_error(err))
                    }
                }
            }
        })
        .await
        .map_err(|err| match err {
            RetryError::Canceled => ClientPoolError::Transport {
                kind: TransportErrorKind::Other,
                message: "request canceled".into(),
            },
            RetryError::Exhausted(inner) => inner,
        })
    }
}

fn auth_headers(upstream: &ResolvedModel) -> Vec<(&'static str, HeaderValue)> {
    match upstream.upstream_dialect {
        Dialect::OpenAi => {
            let value = format!("Bearer {}", upstream.upstream_api_key);
            vec![("authorization", HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("")))]
        }
        Dialect::Anthropic => vec![
            (
                "x-api-key",
                HeaderValue::from_str(&upstream.upstream_api_key).unwrap_or(HeaderValue::from_static("")),
            ),
            ("anthropic-version", HeaderValue::from_static("2023-06-01")),
        ],
    }
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
    stream_idle_timeout: Duration,
) -> Result<UpstreamResponse, ClientPoolError> {
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let headers = headers_from_wreq(resp.headers());

    let is_success = status.is_success();
    if !is_success || !want_stream {
        let body = resp.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamResponse { status, headers, body: UpstreamBody::Buffered(body) });
    }

    let (tx, rx) = mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        loop {
            let next = tokio::time::timeout(stream_idle_timeout, stream.next()).await;
            let item = match next {
                Ok(item) => item,
                Err(_) => break,
            };
            let Some(item) = item else { break };
            let Ok(chunk) = item else { break };
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    Ok(UpstreamResponse { status, headers, body: UpstreamBody::Streaming(rx) })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in map {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> ClientPoolError {
    ClientPoolError::Transport { kind: classify_wreq_error(&err), message: err.to_string() }
}

fn classify_wreq_error(err: &wreq::Error) -> TransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        if message.contains("read") || message.contains("idle") {
            return TransportErrorKind::ReadTimeout;
        }
        return TransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return TransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return TransportErrorKind::Tls;
    }
    TransportErrorKind::Other
}
