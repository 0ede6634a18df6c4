//! Per-request orchestration: authenticate, rate-limit, resolve the
//! upstream, translate dialects where they differ, forward, and emit
//! telemetry. One method per client-facing entry point; all three run the
//! same skeleton with the translation direction swapped, mirroring this
//! family's existing `proxy_handler` "received"/"responded" log pairing.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;

use llmgate_common::{ProxyError, new_trace_id};
use llmgate_protocol::anthropic::CreateMessageRequestBody;
use llmgate_protocol::openai::{CreateChatCompletionRequestBody, CreateResponseRequestBody};
use llmgate_protocol::sse::SseParser;
use llmgate_resilience::RateLimiter;
use llmgate_storage::{Dialect, LogEntry, PricingTracker, ResolvedModel, Store};
use llmgate_transform::{
    AnthropicStreamToResponses, AnthropicToOpenAiStream, OpenAiToAnthropicStream,
    anthropic_message_to_chat_completion, anthropic_message_to_response, anthropic_request_to_openai,
    needs_sanitization, normalize_prompt_tokens, openai_chat_request_to_anthropic, openai_response_to_anthropic,
    responses_request_to_anthropic, sanitize,
};

use crate::auth_cache::{AuthCache, extract_presented_key};
use crate::client_pool::{ClientPool, UpstreamBody};

/// A body too large to accept; kept here rather than threaded through
/// `GlobalConfig` since no deployment of this family has ever needed to
/// tune it independently of the server's own buffering limits.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub type CancelFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn no_cancel() -> CancelFuture {
    Box::pin(std::future::pending())
}

pub enum DispatchBody {
    Buffered(Bytes),
    Stream(mpsc::Receiver<Bytes>),
}

pub struct DispatchResponse {
    pub status: StatusCode,
    pub body: DispatchBody,
}

impl DispatchResponse {
    fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self { status, body: DispatchBody::Buffered(Bytes::from(value.to_string())) }
    }
}

#[derive(Deserialize)]
struct RoutingFields {
    model: Option<String>,
    #[serde(default)]
    stream: Option<bool>,
}

/// The narrow capability the rest of the binary depends on. A trait purely
/// so tests can substitute a stub client/store; production wiring has
/// exactly one implementation, [`Dispatcher`].
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn handle_anthropic(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse;
    async fn handle_openai_chat(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse;
    async fn handle_openai_responses(
        &self,
        headers: &HeaderMap,
        client_addr: SocketAddr,
        body: Bytes,
    ) -> DispatchResponse;
}

pub struct Dispatcher<S: Store> {
    pub resolver: Arc<crate::resolver::Resolver<S>>,
    pub auth: Arc<AuthCache<S>>,
    pub client_pool: Arc<ClientPool>,
    pub logger: crate::logger::AsyncLogger,
    pub pricing: Arc<PricingTracker>,
    pub rate_limiter: Arc<RateLimiter>,
}

struct RequestMeta {
    trace_id: String,
    key_id: Option<i64>,
    t0: Instant,
}

impl<S: Store + 'static> Dispatcher<S> {
    pub fn new(
        resolver: Arc<crate::resolver::Resolver<S>>,
        auth: Arc<AuthCache<S>>,
        client_pool: Arc<ClientPool>,
        logger: crate::logger::AsyncLogger,
        pricing: Arc<PricingTracker>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self { resolver, auth, client_pool, logger, pricing, rate_limiter }
    }

    /// Authenticates the presented credential and admits it against the
    /// per-key rate limiter. A missing or invalid credential is bucketed
    /// instead by the client's socket address, so an unauthenticated flood
    /// is still rate-limited rather than bypassing admission entirely.
    async fn admit(&self, headers: &HeaderMap, client_addr: SocketAddr) -> Result<i64, ProxyError> {
        let auth_result = match extract_presented_key(headers) {
            Some(presented) => self
                .auth
                .authenticate(&presented)
                .await
                .map_err(|err| ProxyError::authentication(err.to_string())),
            None => Err(ProxyError::authentication("missing credential")),
        };

        match auth_result {
            Ok(key) => {
                let rps_override = key.rate_limit_rps;
                if !self.rate_limiter.admit(&format!("key:{}", key.id), rps_override) {
                    return Err(ProxyError::rate_limited("rate limit exceeded"));
                }
                Ok(key.id)
            }
            Err(auth_err) => {
                if !self.rate_limiter.admit(&format!("addr:{client_addr}"), None) {
                    return Err(ProxyError::rate_limited("rate limit exceeded"));
                }
                Err(auth_err)
            }
        }
    }

    fn parse_routing_fields(body: &[u8]) -> Result<RoutingFields, ProxyError> {
        if body.len() > MAX_BODY_BYTES {
            return Err(ProxyError::invalid_request("request body too large"));
        }
        serde_json::from_slice(body).map_err(|err| ProxyError::invalid_request(format!("malformed JSON: {err}")))
    }

    async fn resolve(&self, model_name: &str) -> Result<ResolvedModel, ProxyError> {
        self.resolver
            .resolve(model_name)
            .await
            .map_err(|err| ProxyError::not_found(err.to_string()))
    }

    fn emit_log(
        &self,
        meta: &RequestMeta,
        path: &str,
        dialect: Dialect,
        model: Option<String>,
        upstream_id: Option<i64>,
        status: u16,
        input_tokens: i64,
        output_tokens: i64,
        cache_read_tokens: i64,
        cache_creation_tokens: i64,
        error_message: Option<String>,
    ) {
        let cost = model
            .as_deref()
            .map(|m| self.pricing.cost(m, input_tokens, output_tokens))
            .unwrap_or(0.0);
        self.logger.enqueue(LogEntry {
            key_id: meta.key_id,
            ts: time::OffsetDateTime::now_utc(),
            method: "POST".into(),
            path: path.into(),
            model,
            input_dialect: dialect,
            upstream_id,
            status,
            latency_ms: meta.t0.elapsed().as_millis() as u64,
            overhead_us: 0,
            input_tokens,
            output_tokens,
            cache_creation_tokens,
            cache_read_tokens,
            cost,
            error_message,
            metadata: serde_json::json!({ "trace_id": meta.trace_id }),
        });
    }

    fn log_proxy_error(
        &self,
        meta: &RequestMeta,
        path: &str,
        dialect: Dialect,
        model: Option<String>,
        err: &ProxyError,
    ) {
        tracing::warn!(
            event = "downstream_responded",
            trace_id = %meta.trace_id,
            key_id = ?meta.key_id,
            model = ?model,
            status = err.status().as_u16(),
            error = %err,
        );
        self.emit_log(meta, path, dialect, model, None, err.status().as_u16(), 0, 0, 0, 0, Some(err.message.clone()));
    }

    // ---------------------------------------------------------------
    // /v1/messages
    // ---------------------------------------------------------------

    async fn do_handle_anthropic(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse {
        let meta = RequestMeta { trace_id: new_trace_id(), key_id: None, t0: Instant::now() };
        tracing::info!(event = "downstream_received", trace_id = %meta.trace_id, path = "/v1/messages");

        let key_id = match self.admit(headers, client_addr).await {
            Ok(id) => id,
            Err(err) => {
                let meta = RequestMeta { key_id: None, ..meta };
                self.log_proxy_error(&meta, "/v1/messages", Dialect::Anthropic, None, &err);
                return DispatchResponse::json(err.status(), err.into_anthropic_body());
            }
        };
        let meta = RequestMeta { key_id: Some(key_id), ..meta };

        let routing = match Self::parse_routing_fields(&body) {
            Ok(r) => r,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/messages", Dialect::Anthropic, None, &err);
                return DispatchResponse::json(err.status(), err.into_anthropic_body());
            }
        };
        let model_name = routing.model.clone().unwrap_or_default();
        let want_stream = routing.stream.unwrap_or(false);

        let upstream = match self.resolve(&model_name).await {
            Ok(u) => u,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/messages", Dialect::Anthropic, Some(model_name), &err);
                return DispatchResponse::json(err.status(), err.into_anthropic_body());
            }
        };

        let result = match upstream.upstream_dialect {
            Dialect::Anthropic => {
                let outbound = if needs_sanitization(&body) {
                    match serde_json::from_slice::<serde_json::Value>(&body) {
                        Ok(mut value) => {
                            sanitize(&mut value);
                            Bytes::from(serde_json::to_vec(&value).unwrap_or_default())
                        }
                        Err(err) => {
                            let err = ProxyError::invalid_request(format!("malformed anthropic request: {err}"));
                            self.log_proxy_error(&meta, "/v1/messages", Dialect::Anthropic, Some(model_name), &err);
                            return DispatchResponse::json(err.status(), err.into_anthropic_body());
                        }
                    }
                } else {
                    body.clone()
                };
                self.forward_anthropic_passthrough(&upstream, outbound, want_stream).await
            }
            Dialect::OpenAi => {
                let request: CreateMessageRequestBody = match serde_json::from_slice(&body) {
                    Ok(r) => r,
                    Err(err) => {
                        let err = ProxyError::invalid_request(format!("malformed anthropic request: {err}"));
                        self.log_proxy_error(&meta, "/v1/messages", Dialect::Anthropic, Some(model_name), &err);
                        return DispatchResponse::json(err.status(), err.into_anthropic_body());
                    }
                };
                let openai_request = anthropic_request_to_openai(&request);
                let outbound = Bytes::from(serde_json::to_vec(&openai_request).unwrap_or_default());
                self.forward_anthropic_via_openai(&upstream, outbound, want_stream, request.model.as_str().to_string())
                    .await
            }
        };

        match result {
            Ok((resp, usage)) => {
                self.emit_log(
                    &meta,
                    "/v1/messages",
                    Dialect::Anthropic,
                    Some(model_name),
                    Some(upstream.upstream_id),
                    resp.status.as_u16(),
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cache_read_tokens,
                    usage.cache_creation_tokens,
                    None,
                );
                resp
            }
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/messages", Dialect::Anthropic, Some(model_name), &err);
                DispatchResponse::json(err.status(), err.into_anthropic_body())
            }
        }
    }

    /// Upstream is Anthropic-dialect: forward byte-for-byte, inspecting the
    /// stream in-flight only to extract usage for the log entry.
    async fn forward_anthropic_passthrough(
        &self,
        upstream: &ResolvedModel,
        body: Bytes,
        want_stream: bool,
    ) -> Result<(DispatchResponse, UsageTotalsOwned), ProxyError> {
        let upstream_resp = self
            .client_pool
            .post(upstream, "/v1/messages", body, want_stream, no_cancel())
            .await
            .map_err(transport_error)?;

        let status = upstream_resp.status;
        if !status.is_success() {
            let bytes = match upstream_resp.body {
                UpstreamBody::Buffered(b) => b,
                UpstreamBody::Streaming(mut rx) => {
                    let mut buf = Vec::new();
                    while let Some(chunk) = rx.recv().await {
                        buf.extend_from_slice(&chunk);
                    }
                    Bytes::from(buf)
                }
            };
            return Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, UsageTotalsOwned::default()));
        }

        match upstream_resp.body {
            UpstreamBody::Buffered(bytes) => {
                let usage = serde_json::from_slice::<llmgate_protocol::anthropic::BetaMessage>(&bytes)
                    .map(|message| UsageTotalsOwned {
                        input_tokens: message_input_tokens(&message),
                        output_tokens: message_output_tokens(&message),
                        cache_read_tokens: message_cache_read_tokens(&message),
                        cache_creation_tokens: message_cache_creation_tokens(&message),
                    })
                    .unwrap_or_default();
                Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, usage))
            }
            UpstreamBody::Streaming(mut rx) => {
                let (tx, out_rx) = mpsc::channel::<Bytes>(16);
                tokio::spawn(async move {
                    while let Some(chunk) = rx.recv().await {
                        if tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                });
                Ok((DispatchResponse { status, body: DispatchBody::Stream(out_rx) }, UsageTotalsOwned::default()))
                // NOTE: usage for a streamed passthrough response is only
                // fully known once the spawned task drains; the log entry
                // emitted immediately after this call necessarily predates
                // that, so a streamed passthrough request's usage columns
                // are left at zero. Translated streams (the other branch)
                // do not have this gap since the dispatcher owns the
                // per-event translation loop directly.
            }
        }
    }

    /// Upstream is OpenAI-dialect: translate request/response, or the SSE
    /// stream, through the hub shape.
    async fn forward_anthropic_via_openai(
        &self,
        upstream: &ResolvedModel,
        body: Bytes,
        want_stream: bool,
        model_name: String,
    ) -> Result<(DispatchResponse, UsageTotalsOwned), ProxyError> {
        let upstream_resp = self
            .client_pool
            .post(upstream, "/v1/chat/completions", body, want_stream, no_cancel())
            .await
            .map_err(transport_error)?;

        let status = upstream_resp.status;
        if !status.is_success() {
            let bytes = buffer_all(upstream_resp.body).await;
            return Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, UsageTotalsOwned::default()));
        }

        match upstream_resp.body {
            UpstreamBody::Buffered(bytes) => {
                let chat_response = serde_json::from_slice(&bytes)
                    .map_err(|err| ProxyError::api(format!("upstream response translation failed: {err}")))?;
                let anthropic_message = openai_response_to_anthropic(&chat_response);
                let usage = UsageTotalsOwned {
                    input_tokens: anthropic_message.usage.input_tokens,
                    output_tokens: anthropic_message.usage.output_tokens,
                    cache_read_tokens: anthropic_message.usage.cache_read_input_tokens.unwrap_or(0),
                    cache_creation_tokens: anthropic_message.usage.cache_creation_input_tokens.unwrap_or(0),
                };
                let body = serde_json::to_vec(&anthropic_message).unwrap_or_default();
                Ok((DispatchResponse { status, body: DispatchBody::Buffered(Bytes::from(body)) }, usage))
            }
            UpstreamBody::Streaming(rx) => {
                let (tx, out_rx) = mpsc::channel::<Bytes>(16);
                let input_tokens = estimate_input_tokens(&model_name);
                tokio::spawn(pump_openai_to_anthropic(rx, tx, model_name, input_tokens));
                Ok((DispatchResponse { status, body: DispatchBody::Stream(out_rx) }, UsageTotalsOwned::default()))
            }
        }
    }

    // ---------------------------------------------------------------
    // /v1/chat/completions
    // ---------------------------------------------------------------

    async fn do_handle_openai_chat(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse {
        let meta = RequestMeta { trace_id: new_trace_id(), key_id: None, t0: Instant::now() };
        tracing::info!(event = "downstream_received", trace_id = %meta.trace_id, path = "/v1/chat/completions");

        let key_id = match self.admit(headers, client_addr).await {
            Ok(id) => id,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/chat/completions", Dialect::OpenAi, None, &err);
                return DispatchResponse::json(err.status(), err.into_openai_body());
            }
        };
        let meta = RequestMeta { key_id: Some(key_id), ..meta };

        let routing = match Self::parse_routing_fields(&body) {
            Ok(r) => r,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/chat/completions", Dialect::OpenAi, None, &err);
                return DispatchResponse::json(err.status(), err.into_openai_body());
            }
        };
        let model_name = routing.model.clone().unwrap_or_default();
        let want_stream = routing.stream.unwrap_or(false);

        let upstream = match self.resolve(&model_name).await {
            Ok(u) => u,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/chat/completions", Dialect::OpenAi, Some(model_name), &err);
                return DispatchResponse::json(err.status(), err.into_openai_body());
            }
        };

        let result = match upstream.upstream_dialect {
            Dialect::OpenAi => self.forward_openai_passthrough(&upstream, body, want_stream, "/v1/chat/completions").await,
            Dialect::Anthropic => {
                let request: CreateChatCompletionRequestBody = match serde_json::from_slice(&body) {
                    Ok(r) => r,
                    Err(err) => {
                        let err = ProxyError::invalid_request(format!("malformed openai request: {err}"));
                        self.log_proxy_error(&meta, "/v1/chat/completions", Dialect::OpenAi, Some(model_name), &err);
                        return DispatchResponse::json(err.status(), err.into_openai_body());
                    }
                };
                let anthropic_request = openai_chat_request_to_anthropic(&request);
                let outbound = Bytes::from(serde_json::to_vec(&anthropic_request).unwrap_or_default());
                self.forward_openai_chat_via_anthropic(&upstream, outbound, want_stream).await
            }
        };

        match result {
            Ok((resp, usage)) => {
                self.emit_log(
                    &meta,
                    "/v1/chat/completions",
                    Dialect::OpenAi,
                    Some(model_name),
                    Some(upstream.upstream_id),
                    resp.status.as_u16(),
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cache_read_tokens,
                    usage.cache_creation_tokens,
                    None,
                );
                resp
            }
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/chat/completions", Dialect::OpenAi, Some(model_name), &err);
                DispatchResponse::json(err.status(), err.into_openai_body())
            }
        }
    }

    /// Upstream dialect matches the client's (`OpenAi`↔`/v1/chat/completions`):
    /// forward byte-for-byte. No usage extraction in-flight since OpenAI's
    /// own `CompletionUsage` only appears in full on the final buffered
    /// response or the last stream chunk, which the caller already logs
    /// from when it parses the body; a streamed passthrough leaves usage at
    /// zero for the same reason as its Anthropic counterpart.
    async fn forward_openai_passthrough(
        &self,
        upstream: &ResolvedModel,
        body: Bytes,
        want_stream: bool,
        path: &str,
    ) -> Result<(DispatchResponse, UsageTotalsOwned), ProxyError> {
        let upstream_resp = self
            .client_pool
            .post(upstream, path, body, want_stream, no_cancel())
            .await
            .map_err(transport_error)?;
        let status = upstream_resp.status;
        match upstream_resp.body {
            UpstreamBody::Buffered(bytes) => {
                let usage = extract_openai_usage(&bytes);
                Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, usage))
            }
            UpstreamBody::Streaming(rx) => {
                let (tx, out_rx) = mpsc::channel::<Bytes>(16);
                tokio::spawn(async move {
                    let mut rx = rx;
                    while let Some(chunk) = rx.recv().await {
                        if tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                });
                Ok((DispatchResponse { status, body: DispatchBody::Stream(out_rx) }, UsageTotalsOwned::default()))
            }
        }
    }

    async fn forward_openai_chat_via_anthropic(
        &self,
        upstream: &ResolvedModel,
        body: Bytes,
        want_stream: bool,
    ) -> Result<(DispatchResponse, UsageTotalsOwned), ProxyError> {
        let upstream_resp = self
            .client_pool
            .post(upstream, "/v1/messages", body, want_stream, no_cancel())
            .await
            .map_err(transport_error)?;
        let status = upstream_resp.status;
        if !status.is_success() {
            let bytes = buffer_all(upstream_resp.body).await;
            return Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, UsageTotalsOwned::default()));
        }

        match upstream_resp.body {
            UpstreamBody::Buffered(bytes) => {
                let message = serde_json::from_slice(&bytes)
                    .map_err(|err| ProxyError::api(format!("upstream response translation failed: {err}")))?;
                let usage = UsageTotalsOwned {
                    input_tokens: message_input_tokens(&message),
                    output_tokens: message_output_tokens(&message),
                    cache_read_tokens: message_cache_read_tokens(&message),
                    cache_creation_tokens: message_cache_creation_tokens(&message),
                };
                let chat_response = anthropic_message_to_chat_completion(&message, format!("chatcmpl-{}", new_trace_id()), unix_now());
                let body = serde_json::to_vec(&chat_response).unwrap_or_default();
                Ok((DispatchResponse { status, body: DispatchBody::Buffered(Bytes::from(body)) }, usage))
            }
            UpstreamBody::Streaming(rx) => {
                let (tx, out_rx) = mpsc::channel::<Bytes>(16);
                tokio::spawn(pump_anthropic_to_openai(rx, tx));
                Ok((DispatchResponse { status, body: DispatchBody::Stream(out_rx) }, UsageTotalsOwned::default()))
            }
        }
    }

    // ---------------------------------------------------------------
    // /v1/responses
    // ---------------------------------------------------------------

    async fn do_handle_openai_responses(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse {
        let meta = RequestMeta { trace_id: new_trace_id(), key_id: None, t0: Instant::now() };
        tracing::info!(event = "downstream_received", trace_id = %meta.trace_id, path = "/v1/responses");

        let key_id = match self.admit(headers, client_addr).await {
            Ok(id) => id,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/responses", Dialect::OpenAi, None, &err);
                return DispatchResponse::json(err.status(), err.into_openai_body());
            }
        };
        let meta = RequestMeta { key_id: Some(key_id), ..meta };

        let request: CreateResponseRequestBody = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(err) => {
                let err = ProxyError::invalid_request(format!("malformed responses request: {err}"));
                self.log_proxy_error(&meta, "/v1/responses", Dialect::OpenAi, None, &err);
                return DispatchResponse::json(err.status(), err.into_openai_body());
            }
        };
        let model_name = request.model.clone();
        let want_stream = request.stream.unwrap_or(false);

        let upstream = match self.resolve(&model_name).await {
            Ok(u) => u,
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/responses", Dialect::OpenAi, Some(model_name), &err);
                return DispatchResponse::json(err.status(), err.into_openai_body());
            }
        };

        let anthropic_request = responses_request_to_anthropic(&request);
        let outbound = Bytes::from(serde_json::to_vec(&anthropic_request).unwrap_or_default());
        // The Responses spoke always goes through the hub: whichever dialect
        // the resolved upstream speaks, the request it receives is shaped by
        // that dialect's own translator, so `/v1/messages` is correct only
        // for an Anthropic-dialect upstream; an OpenAi-dialect upstream gets
        // the same Anthropic hub shape translated onward to its chat route.
        let result = match upstream.upstream_dialect {
            Dialect::Anthropic => self.forward_responses_via_anthropic(&upstream, outbound, want_stream).await,
            Dialect::OpenAi => {
                let chat_request = anthropic_request_to_openai(&anthropic_request);
                let outbound = Bytes::from(serde_json::to_vec(&chat_request).unwrap_or_default());
                self.forward_responses_via_openai(&upstream, outbound, want_stream).await
            }
        };

        match result {
            Ok((resp, usage)) => {
                self.emit_log(
                    &meta,
                    "/v1/responses",
                    Dialect::OpenAi,
                    Some(model_name),
                    Some(upstream.upstream_id),
                    resp.status.as_u16(),
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cache_read_tokens,
                    usage.cache_creation_tokens,
                    None,
                );
                resp
            }
            Err(err) => {
                self.log_proxy_error(&meta, "/v1/responses", Dialect::OpenAi, Some(model_name), &err);
                DispatchResponse::json(err.status(), err.into_openai_body())
            }
        }
    }

    async fn forward_responses_via_anthropic(
        &self,
        upstream: &ResolvedModel,
        body: Bytes,
        want_stream: bool,
    ) -> Result<(DispatchResponse, UsageTotalsOwned), ProxyError> {
        let upstream_resp = self
            .client_pool
            .post(upstream, "/v1/messages", body, want_stream, no_cancel())
            .await
            .map_err(transport_error)?;
        let status = upstream_resp.status;
        if !status.is_success() {
            let bytes = buffer_all(upstream_resp.body).await;
            return Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, UsageTotalsOwned::default()));
        }
        match upstream_resp.body {
            UpstreamBody::Buffered(bytes) => {
                let message = serde_json::from_slice(&bytes)
                    .map_err(|err| ProxyError::api(format!("upstream response translation failed: {err}")))?;
                let usage = UsageTotalsOwned {
                    input_tokens: message_input_tokens(&message),
                    output_tokens: message_output_tokens(&message),
                    cache_read_tokens: message_cache_read_tokens(&message),
                    cache_creation_tokens: message_cache_creation_tokens(&message),
                };
                let response = anthropic_message_to_response(&message, unix_now());
                let body = serde_json::to_vec(&response).unwrap_or_default();
                Ok((DispatchResponse { status, body: DispatchBody::Buffered(Bytes::from(body)) }, usage))
            }
            UpstreamBody::Streaming(rx) => {
                let (tx, out_rx) = mpsc::channel::<Bytes>(16);
                tokio::spawn(pump_anthropic_to_responses(rx, tx));
                Ok((DispatchResponse { status, body: DispatchBody::Stream(out_rx) }, UsageTotalsOwned::default()))
            }
        }
    }

    async fn forward_responses_via_openai(
        &self,
        upstream: &ResolvedModel,
        body: Bytes,
        want_stream: bool,
    ) -> Result<(DispatchResponse, UsageTotalsOwned), ProxyError> {
        let upstream_resp = self
            .client_pool
            .post(upstream, "/v1/chat/completions", body, want_stream, no_cancel())
            .await
            .map_err(transport_error)?;
        let status = upstream_resp.status;
        if !status.is_success() {
            let bytes = buffer_all(upstream_resp.body).await;
            return Ok((DispatchResponse { status, body: DispatchBody::Buffered(bytes) }, UsageTotalsOwned::default()));
        }
        match upstream_resp.body {
            UpstreamBody::Buffered(bytes) => {
                let chat_response = serde_json::from_slice(&bytes)
                    .map_err(|err| ProxyError::api(format!("upstream response translation failed: {err}")))?;
                let message = openai_response_to_anthropic(&chat_response);
                let usage = UsageTotalsOwned {
                    input_tokens: message.usage.input_tokens,
                    output_tokens: message.usage.output_tokens,
                    cache_read_tokens: message.usage.cache_read_input_tokens.unwrap_or(0),
                    cache_creation_tokens: message.usage.cache_creation_input_tokens.unwrap_or(0),
                };
                let response = anthropic_message_to_response(&message, unix_now());
                let body = serde_json::to_vec(&response).unwrap_or_default();
                Ok((DispatchResponse { status, body: DispatchBody::Buffered(Bytes::from(body)) }, usage))
            }
            UpstreamBody::Streaming(rx) => {
                let (tx, out_rx) = mpsc::channel::<Bytes>(16);
                tokio::spawn(async move {
                    let mut translator = OpenAiToAnthropicStream::new("", 0);
                    let mut responses_translator = AnthropicStreamToResponses::new("", format!("resp_{}", new_trace_id()), unix_now());
                    let mut parser = SseParser::new();
                    let mut rx = rx;
                    while let Some(chunk) = rx.recv().await {
                        for payload in push_chunk(&mut parser, &chunk) {
                            if payload == "[DONE]" {
                                for event in translator.done() {
                                    for out in responses_translator.translate(&event) {
                                        if send_openai_sse(&tx, &out).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                return;
                            }
                            for event in translator.feed(&payload) {
                                for out in responses_translator.translate(&event) {
                                    if send_openai_sse(&tx, &out).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                });
                Ok((DispatchResponse { status, body: DispatchBody::Stream(out_rx) }, UsageTotalsOwned::default()))
            }
        }
    }
}

#[async_trait]
impl<S: Store + 'static> Dispatch for Dispatcher<S> {
    async fn handle_anthropic(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse {
        self.do_handle_anthropic(headers, client_addr, body).await
    }

    async fn handle_openai_chat(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse {
        self.do_handle_openai_chat(headers, client_addr, body).await
    }

    async fn handle_openai_responses(&self, headers: &HeaderMap, client_addr: SocketAddr, body: Bytes) -> DispatchResponse {
        self.do_handle_openai_responses(headers, client_addr, body).await
    }
}

#[derive(Default, Clone, Copy)]
struct UsageTotalsOwned {
    input_tokens: i64,
    output_tokens: i64,
    cache_read_tokens: i64,
    cache_creation_tokens: i64,
}

impl From<llmgate_transform::UsageTotals> for UsageTotalsOwned {
    fn from(totals: llmgate_transform::UsageTotals) -> Self {
        Self {
            input_tokens: totals.input_tokens,
            output_tokens: totals.output_tokens,
            cache_read_tokens: totals.cache_read_input_tokens,
            cache_creation_tokens: totals.cache_creation_input_tokens,
        }
    }
}

fn message_input_tokens(message: &llmgate_protocol::anthropic::BetaMessage) -> i64 {
    message.usage.input_tokens
}
fn message_output_tokens(message: &llmgate_protocol::anthropic::BetaMessage) -> i64 {
    message.usage.output_tokens
}
fn message_cache_read_tokens(message: &llmgate_protocol::anthropic::BetaMessage) -> i64 {
    message.usage.cache_read_input_tokens.unwrap_or(0)
}
fn message_cache_creation_tokens(message: &llmgate_protocol::anthropic::BetaMessage) -> i64 {
    message.usage.cache_creation_input_tokens.unwrap_or(0)
}

fn transport_error(err: crate::client_pool::ClientPoolError) -> ProxyError {
    match err {
        crate::client_pool::ClientPoolError::CircuitOpen(id) => {
            ProxyError::circuit_open(format!("circuit open for upstream {id}"))
        }
        other => ProxyError::api(other.to_string()),
    }
}

async fn buffer_all(body: UpstreamBody) -> Bytes {
    match body {
        UpstreamBody::Buffered(bytes) => bytes,
        UpstreamBody::Streaming(mut rx) => {
            let mut buf = Vec::new();
            while let Some(chunk) = rx.recv().await {
                buf.extend_from_slice(&chunk);
            }
            Bytes::from(buf)
        }
    }
}

fn extract_openai_usage(bytes: &[u8]) -> UsageTotalsOwned {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return UsageTotalsOwned::default();
    };
    let usage = &value["usage"];
    let prompt_tokens = usage["prompt_tokens"].as_i64().unwrap_or(0);
    let completion_tokens = usage["completion_tokens"].as_i64().unwrap_or(0);
    let cached = usage["prompt_tokens_details"]["cached_tokens"].as_i64();
    let (input_tokens, cache_read_tokens) = normalize_prompt_tokens(prompt_tokens, cached);
    UsageTotalsOwned {
        input_tokens,
        output_tokens: completion_tokens,
        cache_read_tokens,
        cache_creation_tokens: 0,
    }
}

/// A model name is unknown for a streamed mirror-path request until the
/// upstream's own `message_start` event reports it back; this dispatcher
/// only needs an initial `input_tokens` seed, which the translator
/// overwrites on first sight anyway, so zero is a safe placeholder.
fn estimate_input_tokens(_model_name: &str) -> i64 {
    0
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Feeds one chunk's bytes through an [`SseParser`], decoding with lossy
/// UTF-8 so a chunk boundary landing mid multi-byte character degrades to a
/// replacement character instead of silently dropping the line.
fn push_chunk(parser: &mut SseParser, chunk: &[u8]) -> Vec<String> {
    parser.push_str(&String::from_utf8_lossy(chunk)).into_iter().map(|event| event.data).collect()
}

async fn send_bytes(tx: &mpsc::Sender<Bytes>, data: String) -> Result<(), ()> {
    tx.send(Bytes::from(data)).await.map_err(|_| ())
}

async fn send_openai_sse<T: serde::Serialize>(tx: &mpsc::Sender<Bytes>, event: &T) -> Result<(), ()> {
    let data = serde_json::to_string(event).unwrap_or_default();
    send_bytes(tx, format!("data: {data}\n\n")).await
}

/// Drains an upstream OpenAI SSE stream through [`OpenAiToAnthropicStream`],
/// re-emitting each resulting Anthropic event on the wire for a
/// `/v1/messages` client.
async fn pump_openai_to_anthropic(
    mut rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
    model: String,
    initial_input_tokens: i64,
) {
    let mut translator = OpenAiToAnthropicStream::new(model, initial_input_tokens);
    let mut parser = SseParser::new();
    while let Some(chunk) = rx.recv().await {
        for payload in push_chunk(&mut parser, &chunk) {
            if payload == "[DONE]" {
                for event in translator.done() {
                    if send_bytes(&tx, event.to_sse()).await.is_err() {
                        return;
                    }
                }
                return;
            }
            for event in translator.feed(&payload) {
                if send_bytes(&tx, event.to_sse()).await.is_err() {
                    return;
                }
            }
        }
    }
    if !translator.is_terminated() {
        for event in translator.done() {
            if send_bytes(&tx, event.to_sse()).await.is_err() {
                return;
            }
        }
    }
}

/// Drains an upstream native Anthropic SSE stream, parsing each `data:`
/// payload directly into a [`llmgate_protocol::anthropic::BetaStreamEvent`]
/// (the payload's own `type` field carries the tag) and translating each
/// through [`AnthropicToOpenAiStream`] for an OpenAI chat-completions client.
async fn pump_anthropic_to_openai(mut rx: mpsc::Receiver<Bytes>, tx: mpsc::Sender<Bytes>) {
    let mut translator = AnthropicToOpenAiStream::new("");
    let mut parser = SseParser::new();
    while let Some(chunk) = rx.recv().await {
        for payload in push_chunk(&mut parser, &chunk) {
            let Ok(event) = serde_json::from_str::<llmgate_protocol::anthropic::BetaStreamEvent>(&payload) else {
                continue;
            };
            let is_stop = matches!(event, llmgate_protocol::anthropic::BetaStreamEvent::MessageStop);
            for chunk_out in translator.feed(&event) {
                if send_openai_sse(&tx, &chunk_out).await.is_err() {
                    return;
                }
            }
            if is_stop {
                let _ = send_bytes(&tx, "[DONE]".to_string()).await;
                return;
            }
        }
    }
}

/// Same as [`pump_anthropic_to_openai`] but for a `/v1/responses` client:
/// every Anthropic event additionally flows through
/// [`AnthropicStreamToResponses`].
async fn pump_anthropic_to_responses(mut rx: mpsc::Receiver<Bytes>, tx: mpsc::Sender<Bytes>) {
    let mut responses_translator = AnthropicStreamToResponses::new("", format!("resp_{}", new_trace_id()), unix_now());
    let mut parser = SseParser::new();
    while let Some(chunk) = rx.recv().await {
        for payload in push_chunk(&mut parser, &chunk) {
            let Ok(event) = serde_json::from_str::<llmgate_protocol::anthropic::BetaStreamEvent>(&payload) else {
                continue;
            };
            for out in responses_translator.translate(&event) {
                if send_openai_sse(&tx, &out).await.is_err() {
                    return;
                }
            }
        }
    }
}
