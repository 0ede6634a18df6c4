//! Thin axum routes over [`llmgate_core::Dispatch`] and [`ReadinessProbe`].
//! All orchestration lives in `llmgate-core`; this module only adapts
//! between axum's request/response types and the dispatcher's.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use llmgate_core::{Dispatch, DispatchBody, DispatchResponse, ReadinessProbe};

pub(crate) struct AppState<D: Dispatch + 'static, R: ReadinessProbe + 'static> {
    pub(crate) dispatcher: Arc<D>,
    pub(crate) readiness: Arc<R>,
}

/// Manual impl: `#[derive(Clone)]` would require `D: Clone`/`R: Clone`, but
/// only the `Arc` needs cloning here.
impl<D: Dispatch + 'static, R: ReadinessProbe + 'static> Clone for AppState<D, R> {
    fn clone(&self) -> Self {
        Self { dispatcher: self.dispatcher.clone(), readiness: self.readiness.clone() }
    }
}

pub(crate) fn router<D: Dispatch + 'static, R: ReadinessProbe + 'static>(state: AppState<D, R>) -> Router {
    Router::new()
        .route("/v1/messages", post(handle_anthropic::<D, R>))
        .route("/v1/chat/completions", post(handle_openai_chat::<D, R>))
        .route("/v1/responses", post(handle_openai_responses::<D, R>))
        .route("/health", get(health))
        .route("/ready", get(ready::<D, R>))
        .with_state(state)
}

async fn handle_anthropic<D: Dispatch + 'static, R: ReadinessProbe + 'static>(
    State(state): State<AppState<D, R>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    into_axum_response(state.dispatcher.handle_anthropic(&headers, client_addr, body).await)
}

async fn handle_openai_chat<D: Dispatch + 'static, R: ReadinessProbe + 'static>(
    State(state): State<AppState<D, R>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    into_axum_response(state.dispatcher.handle_openai_chat(&headers, client_addr, body).await)
}

async fn handle_openai_responses<D: Dispatch + 'static, R: ReadinessProbe + 'static>(
    State(state): State<AppState<D, R>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    into_axum_response(state.dispatcher.handle_openai_responses(&headers, client_addr, body).await)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ready<D: Dispatch + 'static, R: ReadinessProbe + 'static>(State(state): State<AppState<D, R>>) -> Response {
    if state.readiness.check().await {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "unavailable" }))).into_response()
    }
}

fn into_axum_response(resp: DispatchResponse) -> Response {
    let retry_after = (resp.status == StatusCode::TOO_MANY_REQUESTS).then_some(("retry-after", "1"));
    match resp.body {
        DispatchBody::Buffered(bytes) => {
            let mut response = (resp.status, [("content-type", "application/json")], bytes).into_response();
            if let Some((name, value)) = retry_after {
                response.headers_mut().insert(name, value.parse().unwrap());
            }
            response
        }
        DispatchBody::Stream(rx) => {
            let stream = ReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
            let body = Body::from_stream(stream);
            (resp.status, [("content-type", "text/event-stream")], body).into_response()
        }
    }
}
