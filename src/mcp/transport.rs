//! HTTP + Server-Sent Events transport for the MCP server.
//!
//! This module implements the two-channel SSE transport:
//!
//! - `GET {sse_path}` opens a long-lived `text/event-stream`. The first event
//!   (`endpoint`) carries the URL the client must post to, including its
//!   session id. Every reply is then delivered as a `message` event holding
//!   one line of JSON.
//! - `POST {message_path}?sessionId=…` carries one JSON-RPC message. The HTTP
//!   response only acknowledges routing (202); the reply arrives on the stream.
//! - `OPTIONS` on either path answers CORS pre-flight permissively.
//! - Anything else is a bare 404.
//!
//! Dropping the event stream (client disconnect, server shutdown) closes the
//! session.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::mcp::session::{SessionError, SessionEvent, SessionId, SessionManager};

/// Interval between keep-alive comments on idle streams.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";

/// Paths and buffer sizes for the transport.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Path of the event stream endpoint.
    pub sse_path: String,
    /// Path of the message endpoint.
    pub message_path: String,
    /// Capacity of each session's outgoing event buffer.
    pub channel_capacity: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            sse_path: "/mcp".to_string(),
            message_path: "/mcp/messages".to_string(),
            channel_capacity: 32,
        }
    }
}

#[derive(Clone)]
struct AppState {
    sessions: SessionManager,
    message_path: Arc<str>,
    channel_capacity: usize,
}

/// Builds the HTTP router.
pub fn router(sessions: SessionManager, options: &TransportOptions) -> Router {
    let state = AppState {
        sessions,
        message_path: Arc::from(options.message_path.as_str()),
        channel_capacity: options.channel_capacity.max(1),
    };

    Router::new()
        .route(
            &options.sse_path,
            get(open_stream).options(preflight).fallback(not_found),
        )
        .route(
            &options.message_path,
            post(post_message).options(preflight).fallback(not_found),
        )
        .fallback(not_found)
        .with_state(state)
}

/// Opens a session and streams its events.
///
/// `get` also routes `HEAD` here; that must not open a session.
async fn open_stream(method: Method, State(state): State<AppState>) -> Response {
    if method != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }

    let (sink, events) = mpsc::channel(state.channel_capacity);
    let id = state.sessions.open_session(sink.clone());

    let endpoint = format!("{}?sessionId={id}", state.message_path);
    if sink.try_send(SessionEvent::Endpoint(endpoint)).is_err() {
        tracing::warn!(session_id = %id, "Failed to announce endpoint");
        state.sessions.close_session(&id);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    drop(sink);

    let stream = SessionStream {
        events: ReceiverStream::new(events),
        _guard: CloseOnDrop {
            sessions: state.sessions.clone(),
            id,
        },
    }
    .map(|event| Ok::<_, Infallible>(to_sse(event)));

    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL));
    with_cors(sse.into_response())
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Routes one posted message to its session.
async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(raw_id) = query.session_id.filter(|id| !id.trim().is_empty()) else {
        return with_cors((StatusCode::BAD_REQUEST, "Missing sessionId").into_response());
    };

    let routed = match raw_id.parse::<SessionId>() {
        Ok(id) => state.sessions.route_message(&id, body).await,
        Err(e) => Err(e),
    };

    let response = match routed {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(SessionError::NotFound { id } | SessionError::Closed { id }) => {
            tracing::debug!(session_id = %id, "Message for unknown session");
            (StatusCode::NOT_FOUND, "Session not found").into_response()
        }
    };
    with_cors(response)
}

async fn preflight() -> Response {
    with_cors(StatusCode::NO_CONTENT.into_response())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

fn to_sse(event: SessionEvent) -> Event {
    match event {
        SessionEvent::Endpoint(url) => Event::default().event("endpoint").data(url),
        SessionEvent::Message(line) => Event::default().event("message").data(line),
    }
}

/// Closes the session when the response body is dropped.
struct CloseOnDrop {
    sessions: SessionManager,
    id: SessionId,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if self.sessions.close_session(&self.id) {
            tracing::debug!(session_id = %self.id, "Stream dropped");
        }
    }
}

/// A session's event stream, tied to the session's lifetime.
struct SessionStream {
    events: ReceiverStream<SessionEvent>,
    _guard: CloseOnDrop,
}

impl Stream for SessionStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        tracing::warn!("Failed to install signal handlers, falling back to Ctrl+C");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves on Ctrl+C.
#[cfg(windows)]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::UpstreamClient;
    use crate::mcp::registry::Registry;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, SessionManager) {
        let registry = Arc::new(Registry::load(None).unwrap());
        let upstream =
            UpstreamClient::new(reqwest::Client::new(), "http://127.0.0.1:9/books").unwrap();
        let sessions = SessionManager::new(registry, upstream, 8);
        (router(sessions.clone(), &TransportOptions::default()), sessions)
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn preflight_is_permissive() {
        let (app, _) = app();
        for path in ["/mcp", "/mcp/messages"] {
            let response = app
                .clone()
                .oneshot(request(Method::OPTIONS, path))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            let headers = response.headers();
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], ALLOW_HEADERS);
            let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (app, _) = app();
        let response = app.oneshot(request(Method::GET, "/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_not_found() {
        let (app, _) = app();
        let response = app
            .clone()
            .oneshot(request(Method::DELETE, "/mcp"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request(Method::GET, "/mcp/messages"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_on_stream_path_opens_nothing() {
        let (app, sessions) = app();
        let response = app.oneshot(request(Method::HEAD, "/mcp")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn post_without_session_id() {
        let (app, _) = app();
        let response = app
            .oneshot(request(Method::POST, "/mcp/messages"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_to_unknown_session() {
        let (app, _) = app();
        let response = app
            .oneshot(request(
                Method::POST,
                "/mcp/messages?sessionId=00000000000000000000000000000000",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dropping_stream_closes_session() {
        let (app, sessions) = app();
        let response = app.oneshot(request(Method::GET, "/mcp")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(sessions.len(), 1);

        drop(response);
        assert!(sessions.is_empty());
    }
}
