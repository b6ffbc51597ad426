// src/api.rs
// Axum router: REST lookups plus the long-lived push endpoints (SSE and
// websocket), with logging/metrics/auth middleware for both groups.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Extension, Path, Query, WebSocketUpgrade};
use axum::http::{header, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{SplitSink, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics;
use crate::registry::TraceRegistry;
use crate::sources::{AccountFilter, EventHub};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////
// GET /health
///////////////////////////////////////////////////////////////////////////
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

///////////////////////////////////////////////////////////////////////////
// GET /v2/traces/:hash
///////////////////////////////////////////////////////////////////////////
async fn get_trace(
    Path(hash): Path<String>,
    Extension(registry): Extension<Arc<TraceRegistry>>,
) -> Result<Response, ApiError> {
    let trace = registry.get(&hash).ok_or(ApiError::NotFound)?;
    let body = serde_json::json!({
        "trace": &*trace,
        "in_progress": trace.in_progress(),
    });
    Ok(Json(body).into_response())
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    accounts: Option<String>,
}

/// Parses the `accounts` query parameter and checks it against the node's
/// allow-list: when the node only watches a fixed account set, subscriptions
/// outside that set are rejected up front instead of silently staying empty.
fn parse_filter(raw: Option<&str>, config: &Config) -> Result<AccountFilter, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest("'accounts' parameter is required".into()))?;
    let filter = AccountFilter::parse(raw).map_err(|err| ApiError::BadRequest(err.to_string()))?;
    if !config.accounts.is_empty() {
        if let AccountFilter::List(set) = &filter {
            for account in set {
                if !config.accounts.contains(account) {
                    return Err(ApiError::BadRequest(format!(
                        "account {} is not watched by this node",
                        account
                    )));
                }
            }
        }
    }
    Ok(filter)
}

///////////////////////////////////////////////////////////////////////////
// GET /v2/sse/accounts/traces?accounts=...
///////////////////////////////////////////////////////////////////////////
async fn sse_traces(
    Query(params): Query<StreamParams>,
    Extension(hub): Extension<Arc<EventHub>>,
    Extension(config): Extension<Arc<Config>>,
) -> Result<Sse<impl Stream<Item = Result<Event, serde_json::Error>>>, ApiError> {
    use tokio_stream::StreamExt;

    let filter = parse_filter(params.accounts.as_deref(), &config)?;
    let guard = metrics::StreamGuard::new();
    let stream = BroadcastStream::new(hub.subscribe_traces()).filter_map(move |event| {
        let _ = &guard;
        match event {
            Ok(event) if filter.matches_any(&event.accounts) => {
                Some(Event::default().event("trace").json_data(&event))
            }
            // lagged subscribers simply miss events
            _ => None,
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

///////////////////////////////////////////////////////////////////////////
// GET /v2/sse/accounts/transactions?accounts=...
///////////////////////////////////////////////////////////////////////////
async fn sse_transactions(
    Query(params): Query<StreamParams>,
    Extension(hub): Extension<Arc<EventHub>>,
    Extension(config): Extension<Arc<Config>>,
) -> Result<Sse<impl Stream<Item = Result<Event, serde_json::Error>>>, ApiError> {
    use tokio_stream::StreamExt;

    let filter = parse_filter(params.accounts.as_deref(), &config)?;
    let guard = metrics::StreamGuard::new();
    let stream = BroadcastStream::new(hub.subscribe_transactions()).filter_map(move |event| {
        let _ = &guard;
        match event {
            Ok(event) if filter.matches_one(&event.account) => {
                Some(Event::default().event("transaction").json_data(&event))
            }
            _ => None,
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

///////////////////////////////////////////////////////////////////////////
// GET /v2/sse/blocks
///////////////////////////////////////////////////////////////////////////
async fn sse_blocks(
    Extension(hub): Extension<Arc<EventHub>>,
) -> Sse<impl Stream<Item = Result<Event, serde_json::Error>>> {
    use tokio_stream::StreamExt;

    let guard = metrics::StreamGuard::new();
    let stream = BroadcastStream::new(hub.subscribe_blocks()).filter_map(move |event| {
        let _ = &guard;
        match event {
            Ok(event) => Some(Event::default().event("block").json_data(&event)),
            _ => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

///////////////////////////////////////////////////////////////////////////
// GET /v2/sse/mempool[?accounts=...]
///////////////////////////////////////////////////////////////////////////
async fn sse_mempool(
    Query(params): Query<StreamParams>,
    Extension(hub): Extension<Arc<EventHub>>,
    Extension(config): Extension<Arc<Config>>,
) -> Result<Sse<impl Stream<Item = Result<Event, serde_json::Error>>>, ApiError> {
    use tokio_stream::StreamExt;

    // accounts is optional here: without it the stream carries everything
    let filter = match params.accounts.as_deref() {
        Some(raw) => Some(parse_filter(Some(raw), &config)?),
        None => None,
    };
    let guard = metrics::StreamGuard::new();
    let stream = BroadcastStream::new(hub.subscribe_mempool()).filter_map(move |event| {
        let _ = &guard;
        match event {
            Ok(event)
                if filter
                    .as_ref()
                    .map_or(true, |f| f.matches_any(&event.involved_accounts)) =>
            {
                Some(Event::default().event("message").json_data(&event))
            }
            _ => None,
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

///////////////////////////////////////////////////////////////////////////
// GET /v2/websocket
///////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
struct WsRequest {
    operation: String,
    accounts: Option<Vec<String>>,
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(hub): Extension<Arc<EventHub>>,
    Extension(config): Extension<Arc<Config>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_loop(socket, hub, config))
}

async fn send_frame<T: Serialize>(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    kind: &str,
    payload: &T,
) -> Result<(), axum::Error> {
    use futures::SinkExt;

    let frame = serde_json::json!({ "event": kind, "data": payload });
    sender.send(WsMessage::Text(frame.to_string())).await
}

/// One websocket session: the client adjusts its subscriptions with JSON
/// frames while matching events are pushed down the same socket.
async fn websocket_loop(socket: WebSocket, hub: Arc<EventHub>, config: Arc<Config>) {
    use futures::{SinkExt, StreamExt};

    let _guard = metrics::StreamGuard::new();
    let (mut sender, mut receiver) = socket.split();
    let mut traces = hub.subscribe_traces();
    let mut transactions = hub.subscribe_transactions();
    let mut mempool = hub.subscribe_mempool();

    // nothing flows until the client subscribes
    let mut trace_filter: Option<AccountFilter> = None;
    let mut tx_filter: Option<AccountFilter> = None;
    let mut mempool_on = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = handle_ws_request(
                            &text,
                            &config,
                            &mut trace_filter,
                            &mut tx_filter,
                            &mut mempool_on,
                        );
                        if sender.send(WsMessage::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("websocket receive error: {}", err);
                        break;
                    }
                }
            }
            event = traces.recv() => {
                match event {
                    Ok(event) => {
                        let wanted = trace_filter
                            .as_ref()
                            .map_or(false, |f| f.matches_any(&event.accounts));
                        if wanted && send_frame(&mut sender, "trace", &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(_)) => {}
                }
            }
            event = transactions.recv() => {
                match event {
                    Ok(event) => {
                        let wanted = tx_filter
                            .as_ref()
                            .map_or(false, |f| f.matches_one(&event.account));
                        if wanted && send_frame(&mut sender, "transaction", &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(_)) => {}
                }
            }
            event = mempool.recv() => {
                match event {
                    Ok(event) => {
                        if mempool_on && send_frame(&mut sender, "message", &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(_)) => {}
                }
            }
        }
    }
}

fn handle_ws_request(
    text: &str,
    config: &Config,
    trace_filter: &mut Option<AccountFilter>,
    tx_filter: &mut Option<AccountFilter>,
    mempool_on: &mut bool,
) -> serde_json::Value {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            return serde_json::json!({
                "event": "error",
                "message": format!("invalid request: {}", err),
            })
        }
    };

    match request.operation.as_str() {
        "subscribe_traces" | "subscribe_transactions" => {
            let joined = request.accounts.unwrap_or_default().join(",");
            let raw = if joined.is_empty() { "ALL" } else { joined.as_str() };
            let filter = match parse_filter(Some(raw), config) {
                Ok(filter) => filter,
                Err(err) => {
                    return serde_json::json!({
                        "event": "error",
                        "message": err.to_string(),
                    })
                }
            };
            if request.operation == "subscribe_traces" {
                *trace_filter = Some(filter);
            } else {
                *tx_filter = Some(filter);
            }
            serde_json::json!({ "event": "subscribed", "operation": request.operation })
        }
        "subscribe_mempool" => {
            *mempool_on = true;
            serde_json::json!({ "event": "subscribed", "operation": "subscribe_mempool" })
        }
        other => serde_json::json!({
            "event": "error",
            "message": format!("unknown operation '{}'", other),
        }),
    }
}

///////////////////////////////////////////////////////////////////////////
// middleware
///////////////////////////////////////////////////////////////////////////

/// Request logging middleware.
///
/// Logs all HTTP requests with method, path, status, and latency.
async fn logging_middleware<B>(req: Request<B>, next: Next<B>) -> Result<Response, StatusCode> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    info!("{} {} {} - {:.3}s", method, path, status, latency);

    Ok(response)
}

async fn metrics_middleware<B>(req: Request<B>, next: Next<B>) -> Result<Response, StatusCode> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let timer = metrics::HTTP_LATENCY
        .with_label_values(&[method.as_str(), &path])
        .start_timer();

    let response = next.run(req).await;

    timer.observe_duration();
    metrics::HTTP_REQUESTS
        .with_label_values(&[method.as_str(), &path, response.status().as_str()])
        .inc();
    Ok(response)
}

fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// EventSource clients cannot set headers, so streaming endpoints also accept
// the token as a query parameter.
fn query_token<B>(req: &Request<B>) -> Option<&str> {
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

/// Token check for long-lived connections. A node without API_TOKEN set
/// serves everyone.
async fn auth_middleware<B>(
    Extension(config): Extension<Arc<Config>>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let expected = match config.api_token.as_deref() {
        Some(token) => token,
        None => return Ok(next.run(req).await),
    };
    let presented = bearer_token(&req).or_else(|| query_token(&req));
    match presented {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Build the router (call from `run()` or from tests).
pub fn router(registry: Arc<TraceRegistry>, hub: Arc<EventHub>, config: Arc<Config>) -> Router {
    let rest = Router::new()
        .route("/health", get(health))
        .route("/v2/traces/:hash", get(get_trace));

    let streaming = Router::new()
        .route("/v2/sse/accounts/traces", get(sse_traces))
        .route("/v2/sse/accounts/transactions", get(sse_transactions))
        .route("/v2/sse/blocks", get(sse_blocks))
        .route("/v2/sse/mempool", get(sse_mempool))
        .route("/v2/websocket", get(websocket_handler))
        .layer(middleware::from_fn(auth_middleware));

    Router::new()
        .merge(rest)
        .merge(streaming)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(registry))
        .layer(Extension(hub))
        .layer(Extension(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::core::AccountId;

    fn account(byte: u8) -> AccountId {
        AccountId::new(0, [byte; 32])
    }

    fn open_config() -> Config {
        Config {
            api_addr: "127.0.0.1:0".parse().unwrap(),
            metrics_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            api_token: None,
            accounts: HashSet::new(),
            accounts_file: "accounts.txt".to_string(),
        }
    }

    fn drive(
        config: &Config,
        frame: &serde_json::Value,
    ) -> (
        serde_json::Value,
        Option<AccountFilter>,
        Option<AccountFilter>,
        bool,
    ) {
        let mut trace_filter = None;
        let mut tx_filter = None;
        let mut mempool_on = false;
        let reply = handle_ws_request(
            &frame.to_string(),
            config,
            &mut trace_filter,
            &mut tx_filter,
            &mut mempool_on,
        );
        (reply, trace_filter, tx_filter, mempool_on)
    }

    #[test]
    fn subscribe_without_accounts_defaults_to_all() {
        let frame = serde_json::json!({ "operation": "subscribe_traces" });
        let (reply, trace_filter, tx_filter, _) = drive(&open_config(), &frame);

        assert_eq!(reply["event"], "subscribed");
        assert_eq!(reply["operation"], "subscribe_traces");
        assert!(trace_filter.unwrap().matches_one(&account(42)));
        assert!(tx_filter.is_none());
    }

    #[test]
    fn subscribe_transactions_installs_the_account_list() {
        let frame = serde_json::json!({
            "operation": "subscribe_transactions",
            "accounts": [account(1).to_string()],
        });
        let (reply, trace_filter, tx_filter, _) = drive(&open_config(), &frame);

        assert_eq!(reply["event"], "subscribed");
        let filter = tx_filter.unwrap();
        assert!(filter.matches_one(&account(1)));
        assert!(!filter.matches_one(&account(2)));
        assert!(trace_filter.is_none());
    }

    #[test]
    fn subscribe_mempool_flips_the_switch() {
        let frame = serde_json::json!({ "operation": "subscribe_mempool" });
        let (reply, _, _, mempool_on) = drive(&open_config(), &frame);

        assert_eq!(reply["event"], "subscribed");
        assert!(mempool_on);
    }

    #[test]
    fn unknown_operation_gets_an_error_frame() {
        let frame = serde_json::json!({ "operation": "subscribe_everything" });
        let (reply, trace_filter, tx_filter, mempool_on) = drive(&open_config(), &frame);

        assert_eq!(reply["event"], "error");
        assert!(reply["message"]
            .as_str()
            .unwrap()
            .contains("unknown operation"));
        assert!(trace_filter.is_none() && tx_filter.is_none() && !mempool_on);
    }

    #[test]
    fn malformed_frame_gets_an_error_frame() {
        let mut trace_filter = None;
        let mut tx_filter = None;
        let mut mempool_on = false;
        let reply = handle_ws_request(
            "not even json",
            &open_config(),
            &mut trace_filter,
            &mut tx_filter,
            &mut mempool_on,
        );

        assert_eq!(reply["event"], "error");
        assert!(trace_filter.is_none() && tx_filter.is_none() && !mempool_on);
    }

    #[test]
    fn allow_list_applies_inside_socket_sessions() {
        let mut config = open_config();
        config.accounts = HashSet::from([account(1)]);

        let frame = serde_json::json!({
            "operation": "subscribe_traces",
            "accounts": [account(2).to_string()],
        });
        let (reply, trace_filter, _, _) = drive(&config, &frame);

        assert_eq!(reply["event"], "error");
        assert!(reply["message"].as_str().unwrap().contains("not watched"));
        // a rejected subscription leaves the session silent
        assert!(trace_filter.is_none());
    }
}
