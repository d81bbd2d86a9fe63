// ! HTTP/SSE MCP transport
// !
// ! `GET /sse` opens a long-lived event stream: the server assigns a fresh
// ! clientId, creates an isolated session, and immediately announces the
// ! POST-back endpoint as an `endpoint` event. `POST /message?clientId=<id>`
// ! feeds one JSON-RPC message into that session's inbound queue (per-session
// ! FIFO), and replies travel back over the stream as `message` events.
// ! Dropping the stream tears the session down; an in-flight handler still
// ! completes but its reply is discarded.

use crate::core::error::{HubError, HubResult};
use crate::dispatch::ToolDispatcher;
use crate::plugin::PluginManager;
use crate::protocol::types::JsonRpcMessage;
use crate::server::session::McpSession;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Channels belonging to one connected SSE client
struct SseClientHandle {
    /// Feeds the session worker; preserves inbound order
    inbound: mpsc::UnboundedSender<JsonRpcMessage>,
    /// Feeds the event stream back to the peer
    outbound: mpsc::UnboundedSender<JsonRpcMessage>,
}

/// Shared state behind the axum router
struct SseState {
    sessions: RwLock<HashMap<String, SseClientHandle>>,
    dispatcher: Arc<ToolDispatcher>,
    manager: Arc<PluginManager>,
    local_addr: SocketAddr,
}

/// Running SSE server; dropping the handle does not stop it, call [`stop`]
///
/// [`stop`]: SseServerHandle::stop
pub struct SseServerHandle {
    addr: SocketAddr,
    state: Arc<SseState>,
    server_task: JoinHandle<()>,
    notifier_task: JoinHandle<()>,
}

impl SseServerHandle {
    /// Address the listener is bound to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of currently connected clients
    pub fn client_count(&self) -> usize {
        self.state.sessions.read().expect("session lock poisoned").len()
    }

    /// Stop the listener and drop every live session
    pub async fn stop(self) {
        self.server_task.abort();
        self.notifier_task.abort();
        self.state
            .sessions
            .write()
            .expect("session lock poisoned")
            .clear();
        info!(addr = %self.addr, "SSE server stopped");
    }
}

/// Bind and start the SSE transport on the given port
pub async fn start_sse_server(
    dispatcher: Arc<ToolDispatcher>,
    manager: Arc<PluginManager>,
    port: u16,
) -> HubResult<SseServerHandle> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|err| HubError::transport(format!("cannot bind port {port}: {err}")))?;
    let addr = listener.local_addr()?;

    let state = Arc::new(SseState {
        sessions: RwLock::new(HashMap::new()),
        dispatcher,
        manager: manager.clone(),
        local_addr: addr,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/sse", get(handle_sse))
        .route("/message", post(handle_message))
        .route("/health", get(handle_health))
        .layer(ServiceBuilder::new().layer(cors).into_inner())
        .with_state(state.clone());

    let server_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(%err, "SSE server error");
        }
    });

    // Plugin-state changes fan out to every live session
    let notifier_state = state.clone();
    let mut events = manager.subscribe();
    let notifier_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if !event.changes_tool_visibility() {
                continue;
            }
            let outbounds: Vec<mpsc::UnboundedSender<JsonRpcMessage>> = {
                let sessions = notifier_state
                    .sessions
                    .read()
                    .expect("session lock poisoned");
                sessions.values().map(|client| client.outbound.clone()).collect()
            };
            let notification =
                JsonRpcMessage::Notification(McpSession::list_changed_notification());
            for outbound in outbounds {
                let _ = outbound.send(notification.clone());
            }
        }
    });

    info!(%addr, "SSE server listening");
    Ok(SseServerHandle {
        addr,
        state,
        server_task,
        notifier_task,
    })
}

/// Removes the session from the map once the event stream is dropped
struct SessionGuard {
    client_id: String,
    state: Arc<SseState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state
            .sessions
            .write()
            .expect("session lock poisoned")
            .remove(&self.client_id);
        debug!(client = %self.client_id, "SSE session closed");
    }
}

async fn run_session_worker(
    session: Arc<McpSession>,
    mut inbound: mpsc::UnboundedReceiver<JsonRpcMessage>,
    outbound: mpsc::UnboundedSender<JsonRpcMessage>,
) {
    while let Some(message) = inbound.recv().await {
        if let Some(reply) = session.handle_message(message).await {
            if outbound.send(reply).is_err() {
                // Peer left mid-request; the reply is discarded
                break;
            }
        }
    }
}

async fn handle_sse(
    State(state): State<Arc<SseState>>,
    headers: HeaderMap,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let client_id = Uuid::new_v4().to_string();
    let session = Arc::new(McpSession::new(
        client_id.clone(),
        state.dispatcher.clone(),
        state.manager.clone(),
    ));

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_session_worker(session, inbound_rx, outbound_tx.clone()));

    state
        .sessions
        .write()
        .expect("session lock poisoned")
        .insert(
            client_id.clone(),
            SseClientHandle {
                inbound: inbound_tx,
                outbound: outbound_tx,
            },
        );
    info!(client = %client_id, "SSE client connected");

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.local_addr.to_string());
    let endpoint = format!("http://{host}/message?clientId={client_id}");

    let guard = SessionGuard {
        client_id,
        state: state.clone(),
    };

    let endpoint_event = Event::default().event("endpoint").data(endpoint);
    let message_events = UnboundedReceiverStream::new(outbound_rx).map(|message| {
        let data = serde_json::to_string(&message).unwrap_or_else(|_| "{}".to_string());
        Event::default().event("message").data(data)
    });

    let stream = tokio_stream::once(endpoint_event)
        .chain(message_events)
        .map(move |event| {
            // The guard lives exactly as long as the stream
            let _held = &guard;
            Ok::<Event, Infallible>(event)
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "clientId")]
    client_id: String,
}

async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> StatusCode {
    let message: JsonRpcMessage = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(err) => {
            debug!(client = %query.client_id, %err, "rejecting malformed message");
            return StatusCode::BAD_REQUEST;
        }
    };

    let sessions = state.sessions.read().expect("session lock poisoned");
    let Some(client) = sessions.get(&query.client_id) else {
        return StatusCode::NOT_FOUND;
    };

    if client.inbound.send(message).is_err() {
        return StatusCode::NOT_FOUND;
    }
    StatusCode::ACCEPTED
}

async fn handle_health(State(state): State<Arc<SseState>>) -> Json<Value> {
    let clients = state.sessions.read().expect("session lock poisoned").len();
    Json(json!({"status": "ok", "clients": clients}))
}
