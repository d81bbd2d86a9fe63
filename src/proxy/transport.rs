// ! Child MCP transports for the proxy
// !
// ! A proxy instance talks to its external MCP server either through a
// ! spawned subprocess (line-delimited JSON-RPC over the child's stdio) or
// ! through an SSE stream with POST-back. Both transports correlate
// ! responses to requests through a pending map and invoke an exit callback
// ! when the child goes away so the owning plugin can flip to disconnected.

use crate::core::error::{HubError, HubResult};
use crate::protocol::types::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, timeout};
use tracing::{debug, trace, warn};
use url::Url;

/// Default deadline for one child request
pub const CHILD_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lines of child stderr retained for the `debug` command
pub const STDERR_TAIL_CAPACITY: usize = 100;

/// Invoked once when the child side goes away on its own
pub type ExitCallback = Arc<dyn Fn() + Send + Sync>;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<HubResult<JsonRpcResponse>>>>>;

/// Transport to one child MCP server
#[async_trait]
pub trait ChildTransport: Send + Sync {
    async fn send_request(&self, request: JsonRpcRequest) -> HubResult<JsonRpcResponse>;
    async fn send_notification(&self, notification: JsonRpcNotification) -> HubResult<()>;
    /// Tear the transport down; killing a subprocess child is signal-based
    async fn close(&self);
}

async fn fail_all_pending(pending: &Pending, error: HubError) {
    let mut pending = pending.lock().await;
    for (_, sender) in pending.drain() {
        let _ = sender.send(Err(error.clone()));
    }
}

async fn complete_pending(pending: &Pending, id: u64, result: HubResult<JsonRpcResponse>) {
    match pending.lock().await.remove(&id) {
        Some(sender) => {
            let _ = sender.send(result);
        }
        None => debug!(id, "response for unknown request id"),
    }
}

async fn dispatch_child_message(pending: &Pending, message: JsonRpcMessage) {
    match message {
        JsonRpcMessage::Response(response) => {
            if let Some(id) = response.id.as_u64() {
                complete_pending(pending, id, Ok(response)).await;
            }
        }
        JsonRpcMessage::Error(error) => {
            if let Some(id) = error.id.as_u64() {
                let err = HubError::protocol(format!(
                    "child error {}: {}",
                    error.error.code, error.error.message
                ));
                complete_pending(pending, id, Err(err)).await;
            }
        }
        JsonRpcMessage::Notification(notification) => {
            trace!(method = %notification.method, "child notification ignored");
        }
        JsonRpcMessage::Request(request) => {
            debug!(method = %request.method, "child request ignored");
        }
    }
}

// ============================================================================
// Subprocess child
// ============================================================================

/// Child transport over a spawned subprocess's stdio
#[derive(Debug)]
pub struct StdioChildTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    pending: Pending,
    closing: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl StdioChildTransport {
    /// Spawn the child with the parent environment merged with `env`
    ///
    /// Child stderr is drained into the bounded `stderr_tail` ring and never
    /// reaches the parent's stdout.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        stderr_tail: Arc<StdMutex<VecDeque<String>>>,
        on_exit: ExitCallback,
    ) -> HubResult<Self> {
        debug!(command, ?args, "spawning child MCP server");

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| HubError::transport(format!("failed to spawn '{command}': {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HubError::transport("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HubError::transport("child stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HubError::transport("child stderr unavailable"))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closing = Arc::new(AtomicBool::new(false));

        let reader_pending = pending.clone();
        let reader_closing = closing.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                trace!("child recv: {frame}");
                match serde_json::from_str::<JsonRpcMessage>(frame) {
                    Ok(message) => dispatch_child_message(&reader_pending, message).await,
                    Err(err) => warn!(%err, "unparseable child frame"),
                }
            }

            fail_all_pending(&reader_pending, HubError::ChildExited("stdout closed".into()))
                .await;
            if !reader_closing.load(Ordering::SeqCst) {
                debug!("child exited");
                on_exit();
            }
        });

        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let mut tail = stderr_tail.lock().expect("stderr tail lock poisoned");
                tail.push_back(line);
                while tail.len() > STDERR_TAIL_CAPACITY {
                    tail.pop_front();
                }
            }
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            pending,
            closing,
            request_timeout: CHILD_REQUEST_TIMEOUT,
        })
    }

    async fn write_line(&self, payload: &str) -> HubResult<()> {
        let mut guard = self.stdin.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| HubError::TransportClosed("child stdin closed".into()))?;
        trace!("child send: {payload}");
        writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|err| HubError::transport(format!("child write failed: {err}")))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|err| HubError::transport(format!("child write failed: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| HubError::transport(format!("child flush failed: {err}")))?;
        Ok(())
    }
}

#[async_trait]
impl ChildTransport for StdioChildTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> HubResult<JsonRpcResponse> {
        let id = request
            .id
            .as_u64()
            .ok_or_else(|| HubError::protocol("child request ids must be numeric"))?;

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().await.insert(id, sender);

        let payload = serde_json::to_string(&request)?;
        if let Err(err) = self.write_line(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match timeout(self.request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::TransportClosed("response channel dropped".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(HubError::timeout(format!(
                    "child did not answer request {id} in {}s",
                    self.request_timeout.as_secs()
                )))
            }
        }
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> HubResult<()> {
        let payload = serde_json::to_string(&notification)?;
        self.write_line(&payload).await
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to kill child");
            }
        }
        fail_all_pending(&self.pending, HubError::TransportClosed("proxy disconnected".into()))
            .await;
    }
}

// ============================================================================
// SSE child
// ============================================================================

/// Child transport over an SSE stream with POST-back
pub struct SseChildTransport {
    http: reqwest::Client,
    endpoint: String,
    pending: Pending,
    reader_task: tokio::task::JoinHandle<()>,
    closing: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl SseChildTransport {
    /// Open the stream and wait for the server's `endpoint` event
    pub async fn connect(url: &str, on_exit: ExitCallback) -> HubResult<Self> {
        let base = Url::parse(url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(CHILD_REQUEST_TIMEOUT)
            .build()?;

        let response = http.get(base.clone()).send().await?;
        if !response.status().is_success() {
            return Err(HubError::Http(format!(
                "SSE connect to {url} failed: {}",
                response.status()
            )));
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closing = Arc::new(AtomicBool::new(false));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let reader_pending = pending.clone();
        let reader_closing = closing.clone();
        let reader_task = tokio::spawn(read_sse_stream(
            response,
            base,
            reader_pending,
            endpoint_tx,
            reader_closing,
            on_exit,
        ));

        let endpoint = timeout(CHILD_REQUEST_TIMEOUT, endpoint_rx)
            .await
            .map_err(|_| HubError::timeout("no endpoint event from SSE server"))?
            .map_err(|_| HubError::TransportClosed("SSE stream closed before endpoint".into()))?;

        debug!(%endpoint, "SSE child connected");
        Ok(Self {
            http,
            endpoint,
            pending,
            reader_task,
            closing,
            request_timeout: CHILD_REQUEST_TIMEOUT,
        })
    }

    async fn post(&self, payload: &impl serde::Serialize) -> HubResult<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.request_timeout)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(HubError::Http(format!(
                "POST to {} failed: {}",
                self.endpoint,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChildTransport for SseChildTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> HubResult<JsonRpcResponse> {
        let id = request
            .id
            .as_u64()
            .ok_or_else(|| HubError::protocol("child request ids must be numeric"))?;

        let (sender, receiver) = oneshot::channel();
        self.pending.lock().await.insert(id, sender);

        if let Err(err) = self.post(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match timeout(self.request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::TransportClosed("response channel dropped".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(HubError::timeout(format!(
                    "SSE server did not answer request {id} in {}s",
                    self.request_timeout.as_secs()
                )))
            }
        }
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> HubResult<()> {
        self.post(&notification).await
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        fail_all_pending(&self.pending, HubError::TransportClosed("proxy disconnected".into()))
            .await;
    }
}

/// Parse the SSE byte stream: `event:`/`data:` lines grouped by blank lines
async fn read_sse_stream(
    response: reqwest::Response,
    base: Url,
    pending: Pending,
    endpoint_tx: oneshot::Sender<String>,
    closing: Arc<AtomicBool>,
    on_exit: ExitCallback,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut event_name = String::new();
    let mut data_lines: Vec<String> = Vec::new();

    'outer: while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "SSE stream error");
                break 'outer;
            }
        };
        buffer.extend_from_slice(&bytes);

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                handle_sse_event(
                    &event_name,
                    &data_lines.join("\n"),
                    &base,
                    &pending,
                    &mut endpoint_tx,
                )
                .await;
                event_name.clear();
                data_lines.clear();
            } else if let Some(name) = line.strip_prefix("event:") {
                event_name = name.trim().to_string();
            } else if let Some(data) = line.strip_prefix("data:") {
                data_lines.push(data.trim_start().to_string());
            }
            // Comment lines (leading ':') and unknown fields are ignored
        }
    }

    fail_all_pending(&pending, HubError::ChildExited("SSE stream closed".into())).await;
    if !closing.load(Ordering::SeqCst) {
        debug!("SSE child stream ended");
        on_exit();
    }
}

async fn handle_sse_event(
    event_name: &str,
    data: &str,
    base: &Url,
    pending: &Pending,
    endpoint_tx: &mut Option<oneshot::Sender<String>>,
) {
    if data.is_empty() {
        return;
    }
    match event_name {
        "endpoint" => {
            let absolute = match Url::parse(data) {
                Ok(url) => url.to_string(),
                Err(_) => match base.join(data) {
                    Ok(url) => url.to_string(),
                    Err(err) => {
                        warn!(%err, data, "bad endpoint event");
                        return;
                    }
                },
            };
            if let Some(sender) = endpoint_tx.take() {
                let _ = sender.send(absolute);
            }
        }
        // Plain `data:` frames without an event name are treated as messages
        "message" | "" => match serde_json::from_str::<JsonRpcMessage>(data) {
            Ok(message) => dispatch_child_message(pending, message).await,
            Err(err) => warn!(%err, "unparseable SSE message"),
        },
        other => trace!(event = other, "ignoring SSE event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_spawn_failure_surfaces_transport_error() {
        let tail = Arc::new(StdMutex::new(VecDeque::new()));
        let result = StdioChildTransport::spawn(
            "/nonexistent/mcp-server",
            &[],
            &HashMap::new(),
            tail,
            Arc::new(|| {}),
        )
        .await;
        match result {
            Err(HubError::Transport(message)) => assert!(message.contains("failed to spawn")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_completes_pending_response() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = oneshot::channel();
        pending.lock().await.insert(3, sender);

        dispatch_child_message(
            &pending,
            JsonRpcMessage::Response(JsonRpcResponse::success(json!(3), json!({"ok": true}))),
        )
        .await;

        let response = receiver.await.unwrap().unwrap();
        assert_eq!(response.result["ok"], true);
    }

    #[tokio::test]
    async fn test_dispatch_turns_error_frames_into_protocol_errors() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = oneshot::channel();
        pending.lock().await.insert(9, sender);

        dispatch_child_message(
            &pending,
            JsonRpcMessage::Error(crate::protocol::types::JsonRpcError::new(
                json!(9),
                -32601,
                "no such method",
            )),
        )
        .await;

        let err = receiver.await.unwrap().unwrap_err();
        assert!(matches!(err, HubError::Protocol(_)));
        assert!(err.to_string().contains("no such method"));
    }
}
