// ! Process-stdio MCP transport
// !
// ! One session bound to the process's standard streams: line-delimited
// ! JSON-RPC in on stdin, out on stdout. Diagnostics go to stderr via
// ! `tracing`; nothing else may write to stdout while this transport runs.
// ! Malformed frames are logged and skipped.

use crate::dispatch::{CLIENT_STDIO, ToolDispatcher};
use crate::plugin::PluginManager;
use crate::protocol::types::JsonRpcMessage;
use crate::server::session::McpSession;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Serve MCP over the process's stdin/stdout until the peer closes stdin
///
/// Inbound messages are handled strictly in order; outbound messages
/// (responses and list-changed notifications) are funneled through one
/// writer task so their order matches the order `send` was called.
pub async fn run_stdio_session(
    dispatcher: Arc<ToolDispatcher>,
    manager: Arc<PluginManager>,
) -> crate::core::error::HubResult<()> {
    let session = Arc::new(McpSession::new(CLIENT_STDIO, dispatcher, manager.clone()));
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

    let writer_task = tokio::spawn(async move {
        let mut writer = BufWriter::new(tokio::io::stdout());
        while let Some(message) = outbound_rx.recv().await {
            let line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "failed to serialize outbound message");
                    continue;
                }
            };
            trace!("stdio send: {line}");
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                debug!("stdout closed, stopping writer");
                break;
            }
        }
    });

    // Plugin-state changes fan out as list_changed notifications
    let mut events = manager.subscribe();
    let notify_tx = outbound_tx.clone();
    let events_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.changes_tool_visibility() {
                let notification =
                    JsonRpcMessage::Notification(McpSession::list_changed_notification());
                if notify_tx.send(notification).is_err() {
                    break;
                }
            }
        }
    });

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("stdin closed, stopping stdio session");
                break;
            }
            Ok(_) => {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                trace!("stdio recv: {frame}");

                match serde_json::from_str::<JsonRpcMessage>(frame) {
                    Ok(message) => {
                        if let Some(reply) = session.handle_message(message).await {
                            if outbound_tx.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        // A malformed stdio frame is dropped, not answered
                        warn!(%err, "ignoring malformed frame");
                    }
                }
            }
            Err(err) => {
                warn!(%err, "stdin read failed");
                break;
            }
        }
    }

    events_task.abort();
    drop(outbound_tx);
    let _ = writer_task.await;
    Ok(())
}
