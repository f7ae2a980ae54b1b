//! WebSocket channel to the gateway.
//!
//! Frames are written by a dedicated writer task fed through an mpsc
//! channel, so the receive loop and the heartbeat can both send without
//! sharing the sink.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace};

use qgate_core::protocol::Envelope;
use qgate_core::{Scheduler, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// Capacity of the outbound frame channel.
pub(crate) const OUTBOUND_CAPACITY: usize = 64;

/// How long the writer may take to flush after the channel is dropped.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the WebSocket and splits it.
pub(crate) async fn connect(url: &str) -> TransportResult<(WsSink, WsSource)> {
    let (ws, _response) =
        connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
    Ok(ws.split())
}

/// Spawns the writer task. It sends every envelope it receives and closes
/// the socket once all senders are dropped.
pub(crate) fn spawn_writer(
    scheduler: &Scheduler,
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Envelope>,
) -> JoinHandle<()> {
    scheduler.spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            let text = match envelope.to_text() {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, op = envelope.op_code, "Failed to encode frame");
                    continue;
                }
            };
            trace!(op = envelope.op_code, "Sending frame");
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(error = %e, "Writer task: send failed");
                return;
            }
        }
        let _ = sink.close().await;
    })
}

/// Waits for the writer to flush, aborting it after a short grace period.
pub(crate) async fn finish_writer(mut writer: JoinHandle<()>) {
    tokio::select! {
        _ = &mut writer => {}
        () = tokio::time::sleep(WRITER_FLUSH_TIMEOUT) => {
            writer.abort();
        }
    }
}

/// Why the receive side of the channel stopped.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A text frame.
    Text(String),
    /// The peer closed the connection or the stream ended.
    Closed(TransportError),
}

/// Reads the next text frame, skipping control and binary frames.
pub(crate) async fn next_text(source: &mut WsSource) -> Inbound {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Inbound::Text(text.as_str().to_owned()),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "no close frame".to_string(),
                    |f| format!("{} {}", u16::from(f.code), f.reason.as_str()),
                );
                return Inbound::Closed(TransportError::ConnectionClosed { reason });
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {
                // Ping/pong is answered by tungstenite; binary is not used.
            }
            Some(Err(e)) => {
                return Inbound::Closed(TransportError::ConnectionClosed {
                    reason: e.to_string(),
                });
            }
            None => {
                return Inbound::Closed(TransportError::ConnectionClosed {
                    reason: "stream ended".into(),
                });
            }
        }
    }
}
