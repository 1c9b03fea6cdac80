use std::fmt::Display;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::ws::connection::Connection;
use crate::ws::hub::Hub;
use crate::ws::protocol::{self, Envelope};
use crate::ws::UserId;

/// Run one authenticated socket until either side closes it.
///
/// Builds the connection, registers it with the hub and serves it. Returns
/// once both pumps have stopped and the connection has been unregistered.
pub async fn run_connection(socket: WebSocket, hub: Hub, user_id: UserId, queue_capacity: usize) {
    let (ws_sender, ws_receiver) = socket.split();
    let (conn, rx) = Connection::new(user_id, queue_capacity);
    serve_connection(ws_sender, ws_receiver, hub, conn, rx).await;
}

/// Drive both pumps for an already-constructed connection.
///
/// The outbound pump runs as its own task; the inbound pump runs on the
/// caller's task. Whichever stops first unregisters the connection, which
/// closes it and makes the other one stop as well.
pub async fn serve_connection<Si, St, E>(
    sink: Si,
    stream: St,
    hub: Hub,
    conn: Connection,
    rx: mpsc::Receiver<Envelope>,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display,
{
    hub.register(&conn);
    tracing::info!(
        user_id = conn.user_id(),
        connection_id = %conn.id(),
        "WebSocket connection started"
    );

    let writer = tokio::spawn(outbound_pump(sink, rx, hub.clone(), conn.clone()));

    inbound_pump(stream, &hub, &conn).await;

    hub.unregister(&conn);
    if let Err(e) = writer.await {
        tracing::warn!(connection_id = %conn.id(), error = %e, "Outbound pump panicked");
    }

    tracing::info!(
        user_id = conn.user_id(),
        connection_id = %conn.id(),
        "WebSocket connection stopped"
    );
}

/// Read frames until the peer goes away or the connection is closed.
///
/// Malformed payloads are logged and dropped; they never end the session.
pub async fn inbound_pump<St, E>(mut stream: St, hub: &Hub, conn: &Connection)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            _ = conn.closed() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                handle_payload(text.as_str().as_bytes(), hub, conn).await
            }
            Some(Ok(Message::Binary(data))) => handle_payload(&data, hub, conn).await,
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(
                    user_id = conn.user_id(),
                    reason = ?frame,
                    "Client initiated close"
                );
                break;
            }
            // Ping/pong replies are produced by the transport.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = conn.user_id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = conn.user_id(), "WebSocket stream ended");
                break;
            }
        }
    }
}

async fn handle_payload(data: &[u8], hub: &Hub, conn: &Connection) {
    let envelope = match protocol::decode(data) {
        Ok(envelope) => envelope.with_sender(conn.user_id()),
        Err(e) => {
            tracing::warn!(
                user_id = conn.user_id(),
                error = %e,
                "Dropping malformed inbound payload"
            );
            return;
        }
    };

    let chat_id = envelope.chat_id();
    if let Err(e) = hub.broadcast(envelope).await {
        tracing::warn!(
            user_id = conn.user_id(),
            chat_id,
            error = %e,
            "Broadcast failed"
        );
    }
}

/// Drain the outbound queue onto the socket.
///
/// Envelopes already waiting when one is dequeued are coalesced into the
/// same text frame, separated by [`protocol::BATCH_SEPARATOR`]. When the
/// connection is closed a Close frame is sent and the pump stops; a write
/// error unregisters the connection.
pub async fn outbound_pump<Si>(
    mut sink: Si,
    mut rx: mpsc::Receiver<Envelope>,
    hub: Hub,
    conn: Connection,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    loop {
        let first = tokio::select! {
            biased;
            _ = conn.closed() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let pending = rx.len();
        let mut batch = Vec::with_capacity(pending + 1);
        batch.push(first);
        for _ in 0..pending {
            match rx.try_recv() {
                Ok(envelope) => batch.push(envelope),
                Err(_) => break,
            }
        }

        let frame = match protocol::encode_batch(&batch) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(connection_id = %conn.id(), error = %e, "Failed to encode batch");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            tracing::warn!(
                user_id = conn.user_id(),
                error = %e,
                "WebSocket send failed"
            );
            hub.unregister(&conn);
            return;
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: "".into(),
    }));
    let _ = sink.send(close).await;
    let _ = sink.close().await;
}
