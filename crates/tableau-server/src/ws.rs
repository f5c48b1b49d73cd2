//! WebSocket endpoint. One task reads and dispatches inbound events, a
//! second drains the connection's outbound queue into the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tableau_shared::protocol::ClientEvent;
use tableau_shared::types::ConnectionId;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::error::RoomError;
use crate::rate_limit::TokenBucket;
use crate::room::Outbound;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// What to do with one inbound message.
#[derive(Debug)]
enum Inbound {
    Event(ClientEvent),
    Skip,
    Close,
}

fn classify(conn: ConnectionId, msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => match ClientEvent::from_json(&text) {
            Ok(event) => Inbound::Event(event),
            Err(e) => {
                let e = RoomError::from(e);
                debug!(conn = %conn.short(), error = %e, "Dropping malformed event");
                Inbound::Skip
            }
        },
        Message::Close(_) => Inbound::Close,
        Message::Binary(_) => {
            debug!(conn = %conn.short(), "Ignoring binary frame");
            Inbound::Skip
        }
        // axum answers pings itself.
        Message::Ping(_) | Message::Pong(_) => Inbound::Skip,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = ConnectionId::new();
    let (outbound, mut rx) = Outbound::channel(id, state.config.outbound_buffer);
    let (mut sink, mut stream) = socket.split();

    info!(conn = %id.short(), "Connection opened");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut bucket = TokenBucket::new(state.config.event_rate, state.config.event_burst);
    let mut writer_done = false;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(conn = %id.short(), error = %e, "WebSocket receive failed");
                        break;
                    }
                    None => break,
                };

                match classify(id, msg) {
                    Inbound::Event(event) => {
                        if !bucket.try_consume() {
                            warn!(conn = %id.short(), event = event.name(), "Event rate exceeded, dropping");
                            continue;
                        }
                        state.coordinator.dispatch(&outbound, event).await;
                    }
                    Inbound::Skip => {}
                    Inbound::Close => break,
                }
            }
            _ = &mut writer => {
                debug!(conn = %id.short(), "Writer stopped");
                writer_done = true;
                break;
            }
        }
    }

    // The outbound receiver must be dropped before leaving the room, so a
    // late approval sees the connection as gone.
    if !writer_done {
        writer.abort();
        let _ = writer.await;
    }

    state.coordinator.disconnect(id).await;
    info!(conn = %id.short(), "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_frames() {
        let conn = ConnectionId::new();

        let text = r#"{"event":"get-canvas-state","data":{"roomId":"AB12CD"}}"#;
        assert!(matches!(
            classify(conn, Message::Text(text.into())),
            Inbound::Event(ClientEvent::GetCanvasState(_))
        ));

        assert!(matches!(classify(conn, Message::Text("{oops".into())), Inbound::Skip));
        assert!(matches!(classify(conn, Message::Binary(vec![1, 2, 3])), Inbound::Skip));
        assert!(matches!(classify(conn, Message::Close(None)), Inbound::Close));
    }
}
