//! Per-connection actor
//!
//! One task per socket. It owns both halves and selects between frames
//! queued by the hub and frames arriving from the client. Everything the
//! client sends refreshes its heartbeat.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};

use super::SubscribeError;
use super::channel::Channel;
use super::hub::{ConnectionId, Hub, Outbound};
use super::protocol::{ClientMessage, ServerMessage, parse_client_message};

/// Close code for an unauthorized initial channel.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
/// Close code for a malformed initial channel name.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

fn close(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

pub async fn run_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    initial: String,
    token: Option<String>,
) {
    let (mut sink, mut stream) = socket.split();

    let channel: Channel = match initial.parse() {
        Ok(channel) => channel,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected WebSocket with invalid channel");
            let _ = sink.send(close(CLOSE_POLICY_VIOLATION, "Invalid channel")).await;
            return;
        }
    };

    let mut handle = hub.connect(token.as_deref());
    let id = handle.id;

    if let Err(e) = hub.subscribe(id, &channel) {
        tracing::info!(channel = %channel, error = %e, "WebSocket subscription refused");
        hub.disconnect(id);
        let _ = sink.send(close(CLOSE_UNAUTHORIZED, "Unauthorized")).await;
        return;
    }

    tracing::info!(connection = %id, channel = %channel, "WebSocket connected");

    let welcome = ServerMessage::connected(&channel.to_string(), handle.principal.is_some());
    if sink.send(Message::Text(welcome.to_json().into())).await.is_err() {
        hub.disconnect(id);
        return;
    }

    loop {
        tokio::select! {
            outbound = handle.receiver.recv() => {
                let frame = match outbound {
                    Some(Outbound::Message(text)) => Message::Text(text.as_ref().into()),
                    Some(Outbound::Ping) => Message::Ping(Bytes::new()),
                    Some(Outbound::Close { code, reason }) => {
                        let _ = sink.send(close(code, &reason)).await;
                        break;
                    }
                    // Removed from the hub.
                    None => break,
                };
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        hub.touch(id);
                        let reply = handle_client_message(&hub, id, &channel, text.as_str());
                        if sink.send(Message::Text(reply.to_json().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => hub.touch(id),
                    Some(Err(e)) => {
                        tracing::debug!(connection = %id, error = %e, "WebSocket receive failed");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(id);
    tracing::info!(connection = %id, channel = %channel, "WebSocket disconnected");
}

/// Apply one client frame and build the reply.
pub fn handle_client_message(
    hub: &Hub,
    id: ConnectionId,
    initial: &Channel,
    text: &str,
) -> ServerMessage {
    let message = match parse_client_message(text) {
        Ok(message) => message,
        Err(reply) => return reply,
    };

    match message {
        ClientMessage::Ping { timestamp } => ServerMessage::pong(timestamp),
        ClientMessage::Subscribe { channel: None }
        | ClientMessage::Unsubscribe { channel: None } => ServerMessage::error("Missing channel"),
        ClientMessage::Subscribe { channel: Some(name) } => {
            let result = name
                .parse::<Channel>()
                .map_err(SubscribeError::from)
                .and_then(|channel| hub.subscribe(id, &channel));
            match result {
                Ok(_) => ServerMessage::subscribed(&name),
                Err(SubscribeError::UnknownConnection) => ServerMessage::error("Connection closed"),
                Err(e) => ServerMessage::subscribe_failed(&name, e.to_string()),
            }
        }
        ClientMessage::Unsubscribe { channel: Some(name) } => {
            if name == initial.to_string() {
                return ServerMessage::error(
                    "Cannot unsubscribe from the connection's initial channel",
                );
            }
            match name.parse::<Channel>() {
                Ok(channel) => {
                    hub.unsubscribe(id, &channel);
                    ServerMessage::unsubscribed(&name)
                }
                Err(e) => ServerMessage::error(e.to_string()),
            }
        }
    }
}
