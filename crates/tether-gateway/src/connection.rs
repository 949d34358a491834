use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use tether_types::api::ErrorBody;
use tether_types::events::{ClientCommand, ServerEvent};

use crate::presence::PushHandle;
use crate::router::{MessageRouter, OutgoingMessage};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one push-transport client until it disconnects.
///
/// The credential was validated at the HTTP upgrade, so `principal` is the
/// authenticated user. Presence is only registered once the client sends
/// `user-online`; the disconnect path always prunes it.
pub async fn handle_connection(socket: WebSocket, router: MessageRouter, principal: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut events) = PushHandle::channel();

    info!("{} connected to gateway ({})", principal, handle.conn_id());

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode push event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_router = router.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_router, principal, &recv_handle, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            principal,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    router.presence().mark_offline(&handle).await;
    info!("{} disconnected from gateway ({})", principal, handle.conn_id());
}

async fn handle_command(
    router: &MessageRouter,
    principal: Uuid,
    handle: &PushHandle,
    cmd: ClientCommand,
) {
    match cmd {
        ClientCommand::UserOnline { user_id } => {
            if user_id != principal {
                warn!("{} tried to announce presence for {}", principal, user_id);
                handle.push(ServerEvent::UserOnline { success: false });
                return;
            }
            router.presence().mark_online(user_id, handle.clone()).await;
            handle.push(ServerEvent::UserOnline { success: true });
        }

        ClientCommand::SendMessage {
            sender_id,
            receiver_id,
            content,
            post_id,
            event_id,
        } => {
            let outgoing = OutgoingMessage {
                sender_id,
                receiver_id,
                content,
                post_id,
                event_id,
            };
            let reply = match router.send(principal, outgoing).await {
                Ok(message) => ServerEvent::MessageSent { message },
                Err(e) => {
                    info!("{} send-message to {} failed: {}", principal, receiver_id, e);
                    ServerEvent::MessageError {
                        error: ErrorBody::from(&e),
                    }
                }
            };
            handle.push(reply);
        }
    }
}
