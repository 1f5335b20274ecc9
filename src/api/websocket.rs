use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ClientFrame, ServerFrame};
use crate::services::relay::FrameSender;
use crate::state::ServiceContext;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<ServiceContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(mut socket: WebSocket, ctx: ServiceContext) {
    let conn_id = Uuid::new_v4();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut user_id: Option<String> = None;

    debug!("Relay connection {} opened", conn_id);

    loop {
        tokio::select! {
            // Frames routed to this connection, written in queue order
            Some(frame) = frame_rx.recv() => {
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to serialize relay frame: {}", e);
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&ctx, conn_id, &frame_tx, &mut user_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Relay connection {} errored: {}", conn_id, e);
                        break;
                    }
                }
            }
        }
    }

    if let Some(uid) = user_id {
        ctx.relay.deregister(&uid, conn_id).await;
    }
    debug!("Relay connection {} closed", conn_id);
}

async fn handle_text(
    ctx: &ServiceContext,
    conn_id: Uuid,
    frame_tx: &FrameSender,
    user_id: &mut Option<String>,
    text: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Malformed frame on connection {}: {}", conn_id, e);
            send_error(frame_tx, format!("malformed frame: {}", e));
            return;
        }
    };

    match frame {
        ClientFrame::Register { profile } => {
            if profile.user_id.trim().is_empty() {
                send_error(frame_tx, "user id must not be empty".to_string());
                return;
            }
            if let Some(existing) = user_id.as_deref() {
                if existing != profile.user_id {
                    send_error(frame_tx, format!("connection already registered as {}", existing));
                    return;
                }
            }
            *user_id = Some(profile.user_id.clone());
            ctx.relay.register(conn_id, profile, frame_tx.clone()).await;
        }
        ClientFrame::Relay { to, envelope } => {
            let Some(from) = user_id.as_deref() else {
                send_error(frame_tx, "register before relaying".to_string());
                return;
            };
            ctx.relay.relay(from, &to, envelope).await;
        }
        ClientFrame::Ping => {
            let _ = frame_tx.send(ServerFrame::Pong);
        }
    }
}

fn send_error(frame_tx: &FrameSender, message: String) {
    let _ = frame_tx.send(ServerFrame::Error { message });
}
