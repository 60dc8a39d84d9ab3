use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{
    common::{errors::RoomError, types::ConnectionId},
    server::{AppState, Connection, gateway},
    transport::middleware::authorized,
};

pub async fn websocket_handler(
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, &'static str)> {
    authorized(&state, &headers).map_err(|status| (status, "Unauthorized"))?;

    let client_name = headers.get("client-name").and_then(|h| h.to_str().ok());
    if let Some(name) = client_name {
        info!("Incoming connection from client: {}", name);
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

pub async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (tx, rx) = flume::unbounded();
    let conn = Arc::new(Connection::new(ConnectionId::generate(), tx));
    state.connections.insert(conn.id.clone(), conn.clone());
    info!("WebSocket connected: connection={}", conn.id);

    let mut failure = None;
    loop {
        tokio::select! {
            Ok(msg) = rx.recv_async() => {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = socket.send(msg).await {
                    failure = Some(RoomError::TransportFailure(format!("send: {}", e)));
                    break;
                }
                if closing {
                    break;
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        failure = Some(RoomError::TransportFailure(e.to_string()));
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => gateway::handle_text(&state, &conn, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    match failure {
        Some(err) => gateway::drop_connection(&state, &conn, &err),
        None => gateway::disconnect(&state, &conn),
    }
    info!("Connection closed: {}", conn.id);
}
