use axum::extract::ws::Message;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    common::types::{ConnectionId, ParticipantId, RoomId},
    protocol::OutgoingMessage,
};

/// The slot a connection speaks for. Established by a successful `join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
}

/// One live WebSocket client.
pub struct Connection {
    pub id: ConnectionId,
    /// Sender for outgoing WS messages; drained by the socket task.
    sender: flume::Sender<Message>,
    binding: Mutex<Option<Binding>>,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: flume::Sender<Message>) -> Self {
        Self {
            id,
            sender,
            binding: Mutex::new(None),
        }
    }

    /// Queues a raw JSON frame. Never blocks; a closed socket only logs.
    pub fn send_json(&self, json: &str) {
        if self.sender.send(Message::Text(json.to_string().into())).is_err() {
            debug!("[{}] dropped frame for closed connection", self.id);
        }
    }

    /// Send a typed outgoing message.
    pub fn send_message(&self, msg: &OutgoingMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.send_json(&json),
            Err(e) => warn!("[{}] failed to serialize outgoing message: {}", self.id, e),
        }
    }

    /// Asks the socket task to send a close frame and stop.
    pub fn close(&self) {
        let _ = self.sender.send(Message::Close(None));
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding.lock().clone()
    }

    pub fn bind(&self, binding: Binding) {
        *self.binding.lock() = Some(binding);
    }

    pub fn unbind(&self) -> Option<Binding> {
        self.binding.lock().take()
    }

    /// Clears the binding only if it still points at `room_id`.
    pub fn unbind_from(&self, room_id: &RoomId) -> bool {
        let mut binding = self.binding.lock();
        if binding.as_ref().is_some_and(|b| &b.room_id == room_id) {
            *binding = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_queues_text_frame() {
        let (tx, rx) = flume::unbounded();
        let conn = Connection::new(ConnectionId::from("c1"), tx);
        conn.send_message(&OutgoingMessage::Kicked {
            reason: "bye".into(),
        });

        match rx.try_recv().unwrap() {
            Message::Text(text) => assert!(text.as_str().contains("\"type\":\"kicked\"")),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn send_to_dropped_receiver_is_harmless() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let conn = Connection::new(ConnectionId::from("c1"), tx);
        conn.send_json("{}");
        conn.close();
    }

    #[test]
    fn unbind_from_other_room_keeps_binding() {
        let (tx, _rx) = flume::unbounded();
        let conn = Connection::new(ConnectionId::from("c1"), tx);
        conn.bind(Binding {
            room_id: RoomId::from("A"),
            participant_id: ParticipantId::from("p"),
        });
        assert!(!conn.unbind_from(&RoomId::from("B")));
        assert!(conn.binding().is_some());
        assert!(conn.unbind_from(&RoomId::from("A")));
        assert!(conn.binding().is_none());
    }
}
