use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest, http::HeaderValue, protocol::Message,
};
use tracing::{debug, error, info, warn};

use crate::{
    common::{
        clock::Clock,
        types::{AnyResult, RoomId},
    },
    protocol::{
        ControlPayload, IncomingMessage, JoinParticipant, OutgoingMessage, PlaybackAction,
        TrackRequest,
    },
};

use super::{
    backoff::Backoff,
    constants::{DRIFT_POLL_INTERVAL_MS, WRITE_TASK_SHUTDOWN_MS},
    drift::DriftConfig,
    player::MediaPlayer,
    reconciler::Reconciler,
    session::{Flow, ListenerSession},
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:3030/v1/websocket`.
    pub url: String,
    pub room_id: RoomId,
    pub name: String,
    pub room_name: Option<String>,
    pub password: Option<String>,
}

/// Things the local user asks for.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Chat(String),
    Control {
        action: PlaybackAction,
        payload: ControlPayload,
    },
    AddSong(TrackRequest),
    RequestSync,
    Leave,
}

enum SessionOutcome {
    /// Left the room for good.
    Shutdown,
    /// Transport dropped; `joined` is set when the server had admitted us.
    Reconnect { joined: bool },
}

pub struct RoomClient<P: MediaPlayer> {
    options: ClientOptions,
    session: ListenerSession<P>,
    commands: flume::Receiver<ClientCommand>,
    clock: Arc<dyn Clock>,
}

impl<P: MediaPlayer> RoomClient<P> {
    pub fn new(
        options: ClientOptions,
        player: P,
        commands: flume::Receiver<ClientCommand>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            options,
            session: ListenerSession::new(player, Reconciler::networked(), DriftConfig::default()),
            commands,
            clock,
        }
    }

    pub async fn run(mut self) -> AnyResult<()> {
        let mut backoff = Backoff::new();

        loop {
            let outcome = self.connect().await;
            // Timers and offsets from the previous connection must not leak into the next one.
            self.session.teardown();

            match outcome {
                Ok(SessionOutcome::Shutdown) => {
                    debug!("[{}] Client shutting down cleanly", self.options.room_id);
                    return Ok(());
                }
                Ok(SessionOutcome::Reconnect { joined }) => {
                    if joined {
                        backoff.reset();
                    }
                    if backoff.is_exhausted() {
                        warn!(
                            "[{}] Max reconnect attempts reached",
                            self.options.room_id
                        );
                        return Ok(());
                    }
                    let delay = backoff.next();
                    info!(
                        "[{}] Connection lost; reconnecting in {:?}",
                        self.options.room_id, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if backoff.is_exhausted() {
                        error!(
                            "[{}] Connection error after max attempts: {}",
                            self.options.room_id, e
                        );
                        return Err(e);
                    }
                    let delay = backoff.next();
                    warn!(
                        "[{}] Connection error: {}. Retrying in {:?}",
                        self.options.room_id, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn connect(&mut self) -> AnyResult<SessionOutcome> {
        let room_id = self.options.room_id.clone();
        debug!("[{}] Connecting to {}", room_id, self.options.url);

        let mut request = self.options.url.as_str().into_client_request()?;
        request.headers_mut().insert(
            "Client-Name",
            HeaderValue::from_static(concat!("listenroom-client/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(password) = &self.options.password {
            request
                .headers_mut()
                .insert("Authorization", HeaderValue::from_str(password)?);
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let join = serde_json::to_string(&self.join_message())?;
        write.send(Message::Text(join.into())).await?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        let write_room = room_id.clone();
        let write_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    warn!("[{}] WS write error: {}", write_room, e);
                    break;
                }
            }
        });

        let mut poll = tokio::time::interval(Duration::from_millis(DRIFT_POLL_INTERVAL_MS));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let commands = self.commands.clone();
        let mut joined = false;

        let outcome = loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("[{}] WS read error: {}", room_id, e);
                            break SessionOutcome::Reconnect { joined };
                        }
                        None => {
                            debug!("[{}] WS stream ended", room_id);
                            break SessionOutcome::Reconnect { joined };
                        }
                    };

                    match msg {
                        Message::Text(text) => {
                            let event = match serde_json::from_str::<OutgoingMessage>(text.as_str()) {
                                Ok(event) => event,
                                Err(e) => {
                                    warn!("[{}] Ignoring malformed server frame: {}", room_id, e);
                                    continue;
                                }
                            };
                            joined |= matches!(event, OutgoingMessage::RoomSnapshot { .. });
                            if let Flow::Leave { reason } = self.session.on_message(&event, self.clock.now_ms()) {
                                info!("[{}] Left room: {}", room_id, reason);
                                break SessionOutcome::Shutdown;
                            }
                        }
                        Message::Close(frame) => {
                            let reason = frame
                                .map(|cf| cf.reason.to_string())
                                .unwrap_or_else(|| "No reason".into());
                            info!("[{}] WS closed by server: '{}'", room_id, reason);
                            break SessionOutcome::Reconnect { joined };
                        }
                        _ => {}
                    }
                }
                _ = poll.tick() => {
                    self.session.poll(self.clock.now_ms());
                }
                command = commands.recv_async() => {
                    let Ok(command) = command else {
                        break SessionOutcome::Shutdown;
                    };
                    let leaving = matches!(command, ClientCommand::Leave);
                    let outgoing = self.outgoing(command);
                    match serde_json::to_string(&outgoing) {
                        Ok(json) => {
                            let _ = tx.send(Message::Text(json.into()));
                        }
                        Err(e) => warn!("[{}] Failed to encode command: {}", room_id, e),
                    }
                    if leaving {
                        break SessionOutcome::Shutdown;
                    }
                }
            }
        };

        if matches!(outcome, SessionOutcome::Shutdown) {
            let _ = tx.send(Message::Close(None));
        }
        drop(tx);
        let _ = tokio::time::timeout(Duration::from_millis(WRITE_TASK_SHUTDOWN_MS), write_task).await;

        Ok(outcome)
    }

    fn join_message(&self) -> IncomingMessage {
        IncomingMessage::Join {
            room_id: self.options.room_id.clone(),
            participant: JoinParticipant {
                id: self.session.participant_id(),
                name: self.options.name.clone(),
                is_admin: false,
            },
            room_name: self.options.room_name.clone(),
        }
    }

    fn outgoing(&mut self, command: ClientCommand) -> IncomingMessage {
        let room_id = self.options.room_id.clone();
        match command {
            ClientCommand::Chat(text) => IncomingMessage::SendMessage { room_id, text },
            ClientCommand::AddSong(track) => IncomingMessage::AddSong { room_id, track },
            ClientCommand::Control { action, payload } => {
                if let (PlaybackAction::Seek, Some(position)) = (action, payload.current_time) {
                    self.session.user_seek(position, self.clock.now_ms());
                }
                IncomingMessage::ControlPlayback {
                    room_id,
                    action,
                    payload,
                }
            }
            ClientCommand::RequestSync => IncomingMessage::RequestSync { room_id },
            ClientCommand::Leave => IncomingMessage::LeaveRoom { room_id },
        }
    }
}
