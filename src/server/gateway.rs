//! Routes inbound protocol messages to room operations and fans out the results.
//!
//! Effects are written to peer channels while the room lock is still held, so
//! every connection observes a room's broadcasts in mutation order. Writes
//! are non-blocking flume sends; no I/O happens under the lock.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    common::{errors::RoomError, types::RoomId},
    protocol::{IncomingMessage, JoinParticipant, OutgoingMessage, SettingsPatch, UserActionKind},
    room::{Effects, Room, RoomHandle, SyncCtx, sync_loop},
    server::{
        AppState,
        connection::{Binding, Connection},
    },
};

/// Handles one text frame from `conn`. Rejections go back to `conn` only.
pub fn handle_text(state: &Arc<AppState>, conn: &Arc<Connection>, text: &str) {
    let msg = match serde_json::from_str::<IncomingMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("[{}] malformed message: {}", conn.id, e);
            conn.send_message(&OutgoingMessage::RoomError {
                reason: format!("Malformed message: {}", e),
                fatal: false,
            });
            return;
        }
    };

    let kind = msg.kind();
    let room_id = msg.room_id().clone();
    debug!("[{}] <- {} ({})", conn.id, kind, room_id);
    if let Err(err) = dispatch(state, conn, msg) {
        report(conn, kind, &room_id, &err);
    }
}

fn report(conn: &Connection, kind: &str, room_id: &RoomId, err: &RoomError) {
    warn!("[{}] {} rejected: {}", conn.id, kind, err);
    let msg = match err {
        RoomError::PermissionDenied(reason) => OutgoingMessage::PermissionDenied {
            reason: reason.clone(),
        },
        other => OutgoingMessage::RoomError {
            reason: other.to_string(),
            fatal: other.is_fatal(),
        },
    };
    conn.send_message(&msg);

    if err.is_fatal() {
        conn.unbind_from(room_id);
    }
}

fn dispatch(
    state: &Arc<AppState>,
    conn: &Arc<Connection>,
    msg: IncomingMessage,
) -> Result<(), RoomError> {
    match msg {
        IncomingMessage::Join {
            room_id,
            participant,
            room_name,
        } => join(state, conn, room_id, participant, room_name),
        IncomingMessage::LeaveRoom { room_id } => {
            bound_room(state, conn, &room_id)?;
            leave(state, conn, &room_id);
            Ok(())
        }
        IncomingMessage::RequestSync { room_id } => {
            with_room(state, conn, &room_id, |room, now| room.request_sync(&conn.id, now))
        }
        IncomingMessage::SendMessage { room_id, text } => {
            with_room(state, conn, &room_id, |room, now| {
                room.send_message(&conn.id, &text, now)
            })
        }
        IncomingMessage::AddSong { room_id, track } => {
            with_room(state, conn, &room_id, |room, now| {
                room.add_song(&conn.id, track, now)
            })
        }
        IncomingMessage::ControlPlayback {
            room_id,
            action,
            payload,
        } => with_room(state, conn, &room_id, |room, now| {
            room.control_playback(&conn.id, action, &payload, now)
        }),
        IncomingMessage::UserAction {
            room_id,
            action,
            target_id,
            payload,
        } => {
            let target = || target_id.clone().ok_or_else(|| RoomError::invalid("targetId is required"));
            match action {
                UserActionKind::Kick => {
                    let target = target()?;
                    let reason = payload
                        .as_ref()
                        .and_then(|p| p.get("reason"))
                        .and_then(|r| r.as_str())
                        .map(str::to_string);
                    with_room(state, conn, &room_id, |room, now| {
                        room.kick(&conn.id, &target, reason, now)
                    })
                }
                UserActionKind::TransferAdmin => {
                    let target = target()?;
                    with_room(state, conn, &room_id, |room, now| {
                        room.transfer_admin(&conn.id, &target, now)
                    })
                }
                UserActionKind::UpdateSettings => {
                    let patch: SettingsPatch = match payload {
                        Some(value) => serde_json::from_value(value)
                            .map_err(|e| RoomError::invalid(format!("invalid settings: {}", e)))?,
                        None => return Err(RoomError::invalid("settings payload is required")),
                    };
                    with_room(state, conn, &room_id, |room, _| {
                        room.update_settings(&conn.id, patch)
                    })
                }
            }
        }
        IncomingMessage::CloseRoom { room_id } => {
            with_room(state, conn, &room_id, |room, _| room.close(&conn.id))
        }
    }
}

/// Resolves the room `conn` is joined to, refusing messages for any other room.
fn bound_room(
    state: &AppState,
    conn: &Connection,
    room_id: &RoomId,
) -> Result<Arc<RoomHandle>, RoomError> {
    match conn.binding() {
        Some(Binding { room_id: bound, .. }) if &bound == room_id => state
            .registry
            .get(room_id)
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string())),
        _ => Err(RoomError::UnknownRoom(room_id.to_string())),
    }
}

/// Runs `op` under the room lock and applies its effects before releasing it.
fn with_room<F>(
    state: &Arc<AppState>,
    conn: &Connection,
    room_id: &RoomId,
    op: F,
) -> Result<(), RoomError>
where
    F: FnOnce(&mut Room, u64) -> Result<Effects, RoomError>,
{
    let handle = bound_room(state, conn, room_id)?;
    let mut room = handle.lock();
    if room.is_closed() {
        return Err(RoomError::RoomClosed);
    }

    let effects = op(&mut *room, state.now_ms())?;
    apply_effects(state, &effects);
    drop(room);

    if effects.emptied {
        destroy(state, &handle);
    }
    Ok(())
}

fn join(
    state: &Arc<AppState>,
    conn: &Arc<Connection>,
    room_id: RoomId,
    participant: JoinParticipant,
    room_name: Option<String>,
) -> Result<(), RoomError> {
    state.validate_room_id(&room_id)?;
    let name = state.validate_name(&participant.name)?;

    let mut requested = participant.id;
    let mut previous = None;
    if let Some(binding) = conn.binding() {
        if binding.room_id == room_id {
            requested = Some(binding.participant_id);
        } else {
            previous = Some(binding.room_id);
        }
    }

    loop {
        let (handle, created) =
            state
                .registry
                .get_or_create(&room_id, room_name.clone(), &name, state.now_ms());
        if created {
            spawn_sync(state, &handle);
        }

        let mut room = handle.lock();
        if room.is_closed() {
            // Emptied between lookup and lock; retry against a fresh room.
            drop(room);
            state.registry.remove(&handle);
            continue;
        }

        let (me, effects) =
            match room.join(conn.id.clone(), requested.clone(), &name, state.now_ms()) {
                Ok(joined) => joined,
                Err(e) => {
                    let abandoned = room.participant_count() == 0;
                    drop(room);
                    if abandoned {
                        destroy(state, &handle);
                    }
                    return Err(e);
                }
            };
        apply_effects(state, &effects);
        drop(room);

        // The old room is left only once the new one has admitted us.
        if let Some(previous) = &previous {
            leave(state, conn, previous);
        }
        conn.bind(Binding {
            room_id: room_id.clone(),
            participant_id: me.id,
        });
        return Ok(());
    }
}

/// Removes the slot `conn` holds in `room_id`. Explicit leave and disconnect share this path.
pub fn leave(state: &AppState, conn: &Connection, room_id: &RoomId) {
    conn.unbind_from(room_id);
    let Some(handle) = state.registry.get(room_id) else {
        return;
    };

    let mut room = handle.lock();
    let effects = room.leave(&conn.id, state.now_ms());
    apply_effects(state, &effects);
    drop(room);

    if effects.emptied {
        destroy(state, &handle);
    }
}

/// Cleanup for a dropped socket.
pub fn disconnect(state: &AppState, conn: &Connection) {
    state.connections.remove(&conn.id);
    if let Some(binding) = conn.binding() {
        info!(
            "[{}] disconnected from room {}",
            conn.id, binding.room_id
        );
        leave(state, conn, &binding.room_id);
    }
}

/// Cleanup for a socket that failed mid-session.
pub fn drop_connection(state: &AppState, conn: &Connection, err: &RoomError) {
    warn!("[{}] {}", conn.id, err);
    disconnect(state, conn);
}

fn destroy(state: &AppState, handle: &Arc<RoomHandle>) {
    if state.registry.remove(handle) {
        info!("Room {} destroyed", handle.id());
    }
}

/// Fans effects out to live connections. A missing or closed peer never
/// affects delivery to the others.
pub fn apply_effects(state: &AppState, effects: &Effects) {
    for delivery in &effects.deliveries {
        let json = match serde_json::to_string(&delivery.message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize broadcast: {}", e);
                continue;
            }
        };
        for recipient in &delivery.recipients {
            if let Some(peer) = state.connections.get(recipient) {
                peer.send_json(&json);
            }
        }
    }

    for evicted in &effects.evicted {
        if let Some(peer) = state.connections.get(evicted) {
            peer.unbind();
            peer.close();
        }
    }
}

fn spawn_sync(state: &Arc<AppState>, handle: &Arc<RoomHandle>) {
    let sink = state.clone();
    tokio::spawn(sync_loop(SyncCtx {
        handle: Arc::downgrade(handle),
        period: Duration::from_millis(state.config.rooms.sync_interval_ms),
        clock: state.clock.clone(),
        deliver: move |effects: &Effects| apply_effects(&sink, effects),
    }));
}
