use std::{sync::Weak, time::Duration};

use tracing::debug;

use crate::{
    common::clock::Clock,
    room::{registry::RoomHandle, state::Effects},
};

pub struct SyncCtx<C: Clock + ?Sized, F> {
    pub handle: Weak<RoomHandle>,
    pub period: Duration,
    pub clock: std::sync::Arc<C>,
    /// Called with the room lock held so samples stay ordered with other broadcasts.
    pub deliver: F,
}

/// Per-room heartbeat. Publishes a `syncUpdate` every period while the room
/// plays, and wakes early when the current track is due to end so the next one
/// starts on time. Exits once the room is closed or dropped.
pub async fn sync_loop<C, F>(ctx: SyncCtx<C, F>)
where
    C: Clock + ?Sized,
    F: Fn(&Effects) + Send,
{
    let SyncCtx {
        handle,
        period,
        clock,
        deliver,
    } = ctx;

    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let track_end = {
            let Some(room) = handle.upgrade() else {
                break;
            };
            let remaining = room.lock().remaining_ms(clock.now_ms());
            remaining
        };

        let sample = match track_end {
            Some(ms) => tokio::select! {
                _ = interval.tick() => true,
                _ = tokio::time::sleep(Duration::from_millis(ms)) => false,
            },
            None => {
                interval.tick().await;
                true
            }
        };

        let Some(handle) = handle.upgrade() else {
            break;
        };
        let mut room = handle.lock();
        if room.is_closed() {
            debug!("Sync loop for room {} stopped", handle.id());
            break;
        }

        let now = clock.now_ms();
        let effects = if sample {
            room.tick(now)
        } else {
            room.finish_track(now)
        };
        if !effects.is_empty() {
            deliver(&effects);
        }
    }
}
