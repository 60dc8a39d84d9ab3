use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::{
    common::types::RoomId,
    protocol::RoomSummary,
    room::state::{Room, RoomDefaults},
};

/// A live room. The lock is never held across an `.await`.
pub struct RoomHandle {
    id: RoomId,
    room: Mutex<Room>,
}

impl RoomHandle {
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, Room> {
        self.room.lock()
    }
}

/// Process-wide room table keyed by room code.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<RoomHandle>>,
    defaults: RoomDefaults,
}

impl RoomRegistry {
    pub fn new(defaults: RoomDefaults) -> Self {
        Self {
            rooms: DashMap::new(),
            defaults,
        }
    }

    pub fn get(&self, id: &RoomId) -> Option<Arc<RoomHandle>> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Returns the room for `id`, creating it when absent. Concurrent callers
    /// racing on the same code observe exactly one instance.
    ///
    /// The returned flag is true when this call created the room.
    pub fn get_or_create(
        &self,
        id: &RoomId,
        name: Option<String>,
        creator: &str,
        now: u64,
    ) -> (Arc<RoomHandle>, bool) {
        if let Some(existing) = self.get(id) {
            return (existing, false);
        }

        let mut created = false;
        let handle = self
            .rooms
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(RoomHandle {
                    id: id.clone(),
                    room: Mutex::new(Room::new(id.clone(), name, creator, &self.defaults, now)),
                })
            })
            .value()
            .clone();

        if created {
            info!("Room {} created by {}", id, creator);
        }
        (handle, created)
    }

    /// Removes `handle` if it is still the registered instance for its code.
    ///
    /// A newer room created under the same code after this one emptied is left alone.
    pub fn remove(&self, handle: &Arc<RoomHandle>) -> bool {
        let removed = self
            .rooms
            .remove_if(handle.id(), |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        if removed {
            debug!("Room {} removed from registry", handle.id());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Snapshot of all handles; the registry shards are released before any room is locked.
    pub fn handles(&self) -> Vec<Arc<RoomHandle>> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }

    pub fn summaries(&self, public_only: bool) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self
            .handles()
            .into_iter()
            .filter_map(|handle| {
                let room = handle.lock();
                if room.is_closed() || (public_only && !room.settings().is_public) {
                    return None;
                }
                Some(room.summary())
            })
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    pub fn participant_count(&self) -> usize {
        self.handles()
            .iter()
            .map(|h| h.lock().participant_count())
            .sum()
    }

    pub fn playing_count(&self) -> usize {
        self.handles()
            .iter()
            .filter(|h| h.lock().is_playing())
            .count()
    }
}
