//! Session registry
//!
//! Maps room codes to live rooms. The registry is the only writer to the
//! room map: rooms are created idempotently on first access and destroyed
//! on a grace timer after their last connection closes. The destroy timer
//! re-checks occupancy when it fires, so a client that reconnected during
//! the grace window keeps the room alive simply by being present.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::info;

use crate::{
    constants::room::DESTROY_GRACE_SECONDS,
    game::Game,
    gateway::WsTunnel,
    reconnect::Reconnections,
    room_code::RoomCode,
    watcher::Id,
};

/// One live room: the game state plus its transport bookkeeping
///
/// The game itself is mutated only under its mutex, which preserves the
/// run-to-completion discipline: every operation finishes before the next
/// inbound event for the room is processed.
pub struct RoomHandle {
    /// The room's code
    code: RoomCode,
    /// The authoritative game state
    game: Mutex<Game>,
    /// Live connections by participant identity
    connections: Mutex<HashMap<Id, WsTunnel>>,
    /// The armed turn-timer task, if any
    turn_timer: Mutex<Option<AbortHandle>>,
}

impl RoomHandle {
    /// Creates a handle around a fresh game
    fn new(code: RoomCode) -> Self {
        Self {
            code,
            game: Mutex::new(Game::new(code)),
            connections: Mutex::new(HashMap::new()),
            turn_timer: Mutex::new(None),
        }
    }

    /// Returns the room's code
    pub fn code(&self) -> RoomCode {
        self.code
    }

    /// Locks the game state
    ///
    /// A panic inside one room's handler must not take the room down with
    /// it, so a poisoned lock is recovered rather than propagated.
    pub fn lock_game(&self) -> MutexGuard<'_, Game> {
        self.game.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection's tunnel, returning any tunnel it replaces
    pub fn insert_tunnel(&self, watcher_id: Id, tunnel: WsTunnel) -> Option<WsTunnel> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(watcher_id, tunnel)
    }

    /// Removes a connection's tunnel
    pub fn remove_tunnel(&self, watcher_id: Id) -> Option<WsTunnel> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&watcher_id)
    }

    /// Returns the number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Builds the tunnel-finder closure the state machine sends through
    pub fn tunnel_finder(self: &Arc<Self>) -> impl Fn(Id) -> Option<WsTunnel> + use<> {
        let handle = Arc::clone(self);
        move |watcher_id| {
            handle
                .connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&watcher_id)
                .cloned()
        }
    }

    /// Arms the turn timer, aborting any previously armed one
    pub fn set_turn_timer(&self, handle: AbortHandle) {
        let mut slot = self
            .turn_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Aborts the armed turn timer, if any
    ///
    /// Aborting an already-finished task is a no-op, so cancellation is
    /// safe to repeat.
    pub fn clear_turn_timer(&self) {
        let mut slot = self
            .turn_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
    }
}

/// The process-wide set of live rooms
///
/// Modeled as an explicit object rather than an ambient singleton so tests
/// can run multiple registries side by side.
pub struct Registry {
    /// Live rooms by code
    rooms: DashMap<RoomCode, Arc<RoomHandle>>,
    /// The reconnection ledger shared by all rooms
    reconnections: Mutex<Reconnections>,
    /// How long an empty room survives before destruction
    destroy_grace: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry with the standard destruction grace period
    pub fn new() -> Self {
        Self::with_destroy_grace(Duration::from_secs(DESTROY_GRACE_SECONDS))
    }

    /// Creates a registry with a custom destruction grace period
    pub fn with_destroy_grace(destroy_grace: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            reconnections: Mutex::new(Reconnections::default()),
            destroy_grace,
        }
    }

    /// Returns a room handle for the code, creating the room if absent
    ///
    /// Idempotent and atomic: a racing create and lookup observe the same
    /// room, never two rooms for one code.
    pub fn create_or_get(&self, code: RoomCode) -> Arc<RoomHandle> {
        self.rooms
            .entry(code)
            .or_insert_with(|| Arc::new(RoomHandle::new(code)))
            .clone()
    }

    /// Looks up an existing room
    pub fn get(&self, code: RoomCode) -> Option<Arc<RoomHandle>> {
        self.rooms.get(&code).map(|entry| entry.clone())
    }

    /// Generates a room code no live room is using
    pub fn fresh_code(&self) -> RoomCode {
        loop {
            let code = RoomCode::new();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Returns the number of live rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Checks whether any rooms are live
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Destroys a room if it still has no connections
    ///
    /// This is the fire-time re-check of the destruction timer: a client
    /// that reconnected during the grace window cancels the destruction by
    /// simply being present.
    pub fn destroy_if_empty(&self, code: RoomCode) {
        let Some(handle) = self.get(code) else {
            return;
        };
        if handle.connection_count() == 0 {
            handle.clear_turn_timer();
            self.rooms.remove(&code);
            info!(room = %code, "destroyed empty room");
        }
    }

    /// Schedules a destruction check after the grace period
    ///
    /// Called whenever a room's last connection closes.
    pub fn schedule_destroy(self: &Arc<Self>, code: RoomCode) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(registry.destroy_grace).await;
            registry.destroy_if_empty(code);
        });
    }

    /// Makes a player's identity redeemable for their seat in a room
    pub fn issue_reconnect(&self, player_id: Id, room: RoomCode) {
        self.reconnections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issue(player_id, room);
    }

    /// Attempts to redeem a player's identity for a seat in a room
    pub fn redeem_reconnect(&self, player_id: Id, room: RoomCode) -> bool {
        self.reconnections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .redeem(player_id, room)
    }
}
