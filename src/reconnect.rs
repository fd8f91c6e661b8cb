//! Reconnection ledger
//!
//! When a player's transport drops, their identity becomes redeemable for
//! the same seat in the same room for a short window. Redemption is single
//! use and validates the room; an expired or mismatched redemption behaves
//! exactly like having no entry at all, so the caller degrades gracefully
//! to a fresh join rather than failing hard.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::{constants::reconnect::TOKEN_TTL_SECONDS, room_code::RoomCode, watcher::Id};

/// One redeemable entry: which room a player may return to, and until when
#[derive(Debug, Clone, Copy)]
struct Pending {
    room: RoomCode,
    expires_at: Instant,
}

/// Tracks which disconnected players may reclaim their seats
#[derive(Debug)]
pub struct Reconnections {
    /// How long an entry stays redeemable
    ttl: Duration,
    /// Redeemable entries by player identity
    pending: HashMap<Id, Pending>,
}

impl Default for Reconnections {
    /// Creates a ledger with the standard time-to-live
    fn default() -> Self {
        Self::new(Duration::from_secs(TOKEN_TTL_SECONDS))
    }
}

impl Reconnections {
    /// Creates a ledger whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
        }
    }

    /// Makes a player's identity redeemable for their seat
    ///
    /// Called when a player's connection closes. Re-issuing refreshes the
    /// expiry. Expired entries are swept opportunistically.
    pub fn issue(&mut self, player_id: Id, room: RoomCode) {
        let now = Instant::now();
        self.pending.retain(|_, entry| entry.expires_at > now);
        self.pending.insert(
            player_id,
            Pending {
                room,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Attempts to redeem a player's identity for a seat in a room
    ///
    /// A successful redemption consumes the entry. Returns `false` when the
    /// entry is missing, expired, or bound to a different room; the caller
    /// should then treat the connection as a brand-new player.
    pub fn redeem(&mut self, player_id: Id, room: RoomCode) -> bool {
        let Some(entry) = self.pending.get(&player_id).copied() else {
            return false;
        };

        if entry.expires_at <= Instant::now() {
            self.pending.remove(&player_id);
            return false;
        }
        if entry.room != room {
            return false;
        }

        self.pending.remove(&player_id);
        true
    }

    /// Returns the number of currently stored entries
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Checks whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
