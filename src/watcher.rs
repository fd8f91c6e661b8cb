//! Participant registry for a single room
//!
//! This module tracks everyone attached to a room (the host and the
//! players), what role each connection holds, and provides helpers for
//! sending messages to individual participants or broadcasting to the whole
//! room through the [`Tunnel`](crate::session::Tunnel) abstraction.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    game::{SyncMessage, UpdateMessage},
    session::Tunnel,
};

/// A unique identifier for participants in a room
///
/// Each participant (host or player) gets an identifier that persists
/// across transport reconnects for as long as their seat exists.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random participant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random participant ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The role a participant holds in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The room's host, who controls game flow
    Host,
    /// A player occupying a seat in the turn order
    Player,
}

/// Errors that can occur when managing watchers
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The room has reached the maximum number of participants
    #[error("maximum number of participants reached")]
    MaximumParticipants,
}

/// Tracks all participants attached to a room
///
/// Keeps the primary id-to-role mapping plus a role-indexed reverse mapping
/// for efficient filtering, and provides the send/broadcast helpers the
/// state machine uses.
#[derive(Debug, Default)]
pub struct Watchers {
    /// Primary mapping from participant ID to role
    mapping: HashMap<Id, Role>,
    /// Reverse mapping organized by role for efficient filtering
    reverse_mapping: EnumMap<Role, HashSet<Id>>,
}

impl Watchers {
    /// Gets a vector of all participants with their tunnels and roles
    ///
    /// Participants without an active tunnel are skipped.
    ///
    /// # Arguments
    ///
    /// * `tunnel_finder` - Function to retrieve the tunnel for a given ID
    pub fn vec<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: F) -> Vec<(Id, T, Role)> {
        self.reverse_mapping
            .values()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| match (tunnel_finder(*id), self.mapping.get(id)) {
                (Some(tunnel), Some(role)) => Some((*id, tunnel, *role)),
                _ => None,
            })
            .collect_vec()
    }

    /// Gets a vector of participants of a specific role with their tunnels
    ///
    /// # Arguments
    ///
    /// * `filter` - The role of participants to include
    /// * `tunnel_finder` - Function to retrieve the tunnel for a given ID
    pub fn specific_vec<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        filter: Role,
        tunnel_finder: F,
    ) -> Vec<(Id, T)> {
        self.reverse_mapping[filter]
            .iter()
            .filter_map(|id| tunnel_finder(*id).map(|tunnel| (*id, tunnel)))
            .collect_vec()
    }

    /// Gets the count of participants holding a specific role
    pub fn specific_count(&self, filter: Role) -> usize {
        self.reverse_mapping[filter].len()
    }

    /// Adds a new participant to the room
    ///
    /// # Arguments
    ///
    /// * `watcher_id` - The unique ID for the new participant
    /// * `role` - The role the participant holds
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaximumParticipants`] if adding this participant
    /// would exceed the room's participant limit.
    pub fn add_watcher(&mut self, watcher_id: Id, role: Role) -> Result<(), Error> {
        if self.mapping.len() >= crate::constants::room::MAX_PARTICIPANT_COUNT {
            return Err(Error::MaximumParticipants);
        }

        self.mapping.insert(watcher_id, role);
        self.reverse_mapping[role].insert(watcher_id);

        Ok(())
    }

    /// Removes a participant from the room
    ///
    /// # Arguments
    ///
    /// * `watcher_id` - The ID of the participant to remove
    pub fn remove_watcher(&mut self, watcher_id: Id) {
        if let Some(role) = self.mapping.remove(&watcher_id) {
            self.reverse_mapping[role].remove(&watcher_id);
        }
    }

    /// Gets the role of a specific participant
    ///
    /// # Returns
    ///
    /// The participant's role if they are attached, otherwise `None`
    pub fn get_role(&self, watcher_id: Id) -> Option<Role> {
        self.mapping.get(&watcher_id).copied()
    }

    /// Checks if a participant is attached to the room
    pub fn has_watcher(&self, watcher_id: Id) -> bool {
        self.mapping.contains_key(&watcher_id)
    }

    /// Closes a participant's tunnel if one is active
    ///
    /// # Arguments
    ///
    /// * `watcher_id` - The ID of the participant whose session to close
    /// * `tunnel_finder` - Function to retrieve the tunnel for the participant
    pub fn remove_watcher_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        if let Some(tunnel) = tunnel_finder(watcher_id) {
            tunnel.close();
        }
    }

    /// Sends an update message to a specific participant
    ///
    /// # Arguments
    ///
    /// * `message` - The update message to send
    /// * `watcher_id` - The ID of the participant to send to
    /// * `tunnel_finder` - Function to retrieve the tunnel for the participant
    pub fn send_message<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(watcher_id) else {
            return;
        };

        session.send_message(message);
    }

    /// Sends a state synchronization message to a specific participant
    ///
    /// # Arguments
    ///
    /// * `state` - The sync message to send
    /// * `watcher_id` - The ID of the participant to send to
    /// * `tunnel_finder` - Function to retrieve the tunnel for the participant
    pub fn send_state<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        state: &SyncMessage,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(watcher_id) else {
            return;
        };

        session.send_state(state);
    }

    /// Sends personalized messages to all participants using a sender function
    ///
    /// The sender function is called for each participant and can return
    /// different messages based on the participant's ID and role, or `None`
    /// to skip sending.
    ///
    /// # Arguments
    ///
    /// * `sender` - Function that generates messages for each participant
    /// * `tunnel_finder` - Function to retrieve tunnels for participants
    pub fn announce_with<S, T: Tunnel, F: Fn(Id) -> Option<T>>(&self, sender: S, tunnel_finder: F)
    where
        S: Fn(Id, Role) -> Option<UpdateMessage>,
    {
        for (watcher_id, session, role) in self.vec(tunnel_finder) {
            let Some(message) = sender(watcher_id, role) else {
                continue;
            };

            session.send_message(&message);
        }
    }

    /// Broadcasts an update message to every participant in the room
    ///
    /// # Arguments
    ///
    /// * `message` - The update message to broadcast
    /// * `tunnel_finder` - Function to retrieve tunnels for participants
    pub fn announce<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        tunnel_finder: F,
    ) {
        self.announce_with(|_, _| Some(message.to_owned()), tunnel_finder);
    }

    /// Sends an update message to all participants holding a specific role
    ///
    /// # Arguments
    ///
    /// * `filter` - The role of participants to send to
    /// * `message` - The update message to send
    /// * `tunnel_finder` - Function to retrieve tunnels for participants
    pub fn announce_specific<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        filter: Role,
        message: &UpdateMessage,
        tunnel_finder: F,
    ) {
        for (_, session) in self.specific_vec(filter, tunnel_finder) {
            session.send_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::UpdateMessage;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        messages: Arc<Mutex<Vec<UpdateMessage>>>,
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &UpdateMessage) {
            self.messages.lock().unwrap().push(message.clone());
        }

        fn send_state(&self, _state: &SyncMessage) {}

        fn close(self) {}
    }

    #[test]
    fn test_add_and_get_role() {
        let mut watchers = Watchers::default();
        let host = Id::new();
        let player = Id::new();

        watchers.add_watcher(host, Role::Host).unwrap();
        watchers.add_watcher(player, Role::Player).unwrap();

        assert_eq!(watchers.get_role(host), Some(Role::Host));
        assert_eq!(watchers.get_role(player), Some(Role::Player));
        assert_eq!(watchers.get_role(Id::new()), None);
        assert_eq!(watchers.specific_count(Role::Player), 1);
        assert_eq!(watchers.specific_count(Role::Host), 1);
    }

    #[test]
    fn test_remove_watcher() {
        let mut watchers = Watchers::default();
        let player = Id::new();
        watchers.add_watcher(player, Role::Player).unwrap();

        watchers.remove_watcher(player);

        assert!(!watchers.has_watcher(player));
        assert_eq!(watchers.specific_count(Role::Player), 0);
    }

    #[test]
    fn test_maximum_participants() {
        let mut watchers = Watchers::default();
        for _ in 0..crate::constants::room::MAX_PARTICIPANT_COUNT {
            watchers.add_watcher(Id::new(), Role::Player).unwrap();
        }

        assert_eq!(
            watchers.add_watcher(Id::new(), Role::Player),
            Err(Error::MaximumParticipants)
        );
    }

    #[test]
    fn test_announce_reaches_all_connected() {
        let mut watchers = Watchers::default();
        let host = Id::new();
        let connected = Id::new();
        let disconnected = Id::new();
        watchers.add_watcher(host, Role::Host).unwrap();
        watchers.add_watcher(connected, Role::Player).unwrap();
        watchers.add_watcher(disconnected, Role::Player).unwrap();

        let host_tunnel = MockTunnel::default();
        let player_tunnel = MockTunnel::default();
        let finder = |id: Id| {
            if id == host {
                Some(host_tunnel.clone())
            } else if id == connected {
                Some(player_tunnel.clone())
            } else {
                None
            }
        };

        watchers.announce(
            &UpdateMessage::PlayerLeft {
                player_id: disconnected,
            },
            finder,
        );

        assert_eq!(host_tunnel.messages.lock().unwrap().len(), 1);
        assert_eq!(player_tunnel.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_announce_specific_filters_by_role() {
        let mut watchers = Watchers::default();
        let host = Id::new();
        let player = Id::new();
        watchers.add_watcher(host, Role::Host).unwrap();
        watchers.add_watcher(player, Role::Player).unwrap();

        let host_tunnel = MockTunnel::default();
        let player_tunnel = MockTunnel::default();
        let finder = |id: Id| {
            if id == host {
                Some(host_tunnel.clone())
            } else {
                Some(player_tunnel.clone())
            }
        };

        watchers.announce_specific(
            Role::Host,
            &UpdateMessage::PlayerLeft { player_id: player },
            finder,
        );

        assert_eq!(host_tunnel.messages.lock().unwrap().len(), 1);
        assert!(player_tunnel.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_id_display_parse_roundtrip() {
        let id = Id::new();
        let parsed = Id::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }
}
