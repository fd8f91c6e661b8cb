//! # Pointless Session Server
//!
//! This library implements the multiplayer session core for a party quiz
//! where the most obscure correct answer is the best one: answers score
//! 0-100 by popularity, wrong answers and passes cost a flat penalty, and
//! the LOWEST cumulative score wins. A per-room authoritative state machine
//! serializes turns, validates free-text answers against a closed answer
//! set, and keeps every connected client's view of the room consistent in
//! real time over WebSockets.
//!
//! The state machine itself performs no I/O: outbound messages travel
//! through the [`session::Tunnel`] abstraction and delayed events through
//! an injected scheduler, with the [`gateway`] supplying the production
//! implementations of both.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]

use serde::Serialize;

pub mod config;
pub mod constants;
pub mod game;
pub mod gateway;
pub mod matcher;
pub mod names;
pub mod pack;
pub mod reconnect;
pub mod registry;
pub mod room_code;
pub mod session;
pub mod watcher;

/// Any message the server sends down a connection
///
/// Wire encoding is untagged: each inner message already carries its own
/// `type` field, so clients see one flat message namespace.
#[derive(Debug, Serialize, Clone, derive_more::From)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A dedicated lightweight event
    Update(game::UpdateMessage),
    /// A full-state snapshot
    Sync(game::SyncMessage),
}

impl ServerMessage {
    /// Converts the message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}
