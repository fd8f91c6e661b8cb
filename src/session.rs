//! Communication session management
//!
//! This module defines the trait for tunneling messages between the room
//! state machine and connected clients (players and the host). The tunnel
//! abstraction keeps the game logic independent of the transport; the
//! production implementation is a WebSocket writer, while tests use an
//! in-memory recorder.

use crate::game::{SyncMessage, UpdateMessage};

/// Trait for sending messages through a communication tunnel
///
/// Implementations must swallow their own transport faults: a send to a
/// dead connection is dropped silently so that a broadcast to the rest of
/// the room is unaffected.
pub trait Tunnel {
    /// Sends an update message to the client
    ///
    /// Update messages are the dedicated lightweight events (turn start,
    /// score reveal, joins and leaves) that thin clients use as animation
    /// triggers without diffing full state.
    fn send_message(&self, message: &UpdateMessage);

    /// Sends a full-state synchronization message to the client
    ///
    /// Sync messages carry the complete (redacted) room snapshot and are
    /// sent on connect and after every state-changing operation.
    fn send_state(&self, state: &SyncMessage);

    /// Closes the communication tunnel
    ///
    /// Called when the participant is removed from the room, for example
    /// after a kick or a host takeover.
    fn close(self);
}
