//! Room code generation and management
//!
//! This module provides functionality for generating and managing the short
//! codes that identify rooms. Codes are drawn from an alphabet that excludes
//! characters easily confused when spoken or displayed (no 0/O, no 1/I), so
//! they can be read off a screen and typed on another device without
//! ambiguity.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::room::CODE_LENGTH;

/// Characters allowed in a room code
///
/// 32 characters: digits and uppercase letters minus the visually and
/// verbally ambiguous 0, O, 1, and I.
pub const ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Total number of distinct room codes
const CODE_SPACE: u32 = (ALPHABET.len() as u32).pow(CODE_LENGTH as u32);

/// A unique identifier for a room
///
/// Room codes are generated randomly and displayed as four characters from
/// [`ALPHABET`]. The compact numeric representation keeps the type `Copy`
/// and cheap to use as a map key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct RoomCode(u32);

impl RoomCode {
    /// Creates a new random room code
    pub fn new() -> Self {
        Self(fastrand::u32(0..CODE_SPACE))
    }
}

impl Default for RoomCode {
    /// Creates a new random room code (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoomCode {
    /// Formats the room code as four characters from [`ALPHABET`]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut digits = [0u8; CODE_LENGTH];
        let mut value = self.0;
        for digit in digits.iter_mut().rev() {
            *digit = ALPHABET[(value % ALPHABET.len() as u32) as usize];
            value /= ALPHABET.len() as u32;
        }
        for digit in digits {
            write!(f, "{}", digit as char)?;
        }
        Ok(())
    }
}

/// Errors that can occur when parsing a room code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The input was not exactly [`CODE_LENGTH`] characters long
    #[error("room codes are {CODE_LENGTH} characters long")]
    InvalidLength,
    /// The input contained a character outside the code alphabet
    #[error("character `{0}` is not allowed in room codes")]
    InvalidCharacter(char),
}

impl FromStr for RoomCode {
    type Err = ParseError;

    /// Parses a room code from its four-character representation
    ///
    /// Parsing is case-insensitive, but characters excluded from the
    /// alphabet (0, O, 1, I) are rejected rather than corrected.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the input has the wrong length or
    /// contains a character outside the alphabet.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().count() != CODE_LENGTH {
            return Err(ParseError::InvalidLength);
        }

        let mut value: u32 = 0;
        for c in s.chars() {
            let position = ALPHABET
                .iter()
                .position(|&a| a == c.to_ascii_uppercase() as u8)
                .ok_or(ParseError::InvalidCharacter(c))?;
            value = value * ALPHABET.len() as u32 + position as u32;
        }
        Ok(Self(value))
    }
}
