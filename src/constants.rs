//! Configuration constants for the Pointless session server
//!
//! This module contains all the limits, defaults, and gameplay constants
//! used throughout the server to ensure data integrity and provide
//! consistent boundaries for different components.

/// Room lifecycle constants
pub mod room {
    /// Number of characters in a room code
    pub const CODE_LENGTH: usize = 4;
    /// Maximum number of participants (host included) in a single room
    pub const MAX_PARTICIPANT_COUNT: usize = 16;
    /// Seconds to wait after the last connection closes before destroying a room
    pub const DESTROY_GRACE_SECONDS: u64 = 60;
}

/// Scoring constants
///
/// Lower cumulative scores are better; these values follow that inversion.
pub mod scoring {
    /// Score charged for a pass, a duplicate answer, or an unrecognized answer
    pub const PENALTY_SCORE: u32 = 100;
    /// Maximum point value a pack may assign to an answer
    pub const MAX_ANSWER_SCORE: u32 = 100;
    /// Jackpot value at the start of every game
    pub const JACKPOT_SEED: u32 = 1000;
    /// Amount added to the jackpot each time a pointless (zero) answer lands
    pub const JACKPOT_INCREMENT: u32 = 250;
}

/// Game settings bounds and defaults
pub mod settings {
    /// Default number of rounds in a game
    pub const DEFAULT_ROUNDS: u32 = 5;
    /// Maximum number of rounds a host may request
    pub const MAX_ROUNDS: u32 = 20;
    /// Default turn countdown in seconds
    pub const DEFAULT_TIMER_SECONDS: u64 = 30;
    /// Minimum turn countdown in seconds
    pub const MIN_TIMER_SECONDS: u64 = 5;
    /// Maximum turn countdown in seconds
    pub const MAX_TIMER_SECONDS: u64 = 240;
}

/// Turn timer constants
pub mod timer {
    /// Seconds added on top of the countdown before the auto-pass fires,
    /// tolerating network jitter on a last-moment submission
    pub const GRACE_SECONDS: u64 = 2;
}

/// Reconnection constants
pub mod reconnect {
    /// Seconds a disconnected player's seat stays redeemable
    pub const TOKEN_TTL_SECONDS: u64 = 300;
}

/// Display name constants
pub mod names {
    /// Maximum length of a display name in characters
    pub const MAX_LENGTH: usize = 30;
}

/// Pack ingestion constants
pub mod pack {
    /// Maximum number of categories in a single pack
    pub const MAX_CATEGORIES: usize = 100;
    /// Maximum length of a category prompt in characters
    pub const MAX_PROMPT_LENGTH: usize = 200;
    /// Maximum number of answers in a single category
    pub const MAX_ANSWER_COUNT: usize = 200;
    /// Maximum length of answer text in characters
    pub const MAX_ANSWER_LENGTH: usize = 200;
    /// Maximum number of aliases on a single answer
    pub const MAX_ALIAS_COUNT: usize = 16;
}
