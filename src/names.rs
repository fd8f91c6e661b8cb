//! Display name hygiene
//!
//! This module cleans up the display names players supply at the handshake.
//! Names are censored for inappropriate content, whitespace-collapsed, and
//! capped in length; an empty name falls back to a generated pet-style name.
//! Names are deliberately NOT deduplicated: two players may share a name and
//! remain distinct seats.

use heck::ToTitleCase;
use itertools::Itertools;
use rustrict::CensorStr;

use crate::constants::names::MAX_LENGTH;

/// Cleans a raw display name for use in the room
///
/// Censors inappropriate content, collapses internal whitespace, and
/// truncates to [`MAX_LENGTH`] characters. If nothing printable survives,
/// a generated fallback name is returned instead.
pub fn sanitize(raw: &str) -> String {
    let censored = raw.censor();
    let collapsed = censored.split_whitespace().join(" ");
    let truncated: String = collapsed.chars().take(MAX_LENGTH).collect();
    let cleaned = truncated.trim().to_owned();

    if cleaned.is_empty() {
        fallback_name()
    } else {
        cleaned
    }
}

/// Generates a pet-style fallback name for players who supply none
fn fallback_name() -> String {
    petname::petname(2, " ")
        .unwrap_or_else(|| "Mystery Guest".to_owned())
        .to_title_case()
}
