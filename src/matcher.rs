//! Answer normalization and resolution
//!
//! This module turns free-text player input into a canonical key and looks
//! that key up in a category's closed answer set. Matching is deliberately
//! exact: two texts either normalize to the same key or they do not, so a
//! submission resolves the same way on every device and every replay. There
//! is no fuzzy or edit-distance matching.

use itertools::Itertools;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::pack::{Answer, Category};

/// Normalizes free text into a canonical answer key
///
/// The folding steps, in order: ampersands become the word "and", the text
/// is decomposed and stripped of combining marks (so diacritics vanish),
/// case is folded, every non-alphanumeric character becomes a space, and
/// whitespace is collapsed and trimmed.
///
/// Normalization is idempotent: `normalize(normalize(x)) == normalize(x)`.
///
/// # Examples
///
/// ```rust
/// use pointless::matcher::normalize;
///
/// assert_eq!(normalize("Côte d'Ivoire"), "cote d ivoire");
/// assert_eq!(normalize("COTE-D'IVOIRE"), "cote d ivoire");
/// assert_eq!(normalize("Marks & Spencer"), "marks and spencer");
/// ```
pub fn normalize(text: &str) -> String {
    let text = text.replace('&', " and ");
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().join(" ")
}

/// Resolves a normalized key against a category's closed answer set
///
/// Scans the category's answers in order, comparing the key against each
/// answer's own key and its alias keys. The first exact match wins; `None`
/// means no answer or alias normalizes to the key.
///
/// # Arguments
///
/// * `category` - The category whose answer set to search
/// * `key` - A key previously produced by [`normalize`]
pub fn resolve<'a>(category: &'a Category, key: &str) -> Option<&'a Answer> {
    category.answers.iter().find(|answer| answer.matches(key))
}
