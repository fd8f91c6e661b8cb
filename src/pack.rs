//! Pack ingestion and canonical content shapes
//!
//! A pack is the closed set of categories and scored answers for one game,
//! produced by an external tool and treated as read-only here. External
//! packs name their fields inconsistently (`text` vs `answer`, `prompt` vs
//! `question` vs `name`), so this module is the single ingestion boundary:
//! serde aliases absorb the variants, answer keys are normalized once, and
//! duplicate keys within a category are resolved (first occurrence wins).
//! The rest of the server only ever sees the canonical shapes.

use std::collections::HashSet;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::matcher;

/// How a category's prompt is presented to players
///
/// This is display metadata carried through to clients; the scoring logic
/// never branches on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryKind {
    /// A plain prompt with typed answers
    #[default]
    Standard,
    /// The prompt is an anagram to unscramble
    Anagram,
    /// The prompt is accompanied by a picture
    Picture,
    /// The prompt is a phrase with a word blanked out
    MissingWord,
}

/// Serialization helper for Answer
#[derive(Deserialize)]
struct AnswerSerde {
    #[serde(alias = "answer")]
    text: String,
    #[serde(alias = "value", alias = "score")]
    points: u32,
    #[serde(default)]
    aliases: Vec<String>,
}

/// A single scored answer within a category
///
/// The normalized lookup keys are derived once at ingestion so that
/// resolution never re-normalizes pack content.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(from = "AnswerSerde")]
pub struct Answer {
    /// Display text, shown when the answer is revealed
    #[garde(length(chars, min = 1, max = crate::constants::pack::MAX_ANSWER_LENGTH))]
    pub text: String,
    /// Point value in [0, 100]; 0 is a pointless answer
    #[garde(range(max = crate::constants::scoring::MAX_ANSWER_SCORE))]
    pub points: u32,
    /// Alternative spellings that resolve to this answer
    #[garde(length(max = crate::constants::pack::MAX_ALIAS_COUNT),
        inner(length(chars, max = crate::constants::pack::MAX_ANSWER_LENGTH)))]
    pub aliases: Vec<String>,

    /// Normalized key of `text` (derived, not part of the wire shape)
    #[serde(skip_serializing)]
    #[garde(skip)]
    key: String,
    /// Normalized keys of `aliases` (derived, not part of the wire shape)
    #[serde(skip_serializing)]
    #[garde(skip)]
    alias_keys: Vec<String>,
}

impl From<AnswerSerde> for Answer {
    /// Builds the canonical answer, deriving its normalized lookup keys
    fn from(serde: AnswerSerde) -> Self {
        let AnswerSerde {
            text,
            points,
            aliases,
        } = serde;
        let key = matcher::normalize(&text);
        let alias_keys = aliases.iter().map(|alias| matcher::normalize(alias)).collect();
        Self {
            text,
            points,
            aliases,
            key,
            alias_keys,
        }
    }
}

impl Answer {
    /// Checks whether a normalized key refers to this answer
    ///
    /// # Arguments
    ///
    /// * `key` - A key produced by [`matcher::normalize`]
    pub fn matches(&self, key: &str) -> bool {
        self.key == key || self.alias_keys.iter().any(|alias_key| alias_key == key)
    }

    /// Returns the normalized key of the answer's display text
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Serialization helper for Category
#[derive(Deserialize)]
struct CategorySerde {
    #[serde(alias = "question", alias = "name")]
    prompt: String,
    #[serde(default, alias = "type")]
    kind: CategoryKind,
    answers: Vec<Answer>,
}

/// One round's topic: a prompt plus a closed answer list
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(from = "CategorySerde")]
pub struct Category {
    /// The prompt shown to players
    #[garde(length(chars, min = 1, max = crate::constants::pack::MAX_PROMPT_LENGTH))]
    pub prompt: String,
    /// How the prompt is presented
    #[garde(skip)]
    pub kind: CategoryKind,
    /// The closed, ordered answer list (deduplicated by key at ingestion)
    #[garde(length(min = 1, max = crate::constants::pack::MAX_ANSWER_COUNT), dive)]
    pub answers: Vec<Answer>,
}

impl From<CategorySerde> for Category {
    /// Builds the canonical category, dropping answers whose normalized key
    /// repeats an earlier answer's key
    fn from(serde: CategorySerde) -> Self {
        let CategorySerde {
            prompt,
            kind,
            answers,
        } = serde;
        let mut seen = HashSet::new();
        let answers = answers
            .into_iter()
            .filter(|answer| seen.insert(answer.key.clone()))
            .collect();
        Self {
            prompt,
            kind,
            answers,
        }
    }
}

/// A complete pack: every category available for one game
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Pack {
    /// The categories a game draws its rounds from
    #[garde(
        length(min = 1, max = crate::constants::pack::MAX_CATEGORIES),
        dive
    )]
    pub categories: Vec<Category>,
}

impl Pack {
    /// Returns the number of categories in this pack
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Checks if this pack contains any categories
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_accepts_field_name_variants() {
        let category: Category = serde_json::from_value(serde_json::json!({
            "question": "UK Prime Ministers",
            "type": "anagram",
            "answers": [
                { "answer": "Clement Attlee", "value": 45 },
                { "text": "Bonar Law", "points": 5 },
            ],
        }))
        .unwrap();

        assert_eq!(category.prompt, "UK Prime Ministers");
        assert_eq!(category.kind, CategoryKind::Anagram);
        assert_eq!(category.answers.len(), 2);
        assert_eq!(category.answers[0].text, "Clement Attlee");
        assert_eq!(category.answers[0].points, 45);
    }

    #[test]
    fn test_ingestion_category_name_alias() {
        let category: Category = serde_json::from_value(serde_json::json!({
            "name": "Capitals",
            "answers": [{ "text": "Oslo", "points": 30 }],
        }))
        .unwrap();

        assert_eq!(category.prompt, "Capitals");
        assert_eq!(category.kind, CategoryKind::Standard);
    }

    #[test]
    fn test_ingestion_deduplicates_answer_keys_first_wins() {
        let category: Category = serde_json::from_value(serde_json::json!({
            "prompt": "Colors",
            "answers": [
                { "text": "Red", "points": 40 },
                { "text": "RÉD", "points": 5 },
                { "text": "Blue", "points": 20 },
            ],
        }))
        .unwrap();

        assert_eq!(category.answers.len(), 2);
        assert_eq!(category.answers[0].text, "Red");
        assert_eq!(category.answers[0].points, 40);
        assert_eq!(category.answers[1].text, "Blue");
    }

    #[test]
    fn test_answer_keys_precomputed() {
        let answer: Answer = serde_json::from_value(serde_json::json!({
            "text": "São Paulo",
            "points": 15,
            "aliases": ["Sampa"],
        }))
        .unwrap();

        assert_eq!(answer.key(), "sao paulo");
        assert!(answer.matches("sao paulo"));
        assert!(answer.matches("sampa"));
        assert!(!answer.matches("rio"));
    }

    #[test]
    fn test_kind_parsing() {
        let kind: CategoryKind = serde_json::from_str("\"missing-word\"").unwrap();
        assert_eq!(kind, CategoryKind::MissingWord);

        let kind: CategoryKind = serde_json::from_str("\"picture\"").unwrap();
        assert_eq!(kind, CategoryKind::Picture);
    }

    #[test]
    fn test_validation_rejects_out_of_range_points() {
        let pack: Pack = serde_json::from_value(serde_json::json!({
            "categories": [{
                "prompt": "Numbers",
                "answers": [{ "text": "Eleven", "points": 101 }],
            }],
        }))
        .unwrap();

        assert!(pack.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_pack() {
        let pack: Pack = serde_json::from_value(serde_json::json!({ "categories": [] })).unwrap();
        assert!(pack.validate().is_err());
    }

    #[test]
    fn test_validation_accepts_pointless_answer() {
        let pack: Pack = serde_json::from_value(serde_json::json!({
            "categories": [{
                "prompt": "Obscure",
                "answers": [{ "text": "Andorra", "points": 0 }],
            }],
        }))
        .unwrap();

        assert!(pack.validate().is_ok());
    }
}
