//! Data models for flashcards, quizzes and the study state around them.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::import::schema::SchemaKind;

/// Deck assigned to records that don't name one.
pub const DEFAULT_DECK: &str = "General";

/// Loose key/value payloads (settings, stats, profile).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Generate a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_deck() -> String {
    DEFAULT_DECK.to_string()
}

/// How hard a card or question is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Parse a user-supplied label; anything unrecognised is `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// A single flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default = "default_deck")]
    pub deck: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub last_reviewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_count: u32,
}

impl Flashcard {
    pub fn new(question: String, answer: String) -> Self {
        Self {
            id: new_id(),
            question,
            answer,
            deck: default_deck(),
            difficulty: Difficulty::Medium,
            created: Utc::now(),
            last_reviewed: None,
            review_count: 0,
        }
    }

    pub fn with_deck(mut self, deck: impl Into<String>) -> Self {
        self.deck = deck.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }
}

/// Upper bound on distractors kept per quiz question.
pub const MAX_WRONG_ANSWERS: usize = 3;

/// A single quiz question. Stored flat; grouped into [`QuizDeck`]s only on
/// the way to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    #[serde(default = "default_deck")]
    pub deck: String,
    pub question: String,
    pub correct_answer: String,
    #[serde(default)]
    pub wrong_answers: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub created: DateTime<Utc>,
}

impl Quiz {
    pub fn new(deck: String, question: String, correct_answer: String, mut wrong_answers: Vec<String>) -> Self {
        wrong_answers.truncate(MAX_WRONG_ANSWERS);
        Self {
            id: new_id(),
            deck,
            question,
            correct_answer,
            wrong_answers,
            difficulty: Difficulty::Medium,
            created: Utc::now(),
        }
    }
}

/// Quiz questions sharing a deck, in the shape the remote store keeps them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizDeck {
    pub title: String,
    pub category: String,
    pub questions: Vec<QuizDeckQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizDeckQuestion {
    pub question: String,
    pub correct: String,
    pub options: Vec<String>,
}

/// Consecutive-day study tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreakRecord {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_study_date: Option<NaiveDate>,
    pub study_dates: BTreeSet<NaiveDate>,
    pub total_study_days: u32,
}

/// One finished study session from a score history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    #[serde(default, alias = "percentage")]
    pub score: f64,
    #[serde(default, alias = "totalQuestions", alias = "total")]
    pub cards_studied: u32,
    /// Anything else the session carried (date, deck, mode...).
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Normalized result of parsing one import file. Consumed by the reconciler,
/// never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub flashcards: Vec<Flashcard>,
    pub quizzes: Vec<Quiz>,
    pub scores: Vec<ScoreRecord>,
    pub settings: Option<JsonMap>,
    pub stats: Option<JsonMap>,
    pub streak_data: Option<StreakRecord>,
    pub user_profile: Option<JsonMap>,

    /// JSON shape the batch was read from, when the source was JSON.
    pub schema: Option<SchemaKind>,
    /// Records skipped while parsing.
    pub warnings: Vec<String>,
    /// Set when the document itself could not be parsed (best-effort formats).
    pub malformed: Option<String>,
}

impl ImportBatch {
    pub fn has_settings(&self) -> bool {
        self.settings.as_ref().is_some_and(|m| !m.is_empty())
    }

    pub fn has_stats(&self) -> bool {
        self.stats.as_ref().is_some_and(|m| !m.is_empty()) || !self.scores.is_empty()
    }

    pub fn has_profile(&self) -> bool {
        self.user_profile.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// True when nothing in the batch could be committed.
    pub fn is_empty(&self) -> bool {
        self.flashcards.is_empty()
            && self.quizzes.is_empty()
            && !self.has_settings()
            && !self.has_stats()
            && !self.has_profile()
            && self.streak_data.is_none()
    }
}

/// Everything the app holds for the acting user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub flashcards: Vec<Flashcard>,
    pub quizzes: Vec<Quiz>,
    pub settings: JsonMap,
    pub stats: JsonMap,
    pub streak_data: StreakRecord,
    pub user_profile: JsonMap,
}

/// Shallow last-write-wins merge of `incoming` into `target`.
pub fn merge_shallow(target: &mut JsonMap, incoming: &JsonMap) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn difficulty_defaults_to_medium_for_unknown_labels() {
        assert_eq!(Difficulty::parse_lenient(" HARD "), Difficulty::Hard);
        assert_eq!(Difficulty::parse_lenient("easy"), Difficulty::Easy);
        assert_eq!(Difficulty::parse_lenient("brutal"), Difficulty::Medium);
        assert_eq!(Difficulty::parse_lenient(""), Difficulty::Medium);
    }

    #[test]
    fn quiz_keeps_at_most_three_wrong_answers() {
        let quiz = Quiz::new(
            "Geo".into(),
            "Capital of France?".into(),
            "Paris".into(),
            vec!["Rome".into(), "Madrid".into(), "Berlin".into(), "Oslo".into()],
        );
        assert_eq!(quiz.wrong_answers, vec!["Rome", "Madrid", "Berlin"]);
    }

    #[test]
    fn flashcard_deserializes_with_defaults() {
        let card: Flashcard = serde_json::from_value(json!({
            "id": "1",
            "question": "Q",
            "answer": "A",
            "created": "2024-01-02T03:04:05Z"
        }))
        .unwrap();
        assert_eq!(card.deck, DEFAULT_DECK);
        assert_eq!(card.difficulty, Difficulty::Medium);
        assert_eq!(card.review_count, 0);
        assert!(card.last_reviewed.is_none());
    }

    #[test]
    fn score_record_accepts_aliases_and_keeps_extra_fields() {
        let record: ScoreRecord = serde_json::from_value(json!({
            "percentage": 80.0,
            "totalQuestions": 10,
            "deck": "Math"
        }))
        .unwrap();
        assert_eq!(record.score, 80.0);
        assert_eq!(record.cards_studied, 10);
        assert_eq!(record.extra.get("deck"), Some(&json!("Math")));
    }

    #[test]
    fn empty_batch_reports_empty() {
        let mut batch = ImportBatch::default();
        assert!(batch.is_empty());
        batch.settings = Some(JsonMap::new());
        assert!(batch.is_empty());
        batch.flashcards.push(Flashcard::new("Q".into(), "A".into()));
        assert!(!batch.is_empty());
    }

    #[test]
    fn merge_shallow_overwrites_existing_keys() {
        let mut target = JsonMap::new();
        target.insert("theme".into(), json!("light"));
        target.insert("sound".into(), json!(true));
        let mut incoming = JsonMap::new();
        incoming.insert("theme".into(), json!("dark"));
        merge_shallow(&mut target, &incoming);
        assert_eq!(target.get("theme"), Some(&json!("dark")));
        assert_eq!(target.get("sound"), Some(&json!(true)));
    }
}
