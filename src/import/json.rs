//! JSON import across every backup shape the app has written.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use super::schema::{
    detect, SchemaKind, KEY_FLASHCARDS, KEY_QUIZZES, KEY_QUIZ_STATS, KEY_SCORES, KEY_SETTINGS,
    KEY_STATS, KEY_STREAK_HISTORY, KEY_USER_PROFILE, STORAGE_PREFIX,
};
use super::{decode_text, FormatParser};
use crate::error::ImportError;
use crate::models::{
    Difficulty, Flashcard, ImportBatch, JsonMap, Quiz, ScoreRecord, StreakRecord, DEFAULT_DECK,
};

/// Key the current streak record lives under outside complete backups.
const KEY_STREAK: &str = "quizwhiz_streak";

pub struct JsonParser;

impl FormatParser for JsonParser {
    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch, ImportError> {
        let text = decode_text(bytes)?;
        let value: Value = serde_json::from_str(text).map_err(ImportError::InvalidJson)?;
        parse_value(&value)
    }
}

/// Extract a batch from an already parsed payload.
pub fn parse_value(value: &Value) -> Result<ImportBatch, ImportError> {
    let schema = detect(value);
    let mut batch = ImportBatch {
        schema: Some(schema),
        ..Default::default()
    };

    match (schema, value) {
        (SchemaKind::CompleteBackup, Value::Object(map)) => read_complete_backup(map, &mut batch),
        (SchemaKind::ExportV2, Value::Object(map)) => read_export_v2(map, &mut batch),
        (SchemaKind::FlashcardArray, _) => read_flashcards(value, "flashcards", &mut batch),
        (SchemaKind::LegacyFormat, Value::Object(map)) => read_legacy(map, &mut batch),
        _ => return Err(ImportError::UnrecognizedStructure),
    }

    for warning in &batch.warnings {
        log::warn!("JSON import: {}", warning);
    }
    Ok(batch)
}

// ══════════════════════════════════════════════════════════════════════════
// Schema readers
// ══════════════════════════════════════════════════════════════════════════

fn read_complete_backup(map: &JsonMap, batch: &mut ImportBatch) {
    for (key, raw) in map {
        let value = decode_stored(raw);
        match key.as_str() {
            KEY_FLASHCARDS => read_flashcards(&value, key, batch),
            KEY_QUIZZES => read_quizzes(&value, key, batch),
            KEY_SCORES => read_scores(&value, key, batch),
            KEY_SETTINGS => merge_object(&value, key, &mut batch.settings, &mut batch.warnings),
            KEY_STATS => merge_object(&value, key, &mut batch.stats, &mut batch.warnings),
            KEY_USER_PROFILE => {
                merge_object(&value, key, &mut batch.user_profile, &mut batch.warnings)
            }
            KEY_STREAK_HISTORY => read_streak(&value, key, batch),
            KEY_QUIZ_STATS => {
                batch
                    .stats
                    .get_or_insert_with(JsonMap::new)
                    .insert("quizStats".to_string(), value.into_owned());
            }
            _ => {
                if let Some(name) = key.strip_prefix(STORAGE_PREFIX) {
                    route_legacy_entry(name, key, &value, batch);
                }
            }
        }
    }
}

fn read_export_v2(map: &JsonMap, batch: &mut ImportBatch) {
    // Namespaced keys take precedence over plain ones.
    let pick = |plain: &'static str, prefixed: &'static str| {
        map.get(prefixed)
            .map(|v| (prefixed, v))
            .or_else(|| map.get(plain).map(|v| (plain, v)))
            .map(|(key, v)| (key, decode_stored(v)))
    };

    if let Some((key, value)) = pick("flashcards", KEY_FLASHCARDS) {
        read_flashcards(&value, key, batch);
    }
    if let Some((key, value)) = pick("quizzes", KEY_QUIZZES) {
        read_quizzes(&value, key, batch);
    }
    if let Some((key, value)) = pick("scores", KEY_SCORES) {
        read_scores(&value, key, batch);
    }
    if let Some((key, value)) = pick("settings", KEY_SETTINGS) {
        merge_object(&value, key, &mut batch.settings, &mut batch.warnings);
    }
    if let Some((key, value)) = pick("stats", KEY_STATS) {
        merge_object(&value, key, &mut batch.stats, &mut batch.warnings);
    }
    if let Some((key, value)) = pick("streakData", KEY_STREAK) {
        read_streak(&value, key, batch);
    }
    if let Some((key, value)) = pick("userProfile", KEY_USER_PROFILE) {
        merge_object(&value, key, &mut batch.user_profile, &mut batch.warnings);
    }
}

fn read_legacy(map: &JsonMap, batch: &mut ImportBatch) {
    for (key, raw) in map {
        if let Some(name) = key.strip_prefix(STORAGE_PREFIX) {
            route_legacy_entry(name, key, &decode_stored(raw), batch);
        }
    }
}

/// Route a namespaced entry by what its name and value look like.
fn route_legacy_entry(name: &str, key: &str, value: &Value, batch: &mut ImportBatch) {
    match value {
        Value::Array(_) if name.contains("card") => read_flashcards(value, key, batch),
        Value::Array(_) if name.contains("quiz") => read_quizzes(value, key, batch),
        Value::Array(_) if name.contains("score") => read_scores(value, key, batch),
        Value::Array(_) | Value::Object(_) if name.contains("streak") => read_streak(value, key, batch),
        Value::Object(_) if name.contains("setting") => {
            merge_object(value, key, &mut batch.settings, &mut batch.warnings)
        }
        Value::Object(_) if name.contains("stat") => {
            merge_object(value, key, &mut batch.stats, &mut batch.warnings)
        }
        Value::Object(_) if name.contains("user") || name.contains("profile") => {
            merge_object(value, key, &mut batch.user_profile, &mut batch.warnings)
        }
        _ => batch.warnings.push(format!("{}: ignored unrecognized entry", key)),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Collection readers
// ══════════════════════════════════════════════════════════════════════════

fn read_flashcards(value: &Value, source: &str, batch: &mut ImportBatch) {
    let Some(items) = value.as_array() else {
        batch.warnings.push(format!("{}: expected a list of flashcards", source));
        return;
    };

    for (i, item) in items.iter().enumerate() {
        match flashcard_from_value(item) {
            Some(card) => batch.flashcards.push(card),
            None => batch
                .warnings
                .push(format!("{}[{}]: flashcard is missing a question or answer", source, i)),
        }
    }
}

fn read_quizzes(value: &Value, source: &str, batch: &mut ImportBatch) {
    let Some(items) = value.as_array() else {
        batch.warnings.push(format!("{}: expected a list of quizzes", source));
        return;
    };

    for (i, item) in items.iter().enumerate() {
        // Grouped decks are flattened back into single questions.
        if let Some(questions) = item.get("questions").and_then(Value::as_array) {
            let obj = item.as_object();
            let deck = obj
                .and_then(|o| text_field(o, &["title", "deck", "category", "name"]))
                .unwrap_or_else(|| DEFAULT_DECK.to_string());
            for (j, question) in questions.iter().enumerate() {
                match quiz_from_deck_question(&deck, question) {
                    Some(quiz) => batch.quizzes.push(quiz),
                    None => batch.warnings.push(format!(
                        "{}[{}].questions[{}]: question is missing text or a correct answer",
                        source, i, j
                    )),
                }
            }
            continue;
        }

        match quiz_from_value(item) {
            Some(quiz) => batch.quizzes.push(quiz),
            None => batch.warnings.push(format!(
                "{}[{}]: quiz is missing a question or correct answer",
                source, i
            )),
        }
    }
}

fn read_scores(value: &Value, source: &str, batch: &mut ImportBatch) {
    let Some(items) = value.as_array() else {
        batch.warnings.push(format!("{}: expected a list of scores", source));
        return;
    };

    for (i, item) in items.iter().enumerate() {
        match serde_json::from_value::<ScoreRecord>(item.clone()) {
            Ok(record) => batch.scores.push(record),
            Err(e) => batch.warnings.push(format!("{}[{}]: {}", source, i, e)),
        }
    }
}

fn read_streak(value: &Value, source: &str, batch: &mut ImportBatch) {
    match streak_from_value(value) {
        Some(record) => batch.streak_data = Some(record),
        None => batch.warnings.push(format!("{}: unreadable streak data", source)),
    }
}

fn merge_object(value: &Value, source: &str, target: &mut Option<JsonMap>, warnings: &mut Vec<String>) {
    match value {
        Value::Object(obj) => crate::models::merge_shallow(target.get_or_insert_with(JsonMap::new), obj),
        _ => warnings.push(format!("{}: expected an object", source)),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Record conversion
// ══════════════════════════════════════════════════════════════════════════

/// Values saved by key-value storage may be JSON encoded a second time.
fn decode_stored(value: &Value) -> Cow<'_, Value> {
    if let Value::String(s) = value {
        if let Ok(inner @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(s) {
            return Cow::Owned(inner);
        }
    }
    Cow::Borrowed(value)
}

pub(crate) fn flashcard_from_value(value: &Value) -> Option<Flashcard> {
    let obj = value.as_object()?;
    let question = text_field(obj, &["question", "front", "term"])?;
    let answer = text_field(obj, &["answer", "back", "definition"])?;

    let mut card = Flashcard::new(question, answer)
        .with_deck(text_field(obj, &["deck", "category"]).unwrap_or_else(|| DEFAULT_DECK.to_string()))
        .with_difficulty(difficulty_field(obj));

    if let Some(id) = text_field(obj, &["id"]) {
        card.id = id;
    }
    if let Some(created) = timestamp_field(obj, &["created", "createdAt"]) {
        card.created = created;
    }
    card.last_reviewed = timestamp_field(obj, &["lastReviewed"]);
    card.review_count = count_field(obj, &["reviewCount"]);
    Some(card)
}

pub(crate) fn quiz_from_value(value: &Value) -> Option<Quiz> {
    let obj = value.as_object()?;
    let question = text_field(obj, &["question"])?;
    let correct = text_field(obj, &["correctAnswer", "correct", "answer"])?;

    let mut wrong = ["wrongAnswers", "incorrectAnswers"]
        .iter()
        .find_map(|key| obj.get(*key).map(string_list))
        .unwrap_or_default();
    if wrong.is_empty() {
        if let Some(options) = obj.get("options") {
            wrong = string_list(options).into_iter().filter(|o| *o != correct).collect();
        }
    }

    let deck = text_field(obj, &["deck", "category", "quizTitle"]).unwrap_or_else(|| DEFAULT_DECK.to_string());
    let mut quiz = Quiz::new(deck, question, correct, wrong);
    quiz.difficulty = difficulty_field(obj);
    if let Some(id) = text_field(obj, &["id"]) {
        quiz.id = id;
    }
    if let Some(created) = timestamp_field(obj, &["created", "createdAt"]) {
        quiz.created = created;
    }
    Some(quiz)
}

fn quiz_from_deck_question(deck: &str, value: &Value) -> Option<Quiz> {
    let obj = value.as_object()?;
    let question = text_field(obj, &["question"])?;
    let correct = text_field(obj, &["correct", "correctAnswer", "answer"])?;
    let wrong = obj
        .get("options")
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .filter(|o| *o != correct)
        .collect();
    let mut quiz = Quiz::new(deck.to_string(), question, correct, wrong);
    quiz.difficulty = difficulty_field(obj);
    Some(quiz)
}

/// Streak data is either a full record or a bare list of study dates.
pub(crate) fn streak_from_value(value: &Value) -> Option<StreakRecord> {
    match value {
        Value::Array(items) => {
            let study_dates: std::collections::BTreeSet<NaiveDate> =
                items.iter().filter_map(Value::as_str).filter_map(parse_date).collect();
            Some(StreakRecord {
                last_study_date: study_dates.last().copied(),
                total_study_days: u32::try_from(study_dates.len()).unwrap_or(u32::MAX),
                study_dates,
                ..Default::default()
            })
        }
        Value::Object(obj) => {
            let study_dates = obj
                .get("studyDates")
                .and_then(Value::as_array)
                .map(|dates| dates.iter().filter_map(Value::as_str).filter_map(parse_date).collect())
                .unwrap_or_default();
            Some(StreakRecord {
                current_streak: count_field(obj, &["currentStreak"]),
                longest_streak: count_field(obj, &["longestStreak"]),
                last_study_date: obj.get("lastStudyDate").and_then(Value::as_str).and_then(parse_date),
                study_dates,
                total_study_days: count_field(obj, &["totalStudyDays"]),
            })
        }
        _ => None,
    }
}

fn text_field(obj: &JsonMap, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn difficulty_field(obj: &JsonMap) -> Difficulty {
    text_field(obj, &["difficulty"])
        .map(|d| Difficulty::parse_lenient(&d))
        .unwrap_or_default()
}

fn count_field(obj: &JsonMap, keys: &[&str]) -> u32 {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_u64))
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// RFC 3339 strings or epoch milliseconds.
fn timestamp_field(obj: &JsonMap, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts `YYYY-MM-DD` or anything starting with it (ISO timestamps).
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim().get(..10)?, "%Y-%m-%d").ok()
}
