//! Classification of parsed JSON payloads.

use serde::Serialize;
use serde_json::Value;

/// Namespace prefix on every key the app writes to key-value storage.
pub const STORAGE_PREFIX: &str = "quizwhiz_";

pub const KEY_USER_PROFILE: &str = "quizwhiz_user_profile";
pub const KEY_SETTINGS: &str = "quizwhiz_settings";
pub const KEY_FLASHCARDS: &str = "quizwhiz_flashcards";
pub const KEY_QUIZZES: &str = "quizwhiz_quizzes";
pub const KEY_SCORES: &str = "quizwhiz_scores";
pub const KEY_STATS: &str = "quizwhiz_stats";
pub const KEY_STREAK_HISTORY: &str = "quizwhiz_streak_history";
pub const KEY_QUIZ_STATS: &str = "quizwhiz_quiz_stats";

/// Keys that only a full-system export carries.
pub const COMPLETE_BACKUP_KEYS: [&str; 8] = [
    KEY_USER_PROFILE,
    KEY_SETTINGS,
    KEY_FLASHCARDS,
    KEY_QUIZZES,
    KEY_SCORES,
    KEY_STATS,
    KEY_STREAK_HISTORY,
    KEY_QUIZ_STATS,
];

/// Version tag written by the current exporter.
pub const EXPORT_VERSION: &str = "2.0";

/// Shape of a JSON import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    CompleteBackup,
    ExportV2,
    FlashcardArray,
    LegacyFormat,
    Unknown,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompleteBackup => "complete_backup",
            Self::ExportV2 => "export_v2",
            Self::FlashcardArray => "flashcard_array",
            Self::LegacyFormat => "legacy_format",
            Self::Unknown => "unknown",
        }
    }
}

/// Classify a payload. First matching rule wins; never fails.
pub fn detect(value: &Value) -> SchemaKind {
    if let Value::Array(_) = value {
        return SchemaKind::FlashcardArray;
    }

    let Value::Object(map) = value else {
        return SchemaKind::Unknown;
    };

    if COMPLETE_BACKUP_KEYS.iter().any(|key| map.contains_key(*key)) {
        SchemaKind::CompleteBackup
    } else if map.get("exportVersion").and_then(Value::as_str) == Some(EXPORT_VERSION) {
        SchemaKind::ExportV2
    } else if map.keys().any(|key| key.starts_with(STORAGE_PREFIX)) {
        SchemaKind::LegacyFormat
    } else {
        SchemaKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_complete_backup_from_any_system_key() {
        for key in COMPLETE_BACKUP_KEYS {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), json!([]));
            assert_eq!(detect(&Value::Object(map)), SchemaKind::CompleteBackup, "{}", key);
        }
    }

    #[test]
    fn complete_backup_wins_over_export_version() {
        let value = json!({"exportVersion": "2.0", "quizwhiz_flashcards": []});
        assert_eq!(detect(&value), SchemaKind::CompleteBackup);
    }

    #[test]
    fn detects_export_v2_only_for_exact_version() {
        assert_eq!(detect(&json!({"exportVersion": "2.0", "flashcards": []})), SchemaKind::ExportV2);
        assert_eq!(detect(&json!({"exportVersion": "1.0", "flashcards": []})), SchemaKind::Unknown);
        assert_eq!(detect(&json!({"exportVersion": 2.0})), SchemaKind::Unknown);
    }

    #[test]
    fn detects_flashcard_array() {
        assert_eq!(detect(&json!([{"question": "Q", "answer": "A"}])), SchemaKind::FlashcardArray);
        assert_eq!(detect(&json!([])), SchemaKind::FlashcardArray);
    }

    #[test]
    fn detects_legacy_by_prefix() {
        assert_eq!(detect(&json!({"quizwhiz_cards": []})), SchemaKind::LegacyFormat);
    }

    #[test]
    fn detection_is_total() {
        let inputs = [
            json!(null),
            json!(true),
            json!(42),
            json!("quizwhiz_flashcards"),
            json!({}),
            json!({"foo": "bar"}),
            json!({"exportVersion": null}),
        ];
        for input in inputs {
            let kind = detect(&input);
            assert!(matches!(
                kind,
                SchemaKind::CompleteBackup
                    | SchemaKind::ExportV2
                    | SchemaKind::FlashcardArray
                    | SchemaKind::LegacyFormat
                    | SchemaKind::Unknown
            ));
        }
        assert_eq!(detect(&json!({"foo": "bar"})), SchemaKind::Unknown);
        assert_eq!(detect(&json!(42)), SchemaKind::Unknown);
    }
}
