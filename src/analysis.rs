//! Dry-run summary of an import file, shown before anything is committed.

use std::collections::BTreeSet;

use serde::Serialize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::error::ImportError;
use crate::import::schema::SchemaKind;
use crate::import::ImportFile;
use crate::models::ImportBatch;

/// Display columns a preview line may take.
pub const PREVIEW_WIDTH: usize = 50;
const PREVIEW_FLASHCARDS: usize = 3;
const PREVIEW_QUIZZES: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCounts {
    pub flashcards: usize,
    pub quizzes: usize,
    /// Number of keys, for the map categories.
    pub settings: usize,
    pub stats: usize,
    pub user_profile: usize,
    pub scores: usize,
    pub streak: bool,
}

/// Category of an analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisErrorKind {
    InvalidJson,
    InvalidXml,
    UnreadableFile,
    UnrecognizedSchema,
    UnsupportedFormat,
    Other,
}

impl AnalysisErrorKind {
    pub fn classify(err: &ImportError) -> Self {
        match err {
            ImportError::InvalidJson(_) => Self::InvalidJson,
            ImportError::InvalidXml(_) => Self::InvalidXml,
            ImportError::Unreadable(_) | ImportError::Io { .. } => Self::UnreadableFile,
            ImportError::UnrecognizedStructure => Self::UnrecognizedSchema,
            ImportError::UnsupportedFormat(_) => Self::UnsupportedFormat,
            _ => Self::Other,
        }
    }

    /// Message for the person picking the file.
    pub fn user_message(&self, err: &ImportError) -> String {
        match self {
            Self::InvalidJson => format!("The file is not valid JSON ({})", err),
            Self::InvalidXml => format!("The file is not valid XML ({})", err),
            Self::UnreadableFile => "The file could not be read. Check that it is a text file.".to_string(),
            Self::UnrecognizedSchema => {
                "The file structure was not recognized as a QuizWhiz backup or export.".to_string()
            }
            Self::UnsupportedFormat => format!(
                "Unsupported file type ({}). Use JSON, XML, CSV or TXT.",
                match err {
                    ImportError::UnsupportedFormat(ext) => ext.as_str(),
                    _ => "unknown",
                }
            ),
            Self::Other => err.to_string(),
        }
    }
}

/// What importing a file would bring in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAnalysis {
    pub file_name: String,
    pub file_size: usize,
    pub file_type: String,
    pub counts: ImportCounts,
    pub decks: BTreeSet<String>,
    pub difficulties: BTreeSet<String>,
    pub is_complete_backup: bool,
    pub schema: Option<SchemaKind>,
    pub preview: Vec<String>,
    pub validation_errors: Vec<String>,
    pub error: Option<String>,
    pub error_kind: Option<AnalysisErrorKind>,
    pub is_valid: bool,
}

/// Analyze `file` without touching any storage. Parser failures end up in
/// `error`; this never fails itself.
pub fn analyze(file: &ImportFile) -> ImportAnalysis {
    let mut analysis = ImportAnalysis {
        file_name: file.name.clone(),
        file_size: file.bytes.len(),
        file_type: file
            .kind()
            .map(|k| k.to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
        ..Default::default()
    };

    let parsed = file.parse().and_then(|batch| match &batch.malformed {
        Some(reason) => Err(ImportError::InvalidXml(reason.clone())),
        None => Ok(batch),
    });

    match parsed {
        Ok(batch) => summarize(&batch, &mut analysis),
        Err(err) => {
            let kind = AnalysisErrorKind::classify(&err);
            log::info!("Analysis of {} failed: {}", file.name, err);
            analysis.error = Some(kind.user_message(&err));
            analysis.error_kind = Some(kind);
        }
    }
    analysis
}

fn summarize(batch: &ImportBatch, analysis: &mut ImportAnalysis) {
    let map_len = |m: &Option<crate::models::JsonMap>| m.as_ref().map_or(0, |m| m.len());
    analysis.counts = ImportCounts {
        flashcards: batch.flashcards.len(),
        quizzes: batch.quizzes.len(),
        settings: map_len(&batch.settings),
        stats: map_len(&batch.stats),
        user_profile: map_len(&batch.user_profile),
        scores: batch.scores.len(),
        streak: batch.streak_data.is_some(),
    };

    for card in &batch.flashcards {
        analysis.decks.insert(card.deck.clone());
        analysis.difficulties.insert(card.difficulty.as_str().to_string());
    }
    for quiz in &batch.quizzes {
        analysis.decks.insert(quiz.deck.clone());
        analysis.difficulties.insert(quiz.difficulty.as_str().to_string());
    }

    analysis.schema = batch.schema;
    analysis.is_complete_backup = batch.schema == Some(SchemaKind::CompleteBackup);

    analysis.preview = batch
        .flashcards
        .iter()
        .take(PREVIEW_FLASHCARDS)
        .map(|c| truncate_to_width(&format!("Q: {} | A: {}", c.question, c.answer), PREVIEW_WIDTH))
        .chain(
            batch
                .quizzes
                .iter()
                .take(PREVIEW_QUIZZES)
                .map(|q| truncate_to_width(&format!("Quiz: {}", q.question), PREVIEW_WIDTH)),
        )
        .collect();

    analysis.validation_errors = batch.warnings.clone();
    analysis.is_valid = !batch.flashcards.is_empty()
        || !batch.quizzes.is_empty()
        || batch.has_settings()
        || batch.has_stats()
        || batch.has_profile();
    if !analysis.is_valid {
        analysis.error = Some("No importable content was found in the file.".to_string());
        analysis.error_kind = Some(AnalysisErrorKind::Other);
    }
}

/// Collapse whitespace and cut to `max` display columns, ending in `…` when cut.
pub fn truncate_to_width(text: &str, max: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.width() <= max {
        return line;
    }

    let budget = max.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for c in line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_str(name: &str, content: &str) -> ImportAnalysis {
        analyze(&ImportFile::new(name, content))
    }

    #[test]
    fn unknown_schema_is_invalid_with_error() {
        let analysis = analyze_str("backup.json", r#"{"foo": "bar"}"#);
        assert!(!analysis.is_valid);
        assert_eq!(analysis.error_kind, Some(AnalysisErrorKind::UnrecognizedSchema));
        assert!(analysis.error.is_some());
    }

    #[test]
    fn txt_file_summary() {
        let analysis = analyze_str(
            "notes.txt",
            "Q: What is 2+2?\nA: 4\nQ: Capital of France?\nA: Paris",
        );
        assert!(analysis.is_valid);
        assert_eq!(analysis.file_type, "TXT");
        assert_eq!(analysis.counts.flashcards, 2);
        assert_eq!(analysis.decks, BTreeSet::from(["Imported".to_string()]));
        assert_eq!(analysis.difficulties, BTreeSet::from(["medium".to_string()]));
        assert_eq!(analysis.preview[0], "Q: What is 2+2? | A: 4");
        assert!(analysis.schema.is_none());
    }

    #[test]
    fn complete_backup_is_flagged() {
        let analysis = analyze_str(
            "full.json",
            r#"{"quizwhiz_flashcards": [{"question": "Q1", "answer": "A1"}], "quizwhiz_settings": {"theme": "dark"}}"#,
        );
        assert!(analysis.is_complete_backup);
        assert_eq!(analysis.counts.settings, 1);
        assert_eq!(analysis.schema, Some(SchemaKind::CompleteBackup));
    }

    #[test]
    fn classifies_parse_failures() {
        let json = analyze_str("bad.json", "{ nope");
        assert_eq!(json.error_kind, Some(AnalysisErrorKind::InvalidJson));

        let xml = analyze_str("bad.xml", "<flashcards><flashcard>");
        assert_eq!(xml.error_kind, Some(AnalysisErrorKind::InvalidXml));
        assert!(!xml.is_valid);

        let binary = analyze(&ImportFile::new("cards.csv", vec![0xff, 0xfe, 0x00]));
        assert_eq!(binary.error_kind, Some(AnalysisErrorKind::UnreadableFile));

        let ext = analyze_str("deck.apkg", "");
        assert_eq!(ext.error_kind, Some(AnalysisErrorKind::UnsupportedFormat));
        assert!(ext.error.unwrap().contains(".apkg"));

        let pdf = analyze_str("slides.pdf", "%PDF");
        assert_eq!(pdf.error_kind, Some(AnalysisErrorKind::Other));
        assert_eq!(pdf.error.as_deref(), Some("PDF import is not implemented yet"));
    }

    #[test]
    fn skipped_rows_become_validation_errors() {
        let analysis = analyze_str("cards.csv", "front,back\nQ1,A1\nlonely\n");
        assert!(analysis.is_valid);
        assert_eq!(analysis.counts.flashcards, 1);
        assert_eq!(analysis.validation_errors.len(), 1);
    }

    #[test]
    fn truncation_respects_display_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("a  b\n c", 10), "a b c");
        assert_eq!(truncate_to_width("abcdefghij", 5), "abcd…");
        // Wide characters take two columns each.
        assert_eq!(truncate_to_width("日本語のテキスト", 7), "日本語…");
    }
}
