//! Serializing the user's data to JSON, XML or CSV files.

use std::fmt::{self, Write as _};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::import::schema::EXPORT_VERSION;
use crate::models::{AppState, JsonMap};

/// Output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Xml,
    /// Flashcards only.
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A serialized export, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub content: String,
    pub file_name: String,
    pub mime_type: &'static str,
}

/// Serialize `state`. The output depends only on `state` and `now`.
pub fn serialize(state: &AppState, format: ExportFormat, now: DateTime<Utc>) -> Result<ExportArtifact> {
    let content = match format {
        ExportFormat::Json => to_json(state, now)?,
        ExportFormat::Xml => to_xml(state, now),
        ExportFormat::Csv => to_csv(state)?,
    };
    Ok(ExportArtifact {
        content,
        file_name: format!("quizwhiz-export-{}.{}", now.format("%Y-%m-%d"), format.extension()),
        mime_type: format.mime_type(),
    })
}

fn to_json(state: &AppState, now: DateTime<Utc>) -> Result<String> {
    let document = json!({
        "exportVersion": EXPORT_VERSION,
        "exportDate": now.to_rfc3339(),
        "flashcards": state.flashcards,
        "quizzes": state.quizzes,
        "settings": state.settings,
        "stats": state.stats,
        "streakData": state.streak_data,
        "userProfile": state.user_profile,
    });
    serde_json::to_string_pretty(&document).context("Failed to serialize export")
}

// ══════════════════════════════════════════════════════════════════════════
// XML
// ══════════════════════════════════════════════════════════════════════════

fn to_xml(state: &AppState, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_xml(&mut out, state, now);
    out
}

fn write_xml(out: &mut String, state: &AppState, now: DateTime<Utc>) -> fmt::Result {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<quizwhiz exportVersion="{}" exportDate="{}">"#,
        EXPORT_VERSION,
        now.to_rfc3339()
    )?;

    writeln!(out, "  <flashcards>")?;
    for card in &state.flashcards {
        writeln!(out, r#"    <flashcard id="{}">"#, escape(&card.id))?;
        writeln!(out, "      <question>{}</question>", cdata(&card.question))?;
        writeln!(out, "      <answer>{}</answer>", cdata(&card.answer))?;
        writeln!(out, "      <deck>{}</deck>", escape(&card.deck))?;
        writeln!(out, "      <difficulty>{}</difficulty>", card.difficulty.as_str())?;
        writeln!(out, "      <created>{}</created>", card.created.to_rfc3339())?;
        if let Some(reviewed) = card.last_reviewed {
            writeln!(out, "      <lastReviewed>{}</lastReviewed>", reviewed.to_rfc3339())?;
        }
        writeln!(out, "      <reviewCount>{}</reviewCount>", card.review_count)?;
        writeln!(out, "    </flashcard>")?;
    }
    writeln!(out, "  </flashcards>")?;

    writeln!(out, "  <quizzes>")?;
    for quiz in &state.quizzes {
        writeln!(out, r#"    <quiz id="{}">"#, escape(&quiz.id))?;
        writeln!(out, "      <question>{}</question>", cdata(&quiz.question))?;
        writeln!(out, "      <correctAnswer>{}</correctAnswer>", cdata(&quiz.correct_answer))?;
        for wrong in &quiz.wrong_answers {
            writeln!(out, "      <wrongAnswer>{}</wrongAnswer>", cdata(wrong))?;
        }
        writeln!(out, "      <deck>{}</deck>", escape(&quiz.deck))?;
        writeln!(out, "      <difficulty>{}</difficulty>", quiz.difficulty.as_str())?;
        writeln!(out, "      <created>{}</created>", quiz.created.to_rfc3339())?;
        writeln!(out, "    </quiz>")?;
    }
    writeln!(out, "  </quizzes>")?;

    write_block(out, "settings", "setting", &state.settings)?;
    write_block(out, "stats", "stat", &state.stats)?;
    write_block(out, "userProfile", "field", &state.user_profile)?;
    writeln!(out, "</quizwhiz>")
}

/// Flattened key/value section. Strings are written as-is, other values as
/// JSON; the `type` attribute says which.
fn write_block(out: &mut String, tag: &str, entry: &str, map: &JsonMap) -> fmt::Result {
    if map.is_empty() {
        return Ok(());
    }
    writeln!(out, "  <{}>", tag)?;
    for (key, value) in map {
        let (kind, text) = match value {
            Value::String(s) => ("string", s.clone()),
            other => ("json", other.to_string()),
        };
        writeln!(
            out,
            r#"    <{} key="{}" type="{}">{}</{}>"#,
            entry,
            escape(key),
            kind,
            escape(&text),
            entry
        )?;
    }
    writeln!(out, "  </{}>", tag)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap free-form text in CDATA, splitting any `]]>` it contains.
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

// ══════════════════════════════════════════════════════════════════════════
// CSV
// ══════════════════════════════════════════════════════════════════════════

pub const CSV_HEADER: [&str; 4] = ["front", "back", "category", "difficulty"];

fn to_csv(state: &AppState) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for card in &state.flashcards {
        writer.write_record([
            card.question.as_str(),
            card.answer.as_str(),
            card.deck.as_str(),
            card.difficulty.as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV export: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV export is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::csv::split_csv_line;
    use crate::import::{FormatParser, ImportFile};
    use crate::models::{Difficulty, Flashcard, Quiz};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    fn sample_state() -> AppState {
        let mut state = AppState {
            flashcards: vec![
                Flashcard::new(r#"He said "hi", then left"#.into(), "A <tag> & ]]> end".into())
                    .with_deck("Quotes")
                    .with_difficulty(Difficulty::Hard),
            ],
            quizzes: vec![Quiz::new(
                "Geo".into(),
                "Capital of France?".into(),
                "Paris".into(),
                vec!["Rome".into(), "Madrid".into()],
            )],
            ..Default::default()
        };
        state.settings.insert("theme".into(), json!("dark & light"));
        state.settings.insert("dailyGoal".into(), json!(20));
        state.settings.insert("fontSize".into(), json!("20"));
        state.settings.insert("sound".into(), json!("true"));
        state.stats.insert("recent".into(), json!([{"score": 90}]));
        state
    }

    #[test]
    fn csv_quoting_round_trips_through_line_splitter() {
        let artifact = serialize(&sample_state(), ExportFormat::Csv, now()).unwrap();
        assert_eq!(artifact.mime_type, "text/csv");
        assert_eq!(artifact.file_name, "quizwhiz-export-2024-05-06.csv");

        let mut lines = artifact.content.lines();
        assert_eq!(lines.next(), Some(r#""front","back","category","difficulty""#));
        let fields = split_csv_line(lines.next().unwrap());
        assert_eq!(fields[0], r#"He said "hi", then left"#);
        assert_eq!(fields[2], "Quotes");
        assert_eq!(fields[3], "hard");
    }

    #[test]
    fn json_export_is_reimportable() {
        let state = sample_state();
        let artifact = serialize(&state, ExportFormat::Json, now()).unwrap();
        let value: Value = serde_json::from_str(&artifact.content).unwrap();
        assert_eq!(value["exportVersion"], json!("2.0"));
        assert_eq!(value["exportDate"], json!("2024-05-06T07:08:09+00:00"));

        let batch = ImportFile::new(artifact.file_name, artifact.content).parse().unwrap();
        assert_eq!(batch.flashcards, state.flashcards);
        assert_eq!(batch.quizzes, state.quizzes);
        assert_eq!(batch.settings.as_ref(), Some(&state.settings));
    }

    #[test]
    fn xml_export_is_reimportable() {
        let state = sample_state();
        let artifact = serialize(&state, ExportFormat::Xml, now()).unwrap();
        assert!(artifact.content.contains("]]]]><![CDATA[>"));

        let batch = crate::import::xml::XmlParser.parse(artifact.content.as_bytes()).unwrap();
        assert!(batch.malformed.is_none());
        let card = &batch.flashcards[0];
        assert_eq!(card.question, state.flashcards[0].question);
        assert_eq!(card.answer, "A <tag> & ]]> end");
        assert_eq!(card.difficulty, Difficulty::Hard);
        assert_eq!(batch.quizzes[0].wrong_answers, vec!["Rome", "Madrid"]);

        let settings = batch.settings.unwrap();
        assert_eq!(settings.get("theme"), Some(&json!("dark & light")));
        assert_eq!(settings.get("dailyGoal"), Some(&json!(20)));
        assert_eq!(settings, state.settings);
        assert_eq!(batch.stats.as_ref(), Some(&state.stats));
    }

    #[test]
    fn output_is_deterministic() {
        let state = sample_state();
        for format in [ExportFormat::Json, ExportFormat::Xml, ExportFormat::Csv] {
            assert_eq!(
                serialize(&state, format, now()).unwrap(),
                serialize(&state, format, now()).unwrap()
            );
        }
    }
}
