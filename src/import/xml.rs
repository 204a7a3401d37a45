//! XML import.
//!
//! Best effort: a document that fails to parse yields an empty batch with
//! `malformed` set instead of an error, and individual records missing
//! their question or answer are skipped.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};
use serde_json::Value;

use super::{decode_text, FormatParser};
use crate::error::ImportError;
use crate::models::{Difficulty, Flashcard, ImportBatch, JsonMap, Quiz, DEFAULT_DECK};

pub struct XmlParser;

impl FormatParser for XmlParser {
    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch, ImportError> {
        let text = decode_text(bytes)?;
        let mut batch = ImportBatch::default();

        let doc = match Document::parse(text) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("XML import: document is not well formed: {}", e);
                batch.malformed = Some(e.to_string());
                return Ok(batch);
            }
        };

        let flashcards = doc.descendants().filter(|n| n.has_tag_name("flashcard"));
        for (i, node) in flashcards.enumerate() {
            match flashcard_from_node(node) {
                Some(card) => batch.flashcards.push(card),
                None => batch
                    .warnings
                    .push(format!("flashcard #{}: missing question or answer", i + 1)),
            }
        }

        let quizzes = doc.descendants().filter(|n| n.has_tag_name("quiz"));
        for (i, node) in quizzes.enumerate() {
            match quiz_from_node(node) {
                Some(quiz) => batch.quizzes.push(quiz),
                None => batch
                    .warnings
                    .push(format!("quiz #{}: missing question or correct answer", i + 1)),
            }
        }

        batch.settings = key_value_block(&doc, "settings");
        batch.stats = key_value_block(&doc, "stats");
        batch.user_profile = key_value_block(&doc, "userProfile");

        for warning in &batch.warnings {
            log::warn!("XML import: {}", warning);
        }
        Ok(batch)
    }
}

/// Trimmed text of the first child element named `tag`, if non-empty.
fn child_text(node: Node, tag: &str) -> Option<String> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn child_timestamp(node: Node, tag: &str) -> Option<DateTime<Utc>> {
    child_text(node, tag)
        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn flashcard_from_node(node: Node) -> Option<Flashcard> {
    let question = child_text(node, "question")?;
    let answer = child_text(node, "answer")?;

    let mut card = Flashcard::new(question, answer)
        .with_deck(child_text(node, "deck").unwrap_or_else(|| DEFAULT_DECK.to_string()))
        .with_difficulty(
            child_text(node, "difficulty")
                .map(|d| Difficulty::parse_lenient(&d))
                .unwrap_or_default(),
        );

    if let Some(id) = node.attribute("id") {
        card.id = id.to_string();
    }
    if let Some(created) = child_timestamp(node, "created") {
        card.created = created;
    }
    card.last_reviewed = child_timestamp(node, "lastReviewed");
    card.review_count = child_text(node, "reviewCount")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    Some(card)
}

fn quiz_from_node(node: Node) -> Option<Quiz> {
    let question = child_text(node, "question")?;
    let correct = child_text(node, "correctAnswer")?;
    let wrong = node
        .children()
        .filter(|c| c.has_tag_name("wrongAnswer"))
        .filter_map(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let deck = child_text(node, "deck").unwrap_or_else(|| DEFAULT_DECK.to_string());
    let mut quiz = Quiz::new(deck, question, correct, wrong);
    quiz.difficulty = child_text(node, "difficulty")
        .map(|d| Difficulty::parse_lenient(&d))
        .unwrap_or_default();
    if let Some(id) = node.attribute("id") {
        quiz.id = id.to_string();
    }
    if let Some(created) = child_timestamp(node, "created") {
        quiz.created = created;
    }
    Some(quiz)
}

/// Read a flattened `<block><entry key="...">value</entry></block>` section.
/// `type="string"` keeps the text, `type="json"` decodes it. Without a type,
/// values that look like JSON are decoded and everything else stays a string.
fn key_value_block(doc: &Document, tag: &str) -> Option<JsonMap> {
    let block = doc.descendants().find(|n| n.has_tag_name(tag))?;
    let map: JsonMap = block
        .children()
        .filter(Node::is_element)
        .filter_map(|entry| {
            let key = entry.attribute("key")?;
            let text = entry.text().unwrap_or("");
            let value = match entry.attribute("type") {
                Some("string") => Value::String(text.to_string()),
                _ => {
                    let raw = text.trim();
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
                }
            };
            Some((key.to_string(), value))
        })
        .collect();
    (!map.is_empty()).then_some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<quizwhiz exportVersion="2.0">
  <flashcards>
    <flashcard id="c1">
      <question><![CDATA[What is <b>bold</b>, really?]]></question>
      <answer>Emphasis &amp; weight</answer>
      <deck>HTML</deck>
      <difficulty>hard</difficulty>
      <created>2024-02-03T04:05:06Z</created>
      <reviewCount>3</reviewCount>
    </flashcard>
    <flashcard>
      <question>Lonely question</question>
    </flashcard>
    <flashcard>
      <question>Defaults?</question>
      <answer>Yes</answer>
    </flashcard>
  </flashcards>
  <quizzes>
    <quiz>
      <question>Capital of France?</question>
      <correctAnswer>Paris</correctAnswer>
      <wrongAnswer>Rome</wrongAnswer>
      <wrongAnswer>Madrid</wrongAnswer>
      <deck>Geo</deck>
    </quiz>
  </quizzes>
  <settings>
    <setting key="theme">dark</setting>
    <setting key="dailyGoal">20</setting>
    <setting key="fontSize" type="string">20</setting>
    <setting key="sound" type="json">true</setting>
  </settings>
</quizwhiz>"#;

    #[test]
    fn extracts_flashcards_and_quizzes() {
        let batch = XmlParser.parse(SAMPLE.as_bytes()).unwrap();

        assert_eq!(batch.flashcards.len(), 2);
        let card = &batch.flashcards[0];
        assert_eq!(card.id, "c1");
        assert_eq!(card.question, "What is <b>bold</b>, really?");
        assert_eq!(card.answer, "Emphasis & weight");
        assert_eq!(card.deck, "HTML");
        assert_eq!(card.difficulty, Difficulty::Hard);
        assert_eq!(card.review_count, 3);

        let defaults = &batch.flashcards[1];
        assert_eq!(defaults.deck, "General");
        assert_eq!(defaults.difficulty, Difficulty::Medium);

        assert_eq!(batch.quizzes.len(), 1);
        assert_eq!(batch.quizzes[0].wrong_answers, vec!["Rome", "Madrid"]);
        assert_eq!(batch.warnings.len(), 1);
    }

    #[test]
    fn reads_flattened_settings() {
        let batch = XmlParser.parse(SAMPLE.as_bytes()).unwrap();
        let settings = batch.settings.unwrap();
        assert_eq!(settings.get("theme"), Some(&json!("dark")));
        assert_eq!(settings.get("dailyGoal"), Some(&json!(20)));
        assert_eq!(settings.get("fontSize"), Some(&json!("20")));
        assert_eq!(settings.get("sound"), Some(&json!(true)));
        assert!(batch.stats.is_none());
    }

    #[test]
    fn malformed_xml_yields_empty_batch() {
        let batch = XmlParser
            .parse(b"<flashcards><flashcard><question>Q</question></flashcards>")
            .unwrap();
        assert!(batch.is_empty());
        assert!(batch.malformed.is_some());
    }
}
