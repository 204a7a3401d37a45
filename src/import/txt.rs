//! Plain-text import. Tries a series of layouts and keeps the first one that
//! yields any pairs.

use super::{decode_text, FormatParser};
use crate::error::ImportError;
use crate::models::{Difficulty, Flashcard, ImportBatch};

/// Deck every text-imported card lands in.
pub const TEXT_IMPORT_DECK: &str = "Imported";

/// Questions shorter than this are treated as noise.
const MIN_QUESTION_CHARS: usize = 3;

type Pair = (String, String);

pub struct TxtParser;

impl FormatParser for TxtParser {
    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch, ImportError> {
        let text = decode_text(bytes)?;
        let pairs = extract_pairs(text);
        if pairs.is_empty() {
            return Err(ImportError::Format(
                "no question/answer pairs found in text file".to_string(),
            ));
        }

        let flashcards = pairs
            .into_iter()
            .map(|(question, answer)| {
                Flashcard::new(question, answer)
                    .with_deck(TEXT_IMPORT_DECK)
                    .with_difficulty(Difficulty::Medium)
            })
            .collect();

        Ok(ImportBatch {
            flashcards,
            ..Default::default()
        })
    }
}

/// Run each strategy in priority order until one produces usable pairs.
pub fn extract_pairs(text: &str) -> Vec<Pair> {
    let strategies: [fn(&str) -> Vec<Pair>; 4] = [
        |t| labeled_pairs(t, "Q:", "A:"),
        |t| labeled_pairs(t, "Question:", "Answer:"),
        numbered_pairs,
        paragraph_pairs,
    ];

    strategies
        .iter()
        .map(|strategy| {
            strategy(text)
                .into_iter()
                .filter(|(q, a)| q.chars().count() >= MIN_QUESTION_CHARS && !a.is_empty())
                .collect::<Vec<_>>()
        })
        .find(|pairs| !pairs.is_empty())
        .unwrap_or_default()
}

/// Lines starting with a question label open a pair, lines starting with the
/// answer label open its answer. Unlabeled lines continue whichever is open.
fn labeled_pairs(text: &str, q_label: &str, a_label: &str) -> Vec<Pair> {
    enum Open {
        Nothing,
        Question,
        Answer,
    }

    let mut pairs = Vec::new();
    let mut question = String::new();
    let mut answer = String::new();
    let mut open = Open::Nothing;

    let mut flush = |question: &mut String, answer: &mut String| {
        let (q, a) = (question.trim(), answer.trim());
        if !q.is_empty() && !a.is_empty() {
            pairs.push((q.to_string(), a.to_string()));
        }
        question.clear();
        answer.clear();
    };

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = strip_label(trimmed, q_label) {
            flush(&mut question, &mut answer);
            question.push_str(rest.trim());
            open = Open::Question;
        } else if let Some(rest) = strip_label(trimmed, a_label) {
            answer.push_str(rest.trim());
            open = Open::Answer;
        } else {
            let target = match open {
                Open::Question => &mut question,
                Open::Answer => &mut answer,
                Open::Nothing => continue,
            };
            if !line.trim().is_empty() {
                if !target.is_empty() {
                    target.push(' ');
                }
                target.push_str(line.trim());
            }
        }
    }
    flush(&mut question, &mut answer);
    pairs
}

/// Case-insensitive label prefix.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| &line[label.len()..])
}

/// `12. question - answer`
fn numbered_pairs(text: &str) -> Vec<Pair> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            let body = line[digits..].strip_prefix('.')?;
            let (question, answer) = body.split_once(" - ").or_else(|| body.split_once('-'))?;
            Some((question.trim().to_string(), answer.trim().to_string()))
        })
        .collect()
}

/// Blank-line separated paragraphs, taken two at a time.
fn paragraph_pairs(text: &str) -> Vec<Pair> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}
