//! CSV import. Columns are positional: question, answer, deck, difficulty.
//! The first line is a header and is always skipped.

use super::{decode_text, FormatParser};
use crate::error::ImportError;
use crate::models::{Difficulty, Flashcard, ImportBatch, DEFAULT_DECK};

pub struct CsvParser;

impl FormatParser for CsvParser {
    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch, ImportError> {
        let text = decode_text(bytes)?;
        let records = logical_records(text);
        if records.len() < 2 {
            return Err(ImportError::Format(
                "CSV file needs a header row and at least one data row".to_string(),
            ));
        }

        let mut batch = ImportBatch::default();
        for (line_no, record) in records.iter().skip(1) {
            if record.trim().is_empty() {
                continue;
            }

            let fields = split_csv_line(record);
            let field = |i: usize| fields.get(i).map(|f| f.trim()).filter(|f| !f.is_empty());

            let (Some(question), Some(answer)) = (field(0), field(1)) else {
                batch
                    .warnings
                    .push(format!("line {}: needs at least a question and an answer", line_no));
                continue;
            };

            let card = Flashcard::new(question.to_string(), answer.to_string())
                .with_deck(field(2).unwrap_or(DEFAULT_DECK))
                .with_difficulty(field(3).map(Difficulty::parse_lenient).unwrap_or_default());
            batch.flashcards.push(card);
        }

        for warning in &batch.warnings {
            log::warn!("CSV import: {}", warning);
        }
        Ok(batch)
    }
}

/// Join physical lines into records, keeping a line break inside an open
/// quoted field. Each record carries its 1-based starting line number.
fn logical_records(text: &str) -> Vec<(usize, String)> {
    let mut records = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (i, line) in text.lines().enumerate() {
        let (start, mut buf) = match current.take() {
            Some((start, mut buf)) => {
                buf.push('\n');
                (start, buf)
            }
            None => (i + 1, String::new()),
        };
        buf.push_str(line);

        if scan_record(&buf).1 {
            current = Some((start, buf));
        } else {
            records.push((start, buf));
        }
    }

    if let Some(unterminated) = current {
        records.push(unterminated);
    }
    records
}

/// Split one CSV record into fields. A field that opens with `"` may contain
/// commas and line breaks, and `""` inside it is an escaped quote. A quote
/// anywhere else is literal text.
pub fn split_csv_line(line: &str) -> Vec<String> {
    scan_record(line).0
}

/// Fields of `line`, and whether it ends inside an open quoted field.
fn scan_record(line: &str) -> (Vec<String>, bool) {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if !started => {
                in_quotes = true;
                started = true;
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                started = false;
            }
            _ => {
                started |= !c.is_whitespace();
                field.push(c);
            }
        }
    }
    fields.push(field);
    (fields, in_quotes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_and_quoted_fields() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(
            split_csv_line(r#""Hello, world","She said ""hi""",x"#),
            vec!["Hello, world", r#"She said "hi""#, "x"]
        );
        assert_eq!(split_csv_line("a,,"), vec!["a", "", ""]);
    }

    #[test]
    fn parses_rows_positionally_and_skips_header() {
        let csv = "question,answer,deck,difficulty\n\
                   What is 2+2?,4,Math,easy\n\
                   \"Capital, France\",Paris\n\
                   only-one-field\n\
                   \n";
        let batch = CsvParser.parse(csv.as_bytes()).unwrap();

        assert_eq!(batch.flashcards.len(), 2);
        assert_eq!(batch.flashcards[0].deck, "Math");
        assert_eq!(batch.flashcards[0].difficulty, Difficulty::Easy);
        assert_eq!(batch.flashcards[1].question, "Capital, France");
        assert_eq!(batch.flashcards[1].deck, "General");
        assert_eq!(batch.flashcards[1].difficulty, Difficulty::Medium);
        assert_eq!(batch.warnings, vec!["line 4: needs at least a question and an answer"]);
    }

    #[test]
    fn header_is_skipped_even_without_keywords() {
        let batch = CsvParser.parse(b"Q1,A1\nQ2,A2").unwrap();
        assert_eq!(batch.flashcards.len(), 1);
        assert_eq!(batch.flashcards[0].question, "Q2");
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let csv = "front,back\n\"Line one\nline two\",answer\n";
        let batch = CsvParser.parse(csv.as_bytes()).unwrap();
        assert_eq!(batch.flashcards[0].question, "Line one\nline two");
    }

    #[test]
    fn stray_quote_inside_a_field_is_literal() {
        let csv = "question,answer\nScreen size?,15\" laptop\nQ2 here,A2\nQ3 here,A3\nQ4 here,A4";
        let batch = CsvParser.parse(csv.as_bytes()).unwrap();

        assert_eq!(batch.flashcards.len(), 4);
        assert_eq!(batch.flashcards[0].answer, "15\" laptop");
        assert_eq!(batch.flashcards[3].question, "Q4 here");
        assert!(batch.warnings.is_empty());
    }

    #[test]
    fn quote_after_leading_space_still_opens_a_field() {
        assert_eq!(split_csv_line(r#"a, "b,c",d"#), vec!["a", " b,c", "d"]);
        assert_eq!(split_csv_line(r#"say "hi",x"#), vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn rejects_file_without_data_rows() {
        let err = CsvParser.parse(b"question,answer").unwrap_err();
        assert!(err.is_format_error());
        assert!(CsvParser.parse(b"").is_err());
    }
}
