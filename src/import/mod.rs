//! File-format detection and parser dispatch.
//!
//! The file kind is resolved once from the file name; every later step
//! works off the [`FileKind`] and its [`FormatParser`].

pub mod binary;
pub mod csv;
pub mod json;
pub mod schema;
pub mod txt;
pub mod xml;

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::ImportError;
use crate::models::ImportBatch;

/// Input formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Json,
    Xml,
    Csv,
    Txt,
    Pdf,
    Docx,
}

impl FileKind {
    pub const ALL: [FileKind; 6] = [
        FileKind::Json,
        FileKind::Xml,
        FileKind::Csv,
        FileKind::Txt,
        FileKind::Pdf,
        FileKind::Docx,
    ];

    /// Sniff the kind from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self, ImportError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        Self::ALL
            .into_iter()
            .find(|kind| kind.extension() == ext)
            .ok_or_else(|| {
                if ext.is_empty() {
                    ImportError::UnsupportedFormat(name.to_string())
                } else {
                    ImportError::UnsupportedFormat(format!(".{}", ext))
                }
            })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// The parser strategy for this kind.
    pub fn parser(&self) -> &'static dyn FormatParser {
        match self {
            Self::Json => &json::JsonParser,
            Self::Xml => &xml::XmlParser,
            Self::Csv => &csv::CsvParser,
            Self::Txt => &txt::TxtParser,
            Self::Pdf => &binary::UNSUPPORTED_PDF,
            Self::Docx => &binary::UNSUPPORTED_DOCX,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

/// Converts raw file bytes into a normalized batch. Implementations are pure:
/// parsing never touches any storage tier, so the same call serves both the
/// dry-run analysis and the commit path.
pub trait FormatParser: Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch, ImportError>;
}

/// A file picked for import.
#[derive(Debug, Clone)]
pub struct ImportFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk.
    pub fn read(path: &Path) -> Result<Self, ImportError> {
        let bytes = fs::read(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn kind(&self) -> Result<FileKind, ImportError> {
        FileKind::from_file_name(&self.name)
    }

    /// Resolve the parser and run it.
    pub fn parse(&self) -> Result<ImportBatch, ImportError> {
        self.kind()?.parser().parse(&self.bytes)
    }
}

/// Decode file bytes as UTF-8 text, tolerating a leading byte-order mark.
pub(crate) fn decode_text(bytes: &[u8]) -> Result<&str, ImportError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ImportError::Unreadable(format!("not valid UTF-8 text ({})", e)))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}
