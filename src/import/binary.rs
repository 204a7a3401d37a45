//! Document formats that are accepted by extension but not extracted.

use super::{FileKind, FormatParser};
use crate::error::ImportError;
use crate::models::ImportBatch;

pub struct Unsupported(pub FileKind);

pub static UNSUPPORTED_PDF: Unsupported = Unsupported(FileKind::Pdf);
pub static UNSUPPORTED_DOCX: Unsupported = Unsupported(FileKind::Docx);

impl FormatParser for Unsupported {
    fn parse(&self, _bytes: &[u8]) -> Result<ImportBatch, ImportError> {
        Err(ImportError::NotImplemented(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_and_docx_always_fail() {
        for kind in [FileKind::Pdf, FileKind::Docx] {
            let err = kind.parser().parse(b"%PDF-1.7").unwrap_err();
            assert!(matches!(err, ImportError::NotImplemented(k) if k == kind));
        }
        assert_eq!(
            UNSUPPORTED_DOCX.parse(b"").unwrap_err().to_string(),
            "DOCX import is not implemented yet"
        );
    }
}
