use crate::error::IngestError;
use crate::models::{Metadata, MetadataValue, PAGE_KEY};
use lopdf::{Dictionary, Document, Object};
use std::fmt::Display;
use std::path::Path;
use tracing::warn;

/// Document-info entries copied onto every page, keyed by the name they get
/// in page metadata.
const INFO_FIELDS: [(&[u8], &str); 7] = [
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Subject", "subject"),
    (b"Producer", "producer"),
    (b"Creator", "creator"),
    (b"CreationDate", "creationdate"),
    (b"ModDate", "moddate"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub text: String,
    pub metadata: Metadata,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<ExtractedPage>, IngestError>;
}

impl<T: PdfExtractor + ?Sized> PdfExtractor for &T {
    fn extract_pages(&self, path: &Path) -> Result<Vec<ExtractedPage>, IngestError> {
        (**self).extract_pages(path)
    }
}

/// Page extraction backed by `lopdf`. Every page is emitted, including ones
/// without a text layer or with content `lopdf` cannot decode, so `page`
/// stays aligned with the physical page. Only a file that does not load or
/// has no pages is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<ExtractedPage>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let info = document_info(&document);
        let page_numbers = document.get_pages().into_keys().collect::<Vec<_>>();
        let total_pages = page_numbers.len() as i64;

        if page_numbers.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        let mut pages = Vec::with_capacity(page_numbers.len());
        for (index, page_no) in page_numbers.into_iter().enumerate() {
            let text = text_or_empty(document.extract_text(&[page_no]), path, index);

            let mut metadata = info.clone();
            metadata.insert(PAGE_KEY.to_string(), MetadataValue::Integer(index as i64));
            metadata.insert(
                "total_pages".to_string(),
                MetadataValue::Integer(total_pages),
            );
            metadata.insert(
                "page_label".to_string(),
                MetadataValue::Text((index + 1).to_string()),
            );

            pages.push(ExtractedPage { text, metadata });
        }

        Ok(pages)
    }
}

fn text_or_empty<E: Display>(extracted: Result<String, E>, path: &Path, index: usize) -> String {
    match extracted {
        Ok(text) => text,
        Err(error) => {
            warn!(path = %path.display(), page = index, %error, "page text unreadable, keeping it empty");
            String::new()
        }
    }
}

fn document_info(document: &Document) -> Metadata {
    let mut metadata = Metadata::new();

    let Some(info) = info_dictionary(document) else {
        return metadata;
    };

    for (pdf_key, metadata_key) in INFO_FIELDS {
        let value = info
            .get(pdf_key)
            .ok()
            .and_then(|object| object.as_str().ok())
            .map(decode_pdf_string)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        if let Some(value) = value {
            metadata.insert(metadata_key.to_string(), MetadataValue::Text(value));
        }
    }

    metadata
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        Object::Dictionary(dictionary) => Some(dictionary),
        _ => None,
    }
}

/// PDF text strings are either UTF-16BE with a byte-order mark or a
/// single-byte encoding; the latter is read as Latin-1.
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|byte| char::from(*byte)).collect(),
    }
}
