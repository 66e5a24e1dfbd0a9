use crate::error::IngestError;
use crate::extractor::{ExtractedPage, PdfExtractor};
use crate::metadata::load_sidecar_metadata;
use crate::models::{Metadata, MetadataValue, PageRecord, SourceDocument, SOURCE_KEY};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Lists the PDFs directly inside `folder`, sorted by path. Subdirectories
/// are not searched; the corpus is a flat directory.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.exists() {
        return Err(IngestError::CorpusNotFound {
            path: folder.to_path_buf(),
        });
    }
    if !folder.is_dir() {
        return Err(IngestError::NotADirectory {
            path: folder.to_path_buf(),
        });
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CorpusReport {
    pub pages: Vec<PageRecord>,
    pub loaded_documents: usize,
    pub skipped_documents: Vec<SkippedDocument>,
}

/// Loads every PDF page in `folder`. See [`load_corpus_with_report`].
pub fn load_corpus<X: PdfExtractor>(
    folder: &Path,
    extractor: &X,
) -> Result<Vec<PageRecord>, IngestError> {
    Ok(load_corpus_with_report(folder, extractor)?.pages)
}

/// Loads every PDF page in `folder`, merging sidecar metadata into each page.
///
/// A missing directory is an error. An empty directory is not: it yields an
/// empty report and a warning. Documents the extractor cannot read are
/// logged, recorded in the report, and skipped.
pub fn load_corpus_with_report<X: PdfExtractor>(
    folder: &Path,
    extractor: &X,
) -> Result<CorpusReport, IngestError> {
    let files = discover_pdf_files(folder)?;

    if files.is_empty() {
        warn!(folder = %folder.display(), "no pdf files found in corpus directory");
        return Ok(CorpusReport::default());
    }

    info!(folder = %folder.display(), files = files.len(), "loading corpus");

    let mut report = CorpusReport::default();

    for path in files {
        let document = SourceDocument {
            metadata: load_sidecar_metadata(&path),
            path: absolute_path(&path),
        };

        match extractor.extract_pages(&document.path) {
            Ok(extracted) => {
                debug!(
                    path = %document.path.display(),
                    pages = extracted.len(),
                    sidecar_keys = document.metadata.len(),
                    "loaded document"
                );
                report.pages.extend(page_records(&document, extracted));
                report.loaded_documents += 1;
            }
            Err(error) => {
                warn!(path = %document.path.display(), %error, "skipping unreadable pdf");
                report.skipped_documents.push(SkippedDocument {
                    path: document.path,
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        documents = report.loaded_documents,
        skipped = report.skipped_documents.len(),
        pages = report.pages.len(),
        "corpus loaded"
    );

    Ok(report)
}

fn page_records(document: &SourceDocument, extracted: Vec<ExtractedPage>) -> Vec<PageRecord> {
    let source = document.path.to_string_lossy().to_string();

    extracted
        .into_iter()
        .map(|page| PageRecord {
            text: page.text,
            metadata: merge_metadata(page.metadata, &document.metadata, &source),
        })
        .collect()
}

/// Sidecar keys replace parser keys of the same name; `source` always ends
/// up as the document path.
pub fn merge_metadata(native: Metadata, sidecar: &Metadata, source: &str) -> Metadata {
    let mut merged = native;
    for (key, value) in sidecar {
        merged.insert(key.clone(), value.clone());
    }
    merged.insert(SOURCE_KEY.to_string(), MetadataValue::Text(source.to_string()));
    merged
}

fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
