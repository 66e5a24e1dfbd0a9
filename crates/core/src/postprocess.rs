//! Shaping search results for a language-model prompt.

use crate::models::{ChunkRecord, MetadataValue, ScoredChunk, PAGE_KEY, SOURCE_KEY};
use std::collections::BTreeSet;

pub const NO_RESULTS: &str = "No relevant documents found.";

/// Anything that wraps a retrieved chunk.
pub trait AsChunk {
    fn as_chunk(&self) -> &ChunkRecord;
}

impl AsChunk for ChunkRecord {
    fn as_chunk(&self) -> &ChunkRecord {
        self
    }
}

impl AsChunk for ScoredChunk {
    fn as_chunk(&self) -> &ChunkRecord {
        &self.chunk
    }
}

/// Moves the best results to both ends of the list: even positions in
/// order, then odd positions in reverse, so `[0, 1, 2, 3, 4, 5]` becomes
/// `[0, 2, 4, 5, 3, 1]`.
///
/// Assumes `results` is already sorted by descending relevance; it does not
/// look at scores.
pub fn reorder<T: Clone>(results: &[T]) -> Vec<T> {
    let evens = results.iter().step_by(2);
    let odds = results.iter().skip(1).step_by(2).rev();
    evens.chain(odds).cloned().collect()
}

/// Renders results as numbered blocks with a `[file, Page n]` citation,
/// separated by blank lines.
pub fn format_with_citations<T: AsChunk>(results: &[T]) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            let chunk = result.as_chunk();
            format!(
                "--- Document {} ---\nCitation: {}\nContent: {}",
                index + 1,
                citation(chunk),
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `[doc.pdf, Page 3]` for a chunk from the third page of `/any/dir/doc.pdf`.
pub fn citation(chunk: &ChunkRecord) -> String {
    let source = chunk
        .metadata
        .get(SOURCE_KEY)
        .map(ToString::to_string)
        .unwrap_or_else(|| "Unknown".to_string());

    let page = match chunk.metadata.get(PAGE_KEY) {
        Some(MetadataValue::Integer(page)) => match page.checked_add(1) {
            Some(number) => format!("Page {number}"),
            None => "Page N/A".to_string(),
        },
        _ => "Page N/A".to_string(),
    };

    format!("[{}, {}]", file_name(&source), page)
}

fn file_name(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

/// Collects the distinct values of `field` across results. List values
/// contribute their elements; absent and empty values are skipped.
pub fn extract_metadata_field<T: AsChunk>(results: &[T], field: &str) -> BTreeSet<String> {
    let mut values = BTreeSet::new();

    for result in results {
        match result.as_chunk().metadata.get(field) {
            Some(value) if value.is_truthy() => collect_values(value, &mut values),
            _ => {}
        }
    }

    values
}

fn collect_values(value: &MetadataValue, values: &mut BTreeSet<String>) {
    match value {
        MetadataValue::Null => {}
        MetadataValue::List(items) => {
            for item in items {
                collect_values(item, values);
            }
        }
        scalar => {
            values.insert(scalar.to_string());
        }
    }
}
