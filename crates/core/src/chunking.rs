use crate::config::RetrieverConfig;
use crate::error::IngestError;
use crate::models::{ChunkRecord, MetadataValue, PageRecord, START_INDEX_KEY};
use std::collections::VecDeque;
use std::ops::Range;

/// Boundaries tried in order: paragraph, line, sentence, word. When none of
/// them yields pieces small enough the text is cut between characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl TryFrom<&RetrieverConfig> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &RetrieverConfig) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// A chunk of page text with its character offset in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub text: String,
}

/// Boundary-aware splitter. Lengths and offsets are counted in characters.
///
/// Text is cut at the coarsest separator it contains; separators stay
/// attached to the piece they end. Consecutive pieces of the same level are
/// packed into windows, and each new window starts with the tail of the
/// previous one, up to `chunk_overlap` characters. Pieces still longer than
/// `chunk_size` are split again with the next separator, down to single
/// characters.
#[derive(Debug, Clone)]
pub struct RecursiveTextSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveTextSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|sep| sep.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        self.split_range(text, 0..text.len(), &self.separators, &mut spans);
        spans
    }

    /// Splits every page, giving each chunk the page metadata plus
    /// `start_index`. Output keeps page order, then left-to-right order.
    pub fn split_pages(&self, pages: &[PageRecord]) -> Vec<ChunkRecord> {
        let mut chunks = Vec::new();

        for page in pages {
            for span in self.split_text(&page.text) {
                let mut metadata = page.metadata.clone();
                metadata.insert(
                    START_INDEX_KEY.to_string(),
                    MetadataValue::Integer(span.start as i64),
                );
                chunks.push(ChunkRecord {
                    text: span.text,
                    metadata,
                });
            }
        }

        chunks
    }

    /// Cuts `range` at the coarsest separator it contains. Pieces that fit
    /// are packed with their siblings; an oversized piece closes the current
    /// run and is split again with the finer separators.
    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[String],
        spans: &mut Vec<TextSpan>,
    ) {
        let segment = &text[range.clone()];
        if segment.trim().is_empty() {
            return;
        }
        if char_len(segment) <= self.config.chunk_size {
            self.merge_pieces(text, &[range], spans);
            return;
        }

        let level = separators
            .iter()
            .position(|sep| sep.is_empty() || segment.contains(sep.as_str()));

        let (parts, finer) = match level {
            Some(level) if !separators[level].is_empty() => (
                split_on(range.start, segment, &separators[level]),
                &separators[level + 1..],
            ),
            _ => (split_chars(range.start, segment), &[][..]),
        };

        let mut siblings = Vec::new();
        for part in parts {
            if char_len(&text[part.clone()]) <= self.config.chunk_size {
                siblings.push(part);
            } else {
                self.merge_pieces(text, &siblings, spans);
                siblings.clear();
                self.split_range(text, part, finer, spans);
            }
        }
        self.merge_pieces(text, &siblings, spans);
    }

    fn merge_pieces(&self, text: &str, pieces: &[Range<usize>], spans: &mut Vec<TextSpan>) {
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let length = char_len(&text[piece.clone()]);

            if total + length > self.config.chunk_size && !window.is_empty() {
                push_window(text, &window, spans);

                while total > self.config.chunk_overlap
                    || (total + length > self.config.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece.clone(), length));
            total += length;
        }

        if !window.is_empty() {
            push_window(text, &window, spans);
        }
    }
}

fn push_window(text: &str, window: &VecDeque<(Range<usize>, usize)>, spans: &mut Vec<TextSpan>) {
    let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) else {
        return;
    };

    let raw = &text[first.start..last.end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }

    let leading = raw.len() - raw.trim_start().len();
    let byte_start = first.start + leading;
    spans.push(TextSpan {
        start: char_len(&text[..byte_start]),
        text: trimmed.to_string(),
    });
}

/// Absolute ranges of `segment`'s pieces, each keeping the separator that
/// ends it.
fn split_on(base: usize, segment: &str, separator: &str) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut cursor = 0;
    for (offset, matched) in segment.match_indices(separator) {
        let end = offset + matched.len();
        parts.push(base + cursor..base + end);
        cursor = end;
    }
    if cursor < segment.len() {
        parts.push(base + cursor..base + segment.len());
    }
    parts
}

fn split_chars(base: usize, segment: &str) -> Vec<Range<usize>> {
    segment
        .char_indices()
        .map(|(offset, ch)| base + offset..base + offset + ch.len_utf8())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
