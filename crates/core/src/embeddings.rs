use crate::error::SearchError;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Text to vector. An index must be queried with the same embedder (same
/// model, same dimensionality) it was built with; nothing checks this beyond
/// vector length.
pub trait Embedder {
    /// Identifies the model, recorded alongside a persisted index.
    fn model_id(&self) -> String;

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        texts.iter().map(|text| self.embed_query(text)).collect()
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn model_id(&self) -> String {
        (**self).model_id()
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        (**self).embed_query(text)
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        (**self).embed_documents(texts)
    }
}

/// Hashed character-trigram embedding. Deterministic and offline, which
/// makes it the embedder of choice for tests and air-gapped runs.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl CharacterNgramEmbedder {
    /// Each word is padded with a boundary marker on both sides and cut
    /// into trigrams, so `"heart"` and `"hearth"` share most features but
    /// punctuation, case and line breaks from PDF extraction do not matter.
    /// A trigram adds or subtracts one in its bucket depending on the top
    /// bit of its hash; the result is L2-normalised.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let buckets = vector.len() as u64;

        for word in words(text) {
            let padded = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect::<Vec<_>>();

            for trigram in padded.windows(3) {
                let hash = fnv1a(trigram);
                let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
                vector[(hash % buckets) as usize] += sign;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }

        vector
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(chars: &[char]) -> u64 {
    let mut buffer = [0u8; 4];
    chars.iter().fold(FNV_OFFSET, |hash, ch| {
        ch.encode_utf8(&mut buffer)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
    })
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> String {
        format!("char-trigram-{}", self.dimensions.max(1))
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed(text))
    }
}
