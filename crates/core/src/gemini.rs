//! Google Generative Language embedding client.

use crate::embeddings::Embedder;
use crate::error::SearchError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const MODEL_ENV: &str = "GEMINI_EMBEDDING_MODEL";
pub const BASE_URL_ENV: &str = "GEMINI_BASE_URL";
pub const DEFAULT_MODEL: &str = "models/embedding-001";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Upper bound the API accepts for one `batchEmbedContents` call.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub batch_size: usize,
}

impl GeminiConfig {
    /// Reads `GOOGLE_API_KEY` (required), `GEMINI_EMBEDDING_MODEL` and
    /// `GEMINI_BASE_URL`.
    pub fn from_env() -> Result<Self, SearchError> {
        let api_key =
            non_empty_env(API_KEY_ENV).ok_or(SearchError::MissingCredentials(API_KEY_ENV))?;

        Ok(Self {
            api_key,
            model: non_empty_env(MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty_env(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(30),
            max_retries: 4,
            batch_size: MAX_BATCH_SIZE,
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

/// Blocking client for the `embedContent` and `batchEmbedContents` endpoints.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    config: GeminiConfig,
}

impl GeminiEmbedder {
    pub fn new(config: GeminiConfig) -> Result<Self, SearchError> {
        if config.api_key.trim().is_empty() {
            return Err(SearchError::MissingCredentials(API_KEY_ENV));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, SearchError> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn request<'a>(&'a self, text: &'a str, task_type: TaskType) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.config.model,
            content: Content {
                parts: vec![Part { text }],
            },
            task_type,
        }
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R, SearchError> {
        let url = self.endpoint(method);
        let mut attempt = 0usize;

        loop {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.config.api_key)
                .json(body)
                .send();

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(resp.json()?),
                Ok(resp) => {
                    let status = resp.status();
                    let details = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.config.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request throttled, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(SearchError::BackendResponse {
                        backend: "gemini".to_string(),
                        details: format!("{status}: {details}"),
                    });
                }
                Err(error) => {
                    if (error.is_timeout() || error.is_connect())
                        && attempt + 1 < self.config.max_retries
                    {
                        attempt += 1;
                        warn!(%error, attempt, "embedding request failed, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(error.into());
                }
            }
        }
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.request(text, TaskType::RetrievalDocument))
                .collect(),
        };
        let parsed: BatchEmbedResponse = self.post("batchEmbedContents", &body)?;

        if parsed.embeddings.len() != texts.len() {
            return Err(SearchError::Embedding(format!(
                "gemini returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }

        Ok(parsed
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

impl Embedder for GeminiEmbedder {
    fn model_id(&self) -> String {
        self.config.model.clone()
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let body = self.request(text, TaskType::RetrievalQuery);
        let parsed: EmbedContentResponse = self.post("embedContent", &body)?;
        Ok(parsed.embedding.values)
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let batch_size = self.config.batch_size.clamp(1, MAX_BATCH_SIZE);
        let mut vectors = Vec::with_capacity(texts.len());

        for (index, batch) in texts.chunks(batch_size).enumerate() {
            debug!(batch = index, size = batch.len(), "embedding batch");
            vectors.extend(self.embed_batch(batch)?);
        }

        Ok(vectors)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}
