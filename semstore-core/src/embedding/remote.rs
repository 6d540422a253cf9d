//! HTTP embedding backends (Ollama and OpenAI-compatible services).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::error::{Error, Result};

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Request/response dialect of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteApi {
    /// `POST {endpoint}/api/embeddings` with `{model, prompt}`.
    #[serde(rename = "ollama")]
    Ollama,
    /// `POST {endpoint}/embeddings` with `{model, input}` and a bearer token.
    #[serde(rename = "openai")]
    OpenAi,
}

impl FromStr for RemoteApi {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(RemoteApi::Ollama),
            "openai" | "open_ai" | "open-ai" => Ok(RemoteApi::OpenAi),
            other => Err(Error::Configuration(format!(
                "unknown embedding api '{}', expected ollama or openai",
                other
            ))),
        }
    }
}

/// Settings for [`RemoteEmbedder`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEmbedderConfig {
    pub api: RemoteApi,
    pub endpoint: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub dimension: usize,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl RemoteEmbedderConfig {
    /// A local Ollama server on its default port.
    pub fn ollama(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            api: RemoteApi::Ollama,
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: model.into(),
            api_key: None,
            dimension,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// The OpenAI embeddings API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            api: RemoteApi::OpenAi,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            model: model.into(),
            api_key: Some(api_key.into()),
            dimension,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Overrides the endpoint. Chainable.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the API key. Chainable.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the per-request timeout. Chainable.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reads `SEMSTORE_EMBED_API`, `SEMSTORE_EMBED_ENDPOINT`,
    /// `SEMSTORE_EMBED_MODEL`, `SEMSTORE_EMBED_API_KEY` and
    /// `SEMSTORE_EMBED_DIM`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api: RemoteApi = lookup("SEMSTORE_EMBED_API")
            .as_deref()
            .unwrap_or("ollama")
            .parse()?;
        let model = lookup("SEMSTORE_EMBED_MODEL").ok_or_else(|| {
            Error::Configuration("SEMSTORE_EMBED_MODEL is not set".into())
        })?;
        let dimension = match lookup("SEMSTORE_EMBED_DIM") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Configuration(format!("SEMSTORE_EMBED_DIM '{}' is not a number", raw))
            })?,
            None => {
                return Err(Error::Configuration(
                    "SEMSTORE_EMBED_DIM is not set".into(),
                ))
            }
        };

        let mut config = match api {
            RemoteApi::Ollama => Self::ollama(model, dimension),
            RemoteApi::OpenAi => {
                let key = lookup("SEMSTORE_EMBED_API_KEY").ok_or_else(|| {
                    Error::Configuration(
                        "SEMSTORE_EMBED_API_KEY is required for the openai embedding api".into(),
                    )
                })?;
                Self::openai(key, model, dimension)
            }
        };
        if let Some(endpoint) = lookup("SEMSTORE_EMBED_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Configuration("embedding endpoint is empty".into()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "embedding endpoint '{}' must be an http(s) URL",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Configuration("embedding model is empty".into()));
        }
        if self.dimension == 0 {
            return Err(Error::Configuration(
                "embedding dimension must be at least 1".into(),
            ));
        }
        if self.api == RemoteApi::OpenAi
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(Error::Configuration(
                "an API key is required for the openai embedding api".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteEmbedderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEmbedderConfig")
            .field("api", &self.api)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("dimension", &self.dimension)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f64>,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f64>,
}

/// Embedder backed by an HTTP service.
#[derive(Debug)]
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: RemoteEmbedderConfig,
}

impl RemoteEmbedder {
    pub fn new(config: RemoteEmbedderConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Configuration(format!("http client setup failed: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteEmbedderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn embed_ollama(&self, text: &str) -> Result<Vec<f64>> {
        let response = self
            .client
            .post(self.url("api/embeddings"))
            .json(&OllamaRequest {
                model: &self.config.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let body: OllamaResponse = response.json().await.map_err(map_reqwest_error)?;
        Ok(body.embedding)
    }

    async fn embed_openai(&self, text: &str) -> Result<Vec<f64>> {
        let mut request = self.client.post(self.url("embeddings")).json(&OpenAiRequest {
            model: &self.config.model,
            input: text,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        let body: OpenAiResponse = response.json().await.map_err(map_reqwest_error)?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("response contained no embedding".into()))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let raw = match self.config.api {
            RemoteApi::Ollama => self.embed_ollama(text).await?,
            RemoteApi::OpenAi => self.embed_openai(text).await?,
        };
        tracing::debug!(model = %self.config.model, len = raw.len(), "remote embedding received");
        Ok(raw.into_iter().map(|x| x as f32).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &str {
        match self.config.api {
            RemoteApi::Ollama => "ollama",
            RemoteApi::OpenAi => "openai",
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Maps an HTTP failure onto the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> Error {
    let detail = if body.is_empty() {
        format!("embedding service returned {}", status)
    } else {
        let snippet: String = body.chars().take(200).collect();
        format!("embedding service returned {}: {}", status, snippet)
    };
    match status.as_u16() {
        400 | 413 | 422 => Error::InvalidInput(detail),
        401 | 403 | 404 => Error::Configuration(detail),
        408 | 429 => Error::Transient(detail),
        s if s >= 500 => Error::Transient(detail),
        _ => Error::Embedding(detail),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::Transient(format!("embedding request failed: {}", err))
    } else if err.is_decode() {
        Error::Embedding(format!("malformed embedding response: {}", err))
    } else if err.is_builder() {
        Error::Configuration(format!("invalid embedding request: {}", err))
    } else {
        Error::Embedding(err.to_string())
    }
}
