pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, EmbeddingConfig, LLMConfig, LLMProvider};
use async_trait::async_trait;
use gemini::GeminiClient;
use ollama::OllamaClient;
use openai::OpenAIClient;
use std::time::Duration;

/// The two model capabilities the generator consumes.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// Routes chat completion and embedding calls to the configured providers.
pub struct RouterClient {
    llm: LLMConfig,
    embedding: EmbeddingConfig,
    openai: OpenAIClient,
    ollama: OllamaClient,
    gemini: GeminiClient,
}

impl RouterClient {
    pub fn new(llm: LLMConfig, mut embedding: EmbeddingConfig) -> Result<Self> {
        if embedding.api_key.is_none() {
            embedding.api_key = llm.api_key.clone();
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            llm,
            embedding,
            openai: OpenAIClient::new(http.clone()),
            ollama: OllamaClient::new(http.clone()),
            gemini: GeminiClient::new(http),
        })
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        match self.llm.provider {
            LLMProvider::Gemini => self.gemini.chat(&self.llm, messages, temperature).await,
            LLMProvider::Ollama => self.ollama.chat(&self.llm, messages, temperature).await,
            _ => self.openai.chat(&self.llm, messages, temperature).await,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match self.embedding.provider {
            LLMProvider::Gemini => self.gemini.embed(&self.embedding, text).await?,
            LLMProvider::Ollama => self.ollama.embed(&self.embedding, text).await?,
            _ => self.openai.embed(&self.embedding, text).await?,
        };
        if embedding.is_empty() {
            return Err(AppError::Rag("Empty embedding response".to_string()));
        }
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = match self.embedding.provider {
            LLMProvider::Gemini | LLMProvider::Ollama => {
                let mut embeddings = Vec::with_capacity(texts.len());
                for text in texts {
                    embeddings.push(self.embed(text).await?);
                }
                return Ok(embeddings);
            }
            _ => self.openai.embed_batch(&self.embedding, texts).await?,
        };
        if embeddings.iter().any(Vec::is_empty) {
            return Err(AppError::Rag("Empty embedding response".to_string()));
        }
        Ok(embeddings)
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Reads a non-success response body into an error message.
pub(crate) async fn describe_failure(response: reqwest::Response, url: &str) -> String {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    format!("API returned error {} (URL: {}): {}", status, url, text)
}
