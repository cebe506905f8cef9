use super::{describe_failure, join_url};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, EmbeddingConfig, LLMConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Ollama serves its native API from the root, not from the OpenAI `/v1` prefix.
    fn api_root(base_url: &str) -> &str {
        base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .trim_end_matches('/')
    }

    pub async fn chat(
        &self,
        config: &LLMConfig,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String> {
        let url = join_url(Self::api_root(&config.base_url), "api/chat");
        let body = json!({
            "model": config.model,
            "stream": false,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
                .collect::<Vec<_>>(),
            "options": {
                "temperature": temperature,
                "num_predict": config.max_tokens,
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Request failed ({}): {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Llm(describe_failure(response, &url).await));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse JSON: {}", e)))?;

        json["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Llm("Invalid response format".to_string()))
    }

    pub async fn embed(&self, config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
        let url = join_url(Self::api_root(&config.base_url), "api/embeddings");

        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: &config.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to call embedding API ({}): {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Rag(describe_failure(response, &url).await));
        }

        let parsed: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to parse embedding response: {}", e)))?;

        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_api_root_strips_openai_prefix() {
        assert_eq!(
            OllamaClient::api_root("http://localhost:11434/v1/"),
            "http://localhost:11434"
        );
        assert_eq!(
            OllamaClient::api_root("http://localhost:11434"),
            "http://localhost:11434"
        );
    }

    #[tokio::test]
    async fn test_chat_reads_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "{}"}
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(reqwest::Client::new());
        let config = LLMConfig {
            base_url: format!("{}/v1", server.uri()),
            model: "llama3".to_string(),
            ..LLMConfig::default()
        };
        let content = client
            .chat(&config, &[ChatMessage::user("hi")], 0.7)
            .await
            .unwrap();
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn test_embed_failure_is_rag_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new(reqwest::Client::new());
        let config = EmbeddingConfig {
            base_url: server.uri(),
            model: "nomic-embed-text".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = client.embed(&config, "text").await.unwrap_err();
        assert!(matches!(err, AppError::Rag(_)));
    }
}
