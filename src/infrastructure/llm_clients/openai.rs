use super::{describe_failure, join_url};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, EmbeddingConfig, LLMConfig, LLMProvider};
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a, T: Serialize + ?Sized> {
    model: &'a str,
    input: &'a T,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible chat and embedding endpoints, including Azure deployments.
pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn endpoint(
        provider: LLMProvider,
        base_url: &str,
        model: &str,
        api_version: Option<&str>,
        operation: &str,
    ) -> String {
        if provider == LLMProvider::Azure {
            let path = format!("openai/deployments/{}/{}", model, operation);
            format!(
                "{}?api-version={}",
                join_url(base_url, &path),
                api_version.unwrap_or(DEFAULT_AZURE_API_VERSION)
            )
        } else {
            join_url(base_url, operation)
        }
    }

    fn authorize(
        request: reqwest::RequestBuilder,
        provider: LLMProvider,
        api_key: Option<&String>,
    ) -> reqwest::RequestBuilder {
        match (provider, api_key) {
            (LLMProvider::Azure, Some(key)) => request.header("api-key", key),
            (_, Some(key)) => request.bearer_auth(key),
            (_, None) => request,
        }
    }

    pub async fn chat(
        &self,
        config: &LLMConfig,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String> {
        let url = Self::endpoint(
            config.provider,
            &config.base_url,
            &config.model,
            config.api_version.as_deref(),
            "chat/completions",
        );

        let body = json!({
            "model": config.model,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
                .collect::<Vec<_>>(),
            "max_tokens": config.max_tokens,
            "temperature": temperature,
        });

        let request = Self::authorize(
            self.client.post(&url),
            config.provider,
            config.api_key.as_ref(),
        );
        let response = request
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

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Llm("Invalid response format".to_string()))
    }

    pub async fn embed(&self, config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
        self.request_embeddings(config, text)
            .await?
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::Rag("No embedding data in response".to_string()))
    }

    /// Embeds all `texts` with one request, in input order.
    pub async fn embed_batch(
        &self,
        config: &EmbeddingConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = self.request_embeddings(config, texts).await?;
        if data.len() != texts.len() {
            return Err(AppError::Rag(format!(
                "Embedding API returned {} vector(s) for {} input(s)",
                data.len(),
                texts.len()
            )));
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn request_embeddings<T: Serialize + ?Sized + Sync>(
        &self,
        config: &EmbeddingConfig,
        input: &T,
    ) -> Result<Vec<EmbeddingData>> {
        let url = Self::endpoint(
            config.provider,
            &config.base_url,
            &config.model,
            config.api_version.as_deref(),
            "embeddings",
        );

        let request = Self::authorize(
            self.client.post(&url),
            config.provider,
            config.api_key.as_ref(),
        );
        let response = request
            .json(&EmbeddingRequest {
                model: &config.model,
                input,
            })
            .send()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to call embedding API ({}): {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Rag(describe_failure(response, &url).await));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to parse embedding response: {}", e)))?;
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm_config(base_url: String) -> LLMConfig {
        LLMConfig {
            provider: LLMProvider::OpenAI,
            base_url,
            model: "gpt-test".to_string(),
            api_key: Some("sk-test".to_string()),
            ..LLMConfig::default()
        }
    }

    #[test]
    fn test_azure_endpoint_uses_deployment_and_version() {
        let url = OpenAIClient::endpoint(
            LLMProvider::Azure,
            "https://example.openai.azure.com/",
            "gpt4",
            None,
            "chat/completions",
        );
        assert_eq!(
            url,
            "https://example.openai.azure.com/openai/deployments/gpt4/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"name\":\"x\"}"}}]
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let config = llm_config(format!("{}/v1", server.uri()));
        let content = client
            .chat(&config, &[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap();
        assert_eq!(content, "{\"name\":\"x\"}");
    }

    #[tokio::test]
    async fn test_chat_maps_http_failure_to_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let config = llm_config(format!("{}/v1", server.uri()));
        let err = client
            .chat(&config, &[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(ref msg) if msg.contains("429")));
    }

    #[tokio::test]
    async fn test_embed_reads_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.25, 0.5, 0.75]}]
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let config = EmbeddingConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".to_string()),
            ..EmbeddingConfig::default()
        };
        let embedding = client.embed(&config, "hello").await.unwrap();
        assert_eq!(embedding, vec![0.25, 0.5, 0.75]);
    }

    #[tokio::test]
    async fn test_embed_batch_sends_one_request_and_keeps_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({"input": ["first", "second"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let config = EmbeddingConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".to_string()),
            ..EmbeddingConfig::default()
        };
        let texts = vec!["first".to_string(), "second".to_string()];
        let embeddings = client.embed_batch(&config, &texts).await.unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_batch_rejects_short_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(reqwest::Client::new());
        let config = EmbeddingConfig {
            base_url: format!("{}/v1", server.uri()),
            ..EmbeddingConfig::default()
        };
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = client.embed_batch(&config, &texts).await.unwrap_err();
        assert!(matches!(err, AppError::Rag(_)));
    }
}
