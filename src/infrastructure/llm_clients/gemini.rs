use super::describe_failure;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, ChatRole, EmbeddingConfig, LLMConfig};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: String,
}

#[derive(Serialize)]
struct GeminiEmbeddingRequest {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingValues,
}

#[derive(Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f32>,
}

pub struct GeminiClient {
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn models_url(base_url: &str) -> String {
        let base_url = base_url.trim_end_matches('/');
        if base_url.ends_with("/models") {
            base_url.to_string()
        } else {
            format!("{}/models", base_url)
        }
    }

    fn resolve_embedding_model(model: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        if trimmed.contains("embedding") {
            trimmed.to_string()
        } else {
            "text-embedding-004".to_string()
        }
    }

    fn build_request(config: &LLMConfig, messages: &[ChatMessage], temperature: f32) -> GeminiRequest {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != ChatRole::System && !m.content.trim().is_empty())
            .map(|m| GeminiContent {
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
                role: Some(match m.role {
                    ChatRole::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                }),
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: if system_text.is_empty() {
                None
            } else {
                Some(GeminiContent {
                    parts: vec![GeminiPart {
                        text: system_text.join("\n\n"),
                    }],
                    role: None,
                })
            },
            generation_config: GenerationConfig {
                temperature: temperature as f64,
                max_output_tokens: config.max_tokens,
            },
        }
    }

    pub async fn chat(
        &self,
        config: &LLMConfig,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Llm("Missing API key for Gemini provider".to_string()))?;
        let url = format!(
            "{}/{}:generateContent",
            Self::models_url(&config.base_url),
            config.model.trim().trim_start_matches("models/")
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&Self::build_request(config, messages, temperature))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Request failed ({}): {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Llm(describe_failure(response, &url).await));
        }

        let json: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse JSON: {}", e)))?;

        json.candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| AppError::Llm("Invalid response format".to_string()))
    }

    pub async fn embed(&self, config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Rag("Missing API key for Gemini embeddings".to_string()))?;
        let url = format!(
            "{}/{}:embedContent",
            Self::models_url(&config.base_url),
            Self::resolve_embedding_model(&config.model)
        );

        let request = GeminiEmbeddingRequest {
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
                role: None,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to call embedding API ({}): {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Rag(describe_failure(response, &url).await));
        }

        let parsed: GeminiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to parse embedding response: {}", e)))?;

        Ok(parsed.embedding.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_messages_become_instruction() {
        let config = LLMConfig::default();
        let request = GeminiClient::build_request(
            &config,
            &[ChatMessage::system("only json"), ChatMessage::user("generate")],
            0.3,
        );
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        let instruction = request.system_instruction.unwrap();
        assert_eq!(instruction.parts[0].text, "only json");
    }

    #[test]
    fn test_embedding_model_resolution() {
        assert_eq!(
            GeminiClient::resolve_embedding_model("models/text-embedding-004"),
            "text-embedding-004"
        );
        assert_eq!(
            GeminiClient::resolve_embedding_model("gemini-pro"),
            "text-embedding-004"
        );
        assert_eq!(
            GeminiClient::models_url("https://generativelanguage.googleapis.com/v1beta/"),
            "https://generativelanguage.googleapis.com/v1beta/models"
        );
    }
}
