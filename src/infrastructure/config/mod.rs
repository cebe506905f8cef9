use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{EmbeddingConfig, LLMConfig};
use crate::domain::test_case::TestType;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "interface-gen.toml";
const ENV_PREFIX: &str = "INTERFACE_GEN_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the similarity index.
    pub path: PathBuf,
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/vector_store"),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature_functional: f32,
    pub temperature_performance: f32,
    pub temperature_boundary: f32,
    pub temperature_exception: f32,
    /// Examples pulled from the index for each case
    pub examples_k: usize,
    /// Earlier cases of the running batch shown as extra context
    pub max_batch_context: usize,
    /// Extra attempts after a failed model call
    pub llm_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature_functional: 0.7,
            temperature_performance: 0.7,
            temperature_boundary: 0.7,
            temperature_exception: 0.7,
            examples_k: 3,
            max_batch_context: 5,
            llm_retries: 1,
        }
    }
}

impl GenerationConfig {
    pub fn temperature_for(&self, test_type: TestType) -> f32 {
        match test_type {
            TestType::Functional => self.temperature_functional,
            TestType::Performance => self.temperature_performance,
            TestType::Boundary => self.temperature_boundary,
            TestType::Exception => self.temperature_exception,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LLMConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub generation: GenerationConfig,
}

/// Validation result for configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl AppConfig {
    /// Layers defaults, an optional TOML file, and `INTERFACE_GEN_*` variables.
    ///
    /// `OPENAI_API_KEY` is honoured as the chat key when no prefixed key is set.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if config_file.is_some() && !file.exists() {
            return Err(AppError::Configuration(format!(
                "Config file not found: {}",
                file.display()
            )));
        }

        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&file))
            .merge(
                Env::raw()
                    .only(&["OPENAI_API_KEY"])
                    .map(|_| "llm.api_key".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.ensure_valid()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.llm.model.trim().is_empty() {
            errors.push("llm.model must not be empty".to_string());
        }
        if self.llm.base_url.trim().is_empty() {
            errors.push("llm.base_url must not be empty".to_string());
        }
        if self.llm.provider.requires_api_key() && self.llm.api_key.is_none() {
            errors.push(format!("llm.api_key is required for {:?}", self.llm.provider));
        }

        if self.embedding.model.trim().is_empty() {
            errors.push("embedding.model must not be empty".to_string());
        }
        if self.embedding.provider.requires_api_key()
            && self.embedding.api_key.is_none()
            && self.llm.api_key.is_none()
        {
            errors.push(format!(
                "embedding.api_key is required for {:?}",
                self.embedding.provider
            ));
        }

        if self.index.chunk_size == 0 {
            errors.push("index.chunk_size must be at least 1".to_string());
        }
        if self.index.chunk_overlap >= self.index.chunk_size {
            errors.push("index.chunk_overlap must be less than index.chunk_size".to_string());
        }
        if self.index.chunk_size > 8000 {
            warnings.push("Chunk sizes over 8000 may exceed embedding input limits".to_string());
        }

        for test_type in TestType::ALL {
            let temperature = self.generation.temperature_for(test_type);
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(format!(
                    "generation.temperature_{} must be within 0.0..=2.0 (got {})",
                    test_type, temperature
                ));
            }
        }
        if self.generation.examples_k == 0 && self.generation.max_batch_context == 0 {
            warnings.push("No similar cases will be shown to the model".to_string());
        }

        ConfigValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn ensure_valid(&self) -> Result<()> {
        let validation = self.validate();
        for warning in &validation.warnings {
            tracing::warn!("Configuration warning: {}", warning);
        }
        if validation.valid {
            Ok(())
        } else {
            Err(AppError::Configuration(validation.errors.join("; ")))
        }
    }
}
