use thiserror::Error;

/// Errors raised across the generator.
///
/// Setup failures (`Configuration`, `ApiDefinition`, and `Rag` while opening the
/// index) abort the run. Per-case failures (`Llm`, `JsonProcessing`,
/// `Validation`) only skip the case that produced them.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("API definition error: {0}")]
    ApiDefinition(String),
    #[error("RAG error: {0}")]
    Rag(String),
    #[error("JSON processing error: {0}")]
    JsonProcessing(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
