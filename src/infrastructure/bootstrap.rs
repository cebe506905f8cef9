use std::sync::Arc;

use tracing::info;

use crate::application::use_cases::generation::TestCaseGenerator;
use crate::application::use_cases::similarity_store::SimilarityStore;
use crate::domain::error::Result;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};

/// Builds the provider client, opens the similarity index and wires the generator.
///
/// Fails when the providers cannot be configured or the index cannot be opened.
pub async fn setup(config: &AppConfig) -> Result<TestCaseGenerator> {
    let client: Arc<dyn LLMClient> = Arc::new(RouterClient::new(
        config.llm.clone(),
        config.embedding.clone(),
    )?);
    info!(
        "Using {:?} model '{}' with {:?} embeddings '{}'",
        config.llm.provider, config.llm.model, config.embedding.provider, config.embedding.model
    );

    let store = SimilarityStore::open(&config.index, client.clone()).await?;
    info!(
        "Similarity index at {} holds {} chunk(s)",
        config.index.path.display(),
        store.len().await?
    );

    Ok(TestCaseGenerator::new(
        client,
        store,
        config.generation.clone(),
    ))
}
