use crate::application::use_cases::chunking::{ChunkConfig, ChunkEngine};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::IndexConfig;
use crate::infrastructure::db::index::{IndexRepository, NewChunk};
use crate::infrastructure::llm_clients::LLMClient;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub const META_TEST_CASE_ID: &str = "test_case_id";
pub const META_TYPE: &str = "type";
pub const META_API_NAME: &str = "api_name";

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

fn metadata_text(case: &Map<String, Value>, key: &str) -> String {
    match case.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Persistent nearest-neighbour index over serialized test cases.
pub struct SimilarityStore {
    repository: IndexRepository,
    chunker: ChunkEngine,
    client: Arc<dyn LLMClient>,
}

impl SimilarityStore {
    /// Opens (or creates) the index directory named in `config`.
    pub async fn open(config: &IndexConfig, client: Arc<dyn LLMClient>) -> Result<Self> {
        let chunker = ChunkEngine::new(ChunkConfig {
            max_chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        })?;
        let repository = IndexRepository::open(&config.path).await?;
        Ok(Self {
            repository,
            chunker,
            client,
        })
    }

    /// Chunks, embeds and stores `cases` as one durable batch.
    ///
    /// Each case is tagged with its `id`, `type` and `api_name` fields.
    /// Returns the number of chunks written.
    pub async fn add(&self, cases: &[Map<String, Value>]) -> Result<u64> {
        let mut texts = Vec::new();
        let mut pending = Vec::new();

        for case in cases {
            let serialized = serde_json::to_string_pretty(case)
                .map_err(|e| AppError::Rag(format!("Failed to serialize case: {}", e)))?;

            let mut metadata = Map::new();
            metadata.insert(
                META_TEST_CASE_ID.to_string(),
                Value::String(metadata_text(case, "id")),
            );
            metadata.insert(
                META_TYPE.to_string(),
                Value::String(metadata_text(case, META_TYPE)),
            );
            metadata.insert(
                META_API_NAME.to_string(),
                Value::String(metadata_text(case, META_API_NAME)),
            );

            for chunk in self.chunker.chunk_text(&serialized) {
                texts.push(chunk.content.clone());
                pending.push((chunk, metadata.clone()));
            }
        }

        if pending.is_empty() {
            return Ok(0);
        }

        let embeddings = self.client.embed_batch(&texts).await?;
        if embeddings.len() != pending.len() {
            return Err(AppError::Rag(format!(
                "Embedding count mismatch: expected {}, got {}",
                pending.len(),
                embeddings.len()
            )));
        }

        let chunks: Vec<NewChunk> = pending
            .into_iter()
            .zip(embeddings)
            .map(|((chunk, metadata), embedding)| NewChunk {
                content: chunk.content,
                chunk_index: chunk.chunk_index as i64,
                metadata,
                embedding,
            })
            .collect();

        let inserted = self.repository.insert_chunks(&chunks).await?;
        tracing::debug!(
            "Indexed {} case(s) as {} chunk(s), {} new",
            cases.len(),
            chunks.len(),
            inserted
        );
        Ok(inserted)
    }

    /// Up to `k` stored cases nearest to `query` among those whose metadata
    /// matches every filter exactly. Each case appears at most once.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Map<String, Value>>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.client.embed(query).await?;
        let candidates = self.repository.fetch_candidates(filters).await?;

        let mut scored: Vec<(f32, usize)> = candidates
            .iter()
            .enumerate()
            .map(|(i, chunk)| (cosine_similarity(&query_embedding, &chunk.embedding), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for (_, i) in scored {
            let chunk = &candidates[i];
            // Partial slices of long cases are not objects on their own.
            let Ok(Value::Object(case)) = serde_json::from_str::<Value>(&chunk.content) else {
                continue;
            };
            let case_id = match chunk.metadata.get(META_TEST_CASE_ID) {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                _ => format!("chunk-{}", chunk.id),
            };
            if !seen.insert(case_id) {
                continue;
            }
            results.push(case);
            if results.len() >= k {
                break;
            }
        }

        Ok(results)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.repository.count().await?.max(0) as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
