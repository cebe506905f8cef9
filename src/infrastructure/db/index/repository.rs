use super::connection::open_index_db;
use crate::domain::error::{AppError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;

/// A chunk ready to be written: text, its embedding, and retrieval metadata.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub chunk_index: i64,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

#[derive(sqlx::FromRow)]
struct StoredChunkEntity {
    id: i64,
    content: String,
    meta_json: String,
    embedding: Vec<u8>,
}

pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

pub fn bytes_to_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    let mut embedding = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr = [chunk[0], chunk[1], chunk[2], chunk[3]];
        embedding.push(f32::from_le_bytes(arr));
    }

    Some(embedding)
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// SQLite path expression selecting one top-level metadata key.
fn metadata_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Append-only chunk table of the similarity index.
pub struct IndexRepository {
    pool: SqlitePool,
}

impl IndexRepository {
    pub async fn open(dir: &Path) -> Result<Self> {
        let pool = open_index_db(dir).await?;
        Ok(Self { pool })
    }

    /// Writes the batch in a single transaction. Chunks already present with
    /// identical text and metadata are skipped. Returns the number inserted.
    pub async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to begin index transaction: {}", e)))?;

        let created_at = chrono::Utc::now().to_rfc3339();
        let mut inserted = 0;
        for chunk in chunks {
            let meta_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| AppError::Rag(format!("Failed to encode chunk metadata: {}", e)))?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO indexed_chunks
                 (content, content_hash, chunk_index, meta_json, embedding, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.content)
            .bind(content_hash(&chunk.content))
            .bind(chunk.chunk_index)
            .bind(meta_json)
            .bind(embedding_to_bytes(&chunk.embedding))
            .bind(&created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Rag(format!("Failed to insert chunk: {}", e)))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Rag(format!("Failed to commit index batch: {}", e)))?;

        Ok(inserted)
    }

    /// Every chunk whose metadata equals all `filters` exactly.
    pub async fn fetch_candidates(
        &self,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<StoredChunk>> {
        let mut sql = String::from("SELECT id, content, meta_json, embedding FROM indexed_chunks");
        for (position, _) in filters.iter().enumerate() {
            sql.push_str(if position == 0 { " WHERE " } else { " AND " });
            sql.push_str("json_extract(meta_json, ?) = ?");
        }
        sql.push_str(" ORDER BY id ASC");

        let mut query = sqlx::query_as::<_, StoredChunkEntity>(&sql);
        for (key, value) in filters {
            query = query.bind(metadata_path(key)).bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Rag(format!("Failed to fetch index chunks: {}", e)))?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(embedding) = bytes_to_embedding(&row.embedding) else {
                tracing::warn!("Skipping chunk {} with malformed embedding", row.id);
                continue;
            };
            let metadata = serde_json::from_str::<Map<String, Value>>(&row.meta_json)
                .unwrap_or_default();
            chunks.push(StoredChunk {
                id: row.id,
                content: row.content,
                metadata,
                embedding,
            });
        }

        Ok(chunks)
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM indexed_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Rag(format!("Failed to count index chunks: {}", e)))
    }

    #[cfg(test)]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(content: &str, api_name: &str, test_type: &str) -> NewChunk {
        let mut metadata = Map::new();
        metadata.insert("test_case_id".to_string(), json!(content));
        metadata.insert("type".to_string(), json!(test_type));
        metadata.insert("api_name".to_string(), json!(api_name));
        NewChunk {
            content: content.to_string(),
            chunk_index: 0,
            metadata,
            embedding: vec![1.0, 0.5, -0.25],
        }
    }

    #[test]
    fn test_embedding_to_bytes_roundtrip() {
        let embedding = vec![0.1, 0.2, 0.3, 0.4];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);
        assert!(bytes_to_embedding(&bytes[..5]).is_none());
    }

    #[test]
    fn test_metadata_path_quotes_keys() {
        assert_eq!(metadata_path("api_name"), "$.\"api_name\"");
        assert_eq!(metadata_path("we\"ird"), "$.\"we\\\"ird\"");
    }

    #[tokio::test]
    async fn test_filters_match_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let repository = IndexRepository::open(dir.path()).await.unwrap();
        repository
            .insert_chunks(&[
                chunk("a", "foo", "boundary"),
                chunk("b", "foo", "functional"),
                chunk("c", "bar", "boundary"),
            ])
            .await
            .unwrap();

        let mut filters = BTreeMap::new();
        filters.insert("api_name".to_string(), "foo".to_string());
        filters.insert("type".to_string(), "boundary".to_string());
        let rows = repository.fetch_candidates(&filters).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "a");
        assert_eq!(rows[0].embedding, vec![1.0, 0.5, -0.25]);

        let all = repository.fetch_candidates(&BTreeMap::new()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_chunks_are_ignored_and_batches_persist() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repository = IndexRepository::open(dir.path()).await.unwrap();
            let inserted = repository
                .insert_chunks(&[chunk("a", "foo", "boundary"), chunk("a", "foo", "boundary")])
                .await
                .unwrap();
            assert_eq!(inserted, 1);
            repository.close().await;
        }

        let reopened = IndexRepository::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
