use crate::domain::error::{AppError, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const INDEX_SCHEMA: &str = include_str!("../../../../resources/index/schema.sql");

const INDEX_SCHEMA_VERSION: i32 = 1;
pub const INDEX_FILE_NAME: &str = "index.db";

/// Opens the index stored under `dir`, creating an empty one when none exists.
///
/// Any failure here is fatal for the run: a directory that holds a corrupt or
/// newer-version index is never rebuilt.
pub async fn open_index_db(dir: &Path) -> Result<SqlitePool> {
    if dir.exists() && !dir.is_dir() {
        return Err(AppError::Rag(format!(
            "Index path is not a directory: {}",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        AppError::Rag(format!(
            "Failed to create index directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let db_path = index_file(dir);
    let is_new = !db_path.exists();
    let pool = connect_pool(&db_path).await?;

    verify_integrity(&pool).await?;

    let version = read_user_version(&pool).await?;
    if version > INDEX_SCHEMA_VERSION {
        return Err(AppError::Rag(format!(
            "Index schema too new: db user_version={} > supported_version={}",
            version, INDEX_SCHEMA_VERSION
        )));
    }

    apply_schema(&pool).await?;
    set_user_version(&pool, INDEX_SCHEMA_VERSION).await?;

    if is_new {
        tracing::info!("Created empty similarity index at {}", db_path.display());
    } else {
        tracing::debug!("Opened similarity index at {}", db_path.display());
    }

    Ok(pool)
}

pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE_NAME)
}

async fn connect_pool(db_path: &Path) -> Result<SqlitePool> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| AppError::Rag("Index path is not valid UTF-8".to_string()))?;
    let db_url = format!("sqlite://{}", db_path_str.replace('\\', "/"));

    // FULL sync: a committed batch must survive the process dying right after.
    let options = SqliteConnectOptions::from_str(&db_url)
        .map_err(|e| AppError::Rag(format!("Failed to parse index DB URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| AppError::Rag(format!("Failed to open index {}: {}", db_path.display(), e)))
}

async fn verify_integrity(pool: &SqlitePool) -> Result<()> {
    let status: String = sqlx::query_scalar("PRAGMA quick_check")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::Rag(format!("Index integrity check failed: {}", e)))?;
    if status != "ok" {
        return Err(AppError::Rag(format!("Index is corrupt: {}", status)));
    }
    Ok(())
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for stmt in INDEX_SCHEMA.split(';') {
        let sql = stmt.trim();
        if sql.is_empty() {
            continue;
        }
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| AppError::Rag(format!("Failed to apply index schema statement: {}", e)))?;
    }
    Ok(())
}

async fn read_user_version(pool: &SqlitePool) -> Result<i32> {
    sqlx::query_scalar::<_, i32>("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::Rag(format!("Failed to read index user_version: {}", e)))
}

async fn set_user_version(pool: &SqlitePool, version: i32) -> Result<()> {
    let stmt = format!("PRAGMA user_version = {}", version);
    sqlx::query(&stmt)
        .execute(pool)
        .await
        .map_err(|e| AppError::Rag(format!("Failed to set index user_version: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_directory_creates_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index_dir = dir.path().join("nested").join("vector_store");

        let pool = open_index_db(&index_dir).await.unwrap();
        assert!(index_file(&index_dir).exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(read_user_version(&pool).await.unwrap(), INDEX_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(index_file(dir.path()), vec![0x42u8; 4096]).unwrap();

        let err = open_index_db(dir.path()).await.unwrap_err();
        assert!(matches!(err, AppError::Rag(_)));
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        {
            let pool = open_index_db(dir.path()).await.unwrap();
            set_user_version(&pool, INDEX_SCHEMA_VERSION + 1).await.unwrap();
            pool.close().await;
        }

        let err = open_index_db(dir.path()).await.unwrap_err();
        assert!(matches!(err, AppError::Rag(ref msg) if msg.contains("too new")));
    }

    #[tokio::test]
    async fn test_file_in_place_of_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        std::fs::write(&path, b"").unwrap();

        let err = open_index_db(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Rag(_)));
    }
}
