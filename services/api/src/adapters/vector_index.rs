//! services/api/src/adapters/vector_index.rs
//!
//! The `VectorIndex` port backed by one SQLite file per notebook. Embeddings are
//! stored as little-endian `f32` blobs and searched by brute-force cosine
//! similarity, which is plenty for the few thousand chunks a notebook holds.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use studypod_core::domain::{DocumentChunk, NotebookScope, RetrievedChunk};
use studypod_core::ports::{PortError, PortResult, VectorIndex};
use studypod_core::similarity::cosine_similarity;
use tracing::{debug, info};

use crate::adapters::layout::DataLayout;

const INDEX_FILE: &str = "index.sqlite";

fn storage_err(e: sqlx::Error) -> PortError {
    PortError::Storage(format!("vector index: {}", e))
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[derive(Debug, Clone)]
pub struct SqliteVectorIndex {
    layout: DataLayout,
}

impl SqliteVectorIndex {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Opens the notebook's index. With `create == false` a notebook that has
    /// never been indexed yields `None` instead of an empty database file.
    /// Creation requires the notebook's metadata, so an ingestion finishing
    /// after its notebook was deleted cannot bring the directory back.
    async fn open(&self, scope: &NotebookScope, create: bool) -> PortResult<Option<SqlitePool>> {
        let dir = self.layout.vectors_dir(scope);
        let path = dir.join(INDEX_FILE);
        if create {
            if !tokio::fs::try_exists(self.layout.metadata_file(scope)).await.unwrap_or(false) {
                return Err(PortError::NotFound(format!("notebook {}", scope)));
            }
        } else if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        tokio::fs::create_dir_all(&dir).await?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id)")
            .execute(&pool)
            .await
            .map_err(storage_err)?;

        Ok(Some(pool))
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn replace_source(
        &self,
        scope: &NotebookScope,
        source_id: &str,
        chunks: Vec<DocumentChunk>,
    ) -> PortResult<()> {
        let Some(pool) = self.open(scope, true).await? else {
            return Err(PortError::Storage("vector index could not be created".to_string()));
        };

        let mut tx = pool.begin().await.map_err(storage_err)?;
        let removed = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?
            .rows_affected();

        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO chunks (chunk_id, source_id, source_name, chunk_index, content, embedding)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source_id)
            .bind(&chunk.source_name)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(serialize_embedding(&chunk.embedding))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        pool.close().await;

        info!(scope = %scope, source_id, removed, inserted = chunks.len(), "Source re-indexed");
        Ok(())
    }

    async fn query(&self, scope: &NotebookScope, vector: &[f32], k: usize) -> PortResult<Vec<RetrievedChunk>> {
        let Some(pool) = self.open(scope, false).await? else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT chunk_id, source_id, source_name, chunk_index, content, embedding FROM chunks",
        )
        .fetch_all(&pool)
        .await
        .map_err(storage_err)?;
        pool.close().await;

        let mut hits: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                RetrievedChunk {
                    chunk_id: row.get("chunk_id"),
                    source_id: row.get("source_id"),
                    source_name: row.get("source_name"),
                    chunk_index: chunk_index.max(0) as usize,
                    text: row.get("content"),
                    score: cosine_similarity(vector, &deserialize_embedding(&blob)),
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        hits.truncate(k);
        debug!(scope = %scope, scanned = rows.len(), returned = hits.len(), "Vector query");
        Ok(hits)
    }

    async fn all_chunks(&self, scope: &NotebookScope) -> PortResult<Vec<RetrievedChunk>> {
        let Some(pool) = self.open(scope, false).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT chunk_id, source_id, source_name, chunk_index, content FROM chunks
             ORDER BY source_id, chunk_index",
        )
        .fetch_all(&pool)
        .await
        .map_err(storage_err)?;
        pool.close().await;

        Ok(rows
            .iter()
            .map(|row| {
                let chunk_index: i64 = row.get("chunk_index");
                RetrievedChunk {
                    chunk_id: row.get("chunk_id"),
                    source_id: row.get("source_id"),
                    source_name: row.get("source_name"),
                    chunk_index: chunk_index.max(0) as usize,
                    text: row.get("content"),
                    score: 0.0,
                }
            })
            .collect())
    }

    async fn delete_source(&self, scope: &NotebookScope, source_id: &str) -> PortResult<usize> {
        let Some(pool) = self.open(scope, false).await? else {
            return Ok(0);
        };
        let removed = sqlx::query("DELETE FROM chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&pool)
            .await
            .map_err(storage_err)?
            .rows_affected();
        pool.close().await;
        Ok(removed as usize)
    }

    async fn list_sources(&self, scope: &NotebookScope) -> PortResult<Vec<String>> {
        let Some(pool) = self.open(scope, false).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query("SELECT DISTINCT source_id FROM chunks ORDER BY source_id")
            .fetch_all(&pool)
            .await
            .map_err(storage_err)?;
        pool.close().await;
        Ok(rows.iter().map(|row| row.get("source_id")).collect())
    }

    async fn count(&self, scope: &NotebookScope) -> PortResult<usize> {
        let Some(pool) = self.open(scope, false).await? else {
            return Ok(0);
        };
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM chunks")
            .fetch_one(&pool)
            .await
            .map_err(storage_err)?
            .get("n");
        pool.close().await;
        Ok(count.max(0) as usize)
    }

    async fn drop_notebook(&self, scope: &NotebookScope) -> PortResult<()> {
        match tokio::fs::remove_dir_all(self.layout.vectors_dir(scope)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
