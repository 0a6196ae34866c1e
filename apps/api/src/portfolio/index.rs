//! Similarity index: documents with metadata, queried by text.
//!
//! `SqliteIndex` keeps one row per document in an embedded SQLite file, with the
//! document's embedding stored next to it. Queries embed the query text and rank
//! every row of the collection by cosine similarity, which is adequate for the
//! hundreds of rows a portfolio corpus holds.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use super::embedding::{cosine_similarity, Embedder};
use crate::db::{create_pool, INDEX_FILE};
use crate::models::portfolio::Metadata;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("mismatched batch: {documents} documents, {metadatas} metadatas, {ids} ids")]
    BatchMismatch {
        documents: usize,
        metadatas: usize,
        ids: usize,
    },

    #[error("embedding dimension mismatch: stored {stored}, query {query}")]
    DimensionMismatch { stored: usize, query: usize },
}

/// Nearest matches per query text, best first. Outer vectors follow query order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Metadata>>,
    /// `1 - cosine similarity`; smaller is closer.
    pub distances: Vec<Vec<f32>>,
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn count(&self) -> Result<usize, IndexError>;

    /// Adds documents in one batch. The three slices must have equal length.
    async fn add(
        &self,
        documents: &[String],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<(), IndexError>;

    async fn query(
        &self,
        query_texts: &[String],
        n_results: usize,
    ) -> Result<QueryResult, IndexError>;
}

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndex {
    /// Opens (or creates) the index stored under `dir` and ensures its schema exists.
    pub async fn open(
        dir: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        tokio::fs::create_dir_all(dir).await?;
        let pool = create_pool(&dir.join(INDEX_FILE)).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_entries (
                id          TEXT PRIMARY KEY,
                collection  TEXT NOT NULL,
                document    TEXT NOT NULL,
                metadata    TEXT NOT NULL,
                embedding   TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS index_entries_collection_idx ON index_entries (collection)",
        )
        .execute(&pool)
        .await?;

        info!("Similarity index ready (collection: {collection})");

        Ok(Self {
            pool,
            collection: collection.to_string(),
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl SimilarityIndex for SqliteIndex {
    async fn count(&self) -> Result<usize, IndexError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn add(
        &self,
        documents: &[String],
        metadatas: &[Metadata],
        ids: &[String],
    ) -> Result<(), IndexError> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(IndexError::BatchMismatch {
                documents: documents.len(),
                metadatas: metadatas.len(),
                ids: ids.len(),
            });
        }
        if documents.is_empty() {
            return Ok(());
        }

        let embeddings = self.embedder.embed(documents).await?;
        if embeddings.len() != documents.len() {
            return Err(IndexError::Embedding(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        for (((id, document), metadata), embedding) in
            ids.iter().zip(documents).zip(metadatas).zip(embeddings)
        {
            sqlx::query(
                r#"
                INSERT INTO index_entries (id, collection, document, metadata, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&self.collection)
            .bind(document)
            .bind(Json(metadata))
            .bind(Json(embedding))
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!("Added {} documents to '{}'", documents.len(), self.collection);
        Ok(())
    }

    async fn query(
        &self,
        query_texts: &[String],
        n_results: usize,
    ) -> Result<QueryResult, IndexError> {
        if query_texts.is_empty() || n_results == 0 {
            return Ok(QueryResult::default());
        }

        let rows: Vec<(String, Json<Metadata>, Json<Vec<f32>>)> = sqlx::query_as(
            "SELECT id, metadata, embedding FROM index_entries WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let query_embeddings = self.embedder.embed(query_texts).await?;
        let mut result = QueryResult::default();

        for query in &query_embeddings {
            let mut scored = Vec::with_capacity(rows.len());
            for (idx, (_, _, Json(embedding))) in rows.iter().enumerate() {
                if embedding.len() != query.len() {
                    return Err(IndexError::DimensionMismatch {
                        stored: embedding.len(),
                        query: query.len(),
                    });
                }
                scored.push((idx, cosine_similarity(query, embedding)));
            }
            // Stable sort keeps insertion order among equal scores.
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.truncate(n_results);

            result
                .ids
                .push(scored.iter().map(|(idx, _)| rows[*idx].0.clone()).collect());
            result.metadatas.push(
                scored
                    .iter()
                    .map(|(idx, _)| rows[*idx].1 .0.clone())
                    .collect(),
            );
            result
                .distances
                .push(scored.iter().map(|(_, score)| 1.0 - score).collect());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::portfolio::PortfolioEntry;
    use crate::portfolio::embedding::HashingEmbedder;

    async fn open_index(dir: &Path) -> SqliteIndex {
        let embedder = Arc::new(HashingEmbedder::new(512).unwrap());
        SqliteIndex::open(dir, "portfolio", embedder).await.unwrap()
    }

    fn batch(entries: &[PortfolioEntry]) -> (Vec<String>, Vec<Metadata>, Vec<String>) {
        (
            entries.iter().map(|e| e.techstack.clone()).collect(),
            entries.iter().map(PortfolioEntry::to_metadata).collect(),
            (0..entries.len()).map(|i| format!("id-{i}")).collect(),
        )
    }

    #[tokio::test]
    async fn test_add_then_query_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path()).await;
        let (docs, metas, ids) = batch(&[
            PortfolioEntry::new("React, Node.js", "https://a/1"),
            PortfolioEntry::new("Python, Django", "https://a/2"),
        ]);
        index.add(&docs, &metas, &ids).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let result = index
            .query(&["Python".to_string(), "React".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(result.metadatas.len(), 2);
        assert_eq!(result.metadatas[0][0]["link"], "https://a/2");
        assert_eq!(result.metadatas[0][1]["link"], "https://a/1");
        assert_eq!(result.metadatas[1][0]["link"], "https://a/1");
        assert!(result.distances[0][0] < result.distances[0][1]);
        assert_eq!(result.ids[0][0], "id-1");
    }

    #[tokio::test]
    async fn test_n_results_bounds_each_query() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path()).await;
        let (docs, metas, ids) = batch(&[
            PortfolioEntry::new("Rust", "https://a/1"),
            PortfolioEntry::new("Go", "https://a/2"),
            PortfolioEntry::new("Kubernetes", "https://a/3"),
        ]);
        index.add(&docs, &metas, &ids).await.unwrap();

        let result = index.query(&["Rust".to_string()], 1).await.unwrap();
        assert_eq!(result.metadatas[0].len(), 1);
        assert_eq!(result.metadatas[0][0]["link"], "https://a/1");
    }

    #[tokio::test]
    async fn test_entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = open_index(dir.path()).await;
            let (docs, metas, ids) = batch(&[PortfolioEntry::new("Rust", "https://a/1")]);
            index.add(&docs, &metas, &ids).await.unwrap();
        }
        let reopened = open_index(dir.path()).await;
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let portfolio = open_index(dir.path()).await;
        let embedder = Arc::new(HashingEmbedder::new(512).unwrap());
        let other = SqliteIndex::open(dir.path(), "other", embedder)
            .await
            .unwrap();
        let (docs, metas, ids) = batch(&[PortfolioEntry::new("Rust", "https://a/1")]);
        portfolio.add(&docs, &metas, &ids).await.unwrap();
        assert_eq!(other.count().await.unwrap(), 0);
        assert_eq!(other.collection(), "other");
    }

    #[tokio::test]
    async fn test_mismatched_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path()).await;
        let err = index
            .add(&["Rust".to_string()], &[], &["id".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::BatchMismatch { metadatas: 0, .. }));
    }

    #[tokio::test]
    async fn test_dimension_change_surfaces_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(dir.path()).await;
        let (docs, metas, ids) = batch(&[PortfolioEntry::new("Rust", "https://a/1")]);
        index.add(&docs, &metas, &ids).await.unwrap();

        let narrow = SqliteIndex::open(
            dir.path(),
            "portfolio",
            Arc::new(HashingEmbedder::new(64).unwrap()),
        )
        .await
        .unwrap();
        let err = narrow.query(&["Rust".to_string()], 2).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                stored: 512,
                query: 64
            }
        ));
    }
}
