//! SQLite-backed local vector store.
//!
//! One database file holds every collection. Each collection records the
//! dimension fixed by its first write; documents keep an autoincrement
//! sequence number so ranking ties resolve in insertion order, and replacing
//! a document by id keeps its original position.
//!
//! The connection sits behind a mutex and every call runs on the blocking
//! pool. Readers are serialized with writers and with each other.

use super::{
    assign_ids, cosine_similarity, distance_from_similarity, rank, validate_batch, VectorStore,
};
use crate::types::{
    Embedding, Metadata, MetadataFilter, QueryMatch, QueryResult, StoreStats, UpsertResult,
    VectorRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use vectorkb_core::{AppError, AppResult};

/// Database file name inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

/// Persistent store for one collection of a local SQLite index.
#[derive(Debug, Clone)]
pub struct LocalVectorStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    db_path: PathBuf,
}

fn storage_error(context: &str, e: rusqlite::Error) -> AppError {
    AppError::BackendUnavailable(format!("{}: {}", context, e))
}

impl LocalVectorStore {
    /// Open (or create) the index under `dir` and bind it to `collection`.
    pub fn open(dir: &Path, collection: &str) -> AppResult<Self> {
        if collection.trim().is_empty() {
            return Err(AppError::Config("Collection name must not be empty".to_string()));
        }

        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::BackendUnavailable(format!("Failed to create index directory: {}", e))
        })?;

        let db_path = dir.join(INDEX_FILE);
        let conn = Connection::open(&db_path)
            .map_err(|e| storage_error("Failed to open SQLite index", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);
            "#,
        )
        .map_err(|e| storage_error("Failed to create tables", e))?;

        debug!("Opened local index at {:?} (collection '{}')", db_path, collection);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
            db_path,
        })
    }

    /// Path of the SQLite file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// A started write always runs to completion, even if the caller stops
    /// waiting, so a transaction commits entirely or not at all.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection, &str) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let collection = self.collection.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                AppError::BackendUnavailable("Local index lock poisoned".to_string())
            })?;
            f(&mut guard, &collection)
        })
        .await
        .map_err(|e| AppError::BackendUnavailable(format!("Local index task failed: {}", e)))?
    }
}

fn established_dimension(conn: &Connection, collection: &str) -> AppResult<Option<usize>> {
    conn.query_row(
        "SELECT dimension FROM collections WHERE name = ?1",
        params![collection],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|d| d.map(|d| d as usize))
    .map_err(|e| storage_error("Failed to read collection", e))
}

fn document_count(conn: &Connection, collection: &str) -> AppResult<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE collection = ?1",
        params![collection],
        |row| row.get::<_, i64>(0),
    )
    .map(|c| c as usize)
    .map_err(|e| storage_error("Failed to count documents", e))
}

fn existing_ids(conn: &Connection, collection: &str) -> AppResult<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM documents WHERE collection = ?1")
        .map_err(|e| storage_error("Failed to prepare id scan", e))?;

    let ids = stmt
        .query_map(params![collection], |row| row.get::<_, String>(0))
        .map_err(|e| storage_error("Failed to scan ids", e))?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|e| storage_error("Failed to read id", e))?;

    Ok(ids)
}

fn upsert_blocking(
    conn: &mut Connection,
    collection: &str,
    records: Vec<VectorRecord>,
) -> AppResult<UpsertResult> {
    let tx = conn
        .transaction()
        .map_err(|e| storage_error("Failed to begin transaction", e))?;

    let established = established_dimension(&tx, collection)?;
    let batch_dimension = validate_batch(&records, established)?;
    let count = document_count(&tx, collection)?;

    if records.is_empty() {
        return Ok(UpsertResult {
            stored: 0,
            ids: Vec::new(),
            total: count,
        });
    }

    if let (None, Some(dimension)) = (established, batch_dimension) {
        tx.execute(
            "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
            params![collection, dimension as i64, Utc::now().to_rfc3339()],
        )
        .map_err(|e| storage_error("Failed to create collection", e))?;
    }

    let taken = if records.iter().any(|r| r.id.is_none()) {
        existing_ids(&tx, collection)?
    } else {
        HashSet::new()
    };
    let ids = assign_ids(&records, count, &taken);

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO documents (collection, id, text, metadata, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     text = excluded.text,
                     metadata = excluded.metadata,
                     embedding = excluded.embedding,
                     updated_at = excluded.updated_at",
            )
            .map_err(|e| storage_error("Failed to prepare upsert", e))?;

        let now = Utc::now().to_rfc3339();
        for (record, id) in records.iter().zip(&ids) {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            stmt.execute(params![
                collection,
                id,
                record.text,
                metadata_json,
                embedding_to_bytes(&record.values),
                now,
            ])
            .map_err(|e| storage_error("Failed to upsert document", e))?;
        }
    }

    let total = document_count(&tx, collection)?;
    tx.commit()
        .map_err(|e| storage_error("Failed to commit upsert", e))?;

    debug!("Upserted {} documents into '{}' (total {})", ids.len(), collection, total);

    Ok(UpsertResult {
        stored: ids.len(),
        ids,
        total,
    })
}

fn query_blocking(
    conn: &Connection,
    collection: &str,
    vector: &[f32],
    top_k: usize,
    filter: Option<&MetadataFilter>,
) -> AppResult<QueryResult> {
    let Some(dimension) = established_dimension(conn, collection)? else {
        return Ok(QueryResult::empty_namespace());
    };

    if document_count(conn, collection)? == 0 {
        return Ok(QueryResult::empty_namespace());
    }

    if vector.len() != dimension {
        return Err(AppError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, text, metadata, embedding FROM documents
             WHERE collection = ?1 ORDER BY seq",
        )
        .map_err(|e| storage_error("Failed to prepare query", e))?;

    let rows = stmt
        .query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })
        .map_err(|e| storage_error("Failed to query documents", e))?;

    let mut candidates = Vec::new();
    for row in rows {
        let (id, text, metadata_json, embedding_bytes) =
            row.map_err(|e| storage_error("Failed to read document", e))?;

        let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(|e| {
            AppError::BackendUnavailable(format!("Corrupt metadata for '{}': {}", id, e))
        })?;

        if let Some(filter) = filter {
            if !filter.matches(&metadata) {
                continue;
            }
        }

        let embedding = bytes_to_embedding(&embedding_bytes)?;
        let similarity = cosine_similarity(vector, &embedding);

        candidates.push(QueryMatch {
            id,
            content: text,
            metadata,
            similarity,
            distance: distance_from_similarity(similarity),
        });
    }

    let matched = candidates.len();
    let matches = rank(candidates, top_k);

    debug!(
        "Ranked {} of {} candidates in '{}' (top-{})",
        matches.len(),
        matched,
        collection,
        top_k
    );

    Ok(QueryResult {
        matches,
        namespace_empty: false,
    })
}

fn delete_blocking(conn: &mut Connection, collection: &str, ids: &[String]) -> AppResult<usize> {
    let tx = conn
        .transaction()
        .map_err(|e| storage_error("Failed to begin transaction", e))?;

    let mut removed = 0;
    {
        let mut stmt = tx
            .prepare("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
            .map_err(|e| storage_error("Failed to prepare delete", e))?;

        for id in ids {
            removed += stmt
                .execute(params![collection, id])
                .map_err(|e| storage_error("Failed to delete document", e))?;
        }
    }

    tx.commit()
        .map_err(|e| storage_error("Failed to commit delete", e))?;

    Ok(removed)
}

fn clear_blocking(conn: &mut Connection, collection: &str) -> AppResult<()> {
    let tx = conn
        .transaction()
        .map_err(|e| storage_error("Failed to begin transaction", e))?;

    let removed = tx
        .execute("DELETE FROM documents WHERE collection = ?1", params![collection])
        .map_err(|e| storage_error("Failed to delete documents", e))?;
    tx.execute("DELETE FROM collections WHERE name = ?1", params![collection])
        .map_err(|e| storage_error("Failed to delete collection", e))?;

    tx.commit()
        .map_err(|e| storage_error("Failed to commit clear", e))?;

    info!("Cleared collection '{}' ({} documents)", collection, removed);
    Ok(())
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn namespace(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> AppResult<UpsertResult> {
        self.with_conn(move |conn, collection| upsert_blocking(conn, collection, records))
            .await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<QueryResult> {
        let vector = vector.to_vec();
        let filter = filter.cloned();
        self.with_conn(move |conn, collection| {
            query_blocking(conn, collection, &vector, top_k, filter.as_ref())
        })
        .await
    }

    async fn delete(&self, ids: &[String]) -> AppResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.with_conn(move |conn, collection| delete_blocking(conn, collection, &ids))
            .await
    }

    async fn clear(&self) -> AppResult<()> {
        self.with_conn(clear_blocking).await
    }

    async fn stats(&self) -> AppResult<StoreStats> {
        self.with_conn(|conn, collection| {
            Ok(StoreStats {
                count: document_count(conn, collection)?,
                dimension: established_dimension(conn, collection)?,
                namespace: collection.to_string(),
            })
        })
        .await
    }
}

/// Encode an embedding as little-endian `f32` bytes.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Embedding> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::BackendUnavailable(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataValue;
    use tempfile::TempDir;

    fn record(id: Option<&str>, text: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.map(str::to_string),
            text: text.to_string(),
            metadata: Metadata::new(),
            values,
        }
    }

    fn open(temp: &TempDir) -> LocalVectorStore {
        LocalVectorStore::open(temp.path(), "test").unwrap()
    }

    #[test]
    fn test_open_creates_file() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        assert!(store.db_path().exists());
        assert_eq!(store.namespace(), "test");
        assert_eq!(store.backend_name(), "local");
    }

    #[test]
    fn test_open_rejects_empty_collection() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            LocalVectorStore::open(temp.path(), " "),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let result = store
            .upsert(vec![
                record(Some("x"), "x axis", vec![1.0, 0.0, 0.0]),
                record(Some("y"), "y axis", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(result.stored, 2);
        assert_eq!(result.total, 2);

        let found = store.query(&[1.0, 0.1, 0.0], 5, None).await.unwrap();
        assert!(!found.namespace_empty);
        assert_eq!(found.matches.len(), 2);
        assert_eq!(found.matches[0].id, "x");
        assert_eq!(found.matches[0].content, "x axis");
        let top = &found.matches[0];
        assert!((top.similarity + top.distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generated_ids() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let first = store
            .upsert(vec![
                record(None, "a", vec![1.0, 0.0]),
                record(None, "b", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(first.ids, vec!["doc_0_0", "doc_0_1"]);

        let second = store
            .upsert(vec![record(None, "c", vec![1.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(second.ids, vec!["doc_2_0"]);
        assert_eq!(second.total, 3);
    }

    #[tokio::test]
    async fn test_generated_id_skips_existing() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        store
            .upsert(vec![record(Some("doc_1_0"), "manual", vec![1.0, 0.0])])
            .await
            .unwrap();
        let result = store
            .upsert(vec![record(None, "auto", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(result.ids, vec!["doc_1_0_1"]);
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_keeps_position() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        store
            .upsert(vec![
                record(Some("first"), "one", vec![1.0, 0.0]),
                record(Some("second"), "two", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let mut replacement = record(Some("first"), "uno", vec![1.0, 0.0]);
        replacement.metadata.insert("lang".into(), "es".into());
        let result = store.upsert(vec![replacement]).await.unwrap();
        assert_eq!(result.total, 2);

        // Equal scores keep insertion order
        let found = store.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(found.matches[0].id, "first");
        assert_eq!(found.matches[0].content, "uno");
        assert_eq!(
            found.matches[0].metadata.get("lang"),
            Some(&MetadataValue::from("es"))
        );
        assert_eq!(found.matches[1].id, "second");
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        store
            .upsert(vec![record(Some("a"), "a", vec![1.0, 0.0])])
            .await
            .unwrap();

        let result = store
            .upsert(vec![
                record(Some("b"), "b", vec![0.0, 1.0]),
                record(Some("c"), "c", vec![0.0, 1.0, 0.0]),
            ])
            .await;
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert_eq!(store.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_empty_namespace_query() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let result = store.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert!(result.namespace_empty);
        assert!(result.matches.is_empty());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.dimension, None);
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        store
            .upsert(vec![record(None, "a", vec![1.0, 0.0])])
            .await
            .unwrap();

        let result = store.query(&[1.0, 0.0, 0.0], 5, None).await;
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_filter_applied_before_top_k() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let mut records = Vec::new();
        for i in 0..5 {
            let id = format!("blog{}", i);
            let mut r = record(Some(id.as_str()), "blog post", vec![1.0, i as f32]);
            r.metadata.insert("source".into(), "blog".into());
            records.push(r);
        }
        let mut tweet = record(Some("tweet"), "tweet", vec![0.0, 1.0]);
        tweet.metadata.insert("source".into(), "twitter".into());
        records.push(tweet);
        store.upsert(records).await.unwrap();

        let filter: MetadataFilter = [("source", "twitter")].into_iter().collect();
        let found = store.query(&[1.0, 0.0], 3, Some(&filter)).await.unwrap();
        assert_eq!(found.matches.len(), 1);
        assert_eq!(found.matches[0].id, "tweet");

        let none: MetadataFilter = [("source", "rss")].into_iter().collect();
        let found = store.query(&[1.0, 0.0], 3, Some(&none)).await.unwrap();
        assert!(found.matches.is_empty());
        assert!(!found.namespace_empty);
    }

    #[tokio::test]
    async fn test_delete_and_clear_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        store
            .upsert(vec![
                record(Some("a"), "a", vec![1.0, 0.0]),
                record(Some("b"), "b", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.delete(&["a".to_string()]).await.unwrap(), 0);

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap().count, 0);

        // Dimension is released with the collection
        store
            .upsert(vec![record(None, "wide", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().dimension, Some(3));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let temp = TempDir::new().unwrap();
        let posts = LocalVectorStore::open(temp.path(), "posts").unwrap();
        let drafts = LocalVectorStore::open(temp.path(), "drafts").unwrap();

        posts
            .upsert(vec![record(Some("p"), "post", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(drafts.query(&[1.0, 0.0], 5, None).await.unwrap().namespace_empty);
        assert_eq!(posts.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let store = open(&temp);
            store
                .upsert(vec![record(Some("keep"), "persisted", vec![0.5, 0.5])])
                .await
                .unwrap();
        }

        let reopened = open(&temp);
        let found = reopened.query(&[0.5, 0.5], 1, None).await.unwrap();
        assert_eq!(found.matches[0].id, "keep");
    }

    #[test]
    fn test_embedding_bytes() {
        let values = vec![0.25, -1.5, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&values)).unwrap(), values);
        assert!(bytes_to_embedding(&[0, 1, 2]).is_err());
    }
}
