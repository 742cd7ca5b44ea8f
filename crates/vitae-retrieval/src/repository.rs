//! Vector repository over the SQLite storage engine.
//!
//! Embeddings are stored as little-endian f32 blobs next to their content
//! and metadata; similarity search is an exact cosine scan over the stored
//! vectors. The repository is a thin adapter: it enforces the configured
//! dimension at save time and leaves ranking semantics to the query.

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use vitae_core::{Result, VitaeError};

/// One retrieved document with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub content: String,
    pub metadata: serde_json::Value,
    pub similarity: f32,
}

/// SQLite-backed embedding store.
pub struct VectorRepository {
    db: Arc<Mutex<Connection>>,
    dims: usize,
}

impl VectorRepository {
    /// Open or create the embeddings database at the given path.
    pub fn open(path: &Path, dims: usize) -> Result<Self> {
        info!(?path, dims, "opening vector repository");
        let conn = Connection::open(path).map_err(|e| VitaeError::Storage(e.to_string()))?;
        Self::init(conn, dims)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| VitaeError::Storage(e.to_string()))?;
        Self::init(conn, dims)
    }

    fn init(conn: Connection, dims: usize) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| VitaeError::Storage(e.to_string()))?;
        Self::create_tables(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            dims,
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embeddings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| VitaeError::Storage(e.to_string()))
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    /// Persist content with its vector and metadata. Returns the fresh id.
    /// The vector length must equal the configured dimension.
    pub fn save(
        &self,
        content: &str,
        vector: &[f32],
        metadata: &serde_json::Value,
    ) -> Result<i64> {
        if vector.len() != self.dims {
            return Err(VitaeError::DimensionMismatch {
                got: vector.len(),
                expected: self.dims,
            });
        }

        let blob: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
        let metadata_json = serde_json::to_string(metadata)?;
        let now = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock();
        db.execute(
            "INSERT INTO embeddings (content, embedding, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![content, blob, metadata_json, now],
        )
        .map_err(|e| VitaeError::Storage(e.to_string()))?;
        Ok(db.last_insert_rowid())
    }

    /// Return up to `limit` hits whose cosine similarity strictly exceeds
    /// `threshold`, ordered by decreasing similarity, ties broken by
    /// ascending id.
    pub fn find_similar(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        if query.len() != self.dims {
            return Err(VitaeError::DimensionMismatch {
                got: query.len(),
                expected: self.dims,
            });
        }

        let rows: Vec<(i64, String, Vec<u8>, String)> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare("SELECT id, content, embedding, metadata FROM embeddings")
                .map_err(|e| VitaeError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| VitaeError::Storage(e.to_string()))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter_map(|(id, content, blob, metadata_json)| {
                let vector = decode_vector(&blob)?;
                let similarity = cosine_similarity(query, &vector);
                if similarity > threshold {
                    Some(SearchHit {
                        id,
                        content,
                        metadata: serde_json::from_str(&metadata_json)
                            .unwrap_or(serde_json::Value::Null),
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Delete an embedding by id. Idempotent; returns whether a row existed.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let db = self.db.lock();
        let rows = db
            .execute("DELETE FROM embeddings WHERE id = ?1", rusqlite::params![id])
            .map_err(|e| VitaeError::Storage(e.to_string()))?;
        Ok(rows > 0)
    }

    /// Number of stored embeddings.
    pub fn count(&self) -> Result<i64> {
        let db = self.db.lock();
        db.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(|e| VitaeError::Storage(e.to_string()))
    }

    /// Cheap liveness probe for health checks.
    pub fn ping(&self) -> bool {
        let db = self.db.lock();
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

/// Deserialize a little-endian f32 blob.
fn decode_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Compute cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
