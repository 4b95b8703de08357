//! libSQL index store for harvested data (offline mode).
//!
//! The [`Storage`] struct wraps a local libSQL database holding controlled
//! vocabulary rows and the extracted catalog records, both with full-text
//! search.
//!
//! **Access rules:**
//! - `harvest` / `harvest-all`: read-write via [`Storage::open`]
//! - `search`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use harvester_shared::{DataRow, HarvesterError, Result, SemanticAssetMetadata};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Index contracts
// ---------------------------------------------------------------------------

/// Destination of controlled vocabulary data rows.
#[async_trait]
pub trait VocabularyIndexer: Send + Sync {
    /// Replaces every row stored under `(rights_holder_id, key_concept)`
    /// with `rows`. Returns the number of rows written.
    async fn index_data(
        &self,
        rights_holder_id: &str,
        key_concept: &str,
        rows: &[DataRow],
    ) -> Result<usize>;
}

/// Destination of extracted catalog records.
#[async_trait]
pub trait MetadataIndexer: Send + Sync {
    /// Drops every record harvested from `repo_url`. Returns how many were
    /// removed.
    async fn delete_metadata_for_repo(&self, repo_url: &str) -> Result<u64>;

    /// Inserts or replaces the record for `(repo_url, iri)`.
    async fn save_metadata(&self, metadata: &SemanticAssetMetadata) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    write_lock: Mutex<()>,
}

fn db_err(e: libsql::Error) -> HarvesterError {
    HarvesterError::store(format!("index: {e}"))
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvesterError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for searching only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarvesterError::config(format!(
                "index database {} does not exist; run a harvest first",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        HarvesterError::store(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HarvesterError::store("index is opened in read-only mode"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Vocabulary rows
    // -----------------------------------------------------------------------

    /// Rows of one vocabulary in their original order.
    pub async fn list_rows(&self, rights_holder_id: &str, key_concept: &str) -> Result<Vec<DataRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT data_json FROM vocabulary_rows
                 WHERE rights_holder_id = ?1 AND key_concept = ?2
                 ORDER BY position",
                params![rights_holder_id, key_concept],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let json: String = row.get(0).map_err(db_err)?;
            results.push(decode_row(&json)?);
        }
        Ok(results)
    }

    /// Full-text search inside one vocabulary.
    pub async fn search_rows(
        &self,
        rights_holder_id: &str,
        key_concept: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RowMatch>> {
        let Some(query) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let mut rows = self
            .conn
            .query(
                "SELECT v.position, v.row_id, v.data_json, rank
                 FROM vocabulary_rows_fts fts
                 JOIN vocabulary_rows v ON v.rowid = fts.rowid
                 WHERE vocabulary_rows_fts MATCH ?1
                   AND v.rights_holder_id = ?2 AND v.key_concept = ?3
                 ORDER BY rank
                 LIMIT ?4",
                params![query, rights_holder_id, key_concept, limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let position: i64 = row.get(0).map_err(db_err)?;
            let json: String = row.get(2).map_err(db_err)?;
            results.push(RowMatch {
                position: position as usize,
                row_id: row.get::<String>(1).ok(),
                row: decode_row(&json)?,
                score: row.get(3).unwrap_or(0.0),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Catalog records
    // -----------------------------------------------------------------------

    /// The stored record for `(repo_url, iri)`.
    pub async fn get_metadata(
        &self,
        repo_url: &str,
        iri: &str,
    ) -> Result<Option<SemanticAssetMetadata>> {
        let mut rows = self
            .conn
            .query(
                "SELECT metadata_json FROM semantic_assets WHERE repo_url = ?1 AND iri = ?2",
                params![repo_url, iri],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let json: String = row.get(0).map_err(db_err)?;
                Ok(Some(decode_metadata(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Every record harvested from `repo_url`, ordered by IRI.
    pub async fn list_metadata_for_repo(&self, repo_url: &str) -> Result<Vec<SemanticAssetMetadata>> {
        let mut rows = self
            .conn
            .query(
                "SELECT metadata_json FROM semantic_assets WHERE repo_url = ?1 ORDER BY iri",
                params![repo_url],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let json: String = row.get(0).map_err(db_err)?;
            results.push(decode_metadata(&json)?);
        }
        Ok(results)
    }

    /// Full-text search over titles, descriptions and keywords.
    pub async fn search_assets(&self, query: &str, limit: u32) -> Result<Vec<AssetMatch>> {
        let Some(query) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let mut rows = self
            .conn
            .query(
                "SELECT a.iri, a.repo_url, a.asset_type, a.title, rank
                 FROM semantic_assets_fts fts
                 JOIN semantic_assets a ON a.rowid = fts.rowid
                 WHERE semantic_assets_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
                params![query, limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(AssetMatch {
                iri: row.get(0).map_err(db_err)?,
                repo_url: row.get(1).map_err(db_err)?,
                asset_type: row.get(2).map_err(db_err)?,
                title: row.get(3).map_err(db_err)?,
                score: row.get(4).unwrap_or(0.0),
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl VocabularyIndexer for Storage {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn index_data(
        &self,
        rights_holder_id: &str,
        key_concept: &str,
        rows: &[DataRow],
    ) -> Result<usize> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let removed = tx
            .execute(
                "DELETE FROM vocabulary_rows WHERE rights_holder_id = ?1 AND key_concept = ?2",
                params![rights_holder_id, key_concept],
            )
            .await
            .map_err(db_err)?;

        for (position, row) in rows.iter().enumerate() {
            let data_json = serde_json::to_string(row).map_err(|e| {
                HarvesterError::store(format!("failed to encode row {position}: {e}"))
            })?;
            tx.execute(
                "INSERT INTO vocabulary_rows
                   (rights_holder_id, key_concept, position, row_id, data_json, search_text, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    rights_holder_id,
                    key_concept,
                    position as i64,
                    row.first_value(),
                    data_json,
                    search_text(row),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        debug!(removed, "vocabulary rows replaced");
        Ok(rows.len())
    }
}

#[async_trait]
impl MetadataIndexer for Storage {
    #[instrument(skip(self))]
    async fn delete_metadata_for_repo(&self, repo_url: &str) -> Result<u64> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let removed = self
            .conn
            .execute(
                "DELETE FROM semantic_assets WHERE repo_url = ?1",
                params![repo_url],
            )
            .await
            .map_err(db_err)?;
        debug!(removed, "catalog records removed");
        Ok(removed)
    }

    #[instrument(skip_all, fields(iri = %metadata.iri))]
    async fn save_metadata(&self, metadata: &SemanticAssetMetadata) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| HarvesterError::store(format!("failed to encode metadata: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO semantic_assets
                   (id, repo_url, iri, asset_type, title, description, keywords,
                    rights_holder, modified_on, metadata_json, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(repo_url, iri) DO UPDATE SET
                   asset_type = excluded.asset_type,
                   title = excluded.title,
                   description = excluded.description,
                   keywords = excluded.keywords,
                   rights_holder = excluded.rights_holder,
                   modified_on = excluded.modified_on,
                   metadata_json = excluded.metadata_json,
                   indexed_at = excluded.indexed_at",
                params![
                    Uuid::now_v7().to_string(),
                    metadata.repo_url.as_str(),
                    metadata.iri.as_str(),
                    metadata.asset_type.as_str(),
                    metadata.title.as_str(),
                    metadata.description.as_str(),
                    metadata.keywords.join(" "),
                    metadata.rights_holder.iri.as_str(),
                    metadata.modified_on.to_string(),
                    metadata_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// A vocabulary row matched by full-text search.
#[derive(Debug, Clone)]
pub struct RowMatch {
    /// Zero-based position in the data file.
    pub position: usize,
    /// Value of the row's first column.
    pub row_id: Option<String>,
    pub row: DataRow,
    /// FTS5 rank score (lower is better).
    pub score: f64,
}

/// A catalog record matched by full-text search.
#[derive(Debug, Clone)]
pub struct AssetMatch {
    pub iri: String,
    pub repo_url: String,
    pub asset_type: String,
    pub title: String,
    /// FTS5 rank score (lower is better).
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn search_text(row: &DataRow) -> String {
    row.iter()
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns free text into an FTS5 query matching rows containing every word.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

fn decode_row(json: &str) -> Result<DataRow> {
    serde_json::from_str(json)
        .map_err(|e| HarvesterError::store(format!("corrupt vocabulary row: {e}")))
}

fn decode_metadata(json: &str) -> Result<SemanticAssetMetadata> {
    serde_json::from_str(json)
        .map_err(|e| HarvesterError::store(format!("corrupt catalog record: {e}")))
}
