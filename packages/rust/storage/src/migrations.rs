//! SQL migration definitions for the harvester index database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: vocabulary_rows, semantic_assets, FTS5",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Controlled vocabulary data, keyed by (rights holder, key concept)
CREATE TABLE IF NOT EXISTS vocabulary_rows (
    rights_holder_id TEXT NOT NULL,
    key_concept      TEXT NOT NULL,
    position         INTEGER NOT NULL,
    row_id           TEXT,
    data_json        TEXT NOT NULL,
    search_text      TEXT NOT NULL,
    indexed_at       TEXT NOT NULL,
    PRIMARY KEY (rights_holder_id, key_concept, position)
);

CREATE INDEX IF NOT EXISTS idx_vocabulary_rows_row_id
    ON vocabulary_rows(rights_holder_id, key_concept, row_id);

-- Extracted catalog records, one per (repository, asset IRI)
CREATE TABLE IF NOT EXISTS semantic_assets (
    id            TEXT PRIMARY KEY,
    repo_url      TEXT NOT NULL,
    iri           TEXT NOT NULL,
    asset_type    TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT NOT NULL,
    keywords      TEXT NOT NULL,
    rights_holder TEXT NOT NULL,
    modified_on   TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    indexed_at    TEXT NOT NULL,
    UNIQUE(repo_url, iri)
);

CREATE INDEX IF NOT EXISTS idx_semantic_assets_repo ON semantic_assets(repo_url);

-- Full-text search on vocabulary rows
CREATE VIRTUAL TABLE IF NOT EXISTS vocabulary_rows_fts USING fts5(
    search_text,
    content=vocabulary_rows,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS vocabulary_rows_fts_insert AFTER INSERT ON vocabulary_rows BEGIN
    INSERT INTO vocabulary_rows_fts(rowid, search_text)
    VALUES (new.rowid, new.search_text);
END;

CREATE TRIGGER IF NOT EXISTS vocabulary_rows_fts_delete AFTER DELETE ON vocabulary_rows BEGIN
    INSERT INTO vocabulary_rows_fts(vocabulary_rows_fts, rowid, search_text)
    VALUES ('delete', old.rowid, old.search_text);
END;

-- Full-text search on catalog records
CREATE VIRTUAL TABLE IF NOT EXISTS semantic_assets_fts USING fts5(
    title,
    description,
    keywords,
    content=semantic_assets,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS semantic_assets_fts_insert AFTER INSERT ON semantic_assets BEGIN
    INSERT INTO semantic_assets_fts(rowid, title, description, keywords)
    VALUES (new.rowid, new.title, new.description, new.keywords);
END;

CREATE TRIGGER IF NOT EXISTS semantic_assets_fts_delete AFTER DELETE ON semantic_assets BEGIN
    INSERT INTO semantic_assets_fts(semantic_assets_fts, rowid, title, description, keywords)
    VALUES ('delete', old.rowid, old.title, old.description, old.keywords);
END;

CREATE TRIGGER IF NOT EXISTS semantic_assets_fts_update AFTER UPDATE ON semantic_assets BEGIN
    INSERT INTO semantic_assets_fts(semantic_assets_fts, rowid, title, description, keywords)
    VALUES ('delete', old.rowid, old.title, old.description, old.keywords);
    INSERT INTO semantic_assets_fts(rowid, title, description, keywords)
    VALUES (new.rowid, new.title, new.description, new.keywords);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
