//! Database schema and migrations for BaliFeed.
//!
//! The document store keeps one JSON document per row. Migrations are
//! applied sequentially when the database is first opened or upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Document table and write clock
    r#"
-- One row per document, addressed by collection path and ID
CREATE TABLE documents (
    collection  TEXT NOT NULL,
    id          TEXT NOT NULL,
    data        TEXT NOT NULL,           -- JSON object
    version     INTEGER NOT NULL,        -- store_clock tick of the last write
    PRIMARY KEY (collection, id)
);

-- Monotonic clock; every commit takes the next tick as document version
CREATE TABLE store_clock (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    tick    INTEGER NOT NULL
);

INSERT INTO store_clock (id, tick) VALUES (1, 0);
"#,
    // v2: Indexes for thread cascade lookups
    r#"
CREATE INDEX idx_documents_thread_id
    ON documents(collection, json_extract(data, '$.thread_id'));
CREATE INDEX idx_documents_parent_id
    ON documents(collection, json_extract(data, '$.parent_id'));
"#,
];
