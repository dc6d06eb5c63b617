//! SQL migration definitions for the dedup database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

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
        description: "Initial schema: processed_articles with expiry",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per admitted article id. Timestamps are unix milliseconds.
CREATE TABLE IF NOT EXISTS processed_articles (
    article_id  TEXT PRIMARY KEY,
    admitted_at INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processed_expires ON processed_articles(expires_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
