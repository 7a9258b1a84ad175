//! SQL migration definitions for the SiteForge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

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
        description: "Initial schema: website_versions, assets, catalog_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per generation attempt. The row doubles as the job checkpoint:
-- status/progress/current_step are persisted before each stage runs, and
-- updated_at is the heartbeat for stall detection.
CREATE TABLE IF NOT EXISTS website_versions (
    id                TEXT PRIMARY KEY,
    website_id        TEXT NOT NULL,
    property_id       TEXT NOT NULL,
    version           INTEGER NOT NULL,
    status            TEXT NOT NULL,
    progress          INTEGER NOT NULL DEFAULT 0,
    current_step      TEXT NOT NULL,
    architecture_json TEXT,
    pages_json        TEXT,
    error_message     TEXT,
    started_at        TEXT NOT NULL,
    completed_at      TEXT,
    duration_seconds  INTEGER,
    updated_at        TEXT NOT NULL,
    UNIQUE(property_id, version)
);

CREATE INDEX IF NOT EXISTS idx_versions_property ON website_versions(property_id);
CREATE INDEX IF NOT EXISTS idx_versions_status ON website_versions(status);

-- Resolved image assets, one per distinct image index per version. Scoped
-- to the version so a regeneration never touches the rows a still-ready
-- earlier version deploys against.
CREATE TABLE IF NOT EXISTS assets (
    id          TEXT PRIMARY KEY,
    version_id  TEXT NOT NULL,
    website_id  TEXT NOT NULL,
    asset_type  TEXT NOT NULL,
    source      TEXT NOT NULL,
    file_url    TEXT NOT NULL,
    alt_text    TEXT NOT NULL,
    image_index INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(version_id, image_index)
);

CREATE INDEX IF NOT EXISTS idx_assets_version ON assets(version_id);

-- Capability catalog cache, one entry per catalog source.
CREATE TABLE IF NOT EXISTS catalog_cache (
    source_id    TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    fetched_at   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
