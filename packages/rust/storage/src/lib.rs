//! libSQL storage layer for SiteForge.
//!
//! The [`Storage`] struct wraps a libSQL database holding website-version
//! checkpoints, resolved assets, and the capability-catalog cache. The
//! `website_versions` row is the durable job record: the orchestrator
//! checkpoints into it before every stage, and external clients poll it.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database, params};
use siteforge_shared::{
    Asset, AssetSource, Blueprint, GenerationStatus, Result, SiteArchitecture, SiteForgeError,
    VersionId, WebsiteId, WebsiteVersion,
};

/// Fields supplied by the trigger when creating a version row.
/// The `version` number itself is allocated inside the insert.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub id: VersionId,
    pub website_id: WebsiteId,
    pub property_id: String,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiteForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SiteForgeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Website version operations
    // -----------------------------------------------------------------------

    /// Create a new version row with status `queued` and an atomically
    /// allocated version number.
    ///
    /// The insert is also the duplicate-generation guard: the `NOT EXISTS`
    /// clause and the `MAX(version) + 1` subselect are evaluated inside one
    /// statement, so two concurrent triggers for the same property cannot
    /// both be admitted and cannot claim the same number. Zero affected rows
    /// means another non-terminal version holds the property; a
    /// `UNIQUE(property_id, version)` conflict is retried once, at which
    /// point the earlier winner's row rejects the retry. Returns the
    /// allocated number.
    pub async fn create_version(&self, new: &NewVersion) -> Result<u32> {
        let mut attempts = 0;
        loop {
            let now = Utc::now().to_rfc3339();
            let result = self
                .conn
                .execute(
                    "INSERT INTO website_versions
                       (id, website_id, property_id, version, status, progress, current_step,
                        started_at, updated_at)
                     SELECT ?1, ?2, ?3,
                       (SELECT COALESCE(MAX(version), 0) + 1
                          FROM website_versions WHERE property_id = ?3),
                       ?4, 0, ?5, ?6, ?6
                     WHERE NOT EXISTS
                       (SELECT 1 FROM website_versions
                         WHERE property_id = ?3
                           AND status NOT IN ('ready_for_preview', 'failed', 'deployed'))",
                    params![
                        new.id.to_string(),
                        new.website_id.to_string(),
                        new.property_id.as_str(),
                        GenerationStatus::Queued.as_str(),
                        GenerationStatus::Queued.step_description(),
                        now.as_str(),
                    ],
                )
                .await;

            match result {
                Ok(0) => {
                    return Err(SiteForgeError::validation(format!(
                        "a generation is already in progress for property {}",
                        new.property_id
                    )));
                }
                Ok(_) => break,
                Err(e) if e.to_string().contains("UNIQUE") && attempts == 0 => {
                    attempts += 1;
                    continue;
                }
                Err(e) => return Err(SiteForgeError::Storage(e.to_string())),
            }
        }

        let mut rows = self
            .conn
            .query(
                "SELECT version FROM website_versions WHERE id = ?1",
                params![new.id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<u32>(0)
                .map_err(|e| SiteForgeError::Storage(e.to_string())),
            _ => Err(SiteForgeError::Storage(
                "version row vanished after insert".into(),
            )),
        }
    }

    /// Get a version by its id.
    pub async fn get_version(&self, id: &VersionId) -> Result<Option<WebsiteVersion>> {
        let mut rows = self
            .conn
            .query(
                &format!("{VERSION_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_version(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SiteForgeError::Storage(e.to_string())),
        }
    }

    /// Get the highest-numbered version for a property.
    pub async fn latest_version(&self, property_id: &str) -> Result<Option<WebsiteVersion>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "{VERSION_COLUMNS} WHERE property_id = ?1 ORDER BY version DESC LIMIT 1"
                ),
                params![property_id],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_version(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(SiteForgeError::Storage(e.to_string())),
        }
    }

    /// List versions for a property, newest first.
    pub async fn list_versions(&self, property_id: &str) -> Result<Vec<WebsiteVersion>> {
        let mut rows = self
            .conn
            .query(
                &format!("{VERSION_COLUMNS} WHERE property_id = ?1 ORDER BY version DESC"),
                params![property_id],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_version(&row)?);
        }
        Ok(results)
    }

    /// Whether a non-terminal version exists for the property.
    /// Used by the trigger to reject duplicate concurrent generations.
    pub async fn has_active_version(&self, property_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM website_versions
                 WHERE property_id = ?1
                   AND status NOT IN ('ready_for_preview', 'failed', 'deployed')",
                params![property_id],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
                Ok(count > 0)
            }
            _ => Ok(false),
        }
    }

    /// Persist the checkpoint for entering a stage: status, its progress
    /// value, the step description, and a fresh heartbeat.
    ///
    /// Rejects statuses without a checkpoint progress; failure is recorded
    /// through [`Storage::mark_failed`], which leaves progress untouched.
    pub async fn checkpoint(&self, id: &VersionId, status: GenerationStatus) -> Result<()> {
        let Some(progress) = status.progress() else {
            return Err(SiteForgeError::validation(
                "status has no checkpoint progress; record failures via mark_failed",
            ));
        };

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE website_versions
                 SET status = ?1, progress = ?2, current_step = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    i64::from(progress),
                    status.step_description(),
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Persist the architecture payload produced by the planning stage.
    pub async fn set_architecture(
        &self,
        id: &VersionId,
        architecture: &SiteArchitecture,
    ) -> Result<()> {
        let json = serde_json::to_string(architecture)
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE website_versions
                 SET architecture_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![json.as_str(), now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Persist the generated blueprint.
    pub async fn set_pages(&self, id: &VersionId, blueprint: &Blueprint) -> Result<()> {
        let json = serde_json::to_string(blueprint)
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE website_versions
                 SET pages_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![json.as_str(), now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a run failed. Progress stays frozen at the last checkpoint;
    /// only status, error message, and completion timing change.
    pub async fn mark_failed(&self, id: &VersionId, error_message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE website_versions
                 SET status = 'failed',
                     current_step = ?1,
                     error_message = ?2,
                     completed_at = ?3,
                     duration_seconds =
                       CAST((julianday(?3) - julianday(started_at)) * 86400 AS INTEGER),
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    GenerationStatus::Failed.step_description(),
                    error_message,
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a run ready for preview: progress 100 and completion timing.
    pub async fn mark_ready(&self, id: &VersionId) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE website_versions
                 SET status = 'ready_for_preview',
                     progress = 100,
                     current_step = ?1,
                     completed_at = ?2,
                     duration_seconds =
                       CAST((julianday(?2) - julianday(started_at)) * 86400 AS INTEGER),
                     updated_at = ?2
                 WHERE id = ?3",
                params![
                    GenerationStatus::ReadyForPreview.step_description(),
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Advance a version from `ready_for_preview` to `deployed`.
    /// Fails if the version is in any other status.
    pub async fn mark_deployed(&self, id: &VersionId) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE website_versions
                 SET status = 'deployed', current_step = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'ready_for_preview'",
                params![
                    GenerationStatus::Deployed.step_description(),
                    now.as_str(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(SiteForgeError::validation(format!(
                "version {id} is not ready for preview"
            )));
        }
        Ok(())
    }

    /// Non-terminal versions whose heartbeat is older than `threshold`.
    /// Input for an external reaper/alerting mechanism.
    pub async fn find_stalled(&self, threshold: Duration) -> Result<Vec<WebsiteVersion>> {
        let cutoff = (Utc::now() - threshold).to_rfc3339();
        let mut rows = self
            .conn
            .query(
                &format!(
                    "{VERSION_COLUMNS}
                     WHERE status NOT IN ('ready_for_preview', 'failed', 'deployed')
                       AND updated_at < ?1"
                ),
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_version(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Asset operations
    // -----------------------------------------------------------------------

    /// Remove all assets for a version. Called before re-resolution so a
    /// re-run starts from a clean slate; other versions' rows are untouched.
    pub async fn delete_assets(&self, version_id: &VersionId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM assets WHERE version_id = ?1",
                params![version_id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Insert one resolved asset row.
    pub async fn insert_asset(&self, asset: &Asset) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO assets
                   (id, version_id, website_id, asset_type, source, file_url, alt_text,
                    image_index, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    asset.id.as_str(),
                    asset.version_id.to_string(),
                    asset.website_id.to_string(),
                    asset.asset_type.as_str(),
                    asset.source.as_str(),
                    asset.file_url.as_str(),
                    asset.alt_text.as_str(),
                    i64::from(asset.image_index),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List the assets a version's resolution produced, ordered by index.
    pub async fn list_assets(&self, version_id: &VersionId) -> Result<Vec<Asset>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, version_id, website_id, asset_type, source, file_url, alt_text,
                        image_index
                 FROM assets WHERE version_id = ?1 ORDER BY image_index",
                params![version_id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_asset(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Catalog cache operations
    // -----------------------------------------------------------------------

    /// Get a cached catalog payload and when it was fetched.
    pub async fn get_catalog_cache(
        &self,
        source_id: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload_json, fetched_at FROM catalog_cache WHERE source_id = ?1",
                params![source_id],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let payload: String = row
                    .get(0)
                    .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
                let fetched_at: String = row
                    .get(1)
                    .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
                let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| SiteForgeError::Storage(format!("invalid date: {e}")))?;
                Ok(Some((payload, fetched_at)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(SiteForgeError::Storage(e.to_string())),
        }
    }

    /// Store a catalog payload in the cache (upserts).
    pub async fn set_catalog_cache(&self, source_id: &str, payload_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO catalog_cache (source_id, payload_json, fetched_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(source_id) DO UPDATE SET
                   payload_json = excluded.payload_json,
                   fetched_at = excluded.fetched_at",
                params![source_id, payload_json, now.as_str()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Backdate a row's heartbeat. Test-only hook for stall detection.
    #[doc(hidden)]
    pub async fn backdate_heartbeat(&self, id: &VersionId, to: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE website_versions SET updated_at = ?1 WHERE id = ?2",
                params![to.to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Shared SELECT column list for version rows.
const VERSION_COLUMNS: &str = "SELECT id, website_id, property_id, version, status, progress,
    current_step, architecture_json, pages_json, error_message, started_at, completed_at,
    duration_seconds, updated_at
 FROM website_versions";

/// Read a required text column.
fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| SiteForgeError::Storage(e.to_string()))
}

/// Read a nullable text column, keeping NULL distinct from read errors.
fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row
        .get_value(idx)
        .map_err(|e| SiteForgeError::Storage(e.to_string()))?
    {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(SiteForgeError::Storage(format!(
            "expected text in column {idx}, got {other:?}"
        ))),
    }
}

/// Read a nullable integer column, keeping NULL distinct from read errors.
fn get_opt_i64(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
    match row
        .get_value(idx)
        .map_err(|e| SiteForgeError::Storage(e.to_string()))?
    {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(n) => Ok(Some(n)),
        other => Err(SiteForgeError::Storage(format!(
            "expected integer in column {idx}, got {other:?}"
        ))),
    }
}

fn get_datetime(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s = get_string(row, idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SiteForgeError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`WebsiteVersion`].
fn row_to_version(row: &libsql::Row) -> Result<WebsiteVersion> {
    let status: GenerationStatus = get_string(row, 4)?
        .parse()
        .map_err(SiteForgeError::Storage)?;

    let architecture = match get_opt_string(row, 7)? {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| SiteForgeError::Storage(format!("invalid architecture: {e}")))?,
        ),
        None => None,
    };

    let pages_generated = match get_opt_string(row, 8)? {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| SiteForgeError::Storage(format!("invalid blueprint: {e}")))?,
        ),
        None => None,
    };

    let completed_at = match get_opt_string(row, 11)? {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SiteForgeError::Storage(format!("invalid date: {e}")))?,
        ),
        None => None,
    };

    Ok(WebsiteVersion {
        id: get_string(row, 0)?
            .parse()
            .map_err(|e: uuid::Error| SiteForgeError::Storage(e.to_string()))?,
        website_id: get_string(row, 1)?
            .parse()
            .map_err(|e: uuid::Error| SiteForgeError::Storage(e.to_string()))?,
        property_id: get_string(row, 2)?,
        version: row
            .get::<u32>(3)
            .map_err(|e| SiteForgeError::Storage(e.to_string()))?,
        status,
        progress: row
            .get::<i64>(5)
            .map_err(|e| SiteForgeError::Storage(e.to_string()))? as u8,
        current_step: get_string(row, 6)?,
        architecture,
        pages_generated,
        error_message: get_opt_string(row, 9)?,
        started_at: get_datetime(row, 10)?,
        completed_at,
        duration_seconds: get_opt_i64(row, 12)?,
        updated_at: get_datetime(row, 13)?,
    })
}

/// Convert a database row to an [`Asset`].
fn row_to_asset(row: &libsql::Row) -> Result<Asset> {
    let source: AssetSource = get_string(row, 4)?
        .parse()
        .map_err(SiteForgeError::Storage)?;

    Ok(Asset {
        id: get_string(row, 0)?,
        version_id: get_string(row, 1)?
            .parse()
            .map_err(|e: uuid::Error| SiteForgeError::Storage(e.to_string()))?,
        website_id: get_string(row, 2)?
            .parse()
            .map_err(|e: uuid::Error| SiteForgeError::Storage(e.to_string()))?,
        asset_type: get_string(row, 3)?,
        source,
        file_url: get_string(row, 5)?,
        alt_text: get_string(row, 6)?,
        image_index: row
            .get::<i64>(7)
            .map_err(|e| SiteForgeError::Storage(e.to_string()))? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn new_version(property_id: &str) -> NewVersion {
        NewVersion {
            id: VersionId::new(),
            website_id: WebsiteId::new(),
            property_id: property_id.into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn version_numbers_are_monotonic_per_property() {
        let storage = test_storage().await;

        let v1 = storage
            .create_version(&new_version("prop-1"))
            .await
            .expect("create v1");
        assert_eq!(v1, 1);

        // Terminal state required before another version may start
        let latest = storage.latest_version("prop-1").await.unwrap().unwrap();
        storage.mark_failed(&latest.id, "boom").await.unwrap();

        let v2 = storage
            .create_version(&new_version("prop-1"))
            .await
            .expect("create v2");
        assert_eq!(v2, 2);

        // A different property starts back at 1
        let other = storage
            .create_version(&new_version("prop-2"))
            .await
            .expect("create other");
        assert_eq!(other, 1);
    }

    #[tokio::test]
    async fn active_version_guard() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        assert!(storage.has_active_version("prop-1").await.unwrap());
        assert!(!storage.has_active_version("prop-2").await.unwrap());

        storage.mark_ready(&new.id).await.unwrap();
        assert!(!storage.has_active_version("prop-1").await.unwrap());
    }

    #[tokio::test]
    async fn create_version_is_the_duplicate_guard() {
        let storage = test_storage().await;
        let first = new_version("prop-1");
        storage.create_version(&first).await.unwrap();

        // The insert itself rejects while the first row is non-terminal, so
        // there is no window between a guard check and the insert.
        let err = storage
            .create_version(&new_version("prop-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteForgeError::Validation { .. }));
        assert!(err.to_string().contains("already in progress"));
        assert_eq!(storage.list_versions("prop-1").await.unwrap().len(), 1);

        storage.mark_ready(&first.id).await.unwrap();
        let v2 = storage
            .create_version(&new_version("prop-1"))
            .await
            .expect("terminal row releases the guard");
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn checkpoint_rejects_failed_status() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        let err = storage
            .checkpoint(&new.id, GenerationStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteForgeError::Validation { .. }));
    }

    #[tokio::test]
    async fn checkpoint_updates_status_and_progress() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        storage
            .checkpoint(&new.id, GenerationStatus::PlanningArchitecture)
            .await
            .unwrap();

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::PlanningArchitecture);
        assert_eq!(row.progress, 30);
        assert_eq!(row.current_step, "Planning site architecture");
    }

    #[tokio::test]
    async fn failure_freezes_progress() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        storage
            .checkpoint(&new.id, GenerationStatus::PlanningArchitecture)
            .await
            .unwrap();
        storage
            .mark_failed(&new.id, "planner returned no pages")
            .await
            .unwrap();

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::Failed);
        assert_eq!(row.progress, 30);
        assert_eq!(row.error_message.as_deref(), Some("planner returned no pages"));
        assert!(row.completed_at.is_some());
        assert!(row.duration_seconds.is_some());
    }

    #[tokio::test]
    async fn ready_sets_completion_fields() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();
        storage.mark_ready(&new.id).await.unwrap();

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::ReadyForPreview);
        assert_eq!(row.progress, 100);
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn deploy_requires_ready_for_preview() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        // Still queued: deploy must fail
        assert!(storage.mark_deployed(&new.id).await.is_err());

        storage.mark_ready(&new.id).await.unwrap();
        storage.mark_deployed(&new.id).await.expect("deploy");

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.status, GenerationStatus::Deployed);
    }

    #[tokio::test]
    async fn architecture_and_pages_roundtrip() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        let arch = SiteArchitecture {
            pages: vec![siteforge_shared::types::PagePlan {
                slug: "home".into(),
                title: "Home".into(),
                sections: vec!["hero-carousel".into()],
            }],
            design_notes: Some("warm palette".into()),
        };
        storage.set_architecture(&new.id, &arch).await.unwrap();

        let blueprint = Blueprint {
            pages: vec![siteforge_shared::Page {
                slug: "home".into(),
                title: "Home".into(),
                sections: vec![siteforge_shared::Section {
                    id: "sec-1".into(),
                    section_type: "hero".into(),
                    block_ref: "hero-carousel".into(),
                    content: serde_json::json!({"headline": "Hi"}),
                    variant: None,
                    css_classes: None,
                    order: 0,
                }],
            }],
        };
        storage.set_pages(&new.id, &blueprint).await.unwrap();

        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert_eq!(row.architecture.unwrap().pages[0].slug, "home");
        let pages = row.pages_generated.unwrap();
        assert_eq!(pages.pages[0].sections[0].block_ref, "hero-carousel");
    }

    #[tokio::test]
    async fn stalled_detection() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        assert!(storage
            .find_stalled(Duration::minutes(15))
            .await
            .unwrap()
            .is_empty());

        storage
            .backdate_heartbeat(&new.id, Utc::now() - Duration::minutes(30))
            .await
            .unwrap();

        let stalled = storage.find_stalled(Duration::minutes(15)).await.unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].id, new.id);

        // Terminal rows are never stalled
        storage.mark_failed(&new.id, "crash").await.unwrap();
        storage
            .backdate_heartbeat(&new.id, Utc::now() - Duration::minutes(30))
            .await
            .unwrap();
        assert!(storage
            .find_stalled(Duration::minutes(15))
            .await
            .unwrap()
            .is_empty());
    }

    fn asset(version_id: &VersionId, website_id: &WebsiteId, index: u32) -> Asset {
        Asset {
            id: Uuid::now_v7().to_string(),
            version_id: version_id.clone(),
            website_id: website_id.clone(),
            asset_type: "image".into(),
            source: AssetSource::Placeholder,
            file_url: format!("https://img.example.com/{index}"),
            alt_text: format!("image {index}"),
            image_index: index,
        }
    }

    #[tokio::test]
    async fn asset_insert_and_list() {
        let storage = test_storage().await;
        let version_id = VersionId::new();
        let website_id = WebsiteId::new();

        storage
            .insert_asset(&Asset {
                source: AssetSource::Storage,
                ..asset(&version_id, &website_id, 0)
            })
            .await
            .expect("insert asset");
        storage
            .insert_asset(&asset(&version_id, &website_id, 3))
            .await
            .expect("insert asset");

        let assets = storage.list_assets(&version_id).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].image_index, 0);
        assert_eq!(assets[0].source, AssetSource::Storage);
        assert_eq!(assets[1].source, AssetSource::Placeholder);

        storage.delete_assets(&version_id).await.unwrap();
        assert!(storage.list_assets(&version_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_asset_index_rejected() {
        let storage = test_storage().await;
        let version_id = VersionId::new();
        let website_id = WebsiteId::new();
        let first = asset(&version_id, &website_id, 0);
        storage.insert_asset(&first).await.unwrap();

        let dup = Asset {
            id: Uuid::now_v7().to_string(),
            ..first
        };
        assert!(storage.insert_asset(&dup).await.is_err());
    }

    #[tokio::test]
    async fn assets_are_scoped_to_their_version() {
        let storage = test_storage().await;
        let website_id = WebsiteId::new();
        let v1 = VersionId::new();
        let v2 = VersionId::new();

        // Same website, same index, two versions: both rows may coexist
        storage.insert_asset(&asset(&v1, &website_id, 0)).await.unwrap();
        storage.insert_asset(&asset(&v2, &website_id, 0)).await.unwrap();

        // Wiping v2 before its re-resolution leaves v1's rows alone
        storage.delete_assets(&v2).await.unwrap();
        assert!(storage.list_assets(&v2).await.unwrap().is_empty());

        let remaining = storage.list_assets(&v1).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].version_id, v1);
    }

    #[tokio::test]
    async fn corrupt_nullable_columns_are_read_errors() {
        let storage = test_storage().await;
        let new = new_version("prop-1");
        storage.create_version(&new).await.unwrap();

        // NULL stays a clean None
        let row = storage.get_version(&new.id).await.unwrap().unwrap();
        assert!(row.architecture.is_none());
        assert!(row.duration_seconds.is_none());

        // A wrong-typed value must surface as a storage error, not None
        storage
            .conn
            .execute(
                "UPDATE website_versions SET architecture_json = 42 WHERE id = ?1",
                params![new.id.to_string()],
            )
            .await
            .unwrap();
        let err = storage.get_version(&new.id).await.unwrap_err();
        assert!(matches!(err, SiteForgeError::Storage(_)));

        storage
            .conn
            .execute(
                "UPDATE website_versions
                 SET architecture_json = 'not json', duration_seconds = 'soon'
                 WHERE id = ?1",
                params![new.id.to_string()],
            )
            .await
            .unwrap();
        let err = storage.get_version(&new.id).await.unwrap_err();
        assert!(matches!(err, SiteForgeError::Storage(_)));
    }

    #[tokio::test]
    async fn catalog_cache_roundtrip() {
        let storage = test_storage().await;

        assert!(storage.get_catalog_cache("main").await.unwrap().is_none());

        storage
            .set_catalog_cache("main", r#"{"blocks":[]}"#)
            .await
            .unwrap();

        let (payload, fetched_at) = storage.get_catalog_cache("main").await.unwrap().unwrap();
        assert!(payload.contains("blocks"));
        assert!(Utc::now().signed_duration_since(fetched_at) < Duration::minutes(1));

        // Upsert replaces the payload
        storage
            .set_catalog_cache("main", r#"{"blocks":[{"slug":"hero"}]}"#)
            .await
            .unwrap();
        let (payload, _) = storage.get_catalog_cache("main").await.unwrap().unwrap();
        assert!(payload.contains("hero"));
    }
}
