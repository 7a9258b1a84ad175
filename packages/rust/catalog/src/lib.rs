//! Capability catalog client and cache.
//!
//! The CMS enumerates the block types a generated or patched section may
//! reference, plus their field schemas and design tokens. The catalog is
//! fetched over HTTP and cached in storage with a time-to-live (24 hours by
//! default) per catalog-source identifier; a forced-refresh flag bypasses
//! the cache.

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use siteforge_shared::{Result, SiteForgeError};
use siteforge_storage::Storage;
use tracing::{debug, info, instrument};
use url::Url;

/// Default timeout in seconds for catalog requests.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("SiteForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

/// One available content-block type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockType {
    /// Stable reference used by `Section::block_ref`.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Field schema for the block's content payload.
    #[serde(default)]
    pub fields: serde_json::Value,
    /// Display variants the block supports.
    #[serde(default)]
    pub variants: Vec<String>,
}

/// The externally-served enumeration of valid block types and design tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCatalog {
    /// Available block types.
    pub blocks: Vec<BlockType>,
    /// Theme design tokens (colors, spacing, typography).
    #[serde(default)]
    pub design_tokens: serde_json::Value,
}

impl CapabilityCatalog {
    /// Whether a block type with the given slug exists.
    pub fn has_block(&self, block_ref: &str) -> bool {
        self.blocks.iter().any(|b| b.slug == block_ref)
    }

    /// Look up a block type by slug.
    pub fn block(&self, block_ref: &str) -> Option<&BlockType> {
        self.blocks.iter().find(|b| b.slug == block_ref)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the CMS capability-catalog endpoint, with a
/// storage-backed cache.
pub struct CatalogClient {
    http: Client,
    base_url: Url,
    ttl: Duration,
}

impl CatalogClient {
    /// Build a client for the given CMS base URL and cache TTL in hours.
    pub fn new(base_url: &str, ttl_hours: u64) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SiteForgeError::config(format!("invalid catalog base URL: {e}")))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SiteForgeError::Network(format!("client build: {e}")))?;

        Ok(Self {
            http,
            base_url,
            ttl: Duration::hours(ttl_hours as i64),
        })
    }

    /// Fetch the catalog for a source, serving from cache when the entry is
    /// younger than the TTL. `force_refresh` bypasses the cache entirely.
    #[instrument(skip(self, storage), fields(source_id))]
    pub async fn fetch(
        &self,
        storage: &Storage,
        source_id: &str,
        force_refresh: bool,
    ) -> Result<CapabilityCatalog> {
        if !force_refresh {
            if let Some((payload, fetched_at)) = storage.get_catalog_cache(source_id).await? {
                let age = Utc::now().signed_duration_since(fetched_at);
                if age < self.ttl {
                    debug!(age_mins = age.num_minutes(), "catalog cache hit");
                    return parse_catalog(&payload);
                }
                debug!(age_mins = age.num_minutes(), "catalog cache expired");
            }
        }

        let url = self
            .base_url
            .join(&format!("catalogs/{source_id}"))
            .map_err(|e| SiteForgeError::config(format!("invalid catalog URL: {e}")))?;

        info!(%url, "fetching capability catalog");

        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteForgeError::Network(format!("{url}: HTTP {status}")));
        }

        let payload = response
            .text()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: {e}")))?;

        let catalog = parse_catalog(&payload)?;
        storage.set_catalog_cache(source_id, &payload).await?;

        info!(blocks = catalog.blocks.len(), "catalog refreshed");
        Ok(catalog)
    }
}

/// Parse and shape-validate a catalog payload.
fn parse_catalog(payload: &str) -> Result<CapabilityCatalog> {
    let catalog: CapabilityCatalog = serde_json::from_str(payload)
        .map_err(|e| SiteForgeError::validation(format!("malformed catalog payload: {e}")))?;

    if catalog.blocks.is_empty() {
        return Err(SiteForgeError::validation(
            "catalog payload contains no blocks",
        ));
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_payload() -> serde_json::Value {
        serde_json::json!({
            "blocks": [
                {"slug": "hero-carousel", "name": "Hero Carousel",
                 "fields": {"headline": "string", "slides": "array"},
                 "variants": ["full-bleed", "boxed"]},
                {"slug": "photo-grid", "name": "Photo Grid"}
            ],
            "design_tokens": {"primary": "#1a2b3c"}
        })
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sf_catalog_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[test]
    fn parse_and_lookup() {
        let catalog = parse_catalog(&sample_payload().to_string()).expect("parse");
        assert_eq!(catalog.blocks.len(), 2);
        assert!(catalog.has_block("hero-carousel"));
        assert!(catalog.has_block("photo-grid"));
        assert!(!catalog.has_block("mega-hero"));
        assert_eq!(
            catalog.block("hero-carousel").unwrap().variants,
            vec!["full-bleed", "boxed"]
        );
    }

    #[test]
    fn empty_catalog_rejected() {
        let err = parse_catalog(r#"{"blocks": []}"#).unwrap_err();
        assert!(err.to_string().contains("no blocks"));

        assert!(parse_catalog("not json").is_err());
    }

    #[tokio::test]
    async fn fetch_populates_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalogs/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let client = CatalogClient::new(&server.uri(), 24).expect("client");

        let catalog = client.fetch(&storage, "main", false).await.expect("fetch");
        assert!(catalog.has_block("hero-carousel"));

        // Second fetch is served from cache: the mock's expect(1) would fail
        // the test if a second request were made.
        let cached = client.fetch(&storage, "main", false).await.expect("cached");
        assert!(cached.has_block("photo-grid"));
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalogs/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_payload()))
            .expect(2)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let client = CatalogClient::new(&server.uri(), 24).expect("client");

        client.fetch(&storage, "main", false).await.expect("first");
        client.fetch(&storage, "main", true).await.expect("forced");
    }

    #[tokio::test]
    async fn server_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalogs/main"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let client = CatalogClient::new(&server.uri(), 24).expect("client");

        let err = client.fetch(&storage, "main", false).await.unwrap_err();
        assert!(matches!(err, SiteForgeError::Network(_)));
    }
}
