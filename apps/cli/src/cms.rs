//! CMS-backed implementations of the pipeline's external traits.
//!
//! One HTTP client covers everything the CMS side provides: ownership
//! lookups, brand/property context, the stored-image library, and the
//! publish transport. The pipeline itself only ever sees the traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use siteforge_assets::{ImageLibrary, StoredImage};
use siteforge_core::publish::{PublishAdapter, PublishedPage};
use siteforge_core::queue::AccessControl;
use siteforge_core::stages::ContextAssembler;
use siteforge_shared::{Asset, Page, Result, SiteForgeError, WebsiteId};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("SiteForge/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PropertyRecord {
    organization_id: String,
}

#[derive(Debug, Deserialize)]
struct ImageRecord {
    name: String,
    url: String,
    #[serde(default)]
    alt_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishReply {
    url: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the CMS API.
pub(crate) struct CmsClient {
    http: Client,
    base_url: Url,
}

impl CmsClient {
    pub(crate) fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SiteForgeError::config(format!("invalid CMS base URL: {e}")))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| SiteForgeError::Network(format!("client build: {e}")))?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SiteForgeError::config(format!("invalid CMS URL: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(SiteForgeError::Network(format!("{url}: HTTP {status}")));
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: malformed response: {e}")))?;
        Ok(Some(parsed))
    }
}

#[async_trait]
impl AccessControl for CmsClient {
    async fn property_owner(&self, property_id: &str) -> Result<Option<String>> {
        let record: Option<PropertyRecord> =
            self.get_json(&format!("properties/{property_id}")).await?;
        Ok(record.map(|r| r.organization_id))
    }
}

#[async_trait]
impl ContextAssembler for CmsClient {
    async fn assemble(&self, property_id: &str) -> Result<Value> {
        self.get_json(&format!("properties/{property_id}/context"))
            .await?
            .ok_or_else(|| {
                SiteForgeError::not_found(format!("no context for property {property_id}"))
            })
    }
}

#[async_trait]
impl ImageLibrary for CmsClient {
    async fn list_images(&self, property_id: &str, limit: usize) -> Result<Vec<StoredImage>> {
        let records: Vec<ImageRecord> = self
            .get_json(&format!("properties/{property_id}/images?limit={limit}"))
            .await?
            .unwrap_or_default();

        debug!(property_id, count = records.len(), "stored images listed");
        Ok(records
            .into_iter()
            .map(|r| StoredImage {
                name: r.name,
                url: r.url,
                alt_text: r.alt_text,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Publish transport
// ---------------------------------------------------------------------------

/// Pushes rendered pages to the CMS for one website.
pub(crate) struct CmsPublisher {
    client: CmsClient,
    website_id: WebsiteId,
}

impl CmsPublisher {
    pub(crate) fn new(base_url: &str, website_id: WebsiteId) -> Result<Self> {
        Ok(Self {
            client: CmsClient::new(base_url)?,
            website_id,
        })
    }
}

#[async_trait]
impl PublishAdapter for CmsPublisher {
    async fn publish_page(
        &self,
        page: &Page,
        assets: &BTreeMap<u32, Asset>,
    ) -> Result<PublishedPage> {
        let url = self
            .client
            .endpoint(&format!("websites/{}/pages", self.website_id))?;

        let asset_map: BTreeMap<u32, &str> = assets
            .iter()
            .map(|(index, asset)| (*index, asset.file_url.as_str()))
            .collect();
        let body = serde_json::json!({
            "slug": page.slug,
            "title": page.title,
            "sections": page.sections,
            "assets": asset_map,
        });

        let response = self
            .client
            .http
            .post(url.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteForgeError::Network(format!("{url}: HTTP {status}")));
        }

        let reply: PublishReply = response
            .json()
            .await
            .map_err(|e| SiteForgeError::Network(format!("{url}: malformed response: {e}")))?;

        Ok(PublishedPage {
            slug: page.slug.clone(),
            url: reply.url,
        })
    }
}
