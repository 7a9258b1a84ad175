//! Deployment of a ready version through a publish adapter.
//!
//! The adapter abstracts the CMS/hosting side; `deploy` only gates on state
//! (the version must be `ready_for_preview`), hands each page plus the
//! version's resolved assets to the adapter, and flips the row to `deployed`
//! once every page went out.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use siteforge_shared::{
    Asset, GenerationStatus, Page, Result, SiteForgeError, VersionId,
};
use siteforge_storage::Storage;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPage {
    pub slug: String,
    pub url: String,
}

/// Pushes one rendered page to the hosting target.
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// `assets` is keyed by abstract image index, as referenced from section
    /// content.
    async fn publish_page(
        &self,
        page: &Page,
        assets: &BTreeMap<u32, Asset>,
    ) -> Result<PublishedPage>;
}

/// Deploy a ready version. Fails without a status change when the version is
/// not in `ready_for_preview` or any page fails to publish.
#[instrument(skip(storage, adapter), fields(version_id = %version_id))]
pub async fn deploy(
    storage: &Storage,
    adapter: Arc<dyn PublishAdapter>,
    version_id: &VersionId,
) -> Result<Vec<PublishedPage>> {
    let row = storage.get_version(version_id).await?.ok_or_else(|| {
        SiteForgeError::not_found(format!("website version {version_id} not found"))
    })?;

    if row.status != GenerationStatus::ReadyForPreview {
        return Err(SiteForgeError::validation(format!(
            "version {} is {}, only ready_for_preview versions can be deployed",
            row.version,
            row.status.as_str()
        )));
    }

    let blueprint = row.pages_generated.ok_or_else(|| {
        SiteForgeError::validation(format!("version {} has no generated pages", row.version))
    })?;

    // Keyed to the version being deployed: a newer version's resolution
    // cannot swap assets out from under an older ready one.
    let assets: BTreeMap<u32, Asset> = storage
        .list_assets(version_id)
        .await?
        .into_iter()
        .map(|asset| (asset.image_index, asset))
        .collect();

    let mut published = Vec::with_capacity(blueprint.pages.len());
    for page in &blueprint.pages {
        let page_out = adapter.publish_page(page, &assets).await?;
        info!(slug = %page_out.slug, url = %page_out.url, "page published");
        published.push(page_out);
    }

    storage.mark_deployed(version_id).await?;
    info!(pages = published.len(), "version deployed");
    Ok(published)
}
