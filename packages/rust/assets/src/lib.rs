//! Asset resolution for generated blueprints.
//!
//! Scans every section of every generated page for abstract image-index
//! references and resolves each distinct index to a stored image or a
//! deterministic placeholder, inserting exactly one asset row per index.

mod visitor;

use std::collections::BTreeSet;

use async_trait::async_trait;
use siteforge_shared::{Asset, AssetSource, Blueprint, Result, VersionId, WebsiteId};
use siteforge_storage::Storage;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use visitor::collect_image_indices;

/// Upper bound on stored images considered for a property.
pub const MAX_STORED_IMAGES: usize = 50;

/// One stored image available to a property.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// File name; listing order is by name, so the name is the ordinal key.
    pub name: String,
    /// Public URL of the stored file.
    pub url: String,
    /// Alt text, if the library has one.
    pub alt_text: Option<String>,
}

/// Source of stored images for a property (object storage, media library).
#[async_trait]
pub trait ImageLibrary: Send + Sync {
    /// List up to `limit` stored images, ordered deterministically by name.
    async fn list_images(&self, property_id: &str, limit: usize) -> Result<Vec<StoredImage>>;
}

/// Resolves image-index references in a blueprint to asset rows.
pub struct AssetResolver<'a> {
    library: &'a dyn ImageLibrary,
}

impl<'a> AssetResolver<'a> {
    pub fn new(library: &'a dyn ImageLibrary) -> Self {
        Self { library }
    }

    /// Resolve every distinct image index in `blueprint` and persist one
    /// asset row per index, scoped to the resolving version. Returns the
    /// inserted assets ordered by index.
    ///
    /// A failure to list stored images degrades to all placeholders rather
    /// than failing the stage; no rendering step strictly requires a real
    /// photo.
    #[instrument(skip_all, fields(version_id = %version_id, property_id))]
    pub async fn resolve(
        &self,
        storage: &Storage,
        version_id: &VersionId,
        website_id: &WebsiteId,
        property_id: &str,
        blueprint: &Blueprint,
    ) -> Result<Vec<Asset>> {
        let mut indices = BTreeSet::new();
        for page in &blueprint.pages {
            for section in &page.sections {
                collect_image_indices(&section.content, &mut indices);
            }
        }

        if indices.is_empty() {
            info!("blueprint references no images");
            return Ok(Vec::new());
        }

        let stored = match self.library.list_images(property_id, MAX_STORED_IMAGES).await {
            Ok(mut images) => {
                images.sort_by(|a, b| a.name.cmp(&b.name));
                images
            }
            Err(e) => {
                warn!(error = %e, "image listing failed, falling back to placeholders");
                Vec::new()
            }
        };

        // Re-resolution replaces this version's prior rows wholesale. Other
        // versions of the website keep the assets they were resolved with.
        storage.delete_assets(version_id).await?;

        let mut assets = Vec::with_capacity(indices.len());
        for index in indices {
            let asset = match stored.get(index as usize) {
                Some(image) => Asset {
                    id: Uuid::now_v7().to_string(),
                    version_id: version_id.clone(),
                    website_id: website_id.clone(),
                    asset_type: "image".into(),
                    source: AssetSource::Storage,
                    file_url: image.url.clone(),
                    alt_text: image
                        .alt_text
                        .clone()
                        .unwrap_or_else(|| image.name.clone()),
                    image_index: index,
                },
                None => Asset {
                    id: Uuid::now_v7().to_string(),
                    version_id: version_id.clone(),
                    website_id: website_id.clone(),
                    asset_type: "image".into(),
                    source: AssetSource::Placeholder,
                    file_url: placeholder_url(index),
                    alt_text: format!("Placeholder image {index}"),
                    image_index: index,
                },
            };

            storage.insert_asset(&asset).await?;
            assets.push(asset);
        }

        let placeholders = assets
            .iter()
            .filter(|a| a.source == AssetSource::Placeholder)
            .count();
        info!(
            resolved = assets.len(),
            placeholders,
            "asset resolution complete"
        );

        Ok(assets)
    }
}

/// Deterministic placeholder URL encoding the image index.
pub fn placeholder_url(index: u32) -> String {
    format!("https://placehold.co/1200x800?text=Image+{index}")
}
