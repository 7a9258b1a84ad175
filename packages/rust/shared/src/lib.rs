//! Shared domain types, error taxonomy, and configuration for SiteForge.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, CatalogConfig, CmsConfig, DefaultsConfig, LlmConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, SiteForgeError};
pub use types::{
    Asset, AssetSource, Blueprint, GenerationStatus, Page, Section, SiteArchitecture,
    VersionId, WebsiteId, WebsiteVersion,
};
