//! Core domain types for SiteForge website generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for website-version identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub Uuid);

impl VersionId {
    /// Generate a new time-sortable version identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VersionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A UUID v7 wrapper for website identifiers.
///
/// A website id is minted together with its first `WebsiteVersion`; later
/// versions of the same property reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebsiteId(pub Uuid);

impl WebsiteId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WebsiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WebsiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WebsiteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// GenerationStatus
// ---------------------------------------------------------------------------

/// Pipeline status of a website version.
///
/// The orchestrator walks the statuses strictly in order; `ready_for_preview`
/// is terminal from its perspective. `deployed` is only ever set by the
/// explicit user-triggered deploy action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Queued,
    AnalyzingBrand,
    PlanningArchitecture,
    GeneratingContent,
    PreparingAssets,
    ReadyForPreview,
    Failed,
    Deployed,
}

impl GenerationStatus {
    /// Progress checkpoint persisted when *entering* this status.
    ///
    /// `None` for `failed`: a failed run keeps the progress of its last
    /// checkpoint, so the status itself carries no progress value.
    pub fn progress(self) -> Option<u8> {
        match self {
            Self::Queued => Some(0),
            Self::AnalyzingBrand => Some(10),
            Self::PlanningArchitecture => Some(30),
            Self::GeneratingContent => Some(50),
            Self::PreparingAssets => Some(70),
            Self::ReadyForPreview | Self::Deployed => Some(100),
            Self::Failed => None,
        }
    }

    /// Human-readable description of the active stage.
    pub fn step_description(self) -> &'static str {
        match self {
            Self::Queued => "Queued for generation",
            Self::AnalyzingBrand => "Analyzing brand and property context",
            Self::PlanningArchitecture => "Planning site architecture",
            Self::GeneratingContent => "Generating page content",
            Self::PreparingAssets => "Preparing images and assets",
            Self::ReadyForPreview => "Ready for preview",
            Self::Failed => "Generation failed",
            Self::Deployed => "Deployed",
        }
    }

    /// Whether no further orchestrator transitions can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ReadyForPreview | Self::Failed | Self::Deployed)
    }

    /// Stable storage key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::AnalyzingBrand => "analyzing_brand",
            Self::PlanningArchitecture => "planning_architecture",
            Self::GeneratingContent => "generating_content",
            Self::PreparingAssets => "preparing_assets",
            Self::ReadyForPreview => "ready_for_preview",
            Self::Failed => "failed",
            Self::Deployed => "deployed",
        }
    }
}

impl std::str::FromStr for GenerationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "analyzing_brand" => Ok(Self::AnalyzingBrand),
            "planning_architecture" => Ok(Self::PlanningArchitecture),
            "generating_content" => Ok(Self::GeneratingContent),
            "preparing_assets" => Ok(Self::PreparingAssets),
            "ready_for_preview" => Ok(Self::ReadyForPreview),
            "failed" => Ok(Self::Failed),
            "deployed" => Ok(Self::Deployed),
            other => Err(format!("unknown generation status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// WebsiteVersion
// ---------------------------------------------------------------------------

/// One persisted generation attempt for a property.
///
/// Created by the trigger, mutated exclusively by the orchestrator until
/// `ready_for_preview`, then by the explicit deploy action. The row is the
/// status surface: clients observe progress by re-reading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteVersion {
    /// Unique identifier for this generation attempt.
    pub id: VersionId,
    /// Website this version belongs to (stable across versions).
    pub website_id: WebsiteId,
    /// Owning property.
    pub property_id: String,
    /// Monotonic version number per property, starting at 1.
    pub version: u32,
    /// Current pipeline status.
    pub status: GenerationStatus,
    /// Progress 0–100, non-decreasing while status is non-terminal.
    pub progress: u8,
    /// Human-readable description of the active stage.
    pub current_step: String,
    /// Architecture payload produced by the planning stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<SiteArchitecture>,
    /// Full generated blueprint produced by the content stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_generated: Option<Blueprint>,
    /// Set only when status is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When generation was triggered.
    pub started_at: DateTime<Utc>,
    /// When a terminal status was reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the run, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    /// Heartbeat: refreshed at every checkpoint. A non-terminal row with a
    /// stale heartbeat indicates a crashed run.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SiteArchitecture
// ---------------------------------------------------------------------------

/// Output of the architecture-planning stage: pages and section skeletons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteArchitecture {
    /// Planned pages, in navigation order.
    pub pages: Vec<PagePlan>,
    /// Optional planner notes on theme/design direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_notes: Option<String>,
}

/// One planned page with its section skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePlan {
    /// URL slug (e.g. `home`, `about`).
    pub slug: String,
    /// Display title.
    pub title: String,
    /// Block type references for the planned sections, in order.
    pub sections: Vec<String>,
}

// ---------------------------------------------------------------------------
// Blueprint / Page / Section
// ---------------------------------------------------------------------------

/// The full structured representation of a generated website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    /// Pages in navigation order.
    pub pages: Vec<Page>,
}

impl Blueprint {
    /// Find a section and its containing page by section id.
    pub fn find_section(&self, section_id: &str) -> Option<(&Page, &Section)> {
        self.pages.iter().find_map(|page| {
            page.sections
                .iter()
                .find(|s| s.id == section_id)
                .map(|s| (page, s))
        })
    }

    /// Whether any page contains a section with the given id.
    pub fn contains_section(&self, section_id: &str) -> bool {
        self.find_section(section_id).is_some()
    }

    /// Find a page by slug.
    pub fn find_page(&self, slug: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.slug == slug)
    }
}

/// One page of a generated website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// URL slug.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// Ordered content sections.
    pub sections: Vec<Section>,
}

/// One content block within a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Immutable once assigned.
    pub id: String,
    /// Semantic type (e.g. `hero`, `gallery`).
    #[serde(rename = "type")]
    pub section_type: String,
    /// Must name a block type present in the capability catalog.
    pub block_ref: String,
    /// Content payload; shape depends on `block_ref`.
    pub content: serde_json::Value,
    /// Display variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Extra CSS classes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_classes: Option<String>,
    /// Position within the page, 0-based.
    pub order: u32,
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Where a resolved asset comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSource {
    /// Bound to a real stored image for the property.
    Storage,
    /// Synthesized stand-in URL; no stored photo existed for the index.
    Placeholder,
}

impl AssetSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Placeholder => "placeholder",
        }
    }
}

impl std::str::FromStr for AssetSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "storage" => Ok(Self::Storage),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(format!("unknown asset source: {other}")),
        }
    }
}

/// One resolved image asset.
///
/// Created exactly once per distinct image index during `preparing_assets`
/// and never mutated thereafter. Downstream rendering re-joins content to
/// assets by `image_index`. Rows are scoped to the version that resolved
/// them, so regenerating a website never disturbs the assets an earlier,
/// still-deployable version depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Unique asset id.
    pub id: String,
    /// The version whose resolution produced this asset.
    pub version_id: VersionId,
    /// Owning website.
    pub website_id: WebsiteId,
    /// Always `"image"` today.
    pub asset_type: String,
    /// Storage-backed or placeholder.
    pub source: AssetSource,
    /// Resolved URL.
    pub file_url: String,
    /// Alt text for rendering.
    pub alt_text: String,
    /// The abstract index this asset resolves.
    pub image_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_id_roundtrip() {
        let id = VersionId::new();
        let s = id.to_string();
        let parsed: VersionId = s.parse().expect("parse VersionId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_progress_checkpoints_ascend() {
        let order = [
            GenerationStatus::Queued,
            GenerationStatus::AnalyzingBrand,
            GenerationStatus::PlanningArchitecture,
            GenerationStatus::GeneratingContent,
            GenerationStatus::PreparingAssets,
            GenerationStatus::ReadyForPreview,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].progress().unwrap() < pair[1].progress().unwrap());
        }
    }

    #[test]
    fn failed_status_carries_no_progress() {
        // Frozen at the last checkpoint; only mark_failed may write the row
        assert_eq!(GenerationStatus::Failed.progress(), None);
        assert_eq!(GenerationStatus::Deployed.progress(), Some(100));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            GenerationStatus::Queued,
            GenerationStatus::AnalyzingBrand,
            GenerationStatus::PlanningArchitecture,
            GenerationStatus::GeneratingContent,
            GenerationStatus::PreparingAssets,
            GenerationStatus::ReadyForPreview,
            GenerationStatus::Failed,
            GenerationStatus::Deployed,
        ] {
            let parsed: GenerationStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
        assert!("deplyed".parse::<GenerationStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(GenerationStatus::ReadyForPreview.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
        assert!(GenerationStatus::Deployed.is_terminal());
        assert!(!GenerationStatus::GeneratingContent.is_terminal());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&GenerationStatus::ReadyForPreview).unwrap();
        assert_eq!(json, "\"ready_for_preview\"");
    }

    fn sample_blueprint() -> Blueprint {
        Blueprint {
            pages: vec![Page {
                slug: "home".into(),
                title: "Home".into(),
                sections: vec![
                    Section {
                        id: "sec-hero".into(),
                        section_type: "hero".into(),
                        block_ref: "hero-carousel".into(),
                        content: json!({"headline": "Welcome"}),
                        variant: None,
                        css_classes: None,
                        order: 0,
                    },
                    Section {
                        id: "sec-gallery".into(),
                        section_type: "gallery".into(),
                        block_ref: "photo-grid".into(),
                        content: json!({"image_indices": [0, 1]}),
                        variant: Some("wide".into()),
                        css_classes: None,
                        order: 1,
                    },
                ],
            }],
        }
    }

    #[test]
    fn blueprint_section_lookup() {
        let bp = sample_blueprint();
        let (page, section) = bp.find_section("sec-gallery").expect("find section");
        assert_eq!(page.slug, "home");
        assert_eq!(section.block_ref, "photo-grid");
        assert!(bp.find_section("sec-missing").is_none());
        assert!(bp.find_page("home").is_some());
    }

    #[test]
    fn section_serializes_type_field() {
        let bp = sample_blueprint();
        let json = serde_json::to_string(&bp.pages[0].sections[0]).unwrap();
        assert!(json.contains(r#""type":"hero""#));
        assert!(json.contains(r#""block_ref":"hero-carousel""#));

        let parsed: Section = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.section_type, "hero");
    }

    #[test]
    fn architecture_serialization() {
        let arch = SiteArchitecture {
            pages: vec![PagePlan {
                slug: "home".into(),
                title: "Home".into(),
                sections: vec!["hero-carousel".into(), "photo-grid".into()],
            }],
            design_notes: None,
        };
        let json = serde_json::to_string(&arch).unwrap();
        let parsed: SiteArchitecture = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pages.len(), 1);
        assert_eq!(parsed.pages[0].sections.len(), 2);
    }
}
