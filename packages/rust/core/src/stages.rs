//! Stage boundaries for the generation pipeline.
//!
//! Each orchestrated stage is modeled as an async trait so the pipeline can
//! be driven against the completion service in production and against canned
//! implementations in tests. The trait implementations own shape validation:
//! a structurally invalid payload is a `Generation` error, never silently
//! coerced.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use siteforge_shared::{
    Blueprint, Page, Result, Section, SiteArchitecture, SiteForgeError,
};
use tracing::instrument;
use uuid::Uuid;

use crate::llm::CompletionClient;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produces the brand/property/competitor context for a property.
/// The payload is opaque to the pipeline; it is threaded into prompts.
#[async_trait]
pub trait ContextAssembler: Send + Sync {
    async fn assemble(&self, property_id: &str) -> Result<Value>;
}

/// Plans the site architecture (pages and section skeletons) from context.
#[async_trait]
pub trait ArchitecturePlanner: Send + Sync {
    async fn plan(&self, context: &Value) -> Result<SiteArchitecture>;
}

/// Generates full section content per page from the architecture.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, context: &Value, architecture: &SiteArchitecture)
    -> Result<Blueprint>;
}

// ---------------------------------------------------------------------------
// Shape validation
// ---------------------------------------------------------------------------

/// Parse and shape-validate an architecture payload.
pub fn architecture_from_value(value: Value) -> Result<SiteArchitecture> {
    let architecture: SiteArchitecture = serde_json::from_value(value).map_err(|e| {
        SiteForgeError::Generation(format!("architecture payload is malformed: {e}"))
    })?;

    if architecture.pages.is_empty() {
        return Err(SiteForgeError::Generation(
            "architecture payload contains no pages".into(),
        ));
    }
    for page in &architecture.pages {
        if page.slug.is_empty() {
            return Err(SiteForgeError::Generation(
                "architecture page is missing a slug".into(),
            ));
        }
        if page.sections.is_empty() {
            return Err(SiteForgeError::Generation(format!(
                "architecture page '{}' has no sections",
                page.slug
            )));
        }
    }
    Ok(architecture)
}

/// Raw page shape as the generator returns it: sections without ids or order.
#[derive(Debug, Deserialize)]
struct GeneratedPage {
    slug: String,
    title: String,
    sections: Vec<GeneratedSection>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSection {
    #[serde(rename = "type", default)]
    section_type: Option<String>,
    block_ref: String,
    content: Value,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    css_classes: Option<String>,
}

/// Parse and shape-validate a generated-content payload, assigning section
/// ids and order values.
pub fn blueprint_from_value(value: Value) -> Result<Blueprint> {
    #[derive(Debug, Deserialize)]
    struct RawBlueprint {
        pages: Vec<GeneratedPage>,
    }

    let raw: RawBlueprint = serde_json::from_value(value)
        .map_err(|e| SiteForgeError::Generation(format!("content payload is malformed: {e}")))?;

    if raw.pages.is_empty() {
        return Err(SiteForgeError::Generation(
            "content payload contains no pages".into(),
        ));
    }

    let pages = raw
        .pages
        .into_iter()
        .map(|page| {
            if page.slug.is_empty() {
                return Err(SiteForgeError::Generation(
                    "generated page is missing a slug".into(),
                ));
            }
            if page.sections.is_empty() {
                return Err(SiteForgeError::Generation(format!(
                    "generated page '{}' has no sections",
                    page.slug
                )));
            }
            let sections = page
                .sections
                .into_iter()
                .enumerate()
                .map(|(i, s)| Section {
                    id: format!("sec-{}", Uuid::now_v7()),
                    section_type: s.section_type.unwrap_or_else(|| s.block_ref.clone()),
                    block_ref: s.block_ref,
                    content: s.content,
                    variant: s.variant,
                    css_classes: s.css_classes,
                    order: i as u32,
                })
                .collect();
            Ok(Page {
                slug: page.slug,
                title: page.title,
                sections,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Blueprint { pages })
}

// ---------------------------------------------------------------------------
// LLM-backed implementations
// ---------------------------------------------------------------------------

/// Architecture planner backed by the completion service.
pub struct LlmArchitecturePlanner {
    client: CompletionClient,
}

impl LlmArchitecturePlanner {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArchitecturePlanner for LlmArchitecturePlanner {
    #[instrument(skip_all)]
    async fn plan(&self, context: &Value) -> Result<SiteArchitecture> {
        let system = "You are a website information architect. Respond with JSON only: \
                      {\"pages\": [{\"slug\", \"title\", \"sections\": [block refs]}], \
                      \"design_notes\"}.";
        let user = format!(
            "Plan the page structure for this property:\n{}",
            serde_json::to_string_pretty(context).unwrap_or_default()
        );
        let value = self.client.complete_json(system, &user).await?;
        architecture_from_value(value)
    }
}

/// Content generator backed by the completion service.
pub struct LlmContentGenerator {
    client: CompletionClient,
}

impl LlmContentGenerator {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    #[instrument(skip_all)]
    async fn generate(
        &self,
        context: &Value,
        architecture: &SiteArchitecture,
    ) -> Result<Blueprint> {
        let system = "You are a marketing copywriter. Fill in full section content for the \
                      planned pages. Respond with JSON only: {\"pages\": [{\"slug\", \"title\", \
                      \"sections\": [{\"block_ref\", \"content\", \"variant\"}]}]}. Reference \
                      images by abstract index via image_index / image_indices fields.";
        let user = format!(
            "Property context:\n{}\n\nPlanned architecture:\n{}",
            serde_json::to_string_pretty(context).unwrap_or_default(),
            serde_json::to_string_pretty(architecture).unwrap_or_default(),
        );
        let value = self.client.complete_json(system, &user).await?;
        blueprint_from_value(value)
    }
}

/// Patch planner backed by the completion service.
pub struct LlmPatchPlanner {
    client: CompletionClient,
}

impl LlmPatchPlanner {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl siteforge_patch::PatchPlanner for LlmPatchPlanner {
    #[instrument(skip_all)]
    async fn propose(
        &self,
        context: &siteforge_patch::EditContext,
        user_intent: &str,
    ) -> Result<Value> {
        let system = "You are a website editor. Translate the user's intent into a JSON array \
                      of patch operations. Allowed ops: update_section, add_section, \
                      remove_section, move_section. Each update carries the target section_id \
                      unchanged and a reasoning string. New sections must use block_ref values \
                      from the provided catalog.";
        let catalog_blocks: Vec<&str> = context
            .catalog
            .blocks
            .iter()
            .map(|b| b.slug.as_str())
            .collect();
        let user = format!(
            "Target section (id {}, on page '{}'):\n{}\n\nAvailable blocks: {}\n\n\
             Brand context:\n{}\n\nUser request: {}",
            context.section.id,
            context.page_slug,
            serde_json::to_string_pretty(&context.section).unwrap_or_default(),
            catalog_blocks.join(", "),
            serde_json::to_string_pretty(&context.brand_context).unwrap_or_default(),
            user_intent,
        );
        let value = self.client.complete_json(system, &user).await?;

        // Models sometimes wrap the array in an envelope object
        match value {
            Value::Object(mut map) if map.contains_key("operations") => {
                Ok(map.remove("operations").unwrap_or(Value::Array(vec![])))
            }
            other => Ok(other),
        }
    }
}
