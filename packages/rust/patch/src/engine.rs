//! Patch engine: locate target, plan operations, validate the batch against
//! a snapshot, apply all-or-nothing.
//!
//! Validation always runs over the *entire* proposed batch before any
//! mutation. Application then runs on a clone of the snapshot, so a caller
//! that receives an error is guaranteed to observe zero mutations.

use async_trait::async_trait;
use serde_json::Value;
use siteforge_catalog::CapabilityCatalog;
use siteforge_shared::{Blueprint, Result, Section, SiteForgeError};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::ops::PatchOperation;

// ---------------------------------------------------------------------------
// Planner boundary
// ---------------------------------------------------------------------------

/// Context handed to the planner for one edit request.
#[derive(Debug, Clone)]
pub struct EditContext {
    /// The section the user is editing.
    pub section: Section,
    /// Slug of the page containing it.
    pub page_slug: String,
    /// Title of the page containing it.
    pub page_title: String,
    /// Brand/property context, opaque to the engine.
    pub brand_context: Value,
    /// Catalog of block types any added section must conform to.
    pub catalog: CapabilityCatalog,
}

/// Translates a free-form edit intent into proposed patch operations.
///
/// Implementations return the raw JSON array from the completion service;
/// the engine owns parsing so that malformed operations are reported with
/// their batch index.
#[async_trait]
pub trait PatchPlanner: Send + Sync {
    async fn propose(&self, context: &EditContext, user_intent: &str) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Result of a successful patch request.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// The validated operations, in application order.
    pub operations: Vec<PatchOperation>,
    /// The blueprint with the whole batch applied.
    pub blueprint: Blueprint,
}

/// Validates and applies planner-proposed patch batches.
pub struct PatchEngine<'a> {
    planner: &'a dyn PatchPlanner,
}

impl<'a> PatchEngine<'a> {
    pub fn new(planner: &'a dyn PatchPlanner) -> Self {
        Self { planner }
    }

    /// Handle one edit request end to end: locate the target section, ask
    /// the planner for operations, validate the entire batch, apply it.
    #[instrument(skip_all, fields(section_id, intent_len = user_intent.len()))]
    pub async fn patch(
        &self,
        blueprint: &Blueprint,
        section_id: &str,
        user_intent: &str,
        brand_context: &Value,
        catalog: &CapabilityCatalog,
    ) -> Result<PatchOutcome> {
        let (page, section) = blueprint.find_section(section_id).ok_or_else(|| {
            SiteForgeError::not_found(format!("section {section_id} not found in blueprint"))
        })?;

        let context = EditContext {
            section: section.clone(),
            page_slug: page.slug.clone(),
            page_title: page.title.clone(),
            brand_context: brand_context.clone(),
            catalog: catalog.clone(),
        };

        let proposed = self.planner.propose(&context, user_intent).await?;
        let operations = parse_batch(&proposed)?;
        validate_batch(&operations, blueprint, section_id, catalog)?;
        let updated = apply_batch(blueprint, &operations);

        info!(
            operations = operations.len(),
            "patch batch validated and applied"
        );

        Ok(PatchOutcome {
            operations,
            blueprint: updated,
        })
    }
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parse a planner payload into operations, reporting the index of any
/// element whose tag is unknown or whose shape is malformed.
pub fn parse_batch(proposed: &Value) -> Result<Vec<PatchOperation>> {
    let items = proposed
        .as_array()
        .ok_or_else(|| SiteForgeError::patch_rule("planner output is not an array", 0))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item.clone()).map_err(|e| {
                SiteForgeError::patch_rule(format!("unknown or malformed operation: {e}"), i)
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Validate every operation against the snapshot. Any violation rejects the
/// entire batch; nothing may be applied beforehand.
pub fn validate_batch(
    operations: &[PatchOperation],
    snapshot: &Blueprint,
    target_section_id: &str,
    catalog: &CapabilityCatalog,
) -> Result<()> {
    for (i, op) in operations.iter().enumerate() {
        match op {
            PatchOperation::UpdateSection { section_id, .. } => {
                if section_id != target_section_id {
                    return Err(SiteForgeError::patch_rule(
                        format!(
                            "update_section.section_id '{section_id}' does not match the \
                             requested target '{target_section_id}'"
                        ),
                        i,
                    ));
                }
            }
            PatchOperation::AddSection {
                page_slug,
                after_section_id,
                section,
            } => {
                if !catalog.has_block(&section.block_ref) {
                    return Err(SiteForgeError::patch_rule(
                        format!(
                            "add_section.section.block_ref '{}' does not exist in the \
                             capability catalog",
                            section.block_ref
                        ),
                        i,
                    ));
                }
                if snapshot.find_page(page_slug).is_none() {
                    return Err(SiteForgeError::patch_rule(
                        format!("add_section.page_slug '{page_slug}' not found"),
                        i,
                    ));
                }
                if let Some(after) = after_section_id {
                    if !snapshot.contains_section(after) {
                        return Err(SiteForgeError::patch_rule(
                            format!("add_section.after_section_id '{after}' not found"),
                            i,
                        ));
                    }
                }
            }
            PatchOperation::RemoveSection { section_id } => {
                if !snapshot.contains_section(section_id) {
                    return Err(SiteForgeError::patch_rule(
                        format!("remove_section.section_id '{section_id}' not found"),
                        i,
                    ));
                }
            }
            PatchOperation::MoveSection { section_id, .. } => {
                if !snapshot.contains_section(section_id) {
                    return Err(SiteForgeError::patch_rule(
                        format!("move_section.section_id '{section_id}' not found"),
                        i,
                    ));
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Apply a validated batch to a clone of the snapshot. Each page's section
/// orders are renumbered 0..n afterwards.
///
/// Callers must validate first; operations referencing sections removed
/// earlier in the same batch are skipped rather than panicking.
pub fn apply_batch(snapshot: &Blueprint, operations: &[PatchOperation]) -> Blueprint {
    let mut blueprint = snapshot.clone();

    for op in operations {
        match op {
            PatchOperation::UpdateSection {
                section_id,
                content,
                variant,
                css_classes,
                ..
            } => {
                if let Some(section) = find_section_mut(&mut blueprint, section_id) {
                    if let Some(content) = content {
                        section.content = content.clone();
                    }
                    if let Some(variant) = variant {
                        section.variant = Some(variant.clone());
                    }
                    if let Some(css_classes) = css_classes {
                        section.css_classes = Some(css_classes.clone());
                    }
                }
            }
            PatchOperation::AddSection {
                page_slug,
                after_section_id,
                section,
            } => {
                if let Some(page) = blueprint.pages.iter_mut().find(|p| p.slug == *page_slug) {
                    let position = after_section_id
                        .as_deref()
                        .and_then(|after| page.sections.iter().position(|s| s.id == after))
                        .map(|p| p + 1)
                        .unwrap_or(page.sections.len());

                    page.sections.insert(
                        position,
                        Section {
                            id: format!("sec-{}", Uuid::now_v7()),
                            section_type: section.block_ref.clone(),
                            block_ref: section.block_ref.clone(),
                            content: section.content.clone(),
                            variant: None,
                            css_classes: None,
                            order: position as u32,
                        },
                    );
                }
            }
            PatchOperation::RemoveSection { section_id } => {
                for page in &mut blueprint.pages {
                    page.sections.retain(|s| s.id != *section_id);
                }
            }
            PatchOperation::MoveSection {
                section_id,
                to_order,
            } => {
                for page in &mut blueprint.pages {
                    if let Some(from) = page.sections.iter().position(|s| s.id == *section_id) {
                        let section = page.sections.remove(from);
                        let to = (*to_order as usize).min(page.sections.len());
                        page.sections.insert(to, section);
                        break;
                    }
                }
            }
        }
    }

    for page in &mut blueprint.pages {
        for (i, section) in page.sections.iter_mut().enumerate() {
            section.order = i as u32;
        }
    }

    blueprint
}

fn find_section_mut<'b>(blueprint: &'b mut Blueprint, section_id: &str) -> Option<&'b mut Section> {
    blueprint
        .pages
        .iter_mut()
        .flat_map(|p| p.sections.iter_mut())
        .find(|s| s.id == section_id)
}
