//! Patch operation protocol types.
//!
//! Operations are ephemeral: proposed by the planner, validated as a batch,
//! applied to a blueprint snapshot, and discarded.

use serde::{Deserialize, Serialize};

/// One structured mutation of a blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOperation {
    /// Change fields of an existing section. `section_id` must equal the
    /// section targeted by the edit request; it is never reassigned.
    UpdateSection {
        section_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        css_classes: Option<String>,
        reasoning: String,
    },

    /// Insert a new section into a page, after `after_section_id` when given,
    /// otherwise at the end of the page.
    AddSection {
        page_slug: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_section_id: Option<String>,
        section: NewSection,
    },

    /// Delete a section.
    RemoveSection { section_id: String },

    /// Reposition a section within its page.
    MoveSection { section_id: String, to_order: u32 },
}

impl PatchOperation {
    /// Stable name of the operation kind, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateSection { .. } => "update_section",
            Self::AddSection { .. } => "add_section",
            Self::RemoveSection { .. } => "remove_section",
            Self::MoveSection { .. } => "move_section",
        }
    }
}

/// Payload of an `add_section` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSection {
    /// Must exist in the capability catalog at validation time.
    pub block_ref: String,
    /// Content payload for the new section.
    pub content: serde_json::Value,
    /// Why the planner proposes this section.
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_section_roundtrip() {
        let json_op = json!({
            "op": "update_section",
            "section_id": "sec-1",
            "variant": "centered",
            "reasoning": "center the headline per the request"
        });
        let op: PatchOperation = serde_json::from_value(json_op).expect("parse");
        match &op {
            PatchOperation::UpdateSection {
                section_id,
                content,
                variant,
                ..
            } => {
                assert_eq!(section_id, "sec-1");
                assert!(content.is_none());
                assert_eq!(variant.as_deref(), Some("centered"));
            }
            other => panic!("expected update_section, got {}", other.kind()),
        }

        let back = serde_json::to_value(&op).unwrap();
        assert_eq!(back["op"], "update_section");
        assert!(back.get("content").is_none());
    }

    #[test]
    fn add_section_roundtrip() {
        let json_op = json!({
            "op": "add_section",
            "page_slug": "home",
            "after_section_id": "sec-1",
            "section": {
                "block_ref": "faq-list",
                "content": {"items": []},
                "reasoning": "the intent asks for an FAQ"
            }
        });
        let op: PatchOperation = serde_json::from_value(json_op).expect("parse");
        assert_eq!(op.kind(), "add_section");
    }

    #[test]
    fn unknown_tag_fails_to_parse() {
        let json_op = json!({"op": "replace_page", "page_slug": "home"});
        assert!(serde_json::from_value::<PatchOperation>(json_op).is_err());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        // update_section without reasoning
        let json_op = json!({"op": "update_section", "section_id": "sec-1"});
        assert!(serde_json::from_value::<PatchOperation>(json_op).is_err());
    }
}
