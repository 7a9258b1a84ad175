//! Generic image-index visitor over section content trees.
//!
//! Generated content references images by abstract index in several shapes:
//! a scalar `image_index` field, slide/item objects each carrying one, or a
//! flat `image_indices` array (gallery case). One recursive walk handles all
//! of them at any nesting depth, so new content shapes need no new branches.

use std::collections::BTreeSet;

use serde_json::Value;

/// Field names that hold a single image index.
const INDEX_FIELDS: [&str; 2] = ["image_index", "imageIndex"];

/// Field names that hold a flat list of image indices.
const INDEX_LIST_FIELDS: [&str; 3] = ["image_indices", "imageIndexes", "image_indexes"];

/// Collect every distinct image index referenced anywhere in `value`.
pub fn collect_image_indices(value: &Value, out: &mut BTreeSet<u32>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if INDEX_FIELDS.contains(&key.as_str()) {
                    if let Some(index) = as_index(child) {
                        out.insert(index);
                    }
                } else if INDEX_LIST_FIELDS.contains(&key.as_str()) {
                    if let Value::Array(items) = child {
                        out.extend(items.iter().filter_map(as_index));
                    }
                } else {
                    collect_image_indices(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_image_indices(item, out);
            }
        }
        _ => {}
    }
}

/// Interpret a JSON value as an image index if it is a non-negative integer.
fn as_index(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(value: Value) -> Vec<u32> {
        let mut out = BTreeSet::new();
        collect_image_indices(&value, &mut out);
        out.into_iter().collect()
    }

    #[test]
    fn scalar_field() {
        assert_eq!(collect(json!({"image_index": 2})), vec![2]);
        assert_eq!(collect(json!({"imageIndex": 5})), vec![5]);
    }

    #[test]
    fn slides_list() {
        let content = json!({
            "headline": "Welcome",
            "slides": [
                {"caption": "a", "image_index": 0},
                {"caption": "b", "image_index": 1},
                {"caption": "c", "image_index": 0}
            ]
        });
        assert_eq!(collect(content), vec![0, 1]);
    }

    #[test]
    fn flat_gallery_list() {
        assert_eq!(collect(json!({"image_indices": [4, 2, 4, 7]})), vec![2, 4, 7]);
    }

    #[test]
    fn item_objects() {
        let content = json!({
            "items": [
                {"title": "Pool", "image_index": 3},
                {"title": "Spa", "image_index": 8}
            ]
        });
        assert_eq!(collect(content), vec![3, 8]);
    }

    #[test]
    fn deeply_nested_mixed_shapes() {
        let content = json!({
            "columns": [
                {"blocks": [{"media": {"imageIndex": 1}}]},
                {"gallery": {"image_indices": [1, 9]}}
            ],
            "footer": {"image_index": 0}
        });
        assert_eq!(collect(content), vec![0, 1, 9]);
    }

    #[test]
    fn ignores_non_integer_values() {
        let content = json!({
            "image_index": "three",
            "image_indices": [1, "two", -4, 2.5, null],
            "count": 12
        });
        assert_eq!(collect(content), vec![1]);
    }

    #[test]
    fn empty_content() {
        assert!(collect(json!({})).is_empty());
        assert!(collect(json!(null)).is_empty());
        assert!(collect(json!({"headline": "plain text only"})).is_empty());
    }
}
