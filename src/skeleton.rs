//! Starter taxonomies from public dataset labels
//!
//! Turns an ImageNet class index and a Places365 category list into a
//! wildcard tree that can be saved and grown from there.

use crate::tree::{Category, Children, WildcardTree};
use serde_json::Value;
use std::path::Path;

/// ImageNet `imagenet_class_index.json` shape: `{"0": ["n01440764", "tench"]}`
pub type ImagenetIndex = serde_json::Map<String, Value>;

/// `objects/animals` filled with ImageNet labels
pub fn imagenet_taxonomy(index: &ImagenetIndex) -> WildcardTree {
    let labels = index.values().filter_map(|entry| {
        entry
            .as_array()
            .and_then(|pair| pair.get(1))
            .and_then(Value::as_str)
            .map(|label| label.replace('_', " "))
    });
    nested("objects", "animals", Category::with_wildcards(labels))
}

/// `locations/places_list` filled with the last segment of each Places365
/// category line (`/f/forest/broadleaf 123` -> `broadleaf`)
pub fn places_taxonomy<S: AsRef<str>>(lines: &[S]) -> WildcardTree {
    let names = lines.iter().filter_map(|line| {
        let category = line.as_ref().split_whitespace().next()?;
        let last = category.trim_matches('/').rsplit('/').next()?;
        (!last.is_empty()).then(|| last.replace('_', " "))
    });
    nested("locations", "places_list", Category::with_wildcards(names))
}

fn nested(outer: &str, inner: &str, leaf: Category) -> WildcardTree {
    let mut children = Children::new();
    children.insert(inner.to_string(), leaf);
    let mut root = Children::new();
    root.insert(outer.to_string(), Category::with_children(children));
    WildcardTree::from_categories(root)
}

/// Merge top-level categories; later trees replace earlier ones on clashes
pub fn merge(trees: impl IntoIterator<Item = WildcardTree>) -> WildcardTree {
    let mut merged = WildcardTree::new();
    for tree in trees {
        for (name, category) in tree.categories() {
            merged
                .categories_mut()
                .insert(name.clone(), category.clone());
        }
    }
    merged
}

pub fn read_imagenet(path: &Path) -> Result<ImagenetIndex, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse ImageNet index {}: {}", path.display(), e))
}

pub fn read_places(path: &Path) -> Result<Vec<String>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// A handful of ImageNet entries for trying the builder without downloads
pub fn sample_imagenet() -> ImagenetIndex {
    let json = serde_json::json!({
        "0": ["n02119789", "kit_fox"],
        "1": ["n02100735", "English_setter"],
        "2": ["n00000000", "dummy_entry"],
        "3": ["n02123045", "tabby_cat"],
        "4": ["n02123159", "tiger_cat"]
    });
    match json {
        Value::Object(map) => map,
        _ => ImagenetIndex::new(),
    }
}

pub fn sample_places() -> Vec<String> {
    [
        "/a/airfield",
        "/a/airplane_cabin",
        "/b/bedroom",
        "/b/bar",
        "/k/kitchen",
        "/f/forest/broadleaf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
