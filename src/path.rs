//! Slash-delimited category paths
//!
//! `Characters/Job` addresses the `Job` category inside the `Characters`
//! branch. Lookups never fail loudly: an unknown segment resolves to `None`.

use crate::tree::{Category, CategoryKind, Children, TreeError, WildcardTree};

pub const SEPARATOR: char = '/';

/// Split a path into trimmed segments, rejecting empty ones
pub fn segments(path: &str) -> Result<Vec<&str>, TreeError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(TreeError::InvalidPath(path.to_string()));
    }
    trimmed
        .split(SEPARATOR)
        .map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                Err(TreeError::InvalidPath(path.to_string()))
            } else {
                Ok(segment)
            }
        })
        .collect()
}

/// Check a single category name
pub fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.trim().is_empty() || name.contains(SEPARATOR) {
        return Err(TreeError::InvalidPath(name.to_string()));
    }
    Ok(())
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, SEPARATOR, name)
    }
}

/// Everything before the last separator, `None` for top-level paths
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

/// `Characters/Job_Title` -> `Characters > Job Title`
pub fn readable(path: &str) -> String {
    path.replace(SEPARATOR, " > ").replace('_', " ")
}

pub fn resolve<'a>(path: &str, tree: &'a WildcardTree) -> Option<&'a Category> {
    let parts = segments(path).ok()?;
    let (first, rest) = parts.split_first()?;
    let mut node = tree.categories().get(*first)?;
    for part in rest {
        node = node.children()?.get(*part)?;
    }
    Some(node)
}

pub fn resolve_mut<'a>(path: &str, tree: &'a mut WildcardTree) -> Option<&'a mut Category> {
    let parts = segments(path).ok()?;
    let (first, rest) = parts.split_first()?;
    let mut node = tree.categories_mut().get_mut(*first)?;
    for part in rest {
        node = node.children_mut()?.get_mut(*part)?;
    }
    Some(node)
}

/// Every full path that reaches a leaf, sorted. Empty branches contribute
/// nothing.
pub fn list_paths(tree: &WildcardTree) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(tree.categories(), "", &mut paths);
    paths.sort();
    paths
}

fn collect_paths(children: &Children, prefix: &str, out: &mut Vec<String>) {
    for (name, category) in children {
        let current = join(prefix, name);
        match &category.kind {
            CategoryKind::Wildcards(_) => out.push(current),
            CategoryKind::Children(nested) => collect_paths(nested, &current, out),
        }
    }
}

/// Keys of the branch one level above `path`; top-level keys for empty or
/// single-segment paths.
pub fn sibling_keys(path: &str, tree: &WildcardTree) -> Vec<String> {
    match parent(path.trim()) {
        None => tree.categories().keys().cloned().collect(),
        Some(parent_path) => resolve(parent_path, tree)
            .and_then(Category::children)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default(),
    }
}
