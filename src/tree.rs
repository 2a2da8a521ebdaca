//! In-memory category tree
//!
//! A tree is a mapping of category name -> [`Category`]. Every category
//! carries an instruction and is either a leaf (a sorted set of wildcards)
//! or a branch (more named categories), never both.

use crate::path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Error type for tree operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Path or category name is empty or contains an empty segment
    InvalidPath(String),
    /// No category lives at this path
    NotFound(String),
    /// The operation needs a leaf but found a branch
    NotALeaf(String),
    /// Cannot nest a category under a leaf that still holds wildcards
    LeafNotEmpty(String),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::InvalidPath(p) => write!(f, "Invalid category path '{}'", p),
            TreeError::NotFound(p) => write!(f, "Category '{}' not found", p),
            TreeError::NotALeaf(p) => {
                write!(f, "Category '{}' holds sub-categories, not wildcards", p)
            }
            TreeError::LeafNotEmpty(p) => write!(
                f,
                "Category '{}' already holds wildcards and cannot hold sub-categories",
                p
            ),
        }
    }
}

impl std::error::Error for TreeError {}

pub type Result<T> = std::result::Result<T, TreeError>;

/// Named children of a branch (or of the tree root), in insertion order
pub type Children = IndexMap<String, Category>;

/// A single node of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Free-text guidance used to steer generation for this category
    #[serde(default)]
    pub instruction: String,
    #[serde(flatten)]
    pub kind: CategoryKind,
}

/// Shape of a node: leaf XOR branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Wildcards(BTreeSet<String>),
    Children(Children),
}

/// A suggested new category returned by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    #[serde(default)]
    pub instruction: String,
}

impl Category {
    /// Empty leaf with no instruction
    pub fn leaf() -> Self {
        Self::with_wildcards(std::iter::empty::<String>())
    }

    /// Empty branch with no instruction
    pub fn branch() -> Self {
        Self {
            instruction: String::new(),
            kind: CategoryKind::Children(Children::new()),
        }
    }

    pub fn with_wildcards<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instruction: String::new(),
            kind: CategoryKind::Wildcards(words.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with_children(children: Children) -> Self {
        Self {
            instruction: String::new(),
            kind: CategoryKind::Children(children),
        }
    }

    pub fn instructed(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, CategoryKind::Wildcards(_))
    }

    pub fn wildcards(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            CategoryKind::Wildcards(words) => Some(words),
            CategoryKind::Children(_) => None,
        }
    }

    pub fn children(&self) -> Option<&Children> {
        match &self.kind {
            CategoryKind::Children(children) => Some(children),
            CategoryKind::Wildcards(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Children> {
        match &mut self.kind {
            CategoryKind::Children(children) => Some(children),
            CategoryKind::Wildcards(_) => None,
        }
    }
}

/// The whole wildcard hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WildcardTree {
    categories: Children,
}

impl WildcardTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_categories(categories: Children) -> Self {
        Self { categories }
    }

    /// Top-level categories
    pub fn categories(&self) -> &Children {
        &self.categories
    }

    pub fn categories_mut(&mut self) -> &mut Children {
        &mut self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Category> {
        path::resolve(path, self)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Category> {
        path::resolve_mut(path, self)
    }

    /// Every path that ends at a leaf, sorted
    pub fn paths(&self) -> Vec<String> {
        path::list_paths(self)
    }

    /// Wildcards of the leaf at `path`
    pub fn wildcards(&self, path: &str) -> Result<&BTreeSet<String>> {
        let category = self
            .get(path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        category
            .wildcards()
            .ok_or_else(|| TreeError::NotALeaf(path.to_string()))
    }

    fn leaf_mut(&mut self, path: &str) -> Result<&mut BTreeSet<String>> {
        let category = self
            .get_mut(path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        match &mut category.kind {
            CategoryKind::Wildcards(words) => Ok(words),
            CategoryKind::Children(_) => Err(TreeError::NotALeaf(path.to_string())),
        }
    }

    /// Add one wildcard to a leaf. Returns false when the word was blank or
    /// already present.
    pub fn add_wildcard(&mut self, path: &str, word: &str) -> Result<bool> {
        let words = self.leaf_mut(path)?;
        let word = word.trim();
        if word.is_empty() {
            return Ok(false);
        }
        Ok(words.insert(word.to_string()))
    }

    /// Remove the listed wildcards from a leaf, returning how many were removed
    pub fn remove_wildcards<S: AsRef<str>>(&mut self, path: &str, words: &[S]) -> Result<usize> {
        let existing = self.leaf_mut(path)?;
        let mut removed = 0;
        for word in words {
            if existing.remove(word.as_ref()) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Union generated words into a leaf, returning the ones that were new
    pub fn merge_wildcards<S: AsRef<str>>(&mut self, path: &str, words: &[S]) -> Result<Vec<String>> {
        let existing = self.leaf_mut(path)?;
        let mut added = Vec::new();
        for word in words {
            let word = word.as_ref().trim();
            if !word.is_empty() && existing.insert(word.to_string()) {
                added.push(word.to_string());
            }
        }
        added.sort();
        Ok(added)
    }

    /// Replace the instruction of the category at `path`
    pub fn set_instruction(&mut self, path: &str, instruction: &str) -> Result<()> {
        let category = self
            .get_mut(path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        category.instruction = instruction.trim().to_string();
        Ok(())
    }

    /// Create the category at `path`, creating intermediate branches.
    ///
    /// An empty leaf met on the way becomes a branch; a leaf holding
    /// wildcards is left alone and the call fails. Returns whether anything
    /// was created.
    pub fn create_category(&mut self, path: &str) -> Result<bool> {
        let segments = path::segments(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| TreeError::InvalidPath(path.to_string()))?;

        let mut created = false;
        let mut current = &mut self.categories;
        let mut walked = String::new();
        for segment in parents {
            walked = path::join(&walked, segment);
            if !current.contains_key(*segment) {
                current.insert(segment.to_string(), Category::branch());
                created = true;
            }
            let node = current
                .get_mut(*segment)
                .ok_or_else(|| TreeError::NotFound(walked.clone()))?;
            if let CategoryKind::Wildcards(words) = &node.kind {
                if !words.is_empty() {
                    return Err(TreeError::LeafNotEmpty(walked));
                }
                node.kind = CategoryKind::Children(Children::new());
                created = true;
            }
            current = match &mut node.kind {
                CategoryKind::Children(children) => children,
                CategoryKind::Wildcards(_) => return Err(TreeError::NotALeaf(walked)),
            };
        }

        if !current.contains_key(*last) {
            current.insert(last.to_string(), Category::leaf());
            created = true;
        }
        Ok(created)
    }

    /// Remove the category at `path` from its parent. The parent stays,
    /// even when this leaves it empty.
    pub fn delete_category(&mut self, path: &str) -> Result<Category> {
        let segments = path::segments(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| TreeError::InvalidPath(path.to_string()))?;

        let siblings = if parents.is_empty() {
            &mut self.categories
        } else {
            let parent_path = parents.join("/");
            self.get_mut(&parent_path)
                .and_then(Category::children_mut)
                .ok_or_else(|| TreeError::NotFound(path.to_string()))?
        };
        siblings
            .shift_remove(*last)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))
    }

    /// Children map new categories are suggested into for `path`
    fn insertion_parent_mut(&mut self, path: &str) -> Result<&mut Children> {
        match path::parent(path) {
            None => Ok(&mut self.categories),
            Some(parent) => self
                .get_mut(parent)
                .and_then(Category::children_mut)
                .ok_or_else(|| TreeError::NotFound(parent.to_string())),
        }
    }

    /// Insert suggestions as empty leaves next to the category at `path`.
    ///
    /// Names are trimmed and spaces become underscores. Names that are
    /// empty, contain a separator or already exist are skipped. Returns the
    /// number of categories added.
    pub fn accept_suggestions(&mut self, path: &str, suggestions: &[Suggestion]) -> Result<usize> {
        let parent = self.insertion_parent_mut(path.trim())?;
        let mut added = 0;
        for suggestion in suggestions {
            let name = suggestion.name.trim().replace(' ', "_");
            if path::validate_name(&name).is_err() || parent.contains_key(&name) {
                continue;
            }
            parent.insert(
                name,
                Category::leaf().instructed(suggestion.instruction.trim()),
            );
            added += 1;
        }
        Ok(added)
    }

    /// Leaf paths containing `term`, ignoring case. A blank term matches all.
    pub fn search_paths(&self, term: &str) -> Vec<String> {
        let term = term.trim().to_lowercase();
        self.paths()
            .into_iter()
            .filter(|p| term.is_empty() || p.to_lowercase().contains(&term))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WildcardTree {
        let mut cat2 = Children::new();
        cat2.insert("sub1".into(), Category::with_wildcards(["b"]));
        cat2.insert("sub2".into(), Category::with_wildcards(["c"]));

        let mut root = Children::new();
        root.insert(
            "cat1".into(),
            Category::with_wildcards(["a", "c"]).instructed("letters"),
        );
        root.insert("cat2".into(), Category::with_children(cat2));
        WildcardTree::from_categories(root)
    }

    fn words(tree: &WildcardTree, path: &str) -> Vec<String> {
        tree.wildcards(path).unwrap().iter().cloned().collect()
    }

    #[test]
    fn test_add_wildcard_keeps_sorted_unique() {
        let mut tree = sample();
        assert!(tree.add_wildcard("cat1", "b").unwrap());
        assert!(!tree.add_wildcard("cat1", "a").unwrap());
        assert_eq!(words(&tree, "cat1"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_wildcard_trims_and_ignores_blank() {
        let mut tree = sample();
        assert!(!tree.add_wildcard("cat1", "   ").unwrap());
        assert!(tree.add_wildcard("cat1", "  zebra ").unwrap());
        assert_eq!(words(&tree, "cat1"), vec!["a", "c", "zebra"]);
    }

    #[test]
    fn test_add_wildcard_is_case_sensitive() {
        let mut tree = sample();
        assert!(tree.add_wildcard("cat1", "A").unwrap());
        assert_eq!(words(&tree, "cat1"), vec!["A", "a", "c"]);
    }

    #[test]
    fn test_add_wildcard_errors() {
        let mut tree = sample();
        assert_eq!(
            tree.add_wildcard("missing", "x"),
            Err(TreeError::NotFound("missing".into()))
        );
        assert_eq!(
            tree.add_wildcard("cat2", "x"),
            Err(TreeError::NotALeaf("cat2".into()))
        );
    }

    #[test]
    fn test_remove_wildcards() {
        let mut tree = sample();
        let removed = tree.remove_wildcards("cat1", &["a", "nope"]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(words(&tree, "cat1"), vec!["c"]);
    }

    #[test]
    fn test_merge_wildcards_reports_new_only() {
        let mut tree = sample();
        let added = tree
            .merge_wildcards("cat2/sub1", &["z", "b", " ", "a "])
            .unwrap();
        assert_eq!(added, vec!["a", "z"]);
        assert_eq!(words(&tree, "cat2/sub1"), vec!["a", "b", "z"]);
    }

    #[test]
    fn test_create_category_nested() {
        let mut tree = WildcardTree::new();
        assert!(tree.create_category(" New/Category ").unwrap());
        assert!(tree.get("New").unwrap().children().is_some());
        assert!(tree.get("New/Category").unwrap().is_leaf());
        assert_eq!(tree.paths(), vec!["New/Category"]);

        // Creating again is a no-op
        assert!(!tree.create_category("New/Category").unwrap());
    }

    #[test]
    fn test_create_category_converts_empty_leaf() {
        let mut tree = WildcardTree::new();
        tree.create_category("Parent").unwrap();
        tree.set_instruction("Parent", "keep me").unwrap();
        tree.create_category("Parent/Child").unwrap();

        let parent = tree.get("Parent").unwrap();
        assert!(!parent.is_leaf());
        assert_eq!(parent.instruction, "keep me");
        assert!(tree.get("Parent/Child").is_some());
    }

    #[test]
    fn test_create_category_refuses_under_filled_leaf() {
        let mut tree = sample();
        assert_eq!(
            tree.create_category("cat1/child"),
            Err(TreeError::LeafNotEmpty("cat1".into()))
        );
        assert_eq!(words(&tree, "cat1"), vec!["a", "c"]);
    }

    #[test]
    fn test_create_category_rejects_empty_segments() {
        let mut tree = WildcardTree::new();
        assert!(matches!(
            tree.create_category("a//b"),
            Err(TreeError::InvalidPath(_))
        ));
        assert!(matches!(
            tree.create_category("   "),
            Err(TreeError::InvalidPath(_))
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_delete_nested_keeps_parent() {
        let mut tree = WildcardTree::new();
        tree.create_category("Parent/Child").unwrap();
        tree.delete_category("Parent/Child").unwrap();

        let parent = tree.get("Parent").unwrap();
        assert!(parent.children().unwrap().is_empty());
        assert!(tree.paths().is_empty());
    }

    #[test]
    fn test_delete_top_level_leaf() {
        let mut tree = sample();
        let removed = tree.delete_category("cat1").unwrap();
        assert_eq!(removed.instruction, "letters");
        assert!(tree.get("cat1").is_none());
        assert!(tree.get("cat2").is_some());
    }

    #[test]
    fn test_delete_missing() {
        let mut tree = sample();
        assert_eq!(
            tree.delete_category("cat2/nope"),
            Err(TreeError::NotFound("cat2/nope".into()))
        );
        assert_eq!(
            tree.delete_category("cat1/deeper"),
            Err(TreeError::NotFound("cat1/deeper".into()))
        );
    }

    #[test]
    fn test_accept_suggestions_inserts_siblings() {
        let mut tree = sample();
        let suggestions = vec![
            Suggestion {
                name: "sub 3".into(),
                instruction: "third".into(),
            },
            Suggestion {
                name: "sub1".into(),
                instruction: "duplicate".into(),
            },
            Suggestion {
                name: "bad/name".into(),
                instruction: String::new(),
            },
        ];
        let added = tree.accept_suggestions("cat2/sub1", &suggestions).unwrap();
        assert_eq!(added, 1);

        let new = tree.get("cat2/sub_3").unwrap();
        assert!(new.is_leaf());
        assert_eq!(new.instruction, "third");
        assert_eq!(tree.get("cat2/sub1").unwrap().instruction, "");
    }

    #[test]
    fn test_accept_suggestions_top_level() {
        let mut tree = sample();
        let suggestions = vec![Suggestion {
            name: "NewCat".into(),
            instruction: "New instruction".into(),
        }];
        assert_eq!(tree.accept_suggestions("cat1", &suggestions).unwrap(), 1);
        assert_eq!(tree.get("NewCat").unwrap().instruction, "New instruction");
        assert_eq!(tree.accept_suggestions("", &suggestions).unwrap(), 0);
    }

    #[test]
    fn test_search_paths() {
        let tree = sample();
        assert_eq!(tree.search_paths("SUB"), vec!["cat2/sub1", "cat2/sub2"]);
        assert_eq!(tree.search_paths("  ").len(), 3);
        assert!(tree.search_paths("zzz").is_empty());
    }

    #[test]
    fn test_json_shape() {
        let tree = sample();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["cat1"]["instruction"], "letters");
        assert_eq!(json["cat1"]["wildcards"], serde_json::json!(["a", "c"]));
        assert_eq!(
            json["cat2"]["children"]["sub1"]["wildcards"],
            serde_json::json!(["b"])
        );

        let back: WildcardTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
