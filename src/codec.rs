//! YAML codec for wildcard files
//!
//! Structure is parsed with `serde_yaml`. Instructions live in comments
//! (`category: # instruction: Use specific style`), which no serde data
//! model keeps, so the raw text is scanned separately into a side table of
//! `(parent path, key) -> instruction` and joined back during decoding.
//! Encoding writes the document by hand so the comments can be emitted.
//!
//! Loading is forgiving ([`load_file`] degrades to an empty tree); saving
//! and exporting report every failure.

use crate::path;
use crate::tree::{Category, CategoryKind, Children, WildcardTree};
use serde_yaml::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Prefix marking an instruction comment
pub const INSTRUCTION_PREFIX: &str = "instruction:";

/// Error type for codec and file operations
#[derive(Debug)]
pub enum CodecError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    /// The document parsed but is not a mapping of categories
    Shape(String),
    /// A category key that cannot be used in a path
    InvalidKey(String),
    /// Two keys of one mapping name the same category
    DuplicateKey(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "IO error: {}", e),
            CodecError::Yaml(e) => write!(f, "YAML error: {}", e),
            CodecError::Shape(msg) => write!(f, "Unexpected document shape: {}", msg),
            CodecError::InvalidKey(key) => write!(
                f,
                "Invalid category name '{}': names must be non-empty and contain no '/'",
                key
            ),
            CodecError::DuplicateKey(path) => {
                write!(f, "Category '{}' appears more than once", path)
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl From<serde_yaml::Error> for CodecError {
    fn from(e: serde_yaml::Error) -> Self {
        CodecError::Yaml(e)
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// `(parent path, key) -> instruction text`
pub type CommentTable = HashMap<(String, String), String>;

// =============================================================================
// Decoding
// =============================================================================

/// Decode a YAML document into a tree. Empty documents give an empty tree.
pub fn decode(document: &str) -> Result<WildcardTree> {
    let blank = document.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    });
    if blank {
        return Ok(WildcardTree::new());
    }
    let value: Value = serde_yaml::from_str(document)?;
    let comments = scan_comments(document);
    match value {
        Value::Null => Ok(WildcardTree::new()),
        Value::Mapping(map) => Ok(WildcardTree::from_categories(decode_mapping(
            &map, "", &comments,
        )?)),
        other => Err(CodecError::Shape(format!(
            "top level must be a mapping of categories, found {}",
            kind_name(&other)
        ))),
    }
}

fn decode_mapping(
    map: &serde_yaml::Mapping,
    parent: &str,
    comments: &CommentTable,
) -> Result<Children> {
    let mut children = Children::new();
    for (key, value) in map {
        let name = scalar_to_string(key).ok_or_else(|| {
            CodecError::InvalidKey(serde_json::to_string(key).unwrap_or_default())
        })?;
        // Path segments are trimmed on lookup, so padded keys could never resolve
        if path::validate_name(&name).is_err() || name.trim() != name {
            return Err(CodecError::InvalidKey(name));
        }
        let child_path = path::join(parent, &name);
        if children.contains_key(&name) {
            return Err(CodecError::DuplicateKey(child_path));
        }
        let kind = decode_value(value, &child_path, comments)?;
        let instruction = comments
            .get(&(parent.to_string(), name.clone()))
            .cloned()
            .unwrap_or_default();
        children.insert(name, Category { instruction, kind });
    }
    Ok(children)
}

fn decode_value(value: &Value, at: &str, comments: &CommentTable) -> Result<CategoryKind> {
    Ok(match value {
        Value::Sequence(items) => {
            CategoryKind::Wildcards(items.iter().map(item_to_string).collect())
        }
        Value::Mapping(map) => CategoryKind::Children(decode_mapping(map, at, comments)?),
        Value::Tagged(tagged) => return decode_value(&tagged.value, at, comments),
        // `key:` with nothing after it is a category with no words yet
        Value::Null => CategoryKind::Wildcards(BTreeSet::new()),
        scalar => CategoryKind::Wildcards(BTreeSet::from([item_to_string(scalar)])),
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn item_to_string(value: &Value) -> String {
    scalar_to_string(value).unwrap_or_else(|| {
        serde_json::to_string(value).unwrap_or_default()
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

// =============================================================================
// Comment scanning
// =============================================================================

/// Collect instruction comments attached to block-mapping keys.
///
/// A trailing comment on the key's own line always counts (with or without
/// the `instruction:` prefix). A full-line comment directly above a key
/// counts only when it carries the prefix.
pub fn scan_comments(document: &str) -> CommentTable {
    let mut table = CommentTable::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut pending: Option<String> = None;
    let mut block_scalar_parent: Option<usize> = None;

    for raw in document.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(limit) = block_scalar_parent {
            if trimmed.is_empty() || indent > limit {
                continue;
            }
            block_scalar_parent = None;
        }

        if trimmed.is_empty() {
            pending = None;
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            pending = comment
                .trim()
                .strip_prefix(INSTRUCTION_PREFIX)
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
            continue;
        }
        if trimmed.starts_with("---") || trimmed.starts_with("...") || trimmed.starts_with('%') {
            stack.clear();
            pending = None;
            continue;
        }
        if trimmed == "-" || trimmed.starts_with("- ") {
            pending = None;
            continue;
        }

        let Some((key, rest)) = split_key(trimmed) else {
            pending = None;
            continue;
        };

        while stack.last().map_or(false, |(level, _)| *level >= indent) {
            stack.pop();
        }
        let parent = stack
            .iter()
            .map(|(_, k)| k.as_str())
            .collect::<Vec<_>>()
            .join("/");

        let (value, comment) = split_comment(rest);
        let text = comment.map(instruction_text).or_else(|| pending.take());
        pending = None;
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            table.insert((parent, key.clone()), text);
        }

        if value.starts_with('|') || value.starts_with('>') {
            block_scalar_parent = Some(indent);
        }
        stack.push((indent, key));
    }

    debug!(count = table.len(), "scanned instruction comments");
    table
}

/// Strip the optional `instruction:` prefix from a trailing comment
fn instruction_text(comment: &str) -> String {
    let comment = comment.trim();
    comment
        .strip_prefix(INSTRUCTION_PREFIX)
        .unwrap_or(comment)
        .trim()
        .to_string()
}

/// Split `key: rest` into the key and everything after the colon
fn split_key(line: &str) -> Option<(String, &str)> {
    let first = line.chars().next()?;
    match first {
        '"' | '\'' => {
            let end = closing_quote(line, first)?;
            let after = &line[end + 1..];
            let rest = after.trim_start().strip_prefix(':')?;
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let key: String = serde_yaml::from_str(&line[..=end]).ok()?;
            Some((key, rest))
        }
        '[' | '{' | '?' | '&' | '*' | '!' | '|' | '>' | '@' | '`' => None,
        _ => {
            let bytes = line.as_bytes();
            let mut idx = 0;
            while idx < bytes.len() {
                match bytes[idx] {
                    b'#' if idx > 0 && bytes[idx - 1].is_ascii_whitespace() => return None,
                    b':' => {
                        let next = bytes.get(idx + 1);
                        if next.map_or(true, |b| b.is_ascii_whitespace()) {
                            let key = line[..idx].trim_end();
                            if key.is_empty() {
                                return None;
                            }
                            let key = match serde_yaml::from_str::<Value>(key) {
                                Ok(value) => scalar_to_string(&value)?,
                                Err(_) => key.to_string(),
                            };
                            return Some((key, &line[idx + 1..]));
                        }
                    }
                    _ => {}
                }
                idx += 1;
            }
            None
        }
    }
}

/// Byte index of the quote closing a scalar that opens at index 0
fn closing_quote(line: &str, quote: char) -> Option<usize> {
    let mut chars = line.char_indices().skip(1).peekable();
    while let Some((idx, c)) = chars.next() {
        match (quote, c) {
            ('"', '\\') => {
                chars.next();
            }
            ('\'', '\'') => {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                } else {
                    return Some(idx);
                }
            }
            ('"', '"') => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Split the text after a key's colon into value and trailing comment.
/// A `#` starts a comment only outside quotes and after whitespace.
fn split_comment(rest: &str) -> (&str, Option<&str>) {
    let mut quote: Option<char> = None;
    let mut prev_ws = true;
    let mut escaped = false;
    for (idx, c) in rest.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '#' && prev_ws => {
                return (rest[..idx].trim(), Some(&rest[idx + 1..]));
            }
            None if (c == '"' || c == '\'') && prev_ws => quote = Some(c),
            None => {}
        }
        prev_ws = c.is_whitespace();
    }
    (rest.trim(), None)
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a tree as a YAML document with instruction comments
pub fn encode(tree: &WildcardTree) -> String {
    let mut out = String::new();
    if tree.is_empty() {
        out.push_str("{}\n");
        return out;
    }
    encode_children(&mut out, tree.categories(), 0);
    out
}

fn encode_children(out: &mut String, children: &Children, indent: usize) {
    let pad = " ".repeat(indent);
    for (name, category) in children {
        let _ = write!(out, "{}{}:", pad, quote_scalar(name));
        match &category.kind {
            CategoryKind::Wildcards(words) if words.is_empty() => out.push_str(" []"),
            CategoryKind::Children(nested) if nested.is_empty() => out.push_str(" {}"),
            _ => {}
        }
        let instruction = single_line(&category.instruction);
        if !instruction.is_empty() {
            let _ = write!(out, " # {} {}", INSTRUCTION_PREFIX, instruction);
        }
        out.push('\n');

        match &category.kind {
            CategoryKind::Wildcards(words) => {
                for word in words {
                    let _ = writeln!(out, "{}  - {}", pad, quote_scalar(word));
                }
            }
            CategoryKind::Children(nested) => encode_children(out, nested, indent + 2),
        }
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Emit a string plain when it reads back as the same string, otherwise
/// double-quoted (JSON string syntax is valid YAML).
fn quote_scalar(s: &str) -> String {
    if is_plain_safe(s) {
        s.to_string()
    } else {
        serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
    }
}

fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if s.trim() != s
        || "-?:,[]{}#&*!|>'\"%@`".contains(first)
        || s.ends_with(':')
        || s.contains(": ")
        || s.contains(" #")
        || s.chars().any(|c| c.is_control())
    {
        return false;
    }
    matches!(serde_yaml::from_str::<Value>(s), Ok(Value::String(ref parsed)) if parsed == s)
}

// =============================================================================
// Files
// =============================================================================

/// Read and decode a file, reporting every failure
pub fn read_file(path: &Path) -> Result<WildcardTree> {
    let content = std::fs::read_to_string(path)?;
    decode(&content)
}

/// Load the data file. A missing file gives an empty tree; a broken one is
/// logged and also gives an empty tree.
pub fn load_file(path: &Path) -> WildcardTree {
    if !path.exists() {
        info!(path = %path.display(), "data file not found, starting empty");
        return WildcardTree::new();
    }
    match read_file(path) {
        Ok(tree) => {
            info!(path = %path.display(), categories = tree.categories().len(), "loaded wildcards");
            tree
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to load wildcard file");
            WildcardTree::new()
        }
    }
}

/// Write the tree to `path`, creating parent directories
pub fn save_file(tree: &WildcardTree, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode(tree))?;
    info!(path = %path.display(), "saved wildcards");
    Ok(())
}

/// Write the tree to a fresh `.yaml` file in the temp directory and keep it
pub fn export_temp(tree: &WildcardTree) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("wildcards-")
        .suffix(".yaml")
        .tempfile()?;
    std::io::Write::write_all(&mut file, encode(tree).as_bytes())?;
    let (_, path) = file.keep().map_err(|e| CodecError::Io(e.error))?;
    info!(path = %path.display(), "exported wildcards");
    Ok(path)
}
