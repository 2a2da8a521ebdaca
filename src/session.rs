//! Editing session
//!
//! One [`Session`] holds the live tree plus everything the handlers need
//! (data file, provider settings, prompts). The CLI and the HTTP API both
//! drive it; nothing here is global.

use crate::codec::{self, CodecError};
use crate::config::Config;
use crate::llm::{self, Completer, GenerationContext, LlmError, Provider, ProviderSettings, SuggestionContext};
use crate::path;
use crate::tree::{Suggestion, TreeError, WildcardTree};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Error type for session operations
#[derive(Debug)]
pub enum SessionError {
    Tree(TreeError),
    Llm(LlmError),
    Codec(CodecError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Tree(e) => write!(f, "{}", e),
            SessionError::Llm(e) => write!(f, "{}", e),
            SessionError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Tree(e) => Some(e),
            SessionError::Llm(e) => Some(e),
            SessionError::Codec(e) => Some(e),
        }
    }
}

impl From<TreeError> for SessionError {
    fn from(e: TreeError) -> Self {
        SessionError::Tree(e)
    }
}

impl From<LlmError> for SessionError {
    fn from(e: LlmError) -> Self {
        SessionError::Llm(e)
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Partial settings update; `None` leaves a value alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub provider: Option<Provider>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub suggest_prompt: Option<String>,
}

/// Settings as shown to a client, without the keys themselves
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub provider: Provider,
    pub model: String,
    pub custom_url: String,
    pub has_api_key: bool,
    pub system_prompt: String,
    pub suggest_prompt: String,
}

pub struct Session {
    pub tree: WildcardTree,
    pub data_path: PathBuf,
    pub settings: ProviderSettings,
    pub provider: Provider,
    pub system_prompt: String,
    pub suggest_prompt: String,
}

impl Session {
    /// Session over an already loaded tree
    pub fn new(tree: WildcardTree, data_path: PathBuf, config: &Config) -> Self {
        Self {
            tree,
            data_path,
            settings: config.provider_settings(),
            provider: Provider::default(),
            system_prompt: config.system_prompt(),
            suggest_prompt: config.suggest_prompt(),
        }
    }

    /// Load the data file (degrading to an empty tree) and start a session
    pub fn open(data_path: &Path, config: &Config) -> Self {
        Self::new(codec::load_file(data_path), data_path.to_path_buf(), config)
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) {
        if let Some(provider) = update.provider {
            self.provider = provider;
        }
        if let Some(key) = update.api_key {
            self.settings.api_keys.set(self.provider, Some(key));
        }
        if let Some(model) = update.model {
            self.settings.models.set_model(self.provider, model);
        }
        if let Some(url) = update.base_url {
            self.settings.models.custom_url = url;
        }
        if let Some(prompt) = update.system_prompt {
            self.system_prompt = prompt;
        }
        if let Some(prompt) = update.suggest_prompt {
            self.suggest_prompt = prompt;
        }
    }

    pub fn settings_view(&self) -> SettingsView {
        SettingsView {
            provider: self.provider,
            model: self.settings.models.model(self.provider).to_string(),
            custom_url: self.settings.models.custom_url.clone(),
            has_api_key: self.settings.api_keys.get(self.provider).is_some(),
            system_prompt: self.system_prompt.clone(),
            suggest_prompt: self.suggest_prompt.clone(),
        }
    }

    /// Ask the active provider for more wildcards and merge them into the
    /// leaf. Returns the words that were new.
    pub fn generate_more(&mut self, completer: &dyn Completer, path: &str) -> Result<Vec<String>> {
        let category = self
            .tree
            .get(path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        let existing = category
            .wildcards()
            .ok_or_else(|| TreeError::NotALeaf(path.to_string()))?;

        info!(path, provider = %self.provider, "generating wildcards");
        let ctx = GenerationContext {
            path,
            existing: existing.iter().map(String::as_str).collect(),
            instruction: &category.instruction,
        };
        let generated = llm::generate(
            completer,
            self.provider,
            &self.settings,
            &self.system_prompt,
            &ctx,
        )?;
        let added = self.tree.merge_wildcards(path, &generated)?;
        info!(path, added = added.len(), "generation complete");
        Ok(added)
    }

    /// Ask the active provider for new categories to sit next to `path`
    pub fn suggest(&self, completer: &dyn Completer, path: &str) -> Result<Vec<Suggestion>> {
        let path = path.trim();
        let ctx = SuggestionContext {
            parent_path: path::parent(path).unwrap_or(""),
            siblings: path::sibling_keys(path, &self.tree),
        };
        info!(path, provider = %self.provider, "requesting suggestions");
        Ok(llm::suggest(
            completer,
            self.provider,
            &self.settings,
            &self.suggest_prompt,
            &ctx,
        )?)
    }

    pub fn accept_suggestions(&mut self, path: &str, suggestions: &[Suggestion]) -> Result<usize> {
        let added = self.tree.accept_suggestions(path, suggestions)?;
        info!(added, "accepted suggestions");
        Ok(added)
    }

    /// Write the tree back to the data file
    pub fn save(&self) -> Result<&Path> {
        codec::save_file(&self.tree, &self.data_path)?;
        Ok(self.data_path.as_path())
    }

    /// Write the tree to a new temporary YAML file
    pub fn export(&self) -> Result<PathBuf> {
        Ok(codec::export_temp(&self.tree)?)
    }

    /// Replace the whole tree with a decoded document. On error the current
    /// tree is kept.
    pub fn import(&mut self, document: &str) -> Result<()> {
        self.tree = codec::decode(document)?;
        info!(categories = self.tree.categories().len(), "imported wildcards");
        Ok(())
    }

    pub fn import_file(&mut self, file: &Path) -> Result<()> {
        let document = std::fs::read_to_string(file).map_err(CodecError::Io)?;
        self.import(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderRequest;
    use serde_json::json;
    use std::cell::RefCell;

    /// Replays one canned body and records what was sent
    struct Canned {
        body: String,
        seen: RefCell<Vec<ProviderRequest>>,
    }

    impl Canned {
        fn gemini(text: &str) -> Self {
            Self {
                body: json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
                    .to_string(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Completer for Canned {
        fn complete(&self, request: &ProviderRequest) -> llm::Result<String> {
            self.seen.borrow_mut().push(request.clone());
            Ok(self.body.clone())
        }
    }

    fn session() -> Session {
        let tree = codec::decode(
            "\
Category: # instruction: Test instruction
  - item1
  - item2
EmptyCat: []
Characters:
  Job:
    - baker
  Mood:
    - calm
",
        )
        .unwrap();
        let mut session = Session::new(tree, PathBuf::from("unused.yaml"), &Config::default());
        session.settings.api_keys.gemini = Some("k".to_string());
        session
    }

    #[test]
    fn test_generate_more_merges() {
        let mut session = session();
        let completer = Canned::gemini(r#"["gen1", "item1", "gen2"]"#);
        let added = session.generate_more(&completer, "Category").unwrap();
        assert_eq!(added, vec!["gen1", "gen2"]);

        let words: Vec<&String> = session.tree.wildcards("Category").unwrap().iter().collect();
        assert_eq!(words, vec!["gen1", "gen2", "item1", "item2"]);

        let seen = completer.seen.borrow();
        let user = seen[0].body["contents"][2]["parts"][0]["text"].as_str().unwrap();
        assert!(user.contains("Existing Wildcards: item1, item2"));
        assert!(user.contains("Custom Instructions: \"Test instruction\""));
    }

    #[test]
    fn test_generate_more_unknown_path() {
        let mut session = session();
        let completer = Canned::gemini("[]");
        assert!(matches!(
            session.generate_more(&completer, "Nope"),
            Err(SessionError::Tree(TreeError::NotFound(_)))
        ));
        assert!(matches!(
            session.generate_more(&completer, "Characters"),
            Err(SessionError::Tree(TreeError::NotALeaf(_)))
        ));
        assert!(completer.seen.borrow().is_empty());
    }

    #[test]
    fn test_generate_more_without_key() {
        let mut session = session();
        session.settings.api_keys.gemini = None;
        let completer = Canned::gemini("[]");
        assert!(matches!(
            session.generate_more(&completer, "Category"),
            Err(SessionError::Llm(LlmError::Config(_)))
        ));
        assert!(completer.seen.borrow().is_empty());
    }

    #[test]
    fn test_suggest_uses_parent_and_siblings() {
        let session = session();
        let completer = Canned::gemini(r#"[{"name": "NewCat", "instruction": "Do this"}]"#);
        let suggestions = session.suggest(&completer, "Characters/Job").unwrap();
        assert_eq!(suggestions[0].name, "NewCat");

        let seen = completer.seen.borrow();
        let user = seen[0].body["contents"][2]["parts"][0]["text"].as_str().unwrap();
        assert!(user.contains("\"Mood\""));
        assert!(user.contains("'Characters' category"));
    }

    #[test]
    fn test_suggest_then_accept() {
        let mut session = session();
        let completer = Canned::gemini(r#"[{"name": "Hair Color", "instruction": "Shades"}]"#);
        let suggestions = session.suggest(&completer, "Characters/Job").unwrap();
        let added = session
            .accept_suggestions("Characters/Job", &suggestions)
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(
            session.tree.get("Characters/Hair_Color").unwrap().instruction,
            "Shades"
        );
    }

    #[test]
    fn test_import_replaces_or_keeps() {
        let mut session = session();
        session.import("Other:\n  - x\n").unwrap();
        assert_eq!(session.tree.paths(), vec!["Other"]);

        assert!(session.import("- not\n- a mapping\n").is_err());
        assert_eq!(session.tree.paths(), vec!["Other"]);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut session = session();
        session.data_path = dir.path().join("initial-data.yaml");
        session.save().unwrap();

        let reopened = Session::open(&session.data_path, &Config::default());
        assert_eq!(reopened.tree, session.tree);
        assert_eq!(
            reopened.tree.get("Category").unwrap().instruction,
            "Test instruction"
        );
    }

    #[test]
    fn test_update_settings() {
        let mut session = session();
        session.update_settings(SettingsUpdate {
            provider: Some(Provider::Custom),
            api_key: Some("secret".into()),
            model: Some("llama3".into()),
            base_url: Some("http://localhost:1/v1".into()),
            ..Default::default()
        });
        let view = session.settings_view();
        assert_eq!(view.provider, Provider::Custom);
        assert_eq!(view.model, "llama3");
        assert!(view.has_api_key);
        assert_eq!(view.custom_url, "http://localhost:1/v1");
        // Other providers are untouched
        assert_eq!(session.settings.api_keys.get(Provider::Gemini), Some("k"));
    }
}
