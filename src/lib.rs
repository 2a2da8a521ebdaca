//! Wildcrafter - curate wildcard lists for prompt generation
//!
//! Keep a tree of categories, each leaf holding a set of wildcard words,
//! and grow it with help from an LLM provider.
//!
//! # Overview
//!
//! The data lives in one YAML document. Mappings are categories, sequences
//! are wildcard lists, and a trailing `# instruction: ...` comment on a key
//! carries guidance for generation. Categories are addressed by
//! `/`-separated paths such as `Characters/Job`.
//!
//! # Providers
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | `gemini` | Google Generative Language `generateContent` |
//! | `openrouter` | OpenRouter chat completions |
//! | `custom` | Any OpenAI-compatible `<base>/chat/completions` |
//!
//! # Quick Start
//!
//! ```no_run
//! use wildcrafter::{codec, LlmClient, Session, Config};
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("web/config.json"));
//! let mut session = Session::open(Path::new("web/data/initial-data.yaml"), &config);
//!
//! // Hand-edit a leaf
//! session.tree.add_wildcard("Colors", "teal").unwrap();
//!
//! // Ask the provider for more
//! let client = LlmClient::new().unwrap();
//! let added = session.generate_more(&client, "Colors").unwrap();
//! println!("{} new wildcards", added.len());
//!
//! println!("{}", codec::encode(&session.tree));
//! ```

pub mod codec;
pub mod config;
pub mod llm;
pub mod path;
pub mod serve;
pub mod session;
pub mod skeleton;
pub mod tree;

pub use codec::CodecError;
pub use config::Config;
pub use llm::{Completer, LlmClient, LlmError, Provider, ProviderRequest, ProviderSettings};
pub use session::{Session, SessionError, SettingsUpdate, SettingsView};
pub use tree::{Category, CategoryKind, Suggestion, TreeError, WildcardTree};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Core types are reachable from the crate root
        let tree = WildcardTree::new();
        assert!(tree.is_empty());
        assert_eq!(Provider::default(), Provider::Gemini);
    }
}
