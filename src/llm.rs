//! LLM provider adapter
//!
//! Shapes generation and suggestion prompts into a provider-specific HTTP
//! request and unwraps the reply. Request building and response parsing are
//! pure; only [`LlmClient`] touches the network, with one attempt and a
//! fixed timeout.

use crate::path;
use crate::tree::Suggestion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-3.5-turbo";

/// Existing wildcards sent as context are capped at this many
pub const MAX_CONTEXT_WILDCARDS: usize = 50;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrapper keys searched when a generation reply is an object
const GENERATION_KEYS: [&str; 3] = ["wildcards", "items", "categories"];
/// Wrapper keys searched when a suggestion reply is an object
const SUGGESTION_KEYS: [&str; 3] = ["suggestions", "items", "categories"];

/// Error type for provider calls
#[derive(Debug)]
pub enum LlmError {
    /// Missing key, URL or similar, raised before any I/O
    Config(String),
    /// The request never produced a response
    Transport(String),
    /// Non-2xx status
    Http { status: u16, body: String },
    /// Body is not JSON or lacks the expected shape
    Parse(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Config(msg) => write!(f, "Configuration error: {}", msg),
            LlmError::Transport(msg) => write!(f, "Request failed: {}", msg),
            LlmError::Http { status, body } => {
                write!(f, "API request failed with status {}: {}", status, body)
            }
            LlmError::Parse(msg) => write!(f, "Invalid API response: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        // Gemini carries the key in the query string
        LlmError::Transport(e.without_url().to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

// =============================================================================
// Settings
// =============================================================================

/// Supported backends
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    #[value(name = "openrouter")]
    OpenRouter,
    Custom,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
            Provider::Custom => "custom",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::OpenRouter => "OpenRouter",
            Provider::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openrouter" => Ok(Provider::OpenRouter),
            "custom" => Ok(Provider::Custom),
            other => Err(LlmError::Config(format!(
                "Provider '{}' is not implemented",
                other
            ))),
        }
    }
}

/// API keys per provider; empty strings count as missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub gemini: Option<String>,
    #[serde(default)]
    pub openrouter: Option<String>,
    #[serde(default)]
    pub custom: Option<String>,
}

impl ApiKeys {
    pub fn get(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenRouter => &self.openrouter,
            Provider::Custom => &self.custom,
        };
        key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn set(&mut self, provider: Provider, key: Option<String>) {
        let slot = match provider {
            Provider::Gemini => &mut self.gemini,
            Provider::OpenRouter => &mut self.openrouter,
            Provider::Custom => &mut self.custom,
        };
        *slot = key;
    }
}

/// Model names per provider plus the custom endpoint's base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub gemini: String,
    pub openrouter: String,
    pub custom: String,
    pub custom_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            gemini: DEFAULT_GEMINI_MODEL.to_string(),
            openrouter: DEFAULT_OPENROUTER_MODEL.to_string(),
            custom: String::new(),
            custom_url: String::new(),
        }
    }
}

impl ModelConfig {
    pub fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenRouter => &self.openrouter,
            Provider::Custom => &self.custom,
        }
    }

    pub fn set_model(&mut self, provider: Provider, model: String) {
        match provider {
            Provider::Gemini => self.gemini = model,
            Provider::OpenRouter => self.openrouter = model,
            Provider::Custom => self.custom = model,
        }
    }
}

/// Credentials and models for every provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub models: ModelConfig,
}

// =============================================================================
// Requests
// =============================================================================

/// A ready-to-send POST
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub provider: Provider,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ProviderRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What a generation request is about
#[derive(Debug, Clone, Default)]
pub struct GenerationContext<'a> {
    pub path: &'a str,
    pub existing: Vec<&'a str>,
    pub instruction: &'a str,
}

/// What a suggestion request is about
#[derive(Debug, Clone, Default)]
pub struct SuggestionContext<'a> {
    /// Category the suggestions belong to; empty for the top level
    pub parent_path: &'a str,
    /// Names already present next to the suggestions
    pub siblings: Vec<String>,
}

pub fn generation_user_prompt(ctx: &GenerationContext<'_>) -> String {
    let existing: Vec<&str> = ctx
        .existing
        .iter()
        .take(MAX_CONTEXT_WILDCARDS)
        .copied()
        .collect();
    format!(
        "Category Path: '{}'\nExisting Wildcards: {}\nCustom Instructions: \"{}\"",
        path::readable(ctx.path),
        existing.join(", "),
        ctx.instruction.trim()
    )
}

fn readable_parent(parent_path: &str) -> String {
    if parent_path.trim().is_empty() {
        "Top-Level".to_string()
    } else {
        path::readable(parent_path)
    }
}

/// System prompt for suggestions, with `{parentPath}` filled in
pub fn suggestion_system_prompt(template: &str, ctx: &SuggestionContext<'_>) -> String {
    template.replace("{parentPath}", &readable_parent(ctx.parent_path))
}

pub fn suggestion_user_prompt(ctx: &SuggestionContext<'_>) -> String {
    let siblings = serde_json::to_string_pretty(&ctx.siblings).unwrap_or_else(|_| "[]".into());
    format!(
        "For context, here are the existing sibling items at the same level:\n{}\n\n\
         Please provide new suggestions for the '{}' category. \
         Return a JSON array of objects with 'name' and 'instruction' keys.",
        siblings,
        readable_parent(ctx.parent_path)
    )
}

/// Shared request shaping. `schema` is the Gemini response schema.
fn prepare_request(
    provider: Provider,
    settings: &ProviderSettings,
    system_prompt: &str,
    user_prompt: &str,
    schema: Value,
) -> Result<ProviderRequest> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    let api_key = settings.api_keys.get(provider);
    let model = settings.models.model(provider);

    let (url, body) = match provider {
        Provider::Gemini => {
            let key = api_key.ok_or_else(|| missing_key(provider))?;
            let model = if model.trim().is_empty() {
                DEFAULT_GEMINI_MODEL
            } else {
                model.trim()
            };
            let url = gemini_url(model, key)?;
            let body = json!({
                "contents": [
                    {"role": "user", "parts": [{"text": system_prompt}]},
                    {"role": "model", "parts": [{"text": "Understood."}]},
                    {"role": "user", "parts": [{"text": user_prompt}]}
                ],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": schema
                }
            });
            (url, body)
        }
        Provider::OpenRouter | Provider::Custom => {
            let url = if provider == Provider::OpenRouter {
                let key = api_key.ok_or_else(|| missing_key(provider))?;
                headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
                OPENROUTER_CHAT_URL.to_string()
            } else {
                let base = settings.models.custom_url.trim();
                if base.is_empty() {
                    return Err(LlmError::Config(
                        "Custom API URL not provided in settings.".to_string(),
                    ));
                }
                if let Some(key) = api_key {
                    headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
                }
                format!("{}/chat/completions", base.trim_end_matches('/'))
            };
            let body = json!({
                "model": model,
                "messages": [
                    {"role": "user", "content": format!("{}\n\n{}", system_prompt, user_prompt)}
                ],
                "response_format": {"type": "json_object"}
            });
            (url, body)
        }
    };

    Ok(ProviderRequest {
        provider,
        url,
        headers,
        body,
    })
}

/// `<base>/<model>:generateContent?key=<key>` with both parts escaped
fn gemini_url(model: &str, key: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(GEMINI_API_BASE)
        .map_err(|e| LlmError::Config(format!("Invalid Gemini API URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| LlmError::Config("Gemini API URL cannot take a model path".to_string()))?
        .push(&format!("{}:generateContent", model));
    url.query_pairs_mut().append_pair("key", key);
    Ok(url.into())
}

fn missing_key(provider: Provider) -> LlmError {
    LlmError::Config(format!(
        "{} API key not provided in settings.",
        provider.label()
    ))
}

pub fn build_generation_request(
    provider: Provider,
    settings: &ProviderSettings,
    system_prompt: &str,
    ctx: &GenerationContext<'_>,
) -> Result<ProviderRequest> {
    let schema = json!({"type": "ARRAY", "items": {"type": "STRING"}});
    prepare_request(
        provider,
        settings,
        system_prompt,
        &generation_user_prompt(ctx),
        schema,
    )
}

pub fn build_suggestion_request(
    provider: Provider,
    settings: &ProviderSettings,
    suggest_prompt: &str,
    ctx: &SuggestionContext<'_>,
) -> Result<ProviderRequest> {
    let schema = json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": {"type": "STRING"},
                "instruction": {"type": "STRING"}
            },
            "required": ["name", "instruction"]
        }
    });
    prepare_request(
        provider,
        settings,
        &suggestion_system_prompt(suggest_prompt, ctx),
        &suggestion_user_prompt(ctx),
        schema,
    )
}

// =============================================================================
// Responses
// =============================================================================

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok())
        .as_ref()
}

/// Return the inside of the first fenced code block, or the text unchanged
pub fn strip_code_fence(text: &str) -> &str {
    if !text.contains("```") {
        return text;
    }
    fence_regex()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
}

/// Pull the model's text out of the provider envelope
fn extract_content(provider: Provider, raw_body: &str) -> Result<String> {
    let envelope: Value = serde_json::from_str(raw_body)
        .map_err(|e| LlmError::Parse(format!("response is not JSON: {}", e)))?;
    let text = match provider {
        Provider::Gemini => envelope
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LlmError::Parse("'candidates' key not found in Gemini response".to_string())
            })?,
        Provider::OpenRouter | Provider::Custom => envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LlmError::Parse(format!("'choices' key not found in {} response", provider))
            })?,
    };
    Ok(text.to_string())
}

/// Parse the model's text and find the list it meant to return
fn extract_list(content: &str, wrapper_keys: &[&str]) -> Result<Vec<Value>> {
    let parsed: Value = serde_json::from_str(strip_code_fence(content).trim())
        .map_err(|e| LlmError::Parse(format!("content is not JSON: {}", e)))?;
    Ok(match parsed {
        Value::Array(items) => items,
        Value::Object(map) => {
            let wrapped = wrapper_keys
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array));
            match wrapped.or_else(|| map.values().find_map(Value::as_array)) {
                Some(items) => items.clone(),
                None => {
                    warn!("reply object holds no list");
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    })
}

/// Generated wildcards from a raw provider body
pub fn parse_generation_response(provider: Provider, raw_body: &str) -> Result<Vec<String>> {
    let content = extract_content(provider, raw_body)?;
    let words = extract_list(&content, &GENERATION_KEYS)?
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Ok(words)
}

/// Suggested categories from a raw provider body. Items without a name are
/// dropped.
pub fn parse_suggestion_response(provider: Provider, raw_body: &str) -> Result<Vec<Suggestion>> {
    let content = extract_content(provider, raw_body)?;
    let suggestions = extract_list(&content, &SUGGESTION_KEYS)?
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(Suggestion {
                name,
                instruction: String::new(),
            }),
            other => serde_json::from_value::<Suggestion>(other).ok(),
        })
        .filter(|s| !s.name.trim().is_empty())
        .collect();
    Ok(suggestions)
}

// =============================================================================
// Transport
// =============================================================================

/// Sends a prepared request and returns the raw response body
pub trait Completer {
    fn complete(&self, request: &ProviderRequest) -> Result<String>;
}

/// Blocking reqwest client with a fixed timeout and no retries
pub struct LlmClient {
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wildcrafter/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl Completer for LlmClient {
    fn complete(&self, request: &ProviderRequest) -> Result<String> {
        info!(provider = %request.provider, "sending request");
        let mut builder = self.http.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.json(&request.body).send()?;
        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), bytes = body.len(), "provider replied");
        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Build, send and parse a generation request
pub fn generate(
    completer: &dyn Completer,
    provider: Provider,
    settings: &ProviderSettings,
    system_prompt: &str,
    ctx: &GenerationContext<'_>,
) -> Result<Vec<String>> {
    let request = build_generation_request(provider, settings, system_prompt, ctx)?;
    let body = completer.complete(&request)?;
    parse_generation_response(provider, &body)
}

/// Build, send and parse a suggestion request
pub fn suggest(
    completer: &dyn Completer,
    provider: Provider,
    settings: &ProviderSettings,
    suggest_prompt: &str,
    ctx: &SuggestionContext<'_>,
) -> Result<Vec<Suggestion>> {
    let request = build_suggestion_request(provider, settings, suggest_prompt, ctx)?;
    let body = completer.complete(&request)?;
    parse_suggestion_response(provider, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn settings_with(provider: Provider, key: &str) -> ProviderSettings {
        let mut settings = ProviderSettings::default();
        settings.api_keys.set(provider, Some(key.to_string()));
        settings.models.set_model(provider, "test_model".to_string());
        settings
    }

    fn ctx() -> GenerationContext<'static> {
        GenerationContext {
            path: "Characters/Job_Title",
            existing: vec!["baker", "archer"],
            instruction: "  fantasy only ",
        }
    }

    fn openai_body(content: &str) -> String {
        json!({"choices": [{"message": {"content": content}}]}).to_string()
    }

    fn gemini_body(text: &str) -> String {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
    }

    /// Records requests and replays a canned body
    struct Canned {
        reply: Result<String>,
        seen: RefCell<Vec<ProviderRequest>>,
    }

    impl Completer for Canned {
        fn complete(&self, request: &ProviderRequest) -> Result<String> {
            self.seen.borrow_mut().push(request.clone());
            match &self.reply {
                Ok(body) => Ok(body.clone()),
                Err(_) => Err(LlmError::Http {
                    status: 500,
                    body: "Error details".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_generation_user_prompt() {
        let prompt = generation_user_prompt(&ctx());
        assert_eq!(
            prompt,
            "Category Path: 'Characters > Job Title'\nExisting Wildcards: baker, archer\nCustom Instructions: \"fantasy only\""
        );
    }

    #[test]
    fn test_generation_prompt_caps_existing() {
        let words: Vec<String> = (0..80).map(|i| format!("w{}", i)).collect();
        let ctx = GenerationContext {
            path: "a",
            existing: words.iter().map(String::as_str).collect(),
            instruction: "",
        };
        let prompt = generation_user_prompt(&ctx);
        assert!(prompt.contains("w49"));
        assert!(!prompt.contains("w50"));
    }

    #[test]
    fn test_prepare_request_gemini() {
        let request =
            build_generation_request(Provider::Gemini, &settings_with(Provider::Gemini, "test_key"), "global", &ctx())
                .unwrap();
        assert!(request.url.contains("generativelanguage.googleapis.com"));
        assert!(request.url.contains("key=test_key"));
        assert!(request.url.contains("test_model"));
        assert_eq!(request.header("authorization"), None);
        assert_eq!(request.body["contents"][0]["parts"][0]["text"], "global");
        assert_eq!(request.body["contents"][1]["role"], "model");
        assert_eq!(
            request.body["generationConfig"]["responseSchema"]["items"]["type"],
            "STRING"
        );
    }

    #[test]
    fn test_gemini_url_escapes_key_and_model() {
        let mut settings = settings_with(Provider::Gemini, "a b&c=d");
        settings.models.gemini = "tuned/model x".to_string();
        let request = build_generation_request(Provider::Gemini, &settings, "", &ctx()).unwrap();
        assert!(
            request.url.starts_with(
                "https://generativelanguage.googleapis.com/v1beta/models/tuned%2Fmodel%20x:generateContent?"
            ),
            "{}",
            request.url
        );
        assert!(request.url.ends_with("key=a+b%26c%3Dd"), "{}", request.url);

        let plain = build_generation_request(
            Provider::Gemini,
            &settings_with(Provider::Gemini, "k"),
            "",
            &ctx(),
        )
        .unwrap();
        assert_eq!(
            plain.url,
            "https://generativelanguage.googleapis.com/v1beta/models/test_model:generateContent?key=k"
        );
    }

    #[test]
    fn test_prepare_request_openrouter() {
        let request = build_generation_request(
            Provider::OpenRouter,
            &settings_with(Provider::OpenRouter, "test_key"),
            "global",
            &ctx(),
        )
        .unwrap();
        assert_eq!(request.url, OPENROUTER_CHAT_URL);
        assert_eq!(request.header("Authorization"), Some("Bearer test_key"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body["model"], "test_model");
        assert_eq!(request.body["response_format"]["type"], "json_object");
        let content = request.body["messages"][0]["content"].as_str().unwrap();
        assert!(content.starts_with("global\n\nCategory Path:"));
    }

    #[test]
    fn test_prepare_request_custom() {
        let mut settings = settings_with(Provider::Custom, "test_key");
        settings.models.custom_url = "https://custom.api/v1/".to_string();
        let request =
            build_generation_request(Provider::Custom, &settings, "global", &ctx()).unwrap();
        assert_eq!(request.url, "https://custom.api/v1/chat/completions");
        assert_eq!(request.header("Authorization"), Some("Bearer test_key"));
        assert_eq!(request.body["model"], "test_model");
    }

    #[test]
    fn test_custom_without_key_has_no_auth_header() {
        let mut settings = ProviderSettings::default();
        settings.models.custom_url = "http://localhost:8080/v1".to_string();
        let request =
            build_generation_request(Provider::Custom, &settings, "global", &ctx()).unwrap();
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn test_missing_configuration() {
        let empty = ProviderSettings::default();
        let err = build_generation_request(Provider::Gemini, &empty, "", &ctx()).unwrap_err();
        assert!(matches!(err, LlmError::Config(ref m) if m.contains("Gemini API key not provided")));

        let err = build_generation_request(Provider::OpenRouter, &empty, "", &ctx()).unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));

        let err = build_generation_request(Provider::Custom, &empty, "", &ctx()).unwrap_err();
        assert!(matches!(err, LlmError::Config(ref m) if m.contains("Custom API URL")));

        let blank = settings_with(Provider::Gemini, "   ");
        assert!(build_generation_request(Provider::Gemini, &blank, "", &ctx()).is_err());
    }

    #[test]
    fn test_missing_key_fails_before_network() {
        let completer = Canned {
            reply: Ok(gemini_body("[]")),
            seen: RefCell::new(Vec::new()),
        };
        let result = generate(
            &completer,
            Provider::Gemini,
            &ProviderSettings::default(),
            "global",
            &ctx(),
        );
        assert!(matches!(result, Err(LlmError::Config(_))));
        assert!(completer.seen.borrow().is_empty());
    }

    #[test]
    fn test_parse_gemini_generation() {
        let body = gemini_body(r#"["wildcard1", "wildcard2"]"#);
        assert_eq!(
            parse_generation_response(Provider::Gemini, &body).unwrap(),
            vec!["wildcard1", "wildcard2"]
        );
    }

    #[test]
    fn test_parse_openrouter_generation_plain_array() {
        let body = openai_body(r#"["wildcard1", "wildcard2"]"#);
        assert_eq!(
            parse_generation_response(Provider::OpenRouter, &body).unwrap(),
            vec!["wildcard1", "wildcard2"]
        );
    }

    #[test]
    fn test_parse_fenced_wrapper_object() {
        let body = openai_body("Sure!\n```json\n{\"wildcards\": [\"x\", \"y\"]}\n```");
        assert_eq!(
            parse_generation_response(Provider::OpenRouter, &body).unwrap(),
            vec!["x", "y"]
        );
    }

    #[test]
    fn test_parse_falls_back_to_first_list() {
        let body = openai_body(r#"{"note": "hi", "words": ["a", 2, {"x": 1}, " "]}"#);
        assert_eq!(
            parse_generation_response(Provider::Custom, &body).unwrap(),
            vec!["a", "2"]
        );
        let body = openai_body(r#"{"note": "no list here"}"#);
        assert!(parse_generation_response(Provider::Custom, &body)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_generation_response(Provider::Gemini, "not json"),
            Err(LlmError::Parse(_))
        ));
        assert!(matches!(
            parse_generation_response(Provider::Gemini, r#"{"error": {}}"#),
            Err(LlmError::Parse(ref m)) if m.contains("candidates")
        ));
        assert!(matches!(
            parse_generation_response(Provider::OpenRouter, &openai_body("not json either")),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_suggestions() {
        let body = gemini_body(r#"[{"name": "cat1", "instruction": "inst1"}, {"instruction": "nameless"}]"#);
        assert_eq!(
            parse_suggestion_response(Provider::Gemini, &body).unwrap(),
            vec![Suggestion {
                name: "cat1".into(),
                instruction: "inst1".into()
            }]
        );

        let body = openai_body(
            "```\n{\"suggestions\": [{\"name\": \"Weather\"}, \"Season\"]}\n```",
        );
        let parsed = parse_suggestion_response(Provider::OpenRouter, &body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "Weather");
        assert_eq!(parsed[0].instruction, "");
        assert_eq!(parsed[1].name, "Season");
    }

    #[test]
    fn test_suggestion_request_shape() {
        let ctx = SuggestionContext {
            parent_path: "Characters",
            siblings: vec!["Job".into(), "Mood".into()],
        };
        let request = build_suggestion_request(
            Provider::Gemini,
            &settings_with(Provider::Gemini, "k"),
            "Suggest items for {parentPath}",
            &ctx,
        )
        .unwrap();
        assert_eq!(
            request.body["contents"][0]["parts"][0]["text"],
            "Suggest items for Characters"
        );
        let user = request.body["contents"][2]["parts"][0]["text"].as_str().unwrap();
        assert!(user.contains("\"Job\""));
        assert!(user.contains("'Characters' category"));
        assert_eq!(
            request.body["generationConfig"]["responseSchema"]["items"]["required"],
            json!(["name", "instruction"])
        );
    }

    #[test]
    fn test_suggestion_prompt_top_level() {
        let ctx = SuggestionContext::default();
        assert_eq!(
            suggestion_system_prompt("For {parentPath}", &ctx),
            "For Top-Level"
        );
    }

    #[test]
    fn test_generate_surfaces_http_errors() {
        let completer = Canned {
            reply: Err(LlmError::Transport(String::new())),
            seen: RefCell::new(Vec::new()),
        };
        let err = generate(
            &completer,
            Provider::Gemini,
            &settings_with(Provider::Gemini, "k"),
            "global",
            &ctx(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("API request failed with status 500"));
        assert_eq!(completer.seen.borrow().len(), 1);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("openrouter".parse::<Provider>().unwrap(), Provider::OpenRouter);
        assert!("anthropic".parse::<Provider>().is_err());
    }
}
